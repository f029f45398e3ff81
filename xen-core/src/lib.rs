//! Xen: a framed, bidirectional, asynchronous message channel between a
//! controlling process and one or more peers.
//!
//! A `Channel` reads length-prefixed frames off any
//! `AsyncRead + AsyncWrite` transport, decodes `CATEGORY:SERIAL:TEXT`
//! envelopes, and routes them: `CMD` through a host-supplied [`Evaluator`],
//! everything else through a host-supplied [`Dispatcher`]. `Server`/
//! `Client` in [`endpoint`] wire that up over TCP.

pub mod channel;
pub mod codec;
pub mod content;
pub mod endpoint;
pub mod errors;
pub mod evaluator;
pub mod queue;
pub mod receiver;

pub use channel::{Channel, Dispatcher, Message, PrintDispatcher};
pub use endpoint::{Client, Server};
pub use errors::{Result, XenError};
pub use evaluator::{EchoEvaluator, Evaluator, NullEvaluator};
