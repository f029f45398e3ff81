//! Error types for the Xen core crate.
//!
//! A single flat enum, not a tree of per-module errors: the protocol this
//! crate implements only has a handful of failure modes and they all
//! surface at the same two call sites (a `Channel`'s receive loop, and a
//! caller's send call), so one enum keeps `match`es at those call sites
//! exhaustive without an extra layer of wrapping.

use thiserror::Error;

/// Errors produced by the codec, receiver, content parser, channel, and
/// endpoint.
#[derive(Error, Debug)]
pub enum XenError {
    /// Malformed frame header, stray bytes, or an oversized frame.
    ///
    /// Per the protocol, receiving this on a channel's receive path closes
    /// the channel; it is not retried or skipped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A read or write on the underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// `encode_text`/`decode_text` could not transcode into or out of the
    /// requested encoding. Unlike `Protocol`, this does not close the
    /// channel — it is returned to the caller of the failing send.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The envelope (`CATEGORY:SERIAL:TEXT`) could not be parsed.
    ///
    /// Kept distinct from `Protocol` so callers that parse envelopes
    /// outside of a `Channel` (e.g. tests) get a precise error, even though
    /// a `Channel`'s receive path treats it exactly like a `Protocol`
    /// error and closes.
    #[error("envelope format error: {0}")]
    Format(String),

    /// A send was attempted after the channel was closed.
    #[error("channel is closed")]
    Closed,

    /// A server rejected an incoming connection because `max_clients` was
    /// already reached.
    #[error("server at capacity")]
    Capacity,
}

pub type Result<T> = std::result::Result<T, XenError>;
