//! Composes the codec, receiver, and FIFO queue into a single framed
//! bidirectional connection, and routes decoded messages to either the
//! `Evaluator` port (for `CMD`) or the host's `Dispatcher` (everything
//! else).

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info, warn};

use crate::codec;
use crate::content::{self, Category};
use crate::errors::{Result, XenError};
use crate::evaluator::{Evaluator, NullEvaluator};
use crate::queue::Queue;
use crate::receiver::Receiver;

/// Default text encoding a new `Channel` starts with (`spec` §4.5).
pub const DEFAULT_ENCODING: &str = "iso8859-1";

/// Size of the one-shot read buffer used by [`Channel::receive_once`].
const READ_CHUNK_SIZE: usize = 8192;

/// A decoded message, ready for routing.
///
/// `Unknown` carries a category literal that didn't match one of the four
/// known categories (`spec` §4.3: category validity is enforced at dispatch
/// time, not parse time). `Raw` is what binary-mode channels produce — no
/// envelope parsing happens in binary mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Cmd { serial: u64, text: String },
    Evt { serial: u64, text: String },
    Okay { serial: u64, text: String },
    Fail { serial: u64, text: String },
    Unknown { category: String, serial: u64, text: String },
    Raw(Vec<u8>),
}

/// The host-supplied callback for everything a `Channel` receives other
/// than `CMD` (which goes to the `Evaluator` instead).
pub trait Dispatcher: Send {
    fn on_event(&mut self, serial: u64, text: &str);
    fn on_result(&mut self, serial: u64, text: &str);
    fn on_error(&mut self, serial: u64, text: &str);
    fn on_unknown_category(&mut self, raw_category: &str, serial: u64, text: &str);
    fn on_raw(&mut self, payload: &[u8]);
}

/// Prints every message to the `tracing` diagnostic stream. The default
/// dispatcher a `Channel` starts with, restored by `set_dispatcher(None)`.
#[derive(Debug, Default)]
pub struct PrintDispatcher;

impl Dispatcher for PrintDispatcher {
    fn on_event(&mut self, serial: u64, text: &str) {
        info!(serial, text, "EVT");
    }

    fn on_result(&mut self, serial: u64, text: &str) {
        info!(serial, text, "OK");
    }

    fn on_error(&mut self, serial: u64, text: &str) {
        info!(serial, text, "ERR");
    }

    fn on_unknown_category(&mut self, raw_category: &str, serial: u64, text: &str) {
        warn!(raw_category, serial, text, "unknown category");
    }

    fn on_raw(&mut self, payload: &[u8]) {
        info!(len = payload.len(), "RAW");
    }
}

/// A framed, bidirectional message connection over a single transport.
///
/// `T` is any async byte stream — a `TcpStream`, a Unix pipe pair joined
/// with `tokio::io::join`, or anything else satisfying the bound. There is
/// no blocking variant of `Channel` itself; `codec`/`receiver` underneath
/// it are transport-agnostic and expose a blocking `codec::read_frame`/
/// `write_frame` pair for callers that need to drive them over a plain
/// `std::io::{Read, Write}` pipe directly (`spec` §9's "mixed
/// blocking/non-blocking transports" strategy).
pub struct Channel<T> {
    transport: T,
    encoding: String,
    receiver: Receiver,
    pending: Queue<Message>,
    send_serial: AtomicU64,
    dispatcher: Box<dyn Dispatcher>,
    evaluator: Box<dyn Evaluator>,
    closed: bool,
}

impl<T> Channel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap `transport` in a new channel. Starts with the default encoding
    /// (`iso8859-1`), a `PrintDispatcher`, and a `NullEvaluator` — install
    /// a real evaluator with [`Channel::set_evaluator`] before driving
    /// `CMD` traffic through it.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            encoding: DEFAULT_ENCODING.to_string(),
            receiver: Receiver::default(),
            pending: Queue::new(),
            send_serial: AtomicU64::new(0),
            dispatcher: Box::new(PrintDispatcher),
            evaluator: Box::new(NullEvaluator),
            closed: false,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replace the dispatch callback. `None` restores the default printer
    /// (`spec` §4.5: "`nil/null/none` restores the default printer").
    pub fn set_dispatcher(&mut self, dispatcher: Option<Box<dyn Dispatcher>>) {
        self.dispatcher = dispatcher.unwrap_or_else(|| Box::new(PrintDispatcher));
    }

    pub fn set_evaluator(&mut self, evaluator: Box<dyn Evaluator>) {
        self.evaluator = evaluator;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Send a `CMD` frame. Returns the serial assigned to it — strictly
    /// greater than every serial returned by a prior successful
    /// `send_command`/`send_event` call on this channel.
    pub async fn send_command(&mut self, text: &str) -> Result<u64> {
        let serial = self.next_serial();
        self.send_envelope(Category::Cmd, serial, text).await?;
        Ok(serial)
    }

    /// Send an `EVT` frame. Returns the assigned serial.
    pub async fn send_event(&mut self, text: &str) -> Result<u64> {
        let serial = self.next_serial();
        self.send_envelope(Category::Evt, serial, text).await?;
        Ok(serial)
    }

    /// Send an `OK` reply correlated to `id`.
    pub async fn send_result(&mut self, id: u64, text: &str) -> Result<()> {
        self.send_envelope(Category::Okay, id, text).await
    }

    /// Send an `ERR` reply. `id == 0` denotes an error not tied to any
    /// specific command.
    pub async fn send_error(&mut self, id: u64, text: &str) -> Result<()> {
        self.send_envelope(Category::Fail, id, text).await
    }

    /// Send a raw, unframed-envelope payload (binary transport mode).
    pub async fn send_raw(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(XenError::Closed);
        }
        codec::write_frame_async(&mut self.transport, payload).await?;
        Ok(())
    }

    async fn send_envelope(&mut self, category: Category, serial: u64, text: &str) -> Result<()> {
        if self.closed {
            return Err(XenError::Closed);
        }
        let envelope = content::format(category, serial, text);
        let payload = codec::encode_text(&envelope, &self.encoding)?;
        codec::write_frame_async(&mut self.transport, &payload).await?;
        Ok(())
    }

    fn next_serial(&self) -> u64 {
        self.send_serial.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Read whatever bytes are available in one call, feed them to the
    /// receiver, and push every resulting message onto the pending FIFO.
    ///
    /// Returns the number of messages pushed. Returns
    /// `Err(XenError::Closed)` (after marking the channel closed) on EOF.
    /// Any `Protocol`/`Format`/`Transport` error also closes the channel,
    /// per `spec` §7.
    pub async fn receive_once(&mut self) -> Result<usize> {
        if self.closed {
            return Err(XenError::Closed);
        }

        let mut buf = [0u8; READ_CHUNK_SIZE];
        let n = match self.transport.read(&mut buf).await {
            Ok(0) => {
                debug!("transport EOF, closing channel");
                self.closed = true;
                return Err(XenError::Closed);
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "transport read failed, closing channel");
                self.closed = true;
                return Err(XenError::Transport(e));
            }
        };

        let payloads = match self.receiver.feed(&buf[..n]) {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!(error = %e, "protocol error, closing channel");
                self.closed = true;
                return Err(e);
            }
        };

        let mut pushed = 0;
        for payload in payloads {
            match self.decode_message(payload) {
                Ok(message) => {
                    self.pending.push(message);
                    pushed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "malformed envelope, closing channel");
                    self.closed = true;
                    return Err(e);
                }
            }
        }
        Ok(pushed)
    }

    fn decode_message(&self, payload: Vec<u8>) -> Result<Message> {
        if self.encoding == "binary" {
            return Ok(Message::Raw(payload));
        }
        let text = codec::decode_text(&payload, &self.encoding)?;
        let envelope = content::parse(&text).map_err(|e| match e {
            XenError::Format(msg) => XenError::Protocol(msg),
            other => other,
        })?;
        Ok(match envelope.category {
            Ok(Category::Cmd) => Message::Cmd {
                serial: envelope.serial,
                text: envelope.text,
            },
            Ok(Category::Evt) => Message::Evt {
                serial: envelope.serial,
                text: envelope.text,
            },
            Ok(Category::Okay) => Message::Okay {
                serial: envelope.serial,
                text: envelope.text,
            },
            Ok(Category::Fail) => Message::Fail {
                serial: envelope.serial,
                text: envelope.text,
            },
            Err(unknown) => Message::Unknown {
                category: unknown.0,
                serial: envelope.serial,
                text: envelope.text,
            },
        })
    }

    /// Pop and route exactly one pending message. Returns `true` if a
    /// message was routed, `false` if the FIFO was empty (the host's
    /// signal to stop re-arming the drain for now).
    ///
    /// Routes `CMD` through the `Evaluator`; everything else through the
    /// `Dispatcher`. Evaluation failures produce an `ERR` reply and never
    /// close the channel (`spec` §7).
    pub async fn drain_one(&mut self) -> Result<bool> {
        let message = match self.pending.pop() {
            Some(m) => m,
            None => return Ok(false),
        };

        match message {
            Message::Cmd { serial, text } => match self.evaluator.evaluate(&text) {
                Ok(value) => self.send_result(serial, &value).await?,
                Err(error_text) => self.send_error(serial, &error_text).await?,
            },
            Message::Evt { serial, text } => self.dispatcher.on_event(serial, &text),
            Message::Okay { serial, text } => self.dispatcher.on_result(serial, &text),
            Message::Fail { serial, text } => self.dispatcher.on_error(serial, &text),
            Message::Unknown {
                category,
                serial,
                text,
            } => self
                .dispatcher
                .on_unknown_category(&category, serial, &text),
            Message::Raw(payload) => self.dispatcher.on_raw(&payload),
        }
        Ok(true)
    }

    /// Drive the channel to completion: alternates `receive_once` with
    /// draining every pending message, the cooperative-yield translation
    /// of "idle-time, one message per tick" from `spec` §4.5 — there is no
    /// separate host event loop here, so "idle" is simply "between reads".
    /// Returns normally on a clean close; propagates any other error.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.receive_once().await {
                Ok(_) => {}
                Err(XenError::Closed) => {
                    while self.drain_one().await? {}
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            while self.drain_one().await? {}
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}
