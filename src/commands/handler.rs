//! Command Handler
//!
//! A command handler is the per-connection state machine of one protocol
//! role (client, worker, admin). It receives decoded commands, updates its
//! own state, and emits commands of its own, but it never performs I/O: its
//! output goes into the outbox of its [`HandlerCore`], which the reactor
//! drains into the connection's write buffer.
//!
//! ## Implementing a role
//!
//! ```
//! use bytes::Bytes;
//! use gearmux::commands::{CallbackTable, CommandHandler, HandlerCore};
//! use gearmux::protocol::{CommandArgs, CommandType};
//! use gearmux::GearResult;
//! use once_cell::sync::Lazy;
//!
//! struct Pinger {
//!     core: HandlerCore,
//!     replies: Vec<Bytes>,
//! }
//!
//! impl Pinger {
//!     fn recv_echo_res(&mut self, data: Bytes) -> GearResult<()> {
//!         self.replies.push(data);
//!         Ok(())
//!     }
//! }
//!
//! static CALLBACKS: Lazy<CallbackTable<Pinger>> = Lazy::new(|| {
//!     CallbackTable::<Pinger>::new().on(CommandType::EchoRes, &["data"], |pinger, args| {
//!         pinger.recv_echo_res(args.take("data").unwrap_or_default())
//!     })
//! });
//!
//! impl CommandHandler for Pinger {
//!     type Output = ();
//!
//!     fn core(&self) -> &HandlerCore {
//!         &self.core
//!     }
//!
//!     fn core_mut(&mut self) -> &mut HandlerCore {
//!         &mut self.core
//!     }
//!
//!     fn callbacks() -> &'static CallbackTable<Self> {
//!         &CALLBACKS
//!     }
//! }
//! ```

use super::callbacks::{self, CallbackCache, CallbackTable};
use crate::codec::{DataCodec, Payload};
use crate::config::HandlerConfig;
use crate::error::GearResult;
use crate::protocol::{CommandArgs, CommandRecord, CommandType};
use bytes::Bytes;
use std::sync::Arc;
use tracing::error;

/// An `ERROR` reported by a job server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: String,
    pub text: String,
}

impl ServerError {
    pub fn new(code: &[u8], text: &[u8]) -> Self {
        Self {
            code: String::from_utf8_lossy(code).into_owned(),
            text: String::from_utf8_lossy(text).into_owned(),
        }
    }
}

/// State every handler carries regardless of role.
#[derive(Debug)]
pub struct HandlerCore {
    /// Codec for application payloads
    codec: Arc<dyn DataCodec>,

    /// Commands queued for the reactor to send
    outgoing: Vec<CommandRecord>,

    /// Resolved command callbacks
    pub(crate) callbacks: CallbackCache,

    /// Errors reported by the server, oldest first
    server_errors: Vec<ServerError>,
}

impl HandlerCore {
    pub fn new(codec: Arc<dyn DataCodec>) -> Self {
        Self {
            codec,
            outgoing: Vec::new(),
            callbacks: CallbackCache::new(),
            server_errors: Vec::new(),
        }
    }

    pub fn codec(&self) -> &dyn DataCodec {
        self.codec.as_ref()
    }

    /// Queues a command for the reactor to buffer on this handler's
    /// connection.
    pub fn queue_command(&mut self, record: CommandRecord) {
        self.outgoing.push(record);
    }

    /// Removes and returns every queued command, oldest first.
    pub fn take_outgoing(&mut self) -> Vec<CommandRecord> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    pub fn callback_cache(&self) -> &CallbackCache {
        &self.callbacks
    }

    /// Number of times command resolution ran for this handler.
    pub fn resolution_count(&self) -> u64 {
        self.callbacks.resolution_count()
    }

    pub fn record_server_error(&mut self, error: ServerError) {
        self.server_errors.push(error);
    }

    pub fn server_errors(&self) -> &[ServerError] {
        &self.server_errors
    }
}

/// A per-connection protocol state machine.
pub trait CommandHandler: Sized + 'static {
    /// Value produced by handling one command.
    type Output: Default;

    fn core(&self) -> &HandlerCore;

    fn core_mut(&mut self) -> &mut HandlerCore;

    /// The callback table shared by every handler of this type.
    fn callbacks() -> &'static CallbackTable<Self>;

    /// Called once, right after construction and before any command.
    fn initial_state(&mut self, _config: &HandlerConfig) {}

    /// Called at most once, when the connection is declared dead. Nothing
    /// else is called on the handler afterwards.
    fn on_io_error(&mut self) {}

    /// Built-in handling of a server `ERROR`: log it and record it in the
    /// core. A table entry for [`CommandType::Error`] takes precedence.
    fn recv_error(&mut self, error_code: Bytes, error_text: Bytes) -> GearResult<Self::Output> {
        let server_error = ServerError::new(&error_code, &error_text);
        error!(
            code = %server_error.code,
            text = %server_error.text,
            "Received error from server"
        );
        self.core_mut().record_server_error(server_error);
        Ok(Self::Output::default())
    }

    /// Routes a decoded command to its callback.
    ///
    /// # Errors
    ///
    /// - [`GearError::UnrecognizedCommand`](crate::GearError::UnrecognizedCommand)
    ///   if the code is not a protocol command
    /// - [`GearError::MissingHandler`](crate::GearError::MissingHandler) if
    ///   this handler type registered no callback for it
    /// - [`GearError::ArgumentMismatch`](crate::GearError::ArgumentMismatch)
    ///   if the argument names differ from the declared parameters
    fn recv_command(&mut self, record: CommandRecord) -> GearResult<Self::Output> {
        callbacks::dispatch(self, record)
    }

    /// Queues a command for sending. The reactor buffers it on the
    /// connection after the current dispatch returns.
    fn send_command(&mut self, command: CommandType, args: CommandArgs) {
        self.core_mut()
            .queue_command(CommandRecord::new(command, args));
    }

    /// Application value to wire form through the injected codec.
    fn encode_data(&self, data: Payload) -> GearResult<Payload> {
        self.core().codec().encode(data)
    }

    /// Wire form to application value through the injected codec.
    fn decode_data(&self, data: Payload) -> GearResult<Payload> {
        self.core().codec().decode(data)
    }
}
