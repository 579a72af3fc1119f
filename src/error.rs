//! Error Types
//!
//! Every fallible operation in gearmux returns [`GearResult`]. The variants
//! fall into three families:
//!
//! - **Connectivity** ([`GearError::Connection`]): socket-level failures. The
//!   reactor absorbs these by evicting the connection; they only reach callers
//!   through explicit calls such as [`Reactor::send_command`](crate::Reactor::send_command).
//! - **Protocol shape** (unrecognized command, missing handler, argument
//!   mismatch): the decoded stream does not fit the handler. These surface to
//!   whoever drives the reactor.
//! - **Local** (codec type errors, bad addresses, unknown ids, no servers).

use crate::connection::{ConnectionError, ConnectionId};
use crate::protocol::{CommandCode, CommandType};
use thiserror::Error;

/// Result alias used across the crate.
pub type GearResult<T> = Result<T, GearError>;

/// Errors surfaced by the reactor, registry, handlers and codecs.
#[derive(Debug, Error)]
pub enum GearError {
    /// Socket-level failure during connect, read, write or close
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The decoded command code is not part of the Gearman command namespace
    #[error("could not handle command {code}: not a protocol command (args: {args})")]
    UnrecognizedCommand { code: CommandCode, args: String },

    /// A protocol command this handler role does not implement
    #[error("could not handle command {command}: handler has no {callback}")]
    MissingHandler {
        command: CommandType,
        callback: String,
    },

    /// Decoded argument names differ from the callback's declared parameters
    #[error("argument mismatch for {command}: expected {expected:?}, received {received:?}")]
    ArgumentMismatch {
        command: CommandType,
        expected: Vec<&'static str>,
        received: Vec<String>,
    },

    /// Payload handed to a data codec is not in the expected representation
    #[error("expecting {expected}, got {found}")]
    CodecType {
        expected: &'static str,
        found: &'static str,
    },

    /// None of the connections being driven is connected or connecting
    #[error("found no valid connections in list: {servers:?}")]
    ServerUnavailable { servers: Vec<String> },

    /// The id does not name a registered connection
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A server address could not be parsed
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
}

impl GearError {
    /// Returns true for errors caused by the shape of the decoded command
    /// stream rather than by the transport.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            GearError::UnrecognizedCommand { .. }
                | GearError::MissingHandler { .. }
                | GearError::ArgumentMismatch { .. }
        )
    }
}
