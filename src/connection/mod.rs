//! Connection Module
//!
//! This module defines what the reactor needs from a connection to a job
//! server. The reactor never touches sockets itself; it talks to anything
//! implementing [`Connection`], which keeps the poll loop testable with
//! in-memory doubles.
//!
//! ## Lifecycle
//!
//! ```text
//!   Disconnected ──connect()──> Connecting ──> Connected
//!        ▲                                        │
//!        └──────── close() / I/O error ───────────┘
//! ```
//!
//! ## Modules
//!
//! - `address`: `ServerAddress` parsing (`host[:port]`)
//! - `stats`: shared counters for the reactor
//! - `tcp`: `TcpConnection`, a non-blocking socket implementation

pub mod address;
pub mod stats;
pub mod tcp;

// Re-export commonly used types
pub use address::ServerAddress;
pub use stats::ConnectionStats;
pub use tcp::TcpConnection;

use crate::protocol::CommandRecord;
use std::fmt;

/// Raw OS descriptor handed to the readiness selector.
pub type RawDescriptor = std::os::raw::c_int;

/// Identity of a registered connection.
///
/// Ids are handed out by the registry and never reused, so a stale id can
/// not alias a newer connection the way a recycled file descriptor could.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Connectivity state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Errors that can occur on a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The server closed its end of the stream
    #[error("Server disconnected")]
    ServerDisconnected,

    /// Operation needs a connected socket
    #[error("Not connected")]
    NotConnected,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// Host name did not resolve to any address
    #[error("Could not resolve {0}")]
    Unresolved(String),

    /// Frame codec rejected the byte stream
    #[error("Frame error: {0}")]
    Frame(String),
}

/// A connection to one job server, as seen by the reactor.
///
/// `read` and `write` never block: they move whatever the socket allows and
/// return. Failures come back as [`ConnectionError`] values, which the
/// reactor turns into an eviction.
pub trait Connection {
    /// The server this connection talks to.
    fn address(&self) -> &ServerAddress;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Connected or connecting.
    fn is_alive(&self) -> bool {
        self.is_connected() || self.is_connecting()
    }

    /// OS descriptor for readiness selection, `None` when there is no socket.
    fn descriptor(&self) -> Option<RawDescriptor>;

    /// Establishes the connection.
    fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Closes the connection. Closing twice is not an error.
    fn close(&mut self) -> Result<(), ConnectionError>;

    /// Whether the connection wants to be polled for reading.
    fn readable(&self) -> bool;

    /// Whether the connection wants to be polled for writing, i.e. has
    /// buffered outgoing bytes.
    fn writable(&self) -> bool;

    /// Moves available bytes from the socket into the read buffer and
    /// returns every complete command decoded from it, in stream order.
    fn read(&mut self) -> Result<Vec<CommandRecord>, ConnectionError>;

    /// Flushes as much of the write buffer as the socket accepts, returning
    /// the number of bytes written.
    fn write(&mut self) -> Result<usize, ConnectionError>;

    /// Encodes `record` into the write buffer. Nothing is sent until the
    /// next successful `write`.
    fn send_command(&mut self, record: &CommandRecord) -> Result<(), ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn#7");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ConnectionError = io.into();
        assert!(matches!(err, ConnectionError::IoError(_)));
        assert!(err.to_string().contains("reset"));
    }
}
