//! TCP Connection
//!
//! [`TcpConnection`] is the socket-backed [`Connection`]. It connects with a
//! blocking handshake (so "host not found" and "connection refused" surface
//! from `connect` itself), then switches the socket to non-blocking mode for
//! the reactor.
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` until the frame codec can cut a
//! complete command out of them; TCP may deliver half a frame, or several
//! frames in one read. Outgoing commands are encoded into a second buffer
//! that drains as the socket accepts bytes.

use super::{Connection, ConnectionError, ConnectionState, RawDescriptor, ServerAddress};
use crate::protocol::{CommandRecord, FrameCodec};
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Maximum size for the read buffer (16 MB)
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Bytes pulled from the socket per read call
const READ_CHUNK_SIZE: usize = 4096;

/// How long the blocking connect handshake may take
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A non-blocking TCP connection to one job server.
pub struct TcpConnection<F> {
    /// Server this connection talks to
    address: ServerAddress,

    /// The socket, present while connected
    stream: Option<TcpStream>,

    state: ConnectionState,

    /// Bytes received but not yet decoded
    incoming: BytesMut,

    /// Encoded commands waiting for the socket
    outgoing: BytesMut,

    /// Frame codec for this stream
    frames: F,

    /// The peer closed its side; reported once buffered commands are out
    peer_closed: bool,

    connect_timeout: Duration,
}

impl<F: FrameCodec> TcpConnection<F> {
    /// Creates a disconnected connection. Call [`Connection::connect`] to
    /// open it.
    pub fn new(address: ServerAddress, frames: F) -> Self {
        Self {
            address,
            stream: None,
            state: ConnectionState::Disconnected,
            incoming: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            outgoing: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            frames,
            peer_closed: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bytes buffered for writing.
    pub fn pending_write_bytes(&self) -> usize {
        self.outgoing.len()
    }

    /// Bytes received but not yet decoded into a command.
    pub fn buffered_read_bytes(&self) -> usize {
        self.incoming.len()
    }

    fn open_stream(&self) -> Result<TcpStream, ConnectionError> {
        let addrs = (self.address.host.as_str(), self.address.port)
            .to_socket_addrs()
            .map_err(|e| ConnectionError::Unresolved(format!("{}: {}", self.address, e)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(server = %self.address, addr = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => ConnectionError::IoError(e),
            None => ConnectionError::Unresolved(self.address.to_string()),
        })
    }
}

impl<F: FrameCodec> Connection for TcpConnection<F> {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(unix)]
    fn descriptor(&self) -> Option<RawDescriptor> {
        use std::os::fd::AsRawFd;
        self.stream.as_ref().map(|stream| stream.as_raw_fd())
    }

    #[cfg(not(unix))]
    fn descriptor(&self) -> Option<RawDescriptor> {
        None
    }

    fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        self.peer_closed = false;
        match self.open_stream() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                debug!(server = %self.address, "Connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Disconnected;
        self.peer_closed = false;
        self.incoming.clear();
        self.outgoing.clear();

        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // The peer got there first.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn readable(&self) -> bool {
        self.is_connected()
    }

    fn writable(&self) -> bool {
        self.is_connected() && !self.outgoing.is_empty()
    }

    fn read(&mut self) -> Result<Vec<CommandRecord>, ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        if self.peer_closed {
            return Err(ConnectionError::ServerDisconnected);
        }

        let mut records = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.peer_closed = true;
                    break;
                }
                Ok(n) => {
                    self.incoming.extend_from_slice(&chunk[..n]);
                    trace!(server = %self.address, bytes = n, "Read data");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            // Decode per chunk so only a partial frame stays buffered.
            while let Some(record) = self.frames.decode(&mut self.incoming)? {
                records.push(record);
            }
            if self.incoming.len() >= MAX_BUFFER_SIZE {
                return Err(ConnectionError::BufferFull);
            }
        }

        trace!(
            server = %self.address,
            commands = records.len(),
            remaining = self.incoming.len(),
            "Decoded commands"
        );
        if self.peer_closed && records.is_empty() {
            return Err(ConnectionError::ServerDisconnected);
        }
        Ok(records)
    }

    fn write(&mut self) -> Result<usize, ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;

        let mut written = 0;
        while !self.outgoing.is_empty() {
            match stream.write(&self.outgoing) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outgoing.advance(n);
                    written += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        trace!(server = %self.address, bytes = written, pending = self.outgoing.len(), "Sent data");
        Ok(written)
    }

    fn send_command(&mut self, record: &CommandRecord) -> Result<(), ConnectionError> {
        if self.stream.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        self.frames.encode(record, &mut self.outgoing)
    }
}
