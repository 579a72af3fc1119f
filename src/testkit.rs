//! Test doubles shared by the unit tests.

use crate::commands::{CallbackTable, CommandHandler, HandlerCore};
use crate::config::HandlerConfig;
use crate::connection::{Connection, ConnectionError, ConnectionId, ConnectionState, RawDescriptor, ServerAddress};
use crate::poller::{Readiness, Selector, Watch};
use crate::protocol::{CommandArgs, CommandCode, CommandRecord, CommandType, FrameCodec};
use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

/// Installs a test-writer subscriber once; `RUST_LOG` controls the level.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `code|name=value|name=value\n` framing, good enough for tests.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LineCodec;

impl FrameCodec for LineCodec {
    fn decode(&mut self, buffer: &mut BytesMut) -> Result<Option<CommandRecord>, ConnectionError> {
        let Some(end) = buffer.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = buffer.split_to(end + 1);
        let line = std::str::from_utf8(&line[..end])
            .map_err(|e| ConnectionError::Frame(e.to_string()))?;

        let mut parts = line.split('|');
        let code = parts
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or_else(|| ConnectionError::Frame(format!("bad command code in {line:?}")))?;
        let mut args = CommandArgs::new();
        for part in parts {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| ConnectionError::Frame(format!("bad argument {part:?}")))?;
            args.insert(name, Bytes::copy_from_slice(value.as_bytes()));
        }
        Ok(Some(CommandRecord::new(CommandCode(code), args)))
    }

    fn encode(&mut self, record: &CommandRecord, buffer: &mut BytesMut) -> Result<(), ConnectionError> {
        buffer.extend_from_slice(record.code.0.to_string().as_bytes());
        for (name, value) in record.args.iter() {
            buffer.extend_from_slice(b"|");
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b"=");
            buffer.extend_from_slice(value);
        }
        buffer.extend_from_slice(b"\n");
        Ok(())
    }
}

/// In-memory connection with scripted reads and failures.
#[derive(Debug)]
pub(crate) struct MockConnection {
    pub address: ServerAddress,
    pub state: ConnectionState,
    pub descriptor: Option<RawDescriptor>,
    /// Results handed out by successive `read` calls
    pub reads: VecDeque<Result<Vec<CommandRecord>, ConnectionError>>,
    /// Commands buffered by `send_command`
    pub buffered: Vec<CommandRecord>,
    /// Commands flushed by `write`
    pub flushed: Vec<CommandRecord>,
    pub refuse_connect: bool,
    /// `send_command` fails as if the socket were gone
    pub refuse_send: bool,
    pub fail_write: bool,
    pub close_calls: usize,
}

impl MockConnection {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            state: ConnectionState::Disconnected,
            descriptor: None,
            reads: VecDeque::new(),
            buffered: Vec::new(),
            flushed: Vec::new(),
            refuse_connect: false,
            refuse_send: false,
            fail_write: false,
            close_calls: 0,
        }
    }

    pub fn connect_now(&mut self) {
        self.state = ConnectionState::Connected;
    }

    /// Makes the connection ask for write readiness.
    pub fn queue_outgoing_bytes(&mut self) {
        self.buffered
            .push(CommandRecord::new(CommandType::Noop, CommandArgs::new()));
    }

    pub fn push_read(&mut self, records: Vec<CommandRecord>) {
        self.reads.push_back(Ok(records));
    }

    pub fn push_read_error(&mut self, error: ConnectionError) {
        self.reads.push_back(Err(error));
    }
}

impl Connection for MockConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn descriptor(&self) -> Option<RawDescriptor> {
        self.descriptor
    }

    fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.refuse_connect {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        self.close_calls += 1;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn readable(&self) -> bool {
        self.is_connected()
    }

    fn writable(&self) -> bool {
        self.is_connected() && !self.buffered.is_empty()
    }

    fn read(&mut self) -> Result<Vec<CommandRecord>, ConnectionError> {
        self.reads.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn write(&mut self) -> Result<usize, ConnectionError> {
        if self.fail_write {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        let count = self.buffered.len();
        self.flushed.append(&mut self.buffered);
        Ok(count * 8)
    }

    fn send_command(&mut self, record: &CommandRecord) -> Result<(), ConnectionError> {
        if self.refuse_send || !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        self.buffered.push(record.clone());
        Ok(())
    }
}

/// Selector whose answers are set by the test.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSelector {
    pub readable: BTreeSet<ConnectionId>,
    pub writable: BTreeSet<ConnectionId>,
    pub errored: BTreeSet<ConnectionId>,
    /// Any call watching one of these fails with `EBADF`
    pub broken: BTreeSet<ConnectionId>,
    /// Number of upcoming aggregate calls that fail with `EINTR`
    pub fail_aggregate: usize,
    /// Time each aggregate call spends before answering
    pub aggregate_delay: Duration,
    pub calls: usize,
    pub last_read: Vec<ConnectionId>,
    pub last_write: Vec<ConnectionId>,
    pub last_error: Vec<ConnectionId>,
    pub last_timeout: Option<Duration>,
}

impl Selector for ScriptedSelector {
    fn select(
        &mut self,
        read: &[Watch],
        write: &[Watch],
        error: &[Watch],
        timeout: Option<Duration>,
    ) -> io::Result<Readiness> {
        self.calls += 1;
        let ids = |watches: &[Watch]| watches.iter().map(|w| w.id).collect::<Vec<_>>();

        let mut watched = read.iter().chain(write).chain(error);
        if watched.any(|w| self.broken.contains(&w.id)) {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        // Probes watch a single connection for reading only.
        if !error.is_empty() {
            self.last_read = ids(read);
            self.last_write = ids(write);
            self.last_error = ids(error);
            self.last_timeout = timeout;
            if !self.aggregate_delay.is_zero() {
                std::thread::sleep(self.aggregate_delay);
            }
            if self.fail_aggregate > 0 {
                self.fail_aggregate -= 1;
                return Err(io::Error::from_raw_os_error(libc::EINTR));
            }
        }

        Ok(Readiness {
            readable: ids(read)
                .into_iter()
                .filter(|id| self.readable.contains(id))
                .collect(),
            writable: ids(write)
                .into_iter()
                .filter(|id| self.writable.contains(id))
                .collect(),
            errored: ids(error)
                .into_iter()
                .filter(|id| self.errored.contains(id))
                .collect(),
        })
    }
}

/// Event log shared between a test and the handlers it can no longer reach.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandlerLog(Rc<RefCell<Vec<String>>>);

impl HandlerLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|e| e.as_str() == event).count()
    }
}

/// Handler that answers `ECHO_REQ`, records `ECHO_RES` and `NOOP`.
#[derive(Debug)]
pub(crate) struct EchoHandler {
    core: HandlerCore,
    log: HandlerLog,
}

impl EchoHandler {
    pub fn new(core: HandlerCore, log: HandlerLog) -> Self {
        Self { core, log }
    }

    fn recv_echo_req(&mut self, data: Bytes) -> Option<Bytes> {
        self.send_command(CommandType::EchoRes, CommandArgs::new().with("data", data));
        None
    }

    fn recv_echo_res(&mut self, data: Bytes) -> Option<Bytes> {
        self.log
            .push(format!("echo:{}", String::from_utf8_lossy(&data)));
        Some(data)
    }

    fn recv_noop(&mut self) -> Option<Bytes> {
        self.log.push("noop");
        None
    }
}

static ECHO_CALLBACKS: Lazy<CallbackTable<EchoHandler>> = Lazy::new(|| {
    CallbackTable::<EchoHandler>::new()
        .on(CommandType::EchoReq, &["data"], |handler, args| {
            Ok(handler.recv_echo_req(args.take("data").unwrap_or_default()))
        })
        .on(CommandType::EchoRes, &["data"], |handler, args| {
            Ok(handler.recv_echo_res(args.take("data").unwrap_or_default()))
        })
        .on(CommandType::Noop, &[], |handler, _| Ok(handler.recv_noop()))
});

impl CommandHandler for EchoHandler {
    type Output = Option<Bytes>;

    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn callbacks() -> &'static CallbackTable<Self> {
        &ECHO_CALLBACKS
    }

    fn initial_state(&mut self, config: &HandlerConfig) {
        self.log.push("init");
        if let Some(greeting) = config.get("greeting") {
            let greeting = Bytes::copy_from_slice(greeting.as_bytes());
            self.send_command(CommandType::EchoReq, CommandArgs::new().with("data", greeting));
        }
    }

    fn on_io_error(&mut self) {
        self.log.push("io_error");
    }
}
