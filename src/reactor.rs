//! Reactor
//!
//! The single-threaded event loop. Each cycle polls a set of connections,
//! reads and dispatches incoming commands to their handlers, flushes
//! pending writes, and evicts connections that failed.
//!
//! ## Cycle
//!
//! ```text
//!            poll_once(ids)
//!                 │
//!     ┌───────────┼─────────────┐
//!     ▼           ▼             ▼
//!  readable    writable      faulted
//!     │           │             │
//!  read() ──┐  write() ──┐      │
//!  recv_command  │       │      │
//!  flush outbox  │       │      │
//!     │     err  │  err  │      │
//!     ▼     └────┴───────┴──────┤
//!                          evict (once per id)
//! ```
//!
//! Connectivity failures never escape a cycle: the connection is evicted
//! and its handler told through `on_io_error`. Protocol failures (a command
//! the handler can not take) also evict the connection, and the first one is
//! returned to the caller after the cycle completes.

use crate::commands::{CommandHandler, HandlerCore};
use crate::config::ReactorConfig;
use crate::connection::{Connection, ConnectionId, ConnectionStats, ServerAddress};
use crate::error::{GearError, GearResult};
use crate::poller::{PollResult, PollTimeout, Poller, Selector};
use crate::protocol::{CommandArgs, CommandCode, CommandRecord};
use crate::registry::ConnectionRegistry;
use crate::stopwatch::Stopwatch;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Single-threaded event loop over a [`ConnectionRegistry`].
pub struct Reactor<C, H, S> {
    config: ReactorConfig,
    registry: ConnectionRegistry<C, H>,
    poller: Poller<S>,
    stats: Arc<ConnectionStats>,
}

impl<C, H, S> Reactor<C, H, S>
where
    C: Connection,
    H: CommandHandler,
    S: Selector,
{
    /// Builds a reactor and connects every server in `config.servers`.
    ///
    /// # Errors
    ///
    /// Fails with the first server that can not be connected.
    pub fn new(
        config: ReactorConfig,
        connection_factory: impl FnMut(&ServerAddress) -> C + 'static,
        handler_factory: impl FnMut(HandlerCore) -> H + 'static,
        selector: S,
    ) -> GearResult<Self> {
        let registry = ConnectionRegistry::new(
            connection_factory,
            handler_factory,
            config.handler_options.clone(),
            Arc::clone(&config.data_codec),
        );
        let stats = Arc::clone(registry.stats());
        let mut reactor = Self {
            config,
            registry,
            poller: Poller::new(selector),
            stats,
        };

        for address in reactor.config.servers.clone() {
            reactor.add_connection(address)?;
        }
        Ok(reactor)
    }

    pub fn add_connection(&mut self, address: impl Into<ServerAddress>) -> GearResult<ConnectionId> {
        self.registry.add(address)
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        self.registry.remove(id)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.ids()
    }

    pub fn registry(&self) -> &ConnectionRegistry<C, H> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry<C, H> {
        &mut self.registry
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn selector(&self) -> &S {
        self.poller.selector()
    }

    pub fn selector_mut(&mut self) -> &mut S {
        self.poller.selector_mut()
    }

    /// Buffers a command on a connection. It goes out on a later cycle in
    /// which the connection is writable.
    pub fn send_command(
        &mut self,
        id: ConnectionId,
        command: impl Into<CommandCode>,
        args: CommandArgs,
    ) -> GearResult<()> {
        let connection = self
            .registry
            .connection_mut(id)
            .ok_or(GearError::UnknownConnection(id))?;
        connection.send_command(&CommandRecord::new(command, args))?;
        self.stats.command_sent();
        Ok(())
    }

    /// Runs one poll cycle over the registered subset of `ids`.
    ///
    /// Returns whether anything happened: a connection was readable,
    /// writable, faulted or died.
    ///
    /// # Errors
    ///
    /// Returns the first protocol error raised by a handler during the
    /// cycle. The offending connection has already been evicted; every
    /// other connection was still serviced.
    pub fn step(&mut self, ids: &[ConnectionId], timeout: impl Into<PollTimeout>) -> GearResult<bool> {
        let poll = self
            .poller
            .poll_once(self.registry.connections(ids), timeout);
        self.handle_activity(poll)
    }

    /// Cycles until `stop` returns true, every listed connection is dead,
    /// or `timeout` runs out.
    ///
    /// `stop` sees the registry and whether the last cycle had activity. It
    /// is called once before the first cycle.
    ///
    /// Returns `Ok(true)` if `stop` was satisfied, `Ok(false)` on timeout.
    ///
    /// # Errors
    ///
    /// [`GearError::ServerUnavailable`] when none of `ids` is alive, also if
    /// that is already the case on entry. Protocol errors from
    /// [`step`](Self::step) are passed through.
    pub fn run_until<F>(
        &mut self,
        ids: &[ConnectionId],
        mut stop: F,
        timeout: Option<Duration>,
    ) -> GearResult<bool>
    where
        F: FnMut(&ConnectionRegistry<C, H>, bool) -> bool,
    {
        let stopwatch = Stopwatch::new(timeout);
        let mut done = stop(&self.registry, false);
        let mut alive = self.registry.any_alive(ids);

        while alive && !done {
            let remaining = stopwatch.time_remaining();
            if remaining == Some(Duration::ZERO) {
                break;
            }
            let activity = self.step(ids, remaining)?;
            done = stop(&self.registry, activity);
            alive = self.registry.any_alive(ids);
        }

        if !alive {
            return Err(GearError::ServerUnavailable {
                servers: self.registry.describe(ids),
            });
        }
        Ok(done)
    }

    /// [`run_until`](Self::run_until) over every registered connection.
    pub fn run_until_all<F>(&mut self, stop: F, timeout: Option<Duration>) -> GearResult<bool>
    where
        F: FnMut(&ConnectionRegistry<C, H>, bool) -> bool,
    {
        let ids = self.registry.ids();
        self.run_until(&ids, stop, timeout)
    }

    /// Closes every connection.
    pub fn shutdown(&mut self) {
        self.registry.shutdown();
    }

    fn handle_activity(&mut self, poll: PollResult) -> GearResult<bool> {
        let mut dead = BTreeSet::new();
        let mut protocol_error = None;

        for &id in &poll.readable {
            match self.handle_read(id) {
                Ok(()) => {}
                Err(GearError::Connection(e)) => {
                    warn!(connection = %id, error = %e, "Read failed");
                    dead.insert(id);
                }
                Err(e) => {
                    error!(connection = %id, error = %e, "Protocol error, dropping connection");
                    dead.insert(id);
                    protocol_error.get_or_insert(e);
                }
            }
        }

        for &id in &poll.writable {
            if dead.contains(&id) {
                continue;
            }
            if let Err(e) = self.handle_write(id) {
                warn!(connection = %id, error = %e, "Write failed");
                dead.insert(id);
            }
        }

        let activity = !poll.is_empty() || !dead.is_empty();
        for &id in poll.faulted.iter().chain(&dead) {
            self.registry.evict(id);
        }

        match protocol_error {
            Some(e) => Err(e),
            None => Ok(activity),
        }
    }

    fn handle_read(&mut self, id: ConnectionId) -> GearResult<()> {
        let Some(entry) = self.registry.entry_mut(id) else {
            return Ok(());
        };

        let records = entry.connection.read()?;
        trace!(connection = %id, commands = records.len(), "Read");
        for record in records {
            self.stats.command_received();
            debug!(connection = %id, command = %record.code, "Dispatching");
            entry.handler.recv_command(record)?;
            entry.flush_outgoing(&self.stats)?;
        }
        Ok(())
    }

    fn handle_write(&mut self, id: ConnectionId) -> GearResult<()> {
        let Some(connection) = self.registry.connection_mut(id) else {
            return Ok(());
        };
        let written = connection.write()?;
        trace!(connection = %id, bytes = written, "Wrote");
        self.stats.bytes_written(written);
        Ok(())
    }
}
