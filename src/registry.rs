//! Connection Registry
//!
//! The registry owns every connection together with its command handler.
//! Both live in a single map entry keyed by [`ConnectionId`], so a
//! connection can never be registered without its handler (or the other way
//! round), and evicting one always finds the other.

use crate::codec::DataCodec;
use crate::commands::{CommandHandler, HandlerCore};
use crate::config::HandlerConfig;
use crate::connection::{Connection, ConnectionError, ConnectionId, ConnectionStats, ServerAddress};
use crate::error::GearResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a (not yet connected) connection for a server address.
pub type ConnectionFactory<C> = Box<dyn FnMut(&ServerAddress) -> C>;

/// Builds a handler around a fresh [`HandlerCore`].
pub type HandlerFactory<H> = Box<dyn FnMut(HandlerCore) -> H>;

pub(crate) struct Entry<C, H> {
    pub(crate) connection: C,
    pub(crate) handler: H,
}

impl<C: Connection, H: CommandHandler> Entry<C, H> {
    /// Moves the handler's queued commands into the connection's write
    /// buffer.
    pub(crate) fn flush_outgoing(&mut self, stats: &ConnectionStats) -> Result<(), ConnectionError> {
        for record in self.handler.core_mut().take_outgoing() {
            self.connection.send_command(&record)?;
            stats.command_sent();
        }
        Ok(())
    }
}

/// Owns connections and their handlers.
pub struct ConnectionRegistry<C, H> {
    entries: BTreeMap<ConnectionId, Entry<C, H>>,
    /// Addresses of evicted connections, for diagnostics
    evicted: BTreeMap<ConnectionId, ServerAddress>,
    next_id: u64,
    connection_factory: ConnectionFactory<C>,
    handler_factory: HandlerFactory<H>,
    handler_options: HandlerConfig,
    data_codec: Arc<dyn DataCodec>,
    stats: Arc<ConnectionStats>,
}

impl<C: Connection, H: CommandHandler> ConnectionRegistry<C, H> {
    pub fn new(
        connection_factory: impl FnMut(&ServerAddress) -> C + 'static,
        handler_factory: impl FnMut(HandlerCore) -> H + 'static,
        handler_options: HandlerConfig,
        data_codec: Arc<dyn DataCodec>,
    ) -> Self {
        Self {
            entries: BTreeMap::new(),
            evicted: BTreeMap::new(),
            next_id: 1,
            connection_factory: Box::new(connection_factory),
            handler_factory: Box::new(handler_factory),
            handler_options,
            data_codec,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Connects to `address` and registers the connection with a new
    /// handler.
    ///
    /// The handler receives `initial_state` before this returns, and any
    /// commands it queued there are already buffered on the connection.
    ///
    /// # Errors
    ///
    /// Returns [`GearError::Connection`](crate::GearError::Connection) if the
    /// connection can not be established; nothing is registered then.
    pub fn add(&mut self, address: impl Into<ServerAddress>) -> GearResult<ConnectionId> {
        let address = address.into();
        let mut connection = (self.connection_factory)(&address);
        if let Err(e) = connection.connect() {
            warn!(server = %address, error = %e, "Failed to connect");
            return Err(e.into());
        }

        let mut handler = (self.handler_factory)(HandlerCore::new(Arc::clone(&self.data_codec)));
        handler.initial_state(&self.handler_options);

        let mut entry = Entry {
            connection,
            handler,
        };
        if let Err(e) = entry.flush_outgoing(&self.stats) {
            if let Err(close_error) = entry.connection.close() {
                debug!(server = %address, error = %close_error, "Error closing connection after failed flush");
            }
            return Err(e.into());
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, entry);
        self.stats.connection_opened();
        info!(server = %address, connection = %id, "Connection added");
        Ok(id)
    }

    /// Closes and unregisters a connection. The handler is dropped without
    /// an `on_io_error` notification.
    ///
    /// Returns false if the id was not registered.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(mut entry) = self.entries.remove(&id) else {
            return false;
        };
        if let Err(e) = entry.connection.close() {
            warn!(connection = %id, error = %e, "Error closing connection");
        }
        self.stats.connection_closed();
        info!(server = %entry.connection.address(), connection = %id, "Connection removed");
        true
    }

    /// Declares a connection dead: the handler gets `on_io_error`, the
    /// connection is closed, and both are unregistered.
    ///
    /// Evicting an id that is no longer registered does nothing and returns
    /// false, so a connection reported dead twice in one cycle is only
    /// evicted once.
    pub fn evict(&mut self, id: ConnectionId) -> bool {
        let Some(mut entry) = self.entries.remove(&id) else {
            return false;
        };
        entry.handler.on_io_error();
        if let Err(e) = entry.connection.close() {
            debug!(connection = %id, error = %e, "Error closing dead connection");
        }
        self.stats.connection_evicted();
        warn!(server = %entry.connection.address(), connection = %id, "Connection evicted");
        self.evicted.insert(id, entry.connection.address().clone());
        true
    }

    /// Closes every connection and drops every handler. Close errors are
    /// logged and otherwise ignored.
    pub fn shutdown(&mut self) {
        for (id, mut entry) in std::mem::take(&mut self.entries) {
            if let Err(e) = entry.connection.close() {
                debug!(connection = %id, error = %e, "Error closing connection during shutdown");
            }
            self.stats.connection_closed();
        }
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&C> {
        self.entries.get(&id).map(|entry| &entry.connection)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut C> {
        self.entries.get_mut(&id).map(|entry| &mut entry.connection)
    }

    pub fn handler(&self, id: ConnectionId) -> Option<&H> {
        self.entries.get(&id).map(|entry| &entry.handler)
    }

    pub fn handler_mut(&mut self, id: ConnectionId) -> Option<&mut H> {
        self.entries.get_mut(&id).map(|entry| &mut entry.handler)
    }

    pub(crate) fn entry_mut(&mut self, id: ConnectionId) -> Option<&mut Entry<C, H>> {
        self.entries.get_mut(&id)
    }

    /// The registered subset of `ids`, paired with their connections.
    pub fn connections<'a>(
        &'a self,
        ids: &'a [ConnectionId],
    ) -> impl Iterator<Item = (ConnectionId, &'a C)> + 'a {
        ids.iter()
            .filter_map(|&id| self.connection(id).map(|connection| (id, connection)))
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries.keys().copied().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Whether any of `ids` is registered and connected or connecting.
    pub fn any_alive(&self, ids: &[ConnectionId]) -> bool {
        self.connections(ids)
            .any(|(_, connection)| connection.is_alive())
    }

    /// Human-readable names for `ids`: the server address when registered
    /// or evicted, the id otherwise.
    pub fn describe(&self, ids: &[ConnectionId]) -> Vec<String> {
        ids.iter()
            .map(|&id| match self.connection(id) {
                Some(connection) => connection.address().to_string(),
                None => self
                    .evicted
                    .get(&id)
                    .map_or_else(|| id.to_string(), ServerAddress::to_string),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handler_options(&self) -> &HandlerConfig {
        &self.handler_options
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawBytesCodec;
    use crate::connection::ConnectionState;
    use crate::error::GearError;
    use crate::protocol::CommandType;
    use crate::testkit::{EchoHandler, HandlerLog, MockConnection};

    fn registry(options: HandlerConfig, log: &HandlerLog) -> ConnectionRegistry<MockConnection, EchoHandler> {
        let log = log.clone();
        ConnectionRegistry::new(
            |address: &ServerAddress| {
                let mut connection = MockConnection::new(address.clone());
                connection.refuse_connect = address.host == "refused";
                connection.refuse_send = address.host == "mute";
                connection
            },
            move |core| EchoHandler::new(core, log.clone()),
            options,
            Arc::new(RawBytesCodec),
        )
    }

    #[test]
    fn test_add_connects_and_initializes_handler() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);

        let id = registry.add(("gm1", 4730)).unwrap();
        assert!(registry.contains(id));
        assert!(registry.handler(id).is_some());
        assert_eq!(registry.connection(id).unwrap().state, ConnectionState::Connected);
        assert_eq!(log.events(), vec!["init"]);
        assert_eq!(registry.stats().active(), 1);
    }

    #[test]
    fn test_initial_commands_are_buffered() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new().with("greeting", "hi"), &log);

        let id = registry.add(("gm1", 4730)).unwrap();
        let connection = registry.connection(id).unwrap();
        assert_eq!(connection.buffered.len(), 1);
        assert_eq!(connection.buffered[0].command_type(), Some(CommandType::EchoReq));
        assert!(connection.flushed.is_empty());
        assert!(!registry.handler(id).unwrap().core().has_outgoing());
    }

    #[test]
    fn test_failed_connect_registers_nothing() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);

        let err = registry.add(("refused", 4730)).unwrap_err();
        assert!(matches!(err, GearError::Connection(ConnectionError::IoError(_))));
        assert!(registry.is_empty());
        assert!(log.events().is_empty());
        assert_eq!(registry.stats().active(), 0);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);

        let first = registry.add(("gm1", 4730)).unwrap();
        assert!(registry.remove(first));
        let second = registry.add(("gm1", 4730)).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.ids(), vec![second]);
    }

    #[test]
    fn test_evict_notifies_once() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);
        let id = registry.add(("gm1", 4730)).unwrap();

        assert!(registry.evict(id));
        assert!(!registry.evict(id));
        assert_eq!(log.count("io_error"), 1);
        assert!(registry.connection(id).is_none());
        assert!(registry.handler(id).is_none());
        assert_eq!(registry.stats().active(), 0);
    }

    #[test]
    fn test_remove_does_not_notify() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);
        let id = registry.add(("gm1", 4730)).unwrap();

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(log.count("io_error"), 0);
    }

    #[test]
    fn test_any_alive() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);
        let a = registry.add(("gm1", 4730)).unwrap();
        let b = registry.add(("gm2", 4730)).unwrap();

        assert!(registry.any_alive(&[a, b]));
        registry.connection_mut(a).unwrap().state = ConnectionState::Disconnected;
        assert!(registry.any_alive(&[a, b]));
        assert!(!registry.any_alive(&[a]));
        registry.connection_mut(b).unwrap().state = ConnectionState::Connecting;
        assert!(registry.any_alive(&[b]));
        assert!(!registry.any_alive(&[]));
        assert!(!registry.any_alive(&[ConnectionId(99)]));
    }

    #[test]
    fn test_describe() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);
        let a = registry.add(("gm1", 4730)).unwrap();
        assert_eq!(
            registry.describe(&[a, ConnectionId(42)]),
            vec!["gm1:4730".to_string(), "conn#42".to_string()]
        );
    }

    #[test]
    fn test_evicted_connections_keep_their_address() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);
        let a = registry.add(("gm1", 4730)).unwrap();
        let b = registry.add(("gm2", 4731)).unwrap();

        registry.evict(a);
        registry.remove(b);
        assert_eq!(
            registry.describe(&[a, b]),
            vec!["gm1:4730".to_string(), b.to_string()]
        );
    }

    #[test]
    fn test_failed_initial_flush_registers_nothing() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new().with("greeting", "hi"), &log);

        let err = registry.add(("mute", 4730)).unwrap_err();
        assert!(matches!(err, GearError::Connection(ConnectionError::NotConnected)));
        assert!(registry.is_empty());
        assert_eq!(log.events(), vec!["init"]);
        assert_eq!(registry.stats().active(), 0);
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let log = HandlerLog::default();
        let mut registry = registry(HandlerConfig::new(), &log);
        registry.add(("gm1", 4730)).unwrap();
        registry.add(("gm2", 4730)).unwrap();

        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(registry.stats().active(), 0);
        assert_eq!(log.count("io_error"), 0);
    }
}
