//! Reactor statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for connection and command activity.
///
/// The reactor itself is single-threaded; the counters are atomic so an
/// `Arc<ConnectionStats>` can be read from a monitoring thread.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections established
    pub connections_opened: AtomicU64,
    /// Currently registered connections
    pub active_connections: AtomicU64,
    /// Connections removed because of an I/O or protocol failure
    pub connections_evicted: AtomicU64,
    /// Commands dispatched to handlers
    pub commands_received: AtomicU64,
    /// Commands buffered for sending
    pub commands_sent: AtomicU64,
    /// Total bytes flushed to sockets
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
        self.connection_closed();
    }

    pub fn command_received(&self) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Current number of registered connections.
    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_closes_the_connection() {
        let stats = ConnectionStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_evicted();

        assert_eq!(stats.connections_opened.load(Ordering::Relaxed), 2);
        assert_eq!(stats.connections_evicted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active(), 1);
    }

    #[test]
    fn test_byte_and_command_counters() {
        let stats = ConnectionStats::new();
        stats.command_received();
        stats.command_sent();
        stats.command_sent();
        stats.bytes_written(28);

        assert_eq!(stats.commands_received.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_sent.load(Ordering::Relaxed), 2);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 28);
    }
}
