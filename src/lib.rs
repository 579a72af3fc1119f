//! # gearmux - Connection Multiplexing for Gearman-style Job Queues
//!
//! gearmux is the engine underneath a job-queue client, worker or admin
//! tool: it holds connections to several job servers at once, waits on all
//! of them in a single thread, and hands every decoded command to the
//! per-connection handler that implements the role.
//!
//! ## Features
//!
//! - **Single-threaded reactor**: one `poll(2)` call per cycle over every
//!   connection, no locks and no async runtime
//! - **Fault isolation**: a connection that breaks the readiness call is
//!   found by probing and evicted, the others keep running
//! - **Table-driven dispatch**: handlers declare their callbacks once per
//!   type; lookups are cached per connection
//! - **Pluggable I/O**: connections, frame codecs, data codecs and the
//!   selector are all traits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Reactor                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Poller    │    │            ConnectionRegistry                │    │
//! │  │             │───>│  ┌──────────────┐ ┌──────────────┐           │    │
//! │  │  Selector   │    │  │ conn#1       │ │ conn#2       │  ...      │    │
//! │  │  (poll(2))  │    │  │  Connection  │ │  Connection  │           │    │
//! │  └─────────────┘    │  │  Handler     │ │  Handler     │           │    │
//! │                     │  └──────┬───────┘ └──────────────┘           │    │
//! │                     └─────────┼────────────────────────────────────┘    │
//! │                               │ recv_command                            │
//! │                               ▼                                         │
//! │                     ┌─────────────────────────────────────────────────┐ │
//! │                     │  CallbackTable (per type) + CallbackCache       │ │
//! │                     │  outbox ──> connection write buffer             │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use gearmux::connection::{ServerAddress, TcpConnection};
//! use gearmux::poller::PollSelector;
//! use gearmux::{Reactor, ReactorConfig};
//! use std::time::Duration;
//!
//! fn main() -> gearmux::GearResult<()> {
//!     let config = ReactorConfig::new()
//!         .servers(["gm1.example.com", "gm2.example.com:4731"])?
//!         .handler_option("client_id", "reporter");
//!
//!     let mut reactor = Reactor::new(
//!         config,
//!         |address: &ServerAddress| TcpConnection::new(address.clone(), MyFrames::default()),
//!         |core| MyClient::new(core),
//!         PollSelector::new(),
//!     )?;
//!
//!     // Drive every server until the client has its answer
//!     let done = reactor.run_until_all(
//!         |registry, _| registry.ids().iter().any(|&id| {
//!             registry.handler(id).is_some_and(|client| client.finished())
//!         }),
//!         Some(Duration::from_secs(30)),
//!     )?;
//!
//!     reactor.shutdown();
//!     println!("finished: {done}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: command types, decoded records, frame codec trait
//! - [`commands`]: the handler trait and callback dispatch
//! - [`connection`]: the connection trait, addresses, TCP implementation
//! - [`poller`]: readiness polling with fault isolation
//! - [`registry`]: connections and their handlers
//! - [`reactor`]: the event loop
//! - [`codec`]: payload encoding for job data
//!
//! ## Design Highlights
//!
//! ### Connection Ids
//!
//! Connections are keyed by a registry-assigned [`ConnectionId`], never by
//! file descriptor. A descriptor can be reused by the OS after a close; an
//! id never is.
//!
//! ### Handlers Do Not Do I/O
//!
//! A handler only queues commands. The reactor moves them to the
//! connection after each dispatch, and the bytes leave on a later writable
//! cycle. This keeps handlers trivially testable.

pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod reactor;
pub mod registry;
pub mod stopwatch;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export commonly used types for convenience
pub use codec::{DataCodec, Payload, RawBytesCodec};
pub use commands::{CallbackTable, CommandHandler, HandlerCore};
pub use config::{HandlerConfig, ReactorConfig};
pub use connection::{Connection, ConnectionError, ConnectionId, ConnectionStats, ServerAddress};
pub use error::{GearError, GearResult};
pub use poller::{PollTimeout, Poller, Selector};
pub use protocol::{CommandArgs, CommandCode, CommandRecord, CommandType, FrameCodec};
pub use reactor::Reactor;
pub use registry::ConnectionRegistry;
pub use stopwatch::Stopwatch;

/// The default job server port
pub const DEFAULT_PORT: u16 = 4730;

/// The default job server host
pub const DEFAULT_HOST: &str = "localhost";

/// Version of gearmux
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
