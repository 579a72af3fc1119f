//! Command Handler Module
//!
//! This module implements the dispatch half of gearmux: per-connection
//! handlers that turn decoded commands into role-specific behaviour.
//!
//! ## Architecture
//!
//! ```text
//! Connection::read()
//!       │  Vec<CommandRecord>
//!       ▼
//! ┌─────────────────┐
//! │ recv_command()  │  cache lookup by CommandCode
//! │                 │  (CallbackCache, per instance)
//! │  - Resolve      │
//! │  - Check args   │  CallbackTable, per handler type
//! │  - Invoke       │
//! └────────┬────────┘
//!          │ send_command()
//!          ▼
//! ┌─────────────────┐
//! │ HandlerCore     │  outbox, drained by the reactor
//! └─────────────────┘
//! ```
//!
//! Failures come in three kinds, kept apart for diagnostics: the code is
//! not a protocol command at all, the command is valid but this role does
//! not implement it, or the arguments do not match the callback.

pub mod callbacks;
pub mod handler;

// Re-export the main handler types
pub use callbacks::{Callback, CallbackCache, CallbackTable, Resolution, ERROR_PARAMS};
pub use handler::{CommandHandler, HandlerCore, ServerError};
