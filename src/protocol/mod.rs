//! Protocol Vocabulary
//!
//! This module defines what the dispatch engine knows about the Gearman
//! protocol: the set of command types, the shape of a decoded command, and
//! the capability interface a frame codec must provide.
//!
//! ## Modules
//!
//! - `command`: `CommandType` enumeration, raw `CommandCode`, naming rules
//! - `record`: `CommandRecord` and its named `CommandArgs`
//! - `frame`: the `FrameCodec` trait connections decode and encode through
//!
//! ## Example
//!
//! ```
//! use gearmux::protocol::{CommandArgs, CommandRecord, CommandType};
//!
//! let record = CommandRecord::new(
//!     CommandType::EchoReq,
//!     CommandArgs::new().with("data", "ping"),
//! );
//! assert_eq!(record.command_type(), Some(CommandType::EchoReq));
//! assert_eq!(CommandType::EchoRes.callback_name(), "recv_echo_res");
//! ```

pub mod command;
pub mod frame;
pub mod record;

// Re-export commonly used types for convenience
pub use command::{CommandCode, CommandType, CALLBACK_PREFIX, COMMAND_NAMESPACE};
pub use frame::FrameCodec;
pub use record::{CommandArgs, CommandRecord};
