//! Callback Resolution
//!
//! Each handler type declares its callbacks once, in a [`CallbackTable`]
//! kept in a `static`. Each handler instance owns a [`CallbackCache`] that
//! remembers how every command code it has seen was resolved, so a code is
//! looked up in the table at most once per instance.
//!
//! ## Resolution
//!
//! ```text
//! CommandCode ──cache hit──────────────────────────────> Resolution
//!      │
//!      └─miss─> CommandType::from_code
//!                 ├─ None ──────────────────────────────> Unrecognized
//!                 └─ Some(command) ─> table lookup
//!                                      ├─ found ────────> Callback(index)
//!                                      ├─ ERROR ────────> ServerError (built-in)
//!                                      └─ absent ───────> Missing(command)
//! ```
//!
//! Failed resolutions are cached too: a stream that keeps sending a command
//! the handler cannot take fails the same way every time without another
//! lookup.

use super::handler::CommandHandler;
use crate::error::{GearError, GearResult};
use crate::protocol::{CommandArgs, CommandCode, CommandRecord, CommandType};
use std::collections::HashMap;
use std::fmt;
use tracing::error;

/// Parameters of the built-in `ERROR` callback.
pub const ERROR_PARAMS: &[&str] = &["error_code", "error_text"];

/// A registered callback. It receives the handler and the command's
/// arguments, already checked against the declared parameter names.
pub type Callback<H> =
    fn(&mut H, &mut CommandArgs) -> GearResult<<H as CommandHandler>::Output>;

struct CallbackEntry<H: CommandHandler> {
    command: CommandType,
    params: &'static [&'static str],
    callback: Callback<H>,
}

/// Per-type mapping from command type to callback.
///
/// # Example
/// ```ignore
/// static CALLBACKS: Lazy<CallbackTable<EchoHandler>> = Lazy::new(|| {
///     CallbackTable::<EchoHandler>::new().on(CommandType::EchoRes, &["data"], |handler, args| {
///         handler.recv_echo_res(args.take("data").unwrap_or_default())
///     })
/// });
/// ```
pub struct CallbackTable<H: CommandHandler> {
    entries: Vec<CallbackEntry<H>>,
    index: HashMap<CommandType, usize>,
}

impl<H: CommandHandler> CallbackTable<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registers `callback` for `command`, taking exactly the arguments in
    /// `params`. Registering the same command again replaces the earlier
    /// entry.
    pub fn on(
        mut self,
        command: CommandType,
        params: &'static [&'static str],
        callback: Callback<H>,
    ) -> Self {
        let entry = CallbackEntry {
            command,
            params,
            callback,
        };
        match self.index.get(&command) {
            Some(&slot) => self.entries[slot] = entry,
            None => {
                self.index.insert(command, self.entries.len());
                self.entries.push(entry);
            }
        }
        self
    }

    pub fn contains(&self, command: CommandType) -> bool {
        self.index.contains_key(&command)
    }

    /// Declared parameter names for `command`.
    pub fn params(&self, command: CommandType) -> Option<&'static [&'static str]> {
        self.index.get(&command).map(|&slot| self.entries[slot].params)
    }

    /// Registered command types, in registration order.
    pub fn commands(&self) -> impl Iterator<Item = CommandType> + '_ {
        self.entries.iter().map(|entry| entry.command)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, command: CommandType) -> Option<usize> {
        self.index.get(&command).copied()
    }
}

impl<H: CommandHandler> Default for CallbackTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: CommandHandler> fmt::Debug for CallbackTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.commands()).finish()
    }
}

/// Outcome of resolving one command code for one handler type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Slot in the handler type's callback table
    Callback(usize),
    /// `ERROR` without a registered override; goes to `recv_error`
    ServerError,
    /// Not a protocol command
    Unrecognized,
    /// Protocol command the handler does not implement
    Missing(CommandType),
}

/// Per-instance memo of command code resolutions.
#[derive(Debug, Default)]
pub struct CallbackCache {
    resolved: HashMap<CommandCode, Resolution>,
    resolutions: u64,
}

impl CallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the resolution algorithm actually ran.
    pub fn resolution_count(&self) -> u64 {
        self.resolutions
    }

    /// Cached resolution for `code`, if any.
    pub fn get(&self, code: CommandCode) -> Option<Resolution> {
        self.resolved.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Returns the resolution of `code` for handler type `H`, running the
    /// lookup only on a cache miss.
    pub fn resolve<H: CommandHandler>(&mut self, code: CommandCode) -> Resolution {
        if let Some(resolution) = self.get(code) {
            return resolution;
        }

        self.resolutions += 1;
        let resolution = match CommandType::from_code(code) {
            None => {
                error!(code = code.0, "Could not handle command: not a protocol command");
                Resolution::Unrecognized
            }
            Some(command) => match H::callbacks().position(command) {
                Some(slot) => Resolution::Callback(slot),
                None if command == CommandType::Error => Resolution::ServerError,
                None => {
                    error!(
                        command = %command,
                        callback = %command.callback_name(),
                        "Could not handle command: no callback"
                    );
                    Resolution::Missing(command)
                }
            },
        };
        self.resolved.insert(code, resolution);
        resolution
    }
}

fn check_params(
    command: CommandType,
    params: &'static [&'static str],
    args: &CommandArgs,
) -> GearResult<()> {
    if args.matches_params(params) {
        return Ok(());
    }
    Err(GearError::ArgumentMismatch {
        command,
        expected: params.to_vec(),
        received: args.names().map(str::to_string).collect(),
    })
}

/// Routes one record to the handler callback its code resolves to.
pub(crate) fn dispatch<H: CommandHandler>(
    handler: &mut H,
    record: CommandRecord,
) -> GearResult<H::Output> {
    let CommandRecord { code, mut args } = record;

    match handler.core_mut().callbacks.resolve::<H>(code) {
        Resolution::Callback(slot) => {
            let entry = &H::callbacks().entries[slot];
            check_params(entry.command, entry.params, &args)?;
            (entry.callback)(handler, &mut args)
        }
        Resolution::ServerError => {
            check_params(CommandType::Error, ERROR_PARAMS, &args)?;
            let error_code = args.take("error_code").unwrap_or_default();
            let error_text = args.take("error_text").unwrap_or_default();
            handler.recv_error(error_code, error_text)
        }
        Resolution::Unrecognized => Err(GearError::UnrecognizedCommand {
            code,
            args: args.to_string(),
        }),
        Resolution::Missing(command) => Err(GearError::MissingHandler {
            command,
            callback: command.callback_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::EchoHandler;

    #[test]
    fn test_table_lookup() {
        let table = EchoHandler::callbacks();
        assert!(table.contains(CommandType::EchoRes));
        assert!(!table.contains(CommandType::JobCreated));
        assert_eq!(table.params(CommandType::EchoRes), Some(&["data"][..]));
        assert_eq!(table.params(CommandType::Noop), Some(&[][..]));
    }

    #[test]
    fn test_registering_twice_replaces() {
        let table = CallbackTable::<EchoHandler>::new()
            .on(CommandType::Noop, &[], |_, _| Ok(None))
            .on(CommandType::Noop, &["x"], |_, _| Ok(None));
        assert_eq!(table.len(), 1);
        assert_eq!(table.params(CommandType::Noop), Some(&["x"][..]));
    }

    #[test]
    fn test_resolution_outcomes() {
        let mut cache = CallbackCache::new();
        assert!(matches!(
            cache.resolve::<EchoHandler>(CommandType::EchoRes.code()),
            Resolution::Callback(_)
        ));
        assert_eq!(
            cache.resolve::<EchoHandler>(CommandType::Error.code()),
            Resolution::ServerError
        );
        assert_eq!(
            cache.resolve::<EchoHandler>(CommandCode(0xF00)),
            Resolution::Unrecognized
        );
        assert_eq!(
            cache.resolve::<EchoHandler>(CommandType::JobAssign.code()),
            Resolution::Missing(CommandType::JobAssign)
        );
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.resolution_count(), 4);
    }

    #[test]
    fn test_cache_hits_do_not_resolve_again() {
        let mut cache = CallbackCache::new();
        let first = cache.resolve::<EchoHandler>(CommandType::EchoRes.code());
        for _ in 0..10 {
            assert_eq!(cache.resolve::<EchoHandler>(CommandType::EchoRes.code()), first);
            cache.resolve::<EchoHandler>(CommandCode(0xF00));
        }
        assert_eq!(cache.resolution_count(), 2);
    }
}
