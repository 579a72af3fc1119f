//! Command Records
//!
//! A [`CommandRecord`] is one decoded (or about to be encoded) protocol unit:
//! a command code plus named arguments. Argument names are protocol-defined
//! and must match the parameter names a handler callback declares.

use super::command::{CommandCode, CommandType};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Named arguments of a command, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    entries: BTreeMap<String, Bytes>,
}

impl CommandArgs {
    /// Creates an empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    ///
    /// # Example
    /// ```
    /// use gearmux::protocol::CommandArgs;
    /// let args = CommandArgs::new().with("data", "hello");
    /// assert_eq!(args.get("data").map(|v| v.as_ref()), Some(&b"hello"[..]));
    /// ```
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts an argument, returning the previous value under that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Option<Bytes> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.entries.get(name)
    }

    /// Removes and returns an argument.
    ///
    /// Callbacks use this to move their parameters out; the dispatcher has
    /// already checked that every declared parameter is present, so `None`
    /// only happens when a callback takes a name it never declared.
    pub fn take(&mut self, name: &str) -> Option<Bytes> {
        self.entries.remove(name)
    }

    /// Argument names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true when the argument names are exactly `params`, ignoring
    /// order.
    pub fn matches_params(&self, params: &[&str]) -> bool {
        self.entries.len() == params.len()
            && params.iter().all(|param| self.entries.contains_key(*param))
    }
}

impl fmt::Display for CommandArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, (name, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

impl<K, V> FromIterator<(K, V)> for CommandArgs
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = CommandArgs::new();
        for (name, value) in iter {
            args.insert(name, value);
        }
        args
    }
}

/// A command code together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub code: CommandCode,
    pub args: CommandArgs,
}

impl CommandRecord {
    pub fn new(code: impl Into<CommandCode>, args: CommandArgs) -> Self {
        Self {
            code: code.into(),
            args,
        }
    }

    /// Returns the protocol command type, if the code is a known one.
    pub fn command_type(&self) -> Option<CommandType> {
        self.code.command_type()
    }
}
