//! Reactor configuration.

use crate::codec::{DataCodec, RawBytesCodec};
use crate::connection::ServerAddress;
use crate::error::GearResult;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named options handed to every handler's `initial_state`.
///
/// The reactor does not interpret them; their meaning belongs to the
/// handler role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerConfig {
    options: BTreeMap<String, String>,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.options.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Reactor configuration
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Servers connected when the reactor is built
    pub servers: Vec<ServerAddress>,
    /// Options passed to each handler's `initial_state`
    pub handler_options: HandlerConfig,
    /// Codec injected into every handler
    pub data_codec: Arc<dyn DataCodec>,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            handler_options: HandlerConfig::new(),
            data_codec: Arc::new(RawBytesCodec),
        }
    }
}

impl ReactorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, address: impl Into<ServerAddress>) -> Self {
        self.servers.push(address.into());
        self
    }

    /// Parses each entry with [`ServerAddress::parse`] and adds it.
    pub fn servers<I, S>(mut self, hosts: I) -> GearResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            self.servers.push(ServerAddress::parse(host.as_ref())?);
        }
        Ok(self)
    }

    pub fn handler_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.handler_options.set(name, value);
        self
    }

    pub fn data_codec(mut self, codec: Arc<dyn DataCodec>) -> Self {
        self.data_codec = codec;
        self
    }
}
