//! Job Data Codecs
//!
//! Application payloads pass through a [`DataCodec`] on their way to and from
//! the wire. The reactor injects one codec into every handler it creates
//! (see [`ReactorConfig::data_codec`](crate::ReactorConfig)), so two reactors
//! in one process can use different codecs.
//!
//! The default, [`RawBytesCodec`], is a strict pass-through: it only accepts
//! raw bytes, which catches structured values that were never serialized
//! before reaching the wire layer.

use crate::error::{GearError, GearResult};
use bytes::Bytes;
use std::fmt;

/// Application data in any of the shapes a codec may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw byte sequence, the only shape the wire carries
    Bytes(Bytes),
    /// UTF-8 text
    Text(String),
    /// Signed integer
    Integer(i64),
    /// Sequence of payloads
    List(Vec<Payload>),
}

impl Payload {
    /// Short name of the variant, used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Integer(_) => "integer",
            Payload::List(_) => "list",
        }
    }

    /// Returns the bytes, or a type error for any other shape.
    pub fn into_bytes(self) -> GearResult<Bytes> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(GearError::CodecType {
                expected: "bytes",
                found: other.kind(),
            }),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&'static [u8]> for Payload {
    fn from(bytes: &'static [u8]) -> Self {
        Payload::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Integer(value)
    }
}

/// Converts application data to and from its wire representation.
pub trait DataCodec: fmt::Debug + Send + Sync {
    /// Application value to wire form.
    fn encode(&self, data: Payload) -> GearResult<Payload>;

    /// Wire form to application value.
    fn decode(&self, data: Payload) -> GearResult<Payload>;
}

/// Pass-through codec that insists on raw bytes in both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytesCodec;

impl RawBytesCodec {
    fn enforce_bytes(data: Payload) -> GearResult<Payload> {
        match data {
            Payload::Bytes(_) => Ok(data),
            other => Err(GearError::CodecType {
                expected: "bytes",
                found: other.kind(),
            }),
        }
    }
}

impl DataCodec for RawBytesCodec {
    fn encode(&self, data: Payload) -> GearResult<Payload> {
        Self::enforce_bytes(data)
    }

    fn decode(&self, data: Payload) -> GearResult<Payload> {
        Self::enforce_bytes(data)
    }
}
