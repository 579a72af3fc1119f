//! Frame codec capability.
//!
//! The byte-level framing of commands lives outside this crate. A connection
//! is handed any [`FrameCodec`] and uses it to turn its read buffer into
//! records and records into its write buffer.

use super::record::CommandRecord;
use crate::connection::ConnectionError;
use bytes::BytesMut;

/// Translates between buffered wire bytes and [`CommandRecord`]s.
pub trait FrameCodec {
    /// Decodes one record from the front of `buffer`, consuming its bytes.
    ///
    /// Returns `Ok(None)` when the buffer holds only part of a frame; the
    /// caller keeps the bytes and tries again after the next read.
    fn decode(&mut self, buffer: &mut BytesMut) -> Result<Option<CommandRecord>, ConnectionError>;

    /// Appends the encoding of `record` to `buffer`.
    fn encode(&mut self, record: &CommandRecord, buffer: &mut BytesMut)
        -> Result<(), ConnectionError>;
}
