//! # Byte Cursor - Position-Tracking Buffer for Streaming Decode
//!
//! ## Purpose
//!
//! A growable byte buffer with a read position and a single checkpoint. The
//! transport appends raw bytes as they arrive; the frame codec reads typed
//! big-endian fields and rewinds to the checkpoint when a frame turns out to
//! be incomplete. Writes always append at the end of the buffer.
//!
//! ```text
//!   consumed          available (readable)        spare capacity
//! [##########|==============================|..................]
//!            ^ position                     ^ len
//!            ^ checkpoint (record/restore)
//! ```
//!
//! Reads never panic: asking for more bytes than are available yields
//! [`ProtocolError::Truncated`] and leaves the position untouched.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{BufMut, Bytes, BytesMut};

/// Read cursor over an append-only byte buffer
#[derive(Debug, Default, Clone)]
pub struct ByteCursor {
    buf: BytesMut,
    position: usize,
    checkpoint: Option<usize>,
}

impl ByteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            position: 0,
            checkpoint: None,
        }
    }

    /// Current read position from the start of the retained buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of bytes that can still be read
    pub fn available(&self) -> usize {
        self.buf.len() - self.position
    }

    /// Total bytes held, read or not
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Unread bytes
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.position..]
    }

    /// Every byte held, including bytes already read
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Checkpoint the current read position
    pub fn record(&mut self) {
        self.checkpoint = Some(self.position);
    }

    /// Rewind to the last checkpoint, undoing every read since `record`
    pub fn restore(&mut self) {
        if let Some(checkpoint) = self.checkpoint {
            self.position = checkpoint;
        }
    }

    /// Append bytes received from the transport
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Drop consumed bytes so the buffer does not grow without bound.
    /// Clears the checkpoint since positions shift.
    pub fn compact(&mut self) {
        if self.position > 0 {
            let _ = self.buf.split_to(self.position);
            self.position = 0;
        }
        self.checkpoint = None;
    }

    /// Drop every byte past `len`, such as a partly written frame
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
        self.position = self.position.min(self.buf.len());
    }

    /// Consume the cursor, returning the unread bytes
    pub fn into_bytes(mut self) -> Bytes {
        let _ = self.buf.split_to(self.position);
        self.buf.freeze()
    }

    fn take(&mut self, n: usize, context: &str) -> ProtocolResult<&[u8]> {
        let available = self.available();
        if available < n {
            return Err(ProtocolError::truncated(n, available, context));
        }
        let start = self.position;
        self.position += n;
        Ok(&self.buf[start..start + n])
    }

    pub fn get_octet(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1, "octet")?[0])
    }

    pub fn get_short(&mut self) -> ProtocolResult<u16> {
        let b = self.take(2, "short")?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_long(&mut self) -> ProtocolResult<u32> {
        let b = self.take(4, "long")?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_longlong(&mut self) -> ProtocolResult<u64> {
        let b = self.take(8, "longlong")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    /// Copy the next `n` bytes out of the buffer
    pub fn get_bytes(&mut self, n: usize) -> ProtocolResult<Bytes> {
        Ok(Bytes::copy_from_slice(self.take(n, "byte block")?))
    }

    /// Carve the next `n` bytes into an independent cursor
    pub fn sub_cursor(&mut self, n: usize, context: &str) -> ProtocolResult<ByteCursor> {
        Ok(ByteCursor::from(self.take(n, context)?))
    }

    /// Skip `n` bytes without copying them
    pub fn skip(&mut self, n: usize) -> ProtocolResult<()> {
        self.take(n, "skip").map(|_| ())
    }

    /// Octet-length-prefixed UTF-8 string
    pub fn get_short_string(&mut self) -> ProtocolResult<String> {
        let len = self.get_octet()? as usize;
        let raw = self.take(len, "short string")?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::invalid_string("short string"))
    }

    /// Long-length-prefixed UTF-8 string
    pub fn get_long_string(&mut self) -> ProtocolResult<String> {
        let len = self.get_long()? as usize;
        let raw = self.take(len, "long string")?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::invalid_string("long string"))
    }

    pub fn put_octet(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_short(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_long(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_longlong(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn put_short_string(&mut self, value: &str) -> ProtocolResult<()> {
        if value.len() > u8::MAX as usize {
            return Err(ProtocolError::string_too_long(value.len(), "short string"));
        }
        self.put_octet(value.len() as u8);
        self.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn put_long_string(&mut self, value: &str) {
        self.put_long(value.len() as u32);
        self.put_slice(value.as_bytes());
    }
}

impl From<&[u8]> for ByteCursor {
    fn from(data: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(data),
            position: 0,
            checkpoint: None,
        }
    }
}

impl From<Bytes> for ByteCursor {
    fn from(data: Bytes) -> Self {
        ByteCursor::from(&data[..])
    }
}

/// Encoded size of a short string
pub(crate) fn short_string_size(value: &str) -> usize {
    1 + value.len()
}

/// Encoded size of a long string
pub(crate) fn long_string_size(value: &str) -> usize {
    4 + value.len()
}
