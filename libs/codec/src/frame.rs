//! # Frame Codec - Resumable Envelope Encoding and Decoding
//!
//! ## Purpose
//!
//! Turns a byte stream into discrete frames and back. Decoding tolerates
//! partial network reads: if a whole frame is not yet buffered, `decode`
//! returns `Ok(None)` without consuming anything so the caller can retry once
//! more bytes arrive.
//!
//! ## Decode Contract
//!
//! ```text
//! available < 7                  → Ok(None), nothing read
//! record checkpoint
//! read type, channel, length
//! length over max frame size     → Err(FrameTooLarge), cursor restored
//! available < length + 1         → Ok(None), cursor restored
//! decode body by type tag        → Err(UnknownBodyType / UnknownMethod ...)
//! read terminator != 0xCE        → Err(InvalidFrameEnd)
//! → Ok(Some(frame))
//! ```
//!
//! A failed decode of any kind leaves the cursor exactly where it was. Framing
//! errors are still fatal for the stream; restoring only keeps the cursor
//! state inspectable for diagnostics.

use crate::body::{Body, ContentBody, HeaderBody, HeartbeatBody};
use crate::buffer::ByteCursor;
use crate::constants::{
    BodyType, ProtocolVersion, DEFAULT_MAX_FRAME_SIZE, FRAME_END, FRAME_HEADER_SIZE,
    FRAME_OVERHEAD,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::registry::MethodRegistry;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// One unit of wire transmission: a channel and a typed body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub channel: u16,
    pub body: Option<Body>,
}

impl Frame {
    pub fn new(channel: u16, body: impl Into<Body>) -> Self {
        Self {
            channel,
            body: Some(body.into()),
        }
    }

    /// A frame without a body; it cannot be sized or encoded until one is set
    pub fn empty(channel: u16) -> Self {
        Self {
            channel,
            body: None,
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = Some(body.into());
    }

    pub fn into_body(self) -> Option<Body> {
        self.body
    }

    fn require_body(&self) -> ProtocolResult<&Body> {
        self.body
            .as_ref()
            .ok_or(ProtocolError::MissingBody {
                channel: self.channel,
            })
    }

    /// Encoded length: type + channel + length + body + terminator
    pub fn size(&self) -> ProtocolResult<usize> {
        let body = self.require_body()?;
        Ok(1 + 2 + 4 + body.size() + 1)
    }

    /// Append this frame to the cursor, advancing it by exactly `size()` bytes.
    /// On error nothing is appended.
    pub fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        let body = self.require_body()?;
        let start = cursor.len();
        cursor.put_octet(body.body_type().into());
        cursor.put_short(self.channel);
        cursor.put_long(body.size() as u32);
        if let Err(e) = body.encode(cursor) {
            cursor.truncate(start);
            return Err(e);
        }
        cursor.put_octet(FRAME_END);
        debug_assert_eq!(cursor.len() - start, 1 + 2 + 4 + body.size() + 1);
        Ok(())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[channel={}; ", self.channel)?;
        match &self.body {
            Some(body) => write!(f, "{}", body)?,
            None => write!(f, "empty")?,
        }
        write!(f, "]")
    }
}

/// Frame decoder bound to a method registry and protocol version
#[derive(Debug, Clone)]
pub struct FrameCodec {
    registry: Arc<MethodRegistry>,
    version: ProtocolVersion,
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self {
            registry,
            version: ProtocolVersion::V8_0,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Largest frame (envelope included) accepted from the peer
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    pub fn size(&self, frame: &Frame) -> ProtocolResult<usize> {
        frame.size()
    }

    pub fn encode(&self, frame: &Frame, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        frame.encode(cursor)
    }

    /// Decode one frame; `Ok(None)` means more bytes are needed
    pub fn decode(&self, cursor: &mut ByteCursor) -> ProtocolResult<Option<Frame>> {
        if cursor.available() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        cursor.record();
        match self.decode_frame(cursor) {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                cursor.restore();
                Ok(None)
            }
            Err(e) => {
                cursor.restore();
                Err(e)
            }
        }
    }

    fn decode_frame(&self, cursor: &mut ByteCursor) -> ProtocolResult<Option<Frame>> {
        let tag = cursor.get_octet()?;
        let channel = cursor.get_short()?;
        let body_len = cursor.get_long()? as usize;

        let frame_size = body_len.saturating_add(FRAME_OVERHEAD);
        if frame_size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: frame_size,
                max: self.max_frame_size,
                channel,
            });
        }

        if cursor.available() < body_len + 1 {
            trace!(
                "Incomplete frame on channel {}: need {} bytes, have {}",
                channel,
                body_len + 1,
                cursor.available()
            );
            return Ok(None);
        }

        let body_type =
            BodyType::try_from(tag).map_err(|_| ProtocolError::UnknownBodyType { tag })?;
        let mut body_cursor = cursor.sub_cursor(body_len, "frame body")?;
        let body = self.decode_body(body_type, &mut body_cursor, body_len)?;

        let end = cursor.get_octet()?;
        if end != FRAME_END {
            return Err(ProtocolError::InvalidFrameEnd {
                expected: FRAME_END,
                actual: end,
                channel,
            });
        }

        trace!(
            "Decoded {} frame on channel {} ({} body bytes)",
            body_type.name(),
            channel,
            body_len
        );
        Ok(Some(Frame {
            channel,
            body: Some(body),
        }))
    }

    fn decode_body(
        &self,
        body_type: BodyType,
        body: &mut ByteCursor,
        body_len: usize,
    ) -> ProtocolResult<Body> {
        let decoded = match body_type {
            BodyType::Method => {
                let class_id = body.get_short()?;
                let method_id = body.get_short()?;
                let method = self
                    .registry
                    .decode(class_id, method_id, self.version, body)
                    .map_err(|e| {
                        if matches!(e, ProtocolError::Truncated { .. }) {
                            trace!("Truncated method body: {}", hex::encode(body.as_slice()));
                        }
                        e
                    })?;
                Body::Method(method)
            }
            BodyType::Header => Body::Header(HeaderBody::decode(body)?),
            BodyType::Content => {
                let payload = body.get_bytes(body_len)?;
                Body::Content(ContentBody::new(payload))
            }
            BodyType::Heartbeat => {
                body.skip(body_len)?;
                Body::Heartbeat(HeartbeatBody)
            }
        };

        if body.available() > 0 {
            return Err(ProtocolError::TrailingBytes {
                body: body_type.name(),
                declared: body_len,
                consumed: body_len - body.available(),
            });
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::method::{ChannelOpenOk, QueueBind};

    fn codec() -> FrameCodec {
        FrameCodec::new(Arc::new(MethodRegistry::new()))
    }

    #[test]
    fn test_size_formula() {
        let frame = Frame::new(3, ContentBody::new(vec![1u8, 2, 3]));
        assert_eq!(frame.size().unwrap(), 1 + 2 + 4 + 3 + 1);

        let frame = Frame::new(0, HeartbeatBody);
        assert_eq!(frame.size().unwrap(), FRAME_OVERHEAD);
    }

    #[test]
    fn test_size_of_empty_frame_is_internal_error() {
        let frame = Frame::empty(7);
        let err = frame.size().unwrap_err();
        assert_eq!(err, ProtocolError::MissingBody { channel: 7 });
        assert!(!err.is_framing());

        let mut cursor = ByteCursor::new();
        assert!(frame.encode(&mut cursor).is_err());
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_failed_encode_appends_nothing() {
        let mut cursor = ByteCursor::new();
        Frame::new(1, ChannelOpenOk).encode(&mut cursor).unwrap();
        let before = cursor.as_slice().to_vec();

        let frame = Frame::new(
            2,
            QueueBind {
                queue: "q".repeat(256),
                ..Default::default()
            },
        );
        let err = frame.encode(&mut cursor).unwrap_err();
        assert!(matches!(err, ProtocolError::StringTooLong { len: 256, .. }));
        assert_eq!(cursor.as_slice(), &before[..]);
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(0x0102, ChannelOpenOk);
        let mut cursor = ByteCursor::new();
        frame.encode(&mut cursor).unwrap();
        assert_eq!(
            cursor.as_slice(),
            &[1, 0x01, 0x02, 0, 0, 0, 4, 0, 20, 0, 11, FRAME_END]
        );
        assert_eq!(cursor.len(), frame.size().unwrap());
    }

    #[test]
    fn test_decode_round_trip() {
        let frame = Frame::new(
            5,
            QueueBind {
                queue: "q".into(),
                exchange: "amq.direct".into(),
                routing_key: "abc".into(),
                ..Default::default()
            },
        );
        let mut cursor = ByteCursor::new();
        frame.encode(&mut cursor).unwrap();

        let decoded = codec().decode(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(cursor.available(), 0);
    }

    #[test]
    fn test_short_head_returns_none() {
        let mut cursor = ByteCursor::from(&[1, 0, 0, 0][..]);
        assert_eq!(codec().decode(&mut cursor).unwrap(), None);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_oversized_frame_rejected_before_body_arrives() {
        let mut cursor = ByteCursor::new();
        cursor.put_octet(3);
        cursor.put_short(1);
        cursor.put_long(1_000_000);

        let codec = codec().with_max_frame_size(4096);
        let err = codec.decode(&mut cursor).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 4096, .. }));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_trailing_bytes_in_method_body() {
        let mut cursor = ByteCursor::new();
        cursor.put_octet(1);
        cursor.put_short(1);
        cursor.put_long(5);
        cursor.put_short(20);
        cursor.put_short(11);
        cursor.put_octet(0xFF);
        cursor.put_octet(FRAME_END);

        let err = codec().decode(&mut cursor).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TrailingBytes {
                body: "method",
                declared: 5,
                consumed: 4
            }
        );
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Frame::empty(2).to_string(), "Frame[channel=2; empty]");
        assert_eq!(
            Frame::new(1, ChannelOpenOk).to_string(),
            "Frame[channel=1; method channel.open-ok]"
        );
    }
}
