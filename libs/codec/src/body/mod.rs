//! # Frame Bodies
//!
//! The four body variants a frame can carry. The frame's type tag selects the
//! variant; method bodies are further resolved by `(class_id, method_id)`
//! through the [`MethodRegistry`](crate::registry::MethodRegistry).
//!
//! ```text
//! tag 1 → Method    → class/method → typed MethodBody (registry)
//! tag 2 → Header    → content header + basic properties
//! tag 3 → Content   → opaque payload bytes
//! tag 8 → Heartbeat → empty
//! ```

pub mod header;
pub mod method;

pub use header::{BasicProperties, HeaderBody};
pub use method::*;

use crate::buffer::ByteCursor;
use crate::constants::BodyType;
use crate::error::ProtocolResult;
use bytes::Bytes;
use std::fmt;

/// Tagged union over every frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Method(MethodBody),
    Header(HeaderBody),
    Content(ContentBody),
    Heartbeat(HeartbeatBody),
}

impl Body {
    pub fn body_type(&self) -> BodyType {
        match self {
            Body::Method(_) => BodyType::Method,
            Body::Header(_) => BodyType::Header,
            Body::Content(_) => BodyType::Content,
            Body::Heartbeat(_) => BodyType::Heartbeat,
        }
    }

    /// Encoded body length, excluding the frame envelope
    pub fn size(&self) -> usize {
        match self {
            Body::Method(m) => m.size(),
            Body::Header(h) => h.size(),
            Body::Content(c) => c.size(),
            Body::Heartbeat(_) => 0,
        }
    }

    pub fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        match self {
            Body::Method(m) => m.encode(cursor),
            Body::Header(h) => h.encode(cursor),
            Body::Content(c) => {
                cursor.put_slice(&c.payload);
                Ok(())
            }
            Body::Heartbeat(_) => Ok(()),
        }
    }

    pub fn as_method(&self) -> Option<&MethodBody> {
        match self {
            Body::Method(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Method(m) => write!(f, "method {}", m.name()),
            Body::Header(h) => write!(f, "header class={} body_size={}", h.class_id, h.body_size),
            Body::Content(c) => write!(f, "content {} bytes", c.size()),
            Body::Heartbeat(_) => write!(f, "heartbeat"),
        }
    }
}

impl From<MethodBody> for Body {
    fn from(body: MethodBody) -> Self {
        Body::Method(body)
    }
}

impl From<HeaderBody> for Body {
    fn from(body: HeaderBody) -> Self {
        Body::Header(body)
    }
}

impl From<ContentBody> for Body {
    fn from(body: ContentBody) -> Self {
        Body::Content(body)
    }
}

impl From<HeartbeatBody> for Body {
    fn from(body: HeartbeatBody) -> Self {
        Body::Heartbeat(body)
    }
}

/// Message payload bytes, possibly one slice of a larger message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentBody {
    pub payload: Bytes,
}

impl ContentBody {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Keep-alive body with no content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatBody;
