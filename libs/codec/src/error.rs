//! Protocol-level errors for frame encoding and decoding
//!
//! Every error carries enough context to be logged at the connection layer
//! before the stream is torn down. Errors fall into two kinds:
//!
//! - **Framing**: the byte stream is corrupt or speaks something we do not
//!   understand. The connection must be closed; the stream is never
//!   resynchronized.
//! - **Internal**: a caller broke an invariant (e.g. sizing a frame that has
//!   no body). These are defects, not protocol input.
//!
//! "Not enough bytes yet" is deliberately absent: the frame codec reports it
//! as `Ok(None)` so callers can loop without matching on errors.

use crate::constants::ProtocolVersion;
use thiserror::Error;

/// Classification used by the connection layer to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Corrupt or unrecognized wire data, fatal for the byte stream
    Framing,
    /// Programming invariant violated
    Internal,
}

/// Codec errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Frame terminator byte did not match the fixed frame-end marker
    #[error("Frame end not found: expected {expected:#04x}, got {actual:#04x} (channel {channel})")]
    InvalidFrameEnd {
        expected: u8,
        actual: u8,
        channel: u16,
    },

    /// Body type tag is not one of method/header/content/heartbeat
    #[error("Unknown body type: {tag}")]
    UnknownBodyType { tag: u8 },

    /// Class id is not registered for the protocol version
    #[error("Class {class_id} unknown in AMQP version {version} (while trying to decode class {class_id} method {method_id})")]
    UnknownClass {
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
    },

    /// Method id is not registered for the class in the protocol version
    #[error("Method {method_id} unknown in AMQP version {version} (while trying to decode class {class_id} method {method_id})")]
    UnknownMethod {
        class_id: u16,
        method_id: u16,
        version: ProtocolVersion,
    },

    /// No method table exists for the requested protocol version
    #[error("Unsupported protocol version {version}: supported versions are {supported}")]
    UnsupportedVersion {
        version: ProtocolVersion,
        supported: String,
    },

    /// Declared frame exceeds the negotiated maximum
    #[error("Frame too large: {size} bytes exceeds maximum {max} (channel {channel})")]
    FrameTooLarge { size: usize, max: usize, channel: u16 },

    /// A field read ran past the end of the available bytes
    #[error("Truncated data: need {need} bytes, got {got} (context: {context})")]
    Truncated {
        need: usize,
        got: usize,
        context: String,
    },

    /// A body did not consume the full length declared in the frame head
    #[error("Body length mismatch for {body}: declared {declared} bytes, consumed {consumed}")]
    TrailingBytes {
        body: &'static str,
        declared: usize,
        consumed: usize,
    },

    /// A short or long string was not valid UTF-8
    #[error("Invalid UTF-8 in {context}")]
    InvalidString { context: String },

    /// Field table entry carries a type tag we do not decode
    #[error("Unsupported field type {tag:#04x} for field '{field}'")]
    UnsupportedFieldType { tag: u8, field: String },

    /// Field tables nested deeper than the decoder accepts
    #[error("Field table nesting exceeds {max} levels")]
    TableTooDeep { max: usize },

    /// Content header uses a property-flag continuation word we do not decode
    #[error("Unsupported property flags {flags:#06x}: continuation words are not decoded")]
    InvalidPropertyFlags { flags: u16 },

    /// Frame has no body; sizing or encoding it is a caller bug
    #[error("Attempt to get size of frame with no body set (channel {channel})")]
    MissingBody { channel: u16 },

    /// Short strings are limited to 255 bytes on the wire
    #[error("Short string too long: {len} bytes exceeds 255 (context: {context})")]
    StringTooLong { len: usize, context: String },
}

impl ProtocolError {
    /// Create a Truncated error with context
    pub fn truncated(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::Truncated {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create an InvalidString error with context
    pub fn invalid_string(context: impl Into<String>) -> Self {
        Self::InvalidString {
            context: context.into(),
        }
    }

    /// Create a StringTooLong error with context
    pub fn string_too_long(len: usize, context: impl Into<String>) -> Self {
        Self::StringTooLong {
            len,
            context: context.into(),
        }
    }

    /// Whether this error is a framing error or an internal defect
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingBody { .. } | Self::StringTooLong { .. } => ErrorKind::Internal,
            _ => ErrorKind::Framing,
        }
    }

    /// True for errors that must close the connection's byte stream
    pub fn is_framing(&self) -> bool {
        self.kind() == ErrorKind::Framing
    }
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
