//! # Protocol Constants
//!
//! Wire-level constants for the AMQP 0-8 frame envelope and the reply codes
//! carried in close/return methods. These values are fixed by the protocol and
//! must stay stable across every peer on the wire.
//!
//! ```text
//! offset  size  field
//! 0       1     body type tag
//! 1       2     channel (big-endian)
//! 3       4     body length (big-endian)
//! 7       N     body bytes
//! 7+N     1     FRAME_END (0xCE)
//! ```

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Terminator byte closing every frame
pub const FRAME_END: u8 = 0xCE;

/// Type tag + channel + body length
pub const FRAME_HEADER_SIZE: usize = 7;

/// Envelope bytes around a body: header plus terminator
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Default upper bound for a single frame, matching common broker defaults
pub const DEFAULT_MAX_FRAME_SIZE: usize = 131_072;

/// Deepest field table nesting accepted on decode
pub const MAX_TABLE_DEPTH: usize = 32;

/// Body type tags carried in the first byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BodyType {
    Method = 1,
    Header = 2,
    Content = 3,
    Heartbeat = 8,
}

impl BodyType {
    /// Human-readable name for logs
    pub fn name(self) -> &'static str {
        match self {
            BodyType::Method => "method",
            BodyType::Header => "header",
            BodyType::Content => "content",
            BodyType::Heartbeat => "heartbeat",
        }
    }
}

/// Protocol version used to resolve method bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// The only version this codec currently resolves methods for
    pub const V8_0: ProtocolVersion = ProtocolVersion { major: 8, minor: 0 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.major, self.minor)
    }
}

/// Reply codes used in connection.close, channel.close and basic.return
pub mod reply_code {
    pub const REPLY_SUCCESS: u16 = 200;
    pub const NO_ROUTE: u16 = 312;
    pub const NO_CONSUMERS: u16 = 313;
    pub const ACCESS_REFUSED: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const PRECONDITION_FAILED: u16 = 406;
    pub const FRAME_ERROR: u16 = 501;
    pub const SYNTAX_ERROR: u16 = 502;
    pub const COMMAND_INVALID: u16 = 503;
    pub const CHANNEL_ERROR: u16 = 504;
    pub const UNEXPECTED_FRAME: u16 = 505;
    pub const NOT_ALLOWED: u16 = 530;
    pub const NOT_IMPLEMENTED: u16 = 540;
    pub const INTERNAL_ERROR: u16 = 541;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_type_tags() {
        assert_eq!(u8::from(BodyType::Method), 1);
        assert_eq!(BodyType::try_from(3u8).unwrap(), BodyType::Content);
        assert_eq!(BodyType::try_from(8u8).unwrap(), BodyType::Heartbeat);
        assert!(BodyType::try_from(0u8).is_err());
        assert!(BodyType::try_from(4u8).is_err());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(ProtocolVersion::V8_0.to_string(), "8-0");
        assert_eq!(ProtocolVersion::new(0, 9), ProtocolVersion { major: 0, minor: 9 });
    }
}
