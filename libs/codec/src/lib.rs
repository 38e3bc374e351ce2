//! # Burrow Wire Codec
//!
//! ## Purpose
//!
//! The framing layer of the burrow broker: it turns raw connection bytes into
//! typed frames and frames back into bytes.
//!
//! - [`ByteCursor`]: position-tracking buffer with a record/restore checkpoint
//! - [`FrameCodec`]: resumable frame envelope decode, bit-exact encode
//! - [`MethodRegistry`]: `(class, method, version)` → typed method body
//! - [`Body`]: method / header / content / heartbeat bodies
//! - [`FieldTable`]: typed argument and header tables
//!
//! ## Architecture Role
//!
//! ```text
//! connection bytes → [ByteCursor] → [FrameCodec] → Frame → dispatcher
//!                                        ↓
//!                                 [MethodRegistry]
//!                                 typed MethodBody
//! ```
//!
//! ## Error Model
//!
//! - Incomplete input is `Ok(None)`; the cursor is untouched.
//! - Framing errors ([`ErrorKind::Framing`]) mean the stream is corrupt and the
//!   connection must close.
//! - Internal errors ([`ErrorKind::Internal`]) are caller defects, such as
//!   sizing a frame without a body.
//!
//! ## Example
//!
//! ```rust
//! use codec::{ByteCursor, ContentBody, Frame, FrameCodec, MethodRegistry};
//! use std::sync::Arc;
//!
//! let codec = FrameCodec::new(Arc::new(MethodRegistry::new()));
//! let mut cursor = ByteCursor::new();
//! codec
//!     .encode(&Frame::new(1, ContentBody::new(&b"hello"[..])), &mut cursor)
//!     .unwrap();
//!
//! let frame = codec.decode(&mut cursor).unwrap().expect("complete frame");
//! assert_eq!(frame.channel, 1);
//! ```

pub mod body;
pub mod buffer;
pub mod constants;
pub mod error;
pub mod field_table;
pub mod frame;
pub mod registry;

pub use body::{
    BasicDeliver, BasicProperties, BasicPublish, BasicReturn, Body, ChannelClose,
    ChannelCloseOk, ChannelOpen, ChannelOpenOk, ConnectionClose, ConnectionCloseOk,
    ContentBody, ExchangeDeclare, ExchangeDeclareOk, ExchangeDelete, ExchangeDeleteOk,
    HeaderBody, HeartbeatBody, Method, MethodBody, QueueBind, QueueBindOk, QueueDeclare,
    QueueDeclareOk, QueueUnbind, QueueUnbindOk,
};
pub use buffer::ByteCursor;
pub use constants::{
    reply_code, BodyType, ProtocolVersion, DEFAULT_MAX_FRAME_SIZE, FRAME_END,
    FRAME_HEADER_SIZE, FRAME_OVERHEAD, MAX_TABLE_DEPTH,
};
pub use error::{ErrorKind, ProtocolError, ProtocolResult};
pub use field_table::{FieldTable, FieldValue};
pub use frame::{Frame, FrameCodec};
pub use registry::{MethodDecoder, MethodRegistry, MethodTable};
