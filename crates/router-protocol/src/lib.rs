//! router-protocol
//!
//! Wire-level encoding/decoding for the channel router.
//!
//! This crate turns logical messages (`router_core::ControlMessage`, the
//! record payloads) into bytes and back again:
//!
//! - [`wire_types`]   : message-type ids, version, length limits
//! - [`envelope`]     : the `MessagePack` frame around every message
//! - [`record_codec`] : self-describing structured-record encoding
//! - [`body_codec`]   : per-message body encoding

pub mod wire_types;
pub mod envelope;
pub mod record_codec;
pub mod body_codec;

mod reader;

pub use envelope::{decode_pack, encode_pack, MessagePack};
pub use body_codec::{decode_body, decode_reply_body, encode_body, msg_type_of};
pub use record_codec::{decode_record, encode_record};
pub use wire_types::{WireMsgType, PROTOCOL_VERSION, USER_SPACE_START};

use thiserror::Error;

/// Errors that can arise when encoding/decoding a binary frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short for the expected fields.
    #[error("buffer truncated")]
    Truncated,

    /// Unknown or unsupported message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u32),

    /// Unsupported or mismatched protocol version.
    #[error("protocol version mismatch: got {0}, expected {}", wire_types::PROTOCOL_VERSION)]
    VersionMismatch(u8),

    /// Invalid enum value or other semantic issue.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// A string or container exceeds its wire limit.
    #[error("length limit exceeded: {0}")]
    LimitExceeded(&'static str),

    /// Record nesting beyond [`wire_types::MAX_RECORD_DEPTH`].
    #[error("record nesting too deep")]
    TooDeep,
}
