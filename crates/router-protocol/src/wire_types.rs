//! Low-level wire types and constants.
//!
//! This module defines:
//! - Message type ids for the core control messages.
//! - Protocol versioning.
//! - Length limits enforced at the codec layer.
//!
//! The actual encode/decode logic lives in `envelope`, `record_codec`,
//! and `body_codec`.

/// Current protocol version.
///
/// Bumped if the framing or message layouts change incompatibly.
pub const PROTOCOL_VERSION: u8 = 1;

/// First message type id reserved for user-space messages.
///
/// Anything at or above this value is an opaque payload the router
/// forwards per the envelope's broadcast mode without decoding.
pub const USER_SPACE_START: u32 = 100;

/// Core control message types.
///
/// These ids are stable; they appear in the `msg_type` field of every
/// envelope.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireMsgType {
    /// Discover channels by type or metadata prefix.
    ListChannel = 1,

    /// Reply to `ListChannel`.
    ListChannelResult = 2,

    /// Create a channel; the sender becomes the owner.
    CreateChannel = 3,

    /// Remove a channel (body names the victim).
    RemoveChannel = 4,

    /// Subscribe a connection to the addressed channel.
    SubToChannel = 5,

    /// Unsubscribe a connection from the addressed channel.
    UnsubFromChannel = 6,

    /// Incremental update to the addressed channel's data.
    ChannelDataUpdate = 7,

    /// Error reply echoing the request's stub.
    ServerError = 8,
}

impl WireMsgType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(WireMsgType::ListChannel),
            2 => Some(WireMsgType::ListChannelResult),
            3 => Some(WireMsgType::CreateChannel),
            4 => Some(WireMsgType::RemoveChannel),
            5 => Some(WireMsgType::SubToChannel),
            6 => Some(WireMsgType::UnsubFromChannel),
            7 => Some(WireMsgType::ChannelDataUpdate),
            8 => Some(WireMsgType::ServerError),
            _ => None,
        }
    }
}

/// Maximum channel metadata length on the wire.
pub const MAX_METADATA_LEN: usize = 256;

/// Maximum record field-name length.
pub const MAX_FIELD_NAME_LEN: usize = 64;

/// Maximum length of a single field-mask path.
pub const MAX_MASK_LEN: usize = 128;

/// Maximum number of field masks per subscription.
pub const MAX_FIELD_MASKS: usize = 64;

/// Maximum nesting depth accepted when decoding a record.
pub const MAX_RECORD_DEPTH: usize = 16;

/// Maximum payload length of one envelope.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;
