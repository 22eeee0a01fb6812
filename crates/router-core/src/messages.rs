//! Logical control messages flowing between peers and the router.
//!
//! These are **transport-agnostic**: the binary envelope and body codecs
//! live in the `router-protocol` crate. Requests and replies share the
//! same `msg_type` space, so a single enum covers both directions; the
//! `stub_id` on the envelope pairs them up.

use crate::broadcast::BroadcastType;
use crate::channel_type::ChannelType;
use crate::error::ErrorCode;
use crate::id::{ChannelId, ConnectionId};
use crate::record::Record;
use crate::subscription::SubscriptionOptionsPatch;

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    ListChannel(ListChannelMessage),
    ListChannelResult(ListChannelResultMessage),
    CreateChannel(CreateChannelMessage),
    CreateChannelResult(CreateChannelResultMessage),
    RemoveChannel(RemoveChannelMessage),
    RemoveChannelResult(RemoveChannelResultMessage),
    SubToChannel(SubToChannelMessage),
    SubToChannelResult(SubToChannelResultMessage),
    UnsubFromChannel(UnsubFromChannelMessage),
    UnsubFromChannelResult(UnsubFromChannelResultMessage),
    ChannelDataUpdate(ChannelDataUpdateMessage),
    ServerError(ServerErrorMessage),
    /// Opaque user-space payload forwarded per the envelope's broadcast
    /// mode; the router never decodes it.
    UserSpace(UserSpaceMessage),
}

/// Discover channels by type and/or metadata prefix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListChannelMessage {
    pub type_filter: Option<ChannelType>,
    /// Empty string matches every channel.
    pub metadata_prefix: String,
}

/// One entry of a list-channel reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelListing {
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListChannelResultMessage {
    pub channels: Vec<ChannelListing>,
}

/// Create a channel; the sender becomes its owner and is auto-subscribed
/// with `sub_options`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateChannelMessage {
    pub channel_type: ChannelType,
    pub metadata: String,
    pub sub_options: Option<SubscriptionOptionsPatch>,
    /// Initial channel data, if any.
    pub data: Option<Record>,
    /// Gate for client-originated broadcasts on the new channel.
    pub enable_client_broadcast: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateChannelResultMessage {
    pub channel_id: ChannelId,
}

/// Remove a channel. Addressed to the GLOBAL channel; the body names the
/// victim.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveChannelMessage {
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveChannelResultMessage {
    pub channel_id: ChannelId,
}

/// Subscribe a connection to the addressed channel.
///
/// `conn_id = 0` means "the sender itself"; subscribing anyone else
/// requires authority over the channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubToChannelMessage {
    pub conn_id: ConnectionId,
    pub sub_options: SubscriptionOptionsPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubToChannelResultMessage {
    pub conn_id: ConnectionId,
}

/// Unsubscribe a connection from the addressed channel. Same `conn_id`
/// convention and authority rule as subscribe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnsubFromChannelMessage {
    pub conn_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsubFromChannelResultMessage {
    pub conn_id: ConnectionId,
}

/// Incremental update to the addressed channel's data. The record is
/// self-describing so the router can route it without static typing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDataUpdateMessage {
    pub data: Record,
}

/// Error reply carried on the envelope that echoes the request's stub.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

/// An opaque user-space message (`msg_type >= USER_SPACE_START`).
#[derive(Debug, Clone, PartialEq)]
pub struct UserSpaceMessage {
    pub msg_type: u32,
    pub payload: Vec<u8>,
}

impl ControlMessage {
    /// Convenience constructor for an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> ControlMessage {
        ControlMessage::ServerError(ServerErrorMessage {
            code,
            message: message.into(),
        })
    }
}

/// Context of one inbound message as seen by a channel handler.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub channel_id: ChannelId,
    pub msg_type: u32,
    pub broadcast: BroadcastType,
    pub stub_id: u32,
    pub conn_id: ConnectionId,
    pub msg: ControlMessage,
}
