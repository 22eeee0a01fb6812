//! Body encoding for every control message.
//!
//! Layouts (all integers big-endian; strings are length-prefixed UTF-8):
//!
//! ```text
//! ListChannel:
//!   [0]      has_type_filter (0/1)
//!   [1]      channel_type (present iff has_type_filter)
//!   then     metadata_prefix (u16 len + bytes)
//!
//! ListChannelResult:
//!   u16 count, then per entry:
//!     channel_id (u32), channel_type (u8), metadata (u16 len + bytes)
//!
//! CreateChannel:
//!   [0]      channel_type
//!   then     metadata (u16 len + bytes)
//!   [..]     enable_client_broadcast (0/1)
//!   [..]     has_sub_options (0/1) + options patch
//!   [..]     has_data (0/1) + record
//!
//! CreateChannelResult / RemoveChannel / RemoveChannelResult:
//!   channel_id (u32)
//!
//! SubToChannel:
//!   conn_id (u32) + options patch
//!
//! SubToChannelResult / UnsubFromChannel / UnsubFromChannelResult:
//!   conn_id (u32)
//!
//! ChannelDataUpdate:
//!   record
//!
//! ServerError:
//!   [0] code, then message (u16 len + bytes)
//!
//! options patch (merge-of-options on re-subscribe; absent fields keep
//! their prior value):
//!   [0] flags: bit0 can_update_data, bit1 fan_out_interval, bit2 masks
//!   [can_update_data (0/1)]
//!   [fan_out_interval_ms (u32)]
//!   [mask count (u8) + masks (u8 len + bytes each)]
//! ```
//!
//! User-space bodies (`msg_type >= USER_SPACE_START`) are opaque and pass
//! through untouched.

use router_core::{
    ChannelDataUpdateMessage, ChannelId, ChannelListing, ChannelType, ConnectionId,
    ControlMessage, CreateChannelMessage, CreateChannelResultMessage, ErrorCode,
    ListChannelMessage, ListChannelResultMessage, RemoveChannelMessage,
    RemoveChannelResultMessage, ServerErrorMessage, SubToChannelMessage,
    SubToChannelResultMessage, SubscriptionOptionsPatch, UnsubFromChannelMessage,
    UnsubFromChannelResultMessage, UserSpaceMessage,
};

use crate::reader::{write_str_u8, write_str_u16, Reader};
use crate::record_codec::{encode_record, read_record};
use crate::wire_types::{
    WireMsgType, MAX_FIELD_MASKS, MAX_MASK_LEN, MAX_METADATA_LEN, USER_SPACE_START,
};
use crate::ProtocolError;

const PATCH_CAN_UPDATE: u8 = 1 << 0;
const PATCH_FAN_OUT: u8 = 1 << 1;
const PATCH_MASKS: u8 = 1 << 2;

/// The `msg_type` under which a message travels.
pub fn msg_type_of(msg: &ControlMessage) -> u32 {
    match msg {
        ControlMessage::ListChannel(_) => WireMsgType::ListChannel as u32,
        ControlMessage::ListChannelResult(_) => WireMsgType::ListChannelResult as u32,
        ControlMessage::CreateChannel(_) | ControlMessage::CreateChannelResult(_) => {
            WireMsgType::CreateChannel as u32
        }
        ControlMessage::RemoveChannel(_) | ControlMessage::RemoveChannelResult(_) => {
            WireMsgType::RemoveChannel as u32
        }
        ControlMessage::SubToChannel(_) | ControlMessage::SubToChannelResult(_) => {
            WireMsgType::SubToChannel as u32
        }
        ControlMessage::UnsubFromChannel(_) | ControlMessage::UnsubFromChannelResult(_) => {
            WireMsgType::UnsubFromChannel as u32
        }
        ControlMessage::ChannelDataUpdate(_) => WireMsgType::ChannelDataUpdate as u32,
        ControlMessage::ServerError(_) => WireMsgType::ServerError as u32,
        ControlMessage::UserSpace(u) => u.msg_type,
    }
}

/// Encode a message body into `out`.
pub fn encode_body(msg: &ControlMessage, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    match msg {
        ControlMessage::ListChannel(m) => {
            match m.type_filter {
                Some(t) => {
                    out.push(1);
                    out.push(t.as_u8());
                }
                None => out.push(0),
            }
            write_str_u16(out, &m.metadata_prefix, MAX_METADATA_LEN, "metadata prefix")
        }
        ControlMessage::ListChannelResult(m) => {
            if m.channels.len() > u16::MAX as usize {
                return Err(ProtocolError::LimitExceeded("channel list"));
            }
            out.extend_from_slice(&(m.channels.len() as u16).to_be_bytes());
            for entry in &m.channels {
                out.extend_from_slice(&entry.channel_id.0.to_be_bytes());
                out.push(entry.channel_type.as_u8());
                write_str_u16(out, &entry.metadata, MAX_METADATA_LEN, "metadata")?;
            }
            Ok(())
        }
        ControlMessage::CreateChannel(m) => {
            out.push(m.channel_type.as_u8());
            write_str_u16(out, &m.metadata, MAX_METADATA_LEN, "metadata")?;
            out.push(m.enable_client_broadcast as u8);
            match &m.sub_options {
                Some(patch) => {
                    out.push(1);
                    encode_patch(patch, out)?;
                }
                None => out.push(0),
            }
            match &m.data {
                Some(record) => {
                    out.push(1);
                    encode_record(record, out)?;
                }
                None => out.push(0),
            }
            Ok(())
        }
        ControlMessage::CreateChannelResult(m) => {
            out.extend_from_slice(&m.channel_id.0.to_be_bytes());
            Ok(())
        }
        ControlMessage::RemoveChannel(m) => {
            out.extend_from_slice(&m.channel_id.0.to_be_bytes());
            Ok(())
        }
        ControlMessage::RemoveChannelResult(m) => {
            out.extend_from_slice(&m.channel_id.0.to_be_bytes());
            Ok(())
        }
        ControlMessage::SubToChannel(m) => {
            out.extend_from_slice(&m.conn_id.0.to_be_bytes());
            encode_patch(&m.sub_options, out)
        }
        ControlMessage::SubToChannelResult(m) => {
            out.extend_from_slice(&m.conn_id.0.to_be_bytes());
            Ok(())
        }
        ControlMessage::UnsubFromChannel(m) => {
            out.extend_from_slice(&m.conn_id.0.to_be_bytes());
            Ok(())
        }
        ControlMessage::UnsubFromChannelResult(m) => {
            out.extend_from_slice(&m.conn_id.0.to_be_bytes());
            Ok(())
        }
        ControlMessage::ChannelDataUpdate(m) => encode_record(&m.data, out),
        ControlMessage::ServerError(m) => {
            out.push(m.code.as_u8());
            write_str_u16(out, &m.message, u16::MAX as usize, "error message")
        }
        ControlMessage::UserSpace(m) => {
            out.extend_from_slice(&m.payload);
            Ok(())
        }
    }
}

/// Decode the body of an envelope according to its `msg_type`.
pub fn decode_body(msg_type: u32, buf: &[u8]) -> Result<ControlMessage, ProtocolError> {
    if msg_type >= USER_SPACE_START {
        return Ok(ControlMessage::UserSpace(UserSpaceMessage {
            msg_type,
            payload: buf.to_vec(),
        }));
    }

    // Requests and replies share a msg_type; which one a buffer holds is
    // positional (client→server = request). Dispatch only ever decodes
    // requests, and clients only ever decode replies, so each side calls
    // the matching function below.
    let wire_type =
        WireMsgType::from_u32(msg_type).ok_or(ProtocolError::UnknownMessageType(msg_type))?;
    let mut r = Reader::new(buf);

    match wire_type {
        WireMsgType::ListChannel => {
            let type_filter = match r.read_u8()? {
                0 => None,
                1 => {
                    let raw = r.read_u8()?;
                    Some(
                        ChannelType::from_u8(raw)
                            .ok_or(ProtocolError::InvalidField("channel type"))?,
                    )
                }
                _ => return Err(ProtocolError::InvalidField("type filter")),
            };
            let metadata_prefix = r.read_str_u16(MAX_METADATA_LEN, "metadata prefix")?;
            Ok(ControlMessage::ListChannel(ListChannelMessage {
                type_filter,
                metadata_prefix,
            }))
        }
        WireMsgType::ListChannelResult => {
            let count = r.read_u16_be()? as usize;
            let mut channels = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let channel_id = ChannelId(r.read_u32_be()?);
                let raw = r.read_u8()?;
                let channel_type = ChannelType::from_u8(raw)
                    .ok_or(ProtocolError::InvalidField("channel type"))?;
                let metadata = r.read_str_u16(MAX_METADATA_LEN, "metadata")?;
                channels.push(ChannelListing {
                    channel_id,
                    channel_type,
                    metadata,
                });
            }
            Ok(ControlMessage::ListChannelResult(ListChannelResultMessage {
                channels,
            }))
        }
        WireMsgType::CreateChannel => {
            let raw = r.read_u8()?;
            let channel_type =
                ChannelType::from_u8(raw).ok_or(ProtocolError::InvalidField("channel type"))?;
            let metadata = r.read_str_u16(MAX_METADATA_LEN, "metadata")?;
            let enable_client_broadcast = read_bool(&mut r, "enable_client_broadcast")?;
            let sub_options = if read_bool(&mut r, "has_sub_options")? {
                Some(decode_patch(&mut r)?)
            } else {
                None
            };
            let data = if read_bool(&mut r, "has_data")? {
                Some(read_record(&mut r, 0)?)
            } else {
                None
            };
            Ok(ControlMessage::CreateChannel(CreateChannelMessage {
                channel_type,
                metadata,
                sub_options,
                data,
                enable_client_broadcast,
            }))
        }
        WireMsgType::RemoveChannel => Ok(ControlMessage::RemoveChannel(RemoveChannelMessage {
            channel_id: ChannelId(r.read_u32_be()?),
        })),
        WireMsgType::SubToChannel => {
            let conn_id = ConnectionId(r.read_u32_be()?);
            let sub_options = decode_patch(&mut r)?;
            Ok(ControlMessage::SubToChannel(SubToChannelMessage {
                conn_id,
                sub_options,
            }))
        }
        WireMsgType::UnsubFromChannel => {
            Ok(ControlMessage::UnsubFromChannel(UnsubFromChannelMessage {
                conn_id: ConnectionId(r.read_u32_be()?),
            }))
        }
        WireMsgType::ChannelDataUpdate => {
            let data = read_record(&mut r, 0)?;
            Ok(ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
                data,
            }))
        }
        WireMsgType::ServerError => {
            let raw = r.read_u8()?;
            let code = ErrorCode::from_u8(raw).ok_or(ProtocolError::InvalidField("error code"))?;
            let message = r.read_str_u16(u16::MAX as usize, "error message")?;
            Ok(ControlMessage::ServerError(ServerErrorMessage {
                code,
                message,
            }))
        }
    }
}

/// Decode a **reply** body: same msg_type space, server→client direction.
pub fn decode_reply_body(msg_type: u32, buf: &[u8]) -> Result<ControlMessage, ProtocolError> {
    if msg_type >= USER_SPACE_START {
        return Ok(ControlMessage::UserSpace(UserSpaceMessage {
            msg_type,
            payload: buf.to_vec(),
        }));
    }
    let wire_type =
        WireMsgType::from_u32(msg_type).ok_or(ProtocolError::UnknownMessageType(msg_type))?;
    let mut r = Reader::new(buf);

    match wire_type {
        WireMsgType::CreateChannel => {
            Ok(ControlMessage::CreateChannelResult(CreateChannelResultMessage {
                channel_id: ChannelId(r.read_u32_be()?),
            }))
        }
        WireMsgType::RemoveChannel => {
            Ok(ControlMessage::RemoveChannelResult(RemoveChannelResultMessage {
                channel_id: ChannelId(r.read_u32_be()?),
            }))
        }
        WireMsgType::SubToChannel => {
            Ok(ControlMessage::SubToChannelResult(SubToChannelResultMessage {
                conn_id: ConnectionId(r.read_u32_be()?),
            }))
        }
        WireMsgType::UnsubFromChannel => Ok(ControlMessage::UnsubFromChannelResult(
            UnsubFromChannelResultMessage {
                conn_id: ConnectionId(r.read_u32_be()?),
            },
        )),
        // These decode identically in both directions.
        WireMsgType::ListChannel
        | WireMsgType::ListChannelResult
        | WireMsgType::ChannelDataUpdate
        | WireMsgType::ServerError => decode_body(msg_type, buf),
    }
}

fn encode_patch(patch: &SubscriptionOptionsPatch, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let mut flags = 0u8;
    if patch.can_update_data.is_some() {
        flags |= PATCH_CAN_UPDATE;
    }
    if patch.fan_out_interval_ms.is_some() {
        flags |= PATCH_FAN_OUT;
    }
    if patch.data_field_masks.is_some() {
        flags |= PATCH_MASKS;
    }
    out.push(flags);

    if let Some(can_update) = patch.can_update_data {
        out.push(can_update as u8);
    }
    if let Some(ms) = patch.fan_out_interval_ms {
        out.extend_from_slice(&ms.to_be_bytes());
    }
    if let Some(masks) = &patch.data_field_masks {
        if masks.len() > MAX_FIELD_MASKS {
            return Err(ProtocolError::LimitExceeded("field masks"));
        }
        out.push(masks.len() as u8);
        for mask in masks {
            write_str_u8(out, mask, MAX_MASK_LEN, "field mask")?;
        }
    }
    Ok(())
}

fn decode_patch(r: &mut Reader<'_>) -> Result<SubscriptionOptionsPatch, ProtocolError> {
    let flags = r.read_u8()?;
    let mut patch = SubscriptionOptionsPatch::default();

    if flags & PATCH_CAN_UPDATE != 0 {
        patch.can_update_data = Some(read_bool(r, "can_update_data")?);
    }
    if flags & PATCH_FAN_OUT != 0 {
        patch.fan_out_interval_ms = Some(r.read_u32_be()?);
    }
    if flags & PATCH_MASKS != 0 {
        let count = r.read_u8()? as usize;
        if count > MAX_FIELD_MASKS {
            return Err(ProtocolError::LimitExceeded("field masks"));
        }
        let mut masks = Vec::with_capacity(count);
        for _ in 0..count {
            masks.push(r.read_str_u8(MAX_MASK_LEN, "field mask")?);
        }
        patch.data_field_masks = Some(masks);
    }
    Ok(patch)
}

fn read_bool(r: &mut Reader<'_>, what: &'static str) -> Result<bool, ProtocolError> {
    match r.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProtocolError::InvalidField(what)),
    }
}
