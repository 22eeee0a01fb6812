//! The message envelope framed by the transport.
//!
//! One envelope per frame:
//!
//! ```text
//! [0]      version  (PROTOCOL_VERSION)
//! [1]      broadcast (BroadcastType as u8)
//! [2..4]   reserved = 0
//! [4..8]   channel_id (u32 BE)
//! [8..12]  stub_id (u32 BE)
//! [12..16] msg_type (u32 BE)
//! [16..]   payload (body encoding selected by msg_type)
//! ```
//!
//! NOTE: This module encodes/decodes **one envelope per buffer**. The TCP
//! layer provides its own length-prefix framing around these functions.

use router_core::{BroadcastType, ChannelId};

use crate::reader::Reader;
use crate::wire_types::{MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
use crate::ProtocolError;

/// A framed message: addressing plus an opaque body.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePack {
    pub channel_id: ChannelId,
    pub broadcast: BroadcastType,
    /// Client-chosen correlation id, echoed on the reply. `0` means
    /// "no reply expected".
    pub stub_id: u32,
    pub msg_type: u32,
    pub payload: Vec<u8>,
}

impl MessagePack {
    /// An envelope with no broadcast and no stub.
    pub fn plain(channel_id: ChannelId, msg_type: u32, payload: Vec<u8>) -> MessagePack {
        MessagePack {
            channel_id,
            broadcast: BroadcastType::NoBroadcast,
            stub_id: 0,
            msg_type,
            payload,
        }
    }
}

/// Encode a single envelope into `out`.
pub fn encode_pack(pack: &MessagePack, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if pack.payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::LimitExceeded("payload"));
    }
    out.push(PROTOCOL_VERSION);
    out.push(pack.broadcast.as_u8());
    out.extend_from_slice(&[0, 0]); // reserved
    out.extend_from_slice(&pack.channel_id.0.to_be_bytes());
    out.extend_from_slice(&pack.stub_id.to_be_bytes());
    out.extend_from_slice(&pack.msg_type.to_be_bytes());
    out.extend_from_slice(&pack.payload);
    Ok(())
}

/// Decode a single envelope from a buffer containing exactly one frame.
pub fn decode_pack(buf: &[u8]) -> Result<MessagePack, ProtocolError> {
    let mut r = Reader::new(buf);

    let version = r.read_u8()?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(version));
    }

    let broadcast_raw = r.read_u8()?;
    let broadcast =
        BroadcastType::from_u8(broadcast_raw).ok_or(ProtocolError::InvalidField("broadcast"))?;
    r.take(2)?; // reserved

    let channel_id = ChannelId(r.read_u32_be()?);
    let stub_id = r.read_u32_be()?;
    let msg_type = r.read_u32_be()?;

    let payload = r.take(r.remaining())?.to_vec();
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::LimitExceeded("payload"));
    }

    Ok(MessagePack {
        channel_id,
        broadcast,
        stub_id,
        msg_type,
        payload,
    })
}
