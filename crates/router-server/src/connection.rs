//! Per-connection TCP handler.
//!
//! Responsibilities:
//! - Read length-prefixed binary frames from the socket.
//! - Decode them into `MessagePack` envelopes via `router-protocol`.
//! - Hand each envelope to `dispatch` (blocking on full inboxes, which
//!   backpressures this peer's socket).
//! - Concurrently drain this peer's outbound queue back onto the wire.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use router_protocol::wire_types::MAX_PAYLOAD_LEN;
use router_protocol::{decode_pack, encode_pack, MessagePack};

use crate::dispatch::{dispatch, InboxPolicy};
use crate::registry::{ConnectionHandle, Router};
use crate::types::OutboundRx;

/// Envelope header plus the payload cap.
const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + 64;

/// Run the I/O loop for a single connection until it disconnects or
/// misbehaves.
pub async fn run_connection(
    router: Arc<Router>,
    conn: Arc<ConnectionHandle>,
    stream: TcpStream,
    mut out_rx: OutboundRx,
) -> Result<()> {
    let peer_addr = stream.peer_addr().ok();
    stream.set_nodelay(true).ok();
    let (mut read_half, mut write_half) = stream.into_split();

    // Writer task: consume outbound envelopes and write frames.
    let conn_id = conn.id();
    let writer_handle = tokio::spawn(async move {
        while let Some(pack) = out_rx.recv().await {
            if let Err(err) = write_pack(&mut write_half, &pack).await {
                debug!(conn_id = conn_id.0, %err, "write failed; closing writer");
                break;
            }
        }
    });

    // Reader loop: read frames, decode, dispatch.
    loop {
        let mut len_buf = [0u8; 4];
        if let Err(err) = read_half.read_exact(&mut len_buf).await {
            // EOF or error means disconnect.
            debug!(conn_id = conn.id().0, ?peer_addr, %err, "connection closed");
            break;
        }
        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 {
            continue;
        }
        if frame_len > MAX_FRAME_LEN {
            warn!(
                conn_id = conn.id().0,
                frame_len, "oversized frame; dropping connection"
            );
            break;
        }

        let mut frame = vec![0u8; frame_len];
        if let Err(err) = read_half.read_exact(&mut frame).await {
            debug!(conn_id = conn.id().0, ?peer_addr, %err, "read failed mid-frame");
            break;
        }

        match decode_pack(&frame) {
            Ok(pack) => {
                // Block policy: a full inbox pauses this peer's reads.
                if let Err(err) = dispatch(&router, &conn, pack, InboxPolicy::Block).await {
                    warn!(conn_id = conn.id().0, %err, "dispatch failed");
                }
            }
            Err(err) => {
                warn!(conn_id = conn.id().0, %err, "protocol error; dropping connection");
                break;
            }
        }
    }

    // Unpublish; channel workers prune this peer's subscriptions on their
    // next tick.
    router.remove_connection(conn.id());
    writer_handle.abort();

    Ok(())
}

/// Write one length-prefixed envelope.
pub async fn write_pack(stream: &mut OwnedWriteHalf, pack: &MessagePack) -> Result<()> {
    let mut payload = Vec::with_capacity(128);
    encode_pack(pack, &mut payload)?;

    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}
