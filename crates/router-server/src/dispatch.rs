//! Routes decoded envelopes to channel inboxes.
//!
//! Dispatch itself never touches channel state: it looks up the target,
//! binds the handler for the message type, and enqueues the pair on the
//! channel's bounded inbox. Everything stateful happens on the channel's
//! own loop.

use std::sync::Arc;

use tracing::warn;

use router_core::{ControlMessage, ErrorCode, MessageContext, ServerError};
use router_protocol::{decode_body, encode_body, msg_type_of, MessagePack, USER_SPACE_START, WireMsgType};

use crate::handlers;
use crate::registry::{ConnectionHandle, Router};
use crate::types::{ChannelMessage, MessageHandlerFn};

/// What to do when the target inbox is full.
///
/// `InboxFull` is a retriable condition; the policy belongs to the caller
/// of dispatch. Connection read loops block (pausing the peer's socket),
/// while tests and embedders may prefer to observe the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxPolicy {
    /// Await inbox capacity, applying backpressure to the producer.
    Block,
    /// Surface `ServerError::InboxFull` immediately.
    Fail,
}

/// The handler bound to a control message type, if the router handles it.
pub fn handler_for(msg_type: u32) -> Option<MessageHandlerFn> {
    if msg_type >= USER_SPACE_START {
        return Some(handlers::handle_user_space);
    }
    match WireMsgType::from_u32(msg_type)? {
        WireMsgType::ListChannel => Some(handlers::handle_list_channel),
        WireMsgType::CreateChannel => Some(handlers::handle_create_channel),
        WireMsgType::RemoveChannel => Some(handlers::handle_remove_channel),
        WireMsgType::SubToChannel => Some(handlers::handle_sub_to_channel),
        WireMsgType::UnsubFromChannel => Some(handlers::handle_unsub_from_channel),
        WireMsgType::ChannelDataUpdate => Some(handlers::handle_channel_data_update),
        // Replies and errors have no server-side handler.
        WireMsgType::ListChannelResult | WireMsgType::ServerError => None,
    }
}

/// Route one inbound envelope from `conn`.
///
/// Gate and decode failures are answered directly (when a stub was
/// given) and reported as `Ok`: they are the peer's problem, not the
/// caller's. The only `Err` is `InboxFull` under `InboxPolicy::Fail`.
pub async fn dispatch(
    router: &Arc<Router>,
    conn: &Arc<ConnectionHandle>,
    pack: MessagePack,
    policy: InboxPolicy,
) -> Result<(), ServerError> {
    if !conn.is_allowed(pack.msg_type) {
        warn!(
            conn_id = conn.id().0,
            msg_type = pack.msg_type,
            "connection sent a message type its phase does not allow"
        );
        reply_error(
            conn,
            &pack,
            ErrorCode::Unauthorized,
            "message type not allowed for this connection",
        );
        return Ok(());
    }

    let msg = match decode_body(pack.msg_type, &pack.payload) {
        Ok(msg) => msg,
        Err(err) => {
            warn!(conn_id = conn.id().0, msg_type = pack.msg_type, %err, "undecodable payload");
            reply_error(conn, &pack, ErrorCode::InvalidMessage, &err.to_string());
            return Ok(());
        }
    };

    let Some(handle) = router.get_channel(pack.channel_id) else {
        reply_error(
            conn,
            &pack,
            ErrorCode::ChannelNotFound,
            &format!("channel {} not found", pack.channel_id),
        );
        return Ok(());
    };
    if handle.is_removing() {
        // The channel is on its way out; drop silently.
        return Ok(());
    }

    let Some(handler) = handler_for(pack.msg_type) else {
        warn!(
            conn_id = conn.id().0,
            msg_type = pack.msg_type,
            "no handler for message type; dropping"
        );
        return Ok(());
    };

    let message = ChannelMessage {
        ctx: MessageContext {
            channel_id: pack.channel_id,
            msg_type: pack.msg_type,
            broadcast: pack.broadcast,
            stub_id: pack.stub_id,
            conn_id: conn.id(),
            msg,
        },
        handler,
    };

    match policy {
        InboxPolicy::Fail => router.try_enqueue(&handle, message),
        InboxPolicy::Block => {
            // Blocking send: the producer waits for capacity. A closed
            // inbox means the channel is being removed; drop silently.
            let _ = handle.inbox().send(message).await;
            Ok(())
        }
    }
}

/// Answer a pre-handler failure on the connection itself.
fn reply_error(conn: &ConnectionHandle, pack: &MessagePack, code: ErrorCode, message: &str) {
    if pack.stub_id == 0 {
        return;
    }
    let msg = ControlMessage::error(code, message);
    let mut payload = Vec::new();
    if encode_body(&msg, &mut payload).is_err() {
        return;
    }
    let mut reply = MessagePack::plain(pack.channel_id, msg_type_of(&msg), payload);
    reply.stub_id = pack.stub_id;
    conn.send(reply);
}
