//! Message handlers, each running on the target channel's own loop.
//!
//! Authority model: the GLOBAL owner may do anything; a channel's owner
//! may administer that channel. Removing a channel and (un)subscribing
//! *other* connections require authority; updating data requires
//! authority or a subscription with `can_update_data`.

use tracing::{debug, warn};

use router_core::{
    BroadcastType, ChannelState, ChannelType, ControlMessage, CreateChannelResultMessage,
    ConnectionId, MessageContext, RemoveChannelResultMessage, ServerError,
    ListChannelResultMessage, SubToChannelResultMessage, UnsubFromChannelResultMessage,
};
use router_protocol::MessagePack;

use crate::registry::ChannelSpec;
use crate::types::ConnectionType;
use crate::worker::ChannelWorker;

/// CREATE_CHANNEL: the sender becomes owner of the new channel and is
/// auto-subscribed with the supplied options.
pub fn handle_create_channel(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::CreateChannel(msg) = ctx.msg.clone() else {
        return;
    };

    if msg.channel_type == ChannelType::Global {
        worker.reply_error(&ctx, ServerError::ChannelExists);
        return;
    }

    let spec = ChannelSpec {
        channel_type: msg.channel_type,
        metadata: msg.metadata,
        owner: Some(ctx.conn_id),
        owner_sub_options: msg.sub_options,
        data: msg.data,
        enable_client_broadcast: msg.enable_client_broadcast,
    };
    match worker.router.clone().create_channel(spec) {
        Ok(handle) => {
            worker.reply(
                &ctx,
                ControlMessage::CreateChannelResult(CreateChannelResultMessage {
                    channel_id: handle.id,
                }),
            );
        }
        Err(err) => worker.reply_error(&ctx, err),
    }
}

/// REMOVE_CHANNEL: authority over the target required. The body names the
/// victim; the handler usually runs on the GLOBAL loop.
pub fn handle_remove_channel(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::RemoveChannel(msg) = &ctx.msg else {
        return;
    };
    let target_id = msg.channel_id;

    let Some(target) = worker.router.get_channel(target_id) else {
        worker.reply_error(&ctx, ServerError::ChannelNotFound(target_id));
        return;
    };

    let global_owner = worker.router.global_owner();
    let authorized = (!global_owner.is_none() && ctx.conn_id == global_owner)
        || ctx.conn_id == target.owner();
    if !authorized {
        worker.reply_error(&ctx, ServerError::Unauthorized(ctx.conn_id));
        return;
    }

    match worker.router.remove_channel(target_id) {
        Ok(()) => worker.reply(
            &ctx,
            ControlMessage::RemoveChannelResult(RemoveChannelResultMessage {
                channel_id: target_id,
            }),
        ),
        Err(err) => worker.reply_error(&ctx, err),
    }
}

/// LIST_CHANNEL: filter the registry by type and metadata prefix.
pub fn handle_list_channel(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::ListChannel(msg) = &ctx.msg else {
        return;
    };

    let channels = worker
        .router
        .list_channels()
        .into_iter()
        .filter(|l| msg.type_filter.map_or(true, |t| l.channel_type == t))
        .filter(|l| l.metadata.starts_with(&msg.metadata_prefix))
        .collect();

    worker.reply(
        &ctx,
        ControlMessage::ListChannelResult(ListChannelResultMessage { channels }),
    );
}

/// SUB_TO_CHANNEL: subscribe the named connection (`0` = the sender).
///
/// Subscribing someone else requires authority. A server peer
/// self-subscribing to an ownerless channel claims ownership: unowned
/// `Init` channels are up for grabs, `Handover` ones only for the GLOBAL
/// owner.
pub fn handle_sub_to_channel(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::SubToChannel(msg) = &ctx.msg else {
        return;
    };
    let target = if msg.conn_id.is_none() {
        ctx.conn_id
    } else {
        msg.conn_id
    };

    let global_owner = worker.router.global_owner();
    if target != ctx.conn_id && !worker.channel.has_authority(ctx.conn_id, global_owner) {
        worker.reply_error(&ctx, ServerError::Unauthorized(ctx.conn_id));
        return;
    }

    let Some(target_conn) = worker.router.get_connection(target) else {
        worker.reply_error(&ctx, ServerError::ConnectionGone(target));
        return;
    };
    if target_conn.is_removing() {
        worker.reply_error(&ctx, ServerError::ConnectionGone(target));
        return;
    }

    let newly_added = worker.channel.subscribe(target, &msg.sub_options);
    debug!(
        channel_id = worker.handle.id.0,
        conn_id = target.0,
        newly_added,
        "subscription accepted"
    );

    if worker.channel.owner().is_none()
        && target == ctx.conn_id
        && target_conn.conn_type() == ConnectionType::Server
    {
        let claims = match worker.channel.state() {
            ChannelState::Init => true,
            ChannelState::Handover => !global_owner.is_none() && ctx.conn_id == global_owner,
            ChannelState::Open => false,
        };
        if claims {
            worker.set_owner(target);
            debug!(
                channel_id = worker.handle.id.0,
                conn_id = target.0,
                "ownership claimed"
            );
        }
    }

    let result = ControlMessage::SubToChannelResult(SubToChannelResultMessage { conn_id: target });
    worker.reply(&ctx, result.clone());
    if target != ctx.conn_id {
        worker.notify(target, result.clone());
    }
    if let Some(owner) = worker.channel.owner() {
        if owner != ctx.conn_id && owner != target {
            worker.notify(owner, result);
        }
    }
}

/// UNSUB_FROM_CHANNEL: unsubscribe the named connection (`0` = the
/// sender). Unsubscribing someone else requires authority; an owner
/// unsubscribing itself gives ownership up.
pub fn handle_unsub_from_channel(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::UnsubFromChannel(msg) = &ctx.msg else {
        return;
    };
    let target = if msg.conn_id.is_none() {
        ctx.conn_id
    } else {
        msg.conn_id
    };

    let global_owner = worker.router.global_owner();
    if target != ctx.conn_id && !worker.channel.has_authority(ctx.conn_id, global_owner) {
        worker.reply_error(&ctx, ServerError::Unauthorized(ctx.conn_id));
        return;
    }

    if !worker.channel.unsubscribe(target) {
        worker.reply_error(
            &ctx,
            ServerError::InvalidMessage(format!("connection {target} is not subscribed")),
        );
        return;
    }
    if worker.channel.owner() == Some(target) {
        worker.clear_owner();
    }

    let result =
        ControlMessage::UnsubFromChannelResult(UnsubFromChannelResultMessage { conn_id: target });
    worker.reply(&ctx, result.clone());
    if target != ctx.conn_id {
        worker.notify(target, result.clone());
    }
    if let Some(owner) = worker.channel.owner() {
        if owner != ctx.conn_id && owner != target {
            worker.notify(owner, result);
        }
    }
}

/// CHANNEL_DATA_UPDATE: apply a partial record to the channel's data.
///
/// Requires authority or `can_update_data`; while the channel is in
/// `Handover`, only authority passes.
pub fn handle_channel_data_update(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::ChannelDataUpdate(msg) = ctx.msg.clone() else {
        return;
    };

    let global_owner = worker.router.global_owner();
    let authority = worker.channel.has_authority(ctx.conn_id, global_owner);
    let can_update = authority
        || worker
            .channel
            .subscription(ctx.conn_id)
            .map_or(false, |s| s.options.can_update_data);

    if !can_update || (worker.channel.state() == ChannelState::Handover && !authority) {
        worker.reply_error(&ctx, ServerError::Unauthorized(ctx.conn_id));
        return;
    }

    let now = worker.channel_time();
    worker.channel.ensure_data().on_update(msg.data, now);
}

/// User-space messages (`msg_type >= USER_SPACE_START`): forward the
/// opaque payload per the envelope's broadcast mode. Runs on the channel
/// loop, so forwarded messages inherit per-channel ordering.
pub fn handle_user_space(worker: &mut ChannelWorker, ctx: MessageContext) {
    let ControlMessage::UserSpace(msg) = &ctx.msg else {
        return;
    };

    let sender_is_client = worker
        .router
        .get_connection(ctx.conn_id)
        .map_or(true, |c| c.conn_type() == ConnectionType::Client);
    if sender_is_client
        && ctx.broadcast != BroadcastType::NoBroadcast
        && !worker.channel.enable_client_broadcast()
    {
        worker.reply_error(&ctx, ServerError::Unauthorized(ctx.conn_id));
        return;
    }

    let forward = |conn_id: ConnectionId, stub_id: u32| {
        if let Some(conn) = worker.router.get_connection(conn_id) {
            let mut pack =
                MessagePack::plain(worker.handle.id, msg.msg_type, msg.payload.clone());
            pack.stub_id = stub_id;
            conn.send(pack);
        }
    };

    match ctx.broadcast {
        BroadcastType::NoBroadcast => {
            // Direct to the channel: hand the payload to its owner.
            match worker.channel.owner() {
                Some(owner) => forward(owner, ctx.stub_id),
                None => warn!(
                    channel_id = worker.handle.id.0,
                    msg_type = ctx.msg_type,
                    "dropping user-space message: channel has no owner"
                ),
            }
        }
        BroadcastType::All | BroadcastType::AllButSender | BroadcastType::AllButOwner => {
            let owner = worker.channel.owner();
            for conn_id in worker.channel.subscriber_ids() {
                if ctx.broadcast == BroadcastType::AllButSender && conn_id == ctx.conn_id {
                    continue;
                }
                if ctx.broadcast == BroadcastType::AllButOwner && Some(conn_id) == owner {
                    continue;
                }
                forward(conn_id, 0);
            }
        }
        BroadcastType::SingleConnection => {
            // The envelope has no dedicated target field; the target
            // connection id travels in the stub.
            let target = ConnectionId(ctx.stub_id);
            if worker.router.get_connection(target).is_none() {
                worker.reply_error(&ctx, ServerError::ConnectionGone(target));
                return;
            }
            forward(target, 0);
        }
    }
}
