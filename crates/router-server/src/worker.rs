//! Per-channel worker: the cooperative loop driving one channel.
//!
//! Each iteration:
//! 1. Exit if the channel is being removed.
//! 2. Garbage-collect subscribers whose connections are gone.
//! 3. Drain the inbox, stopping early (with a warning) once handler time
//!    has eaten the whole tick.
//! 4. Run the fan-out pass and route its deliveries.
//! 5. Sleep out the remainder of the tick, parking on the inbox so an
//!    early message is picked up at the next boundary.
//!
//! No handler runs concurrently with another handler or with the fan-out
//! pass: the worker owns the `Channel` outright.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error, warn};

use router_core::{
    Channel, ChannelDataUpdateMessage, ChannelTime, ConnectionId, ControlMessage, FanOutDelivery,
    MessageContext, ServerError, UnsubFromChannelResultMessage,
};
use router_protocol::{encode_body, msg_type_of, MessagePack};

use crate::registry::{ChannelHandle, Router};
use crate::types::{ChannelMessage, InboxRx};

/// How long a manual-tick (tick_interval = 0) worker parks on its inbox
/// before re-checking the removing flag.
const MANUAL_TICK_PARK: Duration = Duration::from_secs(1);

/// State owned by one channel's loop.
pub struct ChannelWorker {
    pub router: Arc<Router>,
    pub handle: Arc<ChannelHandle>,
    pub channel: Channel,
    inbox: InboxRx,
    tick_interval: Duration,
    start_time: Instant,
    /// A message received while sleeping out the tick remainder; handled
    /// first on the next drain.
    pending: Option<ChannelMessage>,
}

impl ChannelWorker {
    pub fn new(
        router: Arc<Router>,
        handle: Arc<ChannelHandle>,
        channel: Channel,
        inbox: InboxRx,
        tick_interval: Duration,
        start_time: Instant,
    ) -> ChannelWorker {
        ChannelWorker {
            router,
            handle,
            channel,
            inbox,
            tick_interval,
            start_time,
            pending: None,
        }
    }

    /// Channel-relative time, taken once per tick for consistency across
    /// subscribers.
    pub fn channel_time(&self) -> ChannelTime {
        ChannelTime::since(self.start_time)
    }

    /// Assign ownership, mirroring it into the shared handle.
    pub fn set_owner(&mut self, owner: ConnectionId) {
        self.channel.set_owner(owner);
        self.handle.set_owner(owner);
        self.handle.set_state(self.channel.state());
    }

    /// Drop ownership, mirroring it into the shared handle.
    pub fn clear_owner(&mut self) {
        self.channel.clear_owner();
        self.handle.set_owner(ConnectionId::NONE);
        self.handle.set_state(self.channel.state());
    }

    /// Send a reply correlated to `ctx.stub_id`; no-op when no reply is
    /// expected.
    pub fn reply(&self, ctx: &MessageContext, msg: ControlMessage) {
        if ctx.stub_id == 0 {
            return;
        }
        self.send_to(ctx.conn_id, ctx.stub_id, msg);
    }

    /// Log a handler error and reply with an error envelope when a stub
    /// was provided.
    pub fn reply_error(&self, ctx: &MessageContext, err: ServerError) {
        warn!(
            channel_id = self.handle.id.0,
            conn_id = ctx.conn_id.0,
            msg_type = ctx.msg_type,
            %err,
            "handler rejected message"
        );
        if ctx.stub_id != 0 {
            self.send_to(
                ctx.conn_id,
                ctx.stub_id,
                ControlMessage::error(err.code(), err.to_string()),
            );
        }
    }

    /// Push an uncorrelated notification to a peer.
    pub fn notify(&self, conn_id: ConnectionId, msg: ControlMessage) {
        self.send_to(conn_id, 0, msg);
    }

    fn send_to(&self, conn_id: ConnectionId, stub_id: u32, msg: ControlMessage) {
        let Some(conn) = self.router.get_connection(conn_id) else {
            return;
        };
        let mut payload = Vec::new();
        if let Err(err) = encode_body(&msg, &mut payload) {
            error!(channel_id = self.handle.id.0, %err, "failed to encode outbound body");
            return;
        }
        let mut pack = MessagePack::plain(self.handle.id, msg_type_of(&msg), payload);
        pack.stub_id = stub_id;
        conn.send(pack);
    }

    /// Step 2: drop subscribers whose connection is gone or removing, and
    /// keep the owner reference live (invariant: a dead owner is cleared
    /// by the end of the tick). The owner is told about every pruned
    /// subscriber.
    fn gc_subscribers(&mut self) {
        if let Some(owner) = self.channel.owner() {
            let alive = self
                .router
                .get_connection(owner)
                .map_or(false, |c| !c.is_removing());
            if !alive {
                debug!(channel_id = self.handle.id.0, conn_id = owner.0, "owner connection lost");
                self.clear_owner();
            }
        }

        for conn_id in self.channel.subscriber_ids() {
            let alive = self
                .router
                .get_connection(conn_id)
                .map_or(false, |c| !c.is_removing());
            if alive {
                continue;
            }
            self.channel.unsubscribe(conn_id);
            debug!(
                channel_id = self.handle.id.0,
                conn_id = conn_id.0,
                "pruned subscriber with lost connection"
            );
            if let Some(owner) = self.channel.owner() {
                self.notify(
                    owner,
                    ControlMessage::UnsubFromChannelResult(UnsubFromChannelResultMessage {
                        conn_id,
                    }),
                );
            }
        }
    }

    /// Run one queued handler, shielding the loop from panics.
    fn handle_message(&mut self, cm: ChannelMessage) {
        let sender_alive = self
            .router
            .get_connection(cm.ctx.conn_id)
            .map_or(false, |c| !c.is_removing());
        if !sender_alive {
            warn!(
                channel_id = self.handle.id.0,
                conn_id = cm.ctx.conn_id.0,
                msg_type = cm.ctx.msg_type,
                "dropping message: sender connection is lost"
            );
            return;
        }

        let handler = cm.handler;
        let ctx = cm.ctx;
        let msg_type = ctx.msg_type;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(self, ctx))) {
            let what = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            error!(
                channel_id = self.handle.id.0,
                msg_type,
                panic = %what,
                "handler panicked; channel continues"
            );
        }
    }

    fn send_deliveries(&self, deliveries: Vec<FanOutDelivery>) {
        for delivery in deliveries {
            self.send_to(
                delivery.conn_id,
                0,
                ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
                    data: delivery.update,
                }),
            );
        }
    }
}

/// Run the channel loop until the channel is removed.
pub async fn run_channel_loop(mut worker: ChannelWorker) {
    let tick_interval = worker.tick_interval;

    loop {
        if worker.handle.is_removing() {
            break;
        }

        worker.gc_subscribers();

        let tick_start = Instant::now();
        let tick_count = worker.channel.begin_tick();
        worker.handle.record_tick(tick_count);

        // Drain the inbox; defer the remainder once handlers have spent
        // the whole tick.
        loop {
            let cm = match worker.pending.take() {
                Some(cm) => cm,
                None => match worker.inbox.try_recv() {
                    Ok(cm) => cm,
                    Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                    Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => return,
                },
            };
            worker.handle_message(cm);

            if !tick_interval.is_zero() && tick_start.elapsed() >= tick_interval {
                warn!(
                    channel_id = worker.handle.id.0,
                    elapsed_ms = tick_start.elapsed().as_millis() as u64,
                    remaining = worker.inbox.len(),
                    "spent too long handling messages, deferring the rest to the next tick"
                );
                break;
            }
        }

        let now = worker.channel_time();
        let deliveries = worker.channel.tick_data(now);
        worker.send_deliveries(deliveries);

        let tick_duration = tick_start.elapsed();
        debug!(
            channel_id = worker.handle.id.0,
            tick = tick_count,
            duration_us = tick_duration.as_micros() as u64,
            "channel tick"
        );

        if tick_interval.is_zero() {
            // Manual-tick mode: no auto cadence, each arriving message
            // triggers the next iteration. Park with a timeout so removal
            // is still noticed.
            match timeout(MANUAL_TICK_PARK, worker.inbox.recv()).await {
                Ok(Some(cm)) => worker.pending = Some(cm),
                Ok(None) => return,
                Err(_) => {}
            }
            continue;
        }

        let remaining = tick_interval.saturating_sub(tick_duration);
        if remaining.is_zero() {
            continue;
        }
        // Suspend on the inbox up to the tick boundary; an early arrival
        // is stashed and handled at the next drain.
        let parked_at = Instant::now();
        match timeout(remaining, worker.inbox.recv()).await {
            Ok(Some(cm)) => {
                worker.pending = Some(cm);
                let rest = remaining.saturating_sub(parked_at.elapsed());
                if !rest.is_zero() {
                    tokio::time::sleep(rest).await;
                }
            }
            Ok(None) => return,
            Err(_) => {}
        }
    }

    debug!(channel_id = worker.handle.id.0, "channel loop shutting down");
}
