//! The channel entity and its fan-out pass.
//!
//! A `Channel` is a pure state machine: the server's per-channel worker
//! feeds it subscription changes and data updates, and `tick_data`
//! returns the deliveries for the I/O layer to route. Nothing in here
//! touches a socket or a clock.

use std::time::Duration;

use indexmap::IndexMap;

use crate::channel_data::ChannelData;
use crate::channel_type::ChannelType;
use crate::id::{ChannelId, ConnectionId};
use crate::merge::MergeOptions;
use crate::record::Record;
use crate::state::ChannelState;
use crate::subscription::{ChannelSubscription, ChannelSubscriptionOptions, SubscriptionOptionsPatch};
use crate::time::ChannelTime;

/// One personalized update produced by a fan-out pass.
#[derive(Debug, Clone)]
pub struct FanOutDelivery {
    pub conn_id: ConnectionId,
    pub update: Record,
}

/// A named group of peers sharing a structured record.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    channel_type: ChannelType,
    state: ChannelState,
    /// Opaque short string, immutable after creation.
    metadata: String,
    owner: Option<ConnectionId>,
    /// Insertion-ordered so same-tick deliveries follow subscription order.
    subscribers: IndexMap<ConnectionId, ChannelSubscription>,
    /// Absent until the first create/update that carries a payload.
    data: Option<ChannelData>,
    tick_count: u64,
    enable_client_broadcast: bool,
    default_fan_out_interval: Duration,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        channel_type: ChannelType,
        metadata: String,
        owner: Option<ConnectionId>,
        default_fan_out_interval: Duration,
    ) -> Channel {
        let state = if owner.is_some() {
            ChannelState::Open
        } else {
            ChannelState::Init
        };
        Channel {
            id,
            channel_type,
            state,
            metadata,
            owner,
            subscribers: IndexMap::new(),
            data: None,
            tick_count: 0,
            enable_client_broadcast: false,
            default_fan_out_interval,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn owner(&self) -> Option<ConnectionId> {
        self.owner
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn enable_client_broadcast(&self) -> bool {
        self.enable_client_broadcast
    }

    pub fn set_enable_client_broadcast(&mut self, enabled: bool) {
        self.enable_client_broadcast = enabled;
    }

    /// `true` if `conn` may mutate lifecycle or membership of this channel.
    ///
    /// The GLOBAL owner has authority over everything; otherwise only the
    /// channel's own owner qualifies.
    pub fn has_authority(&self, conn: ConnectionId, global_owner: ConnectionId) -> bool {
        (!global_owner.is_none() && conn == global_owner) || self.owner == Some(conn)
    }

    /// Assign ownership; moves the channel to `Open`.
    pub fn set_owner(&mut self, conn: ConnectionId) {
        self.owner = Some(conn);
        self.state = ChannelState::Open;
    }

    /// Drop the owner. A channel that already carries data enters
    /// `Handover` (ownership expected to transfer); an empty one falls
    /// back to `Init`.
    ///
    /// The GLOBAL channel always falls back to `Init`: reclaiming a
    /// `Handover` channel is gated on the GLOBAL owner, so GLOBAL's own
    /// ownership must stay claimable without one.
    pub fn clear_owner(&mut self) {
        self.owner = None;
        self.state = if !self.id.is_global() && self.data.is_some() {
            ChannelState::Handover
        } else {
            ChannelState::Init
        };
    }

    // -------------------------------------------------------------------
    // Subscription table
    // -------------------------------------------------------------------

    /// Add or update a subscription. Returns `true` when the subscriber is
    /// new. Updating merges the options patch and keeps the delivery
    /// cursor, so a re-subscribe only ever sees the delta since its last
    /// delivery.
    pub fn subscribe(&mut self, conn_id: ConnectionId, patch: &SubscriptionOptionsPatch) -> bool {
        match self.subscribers.get_mut(&conn_id) {
            Some(sub) => {
                sub.update_options(patch);
                false
            }
            None => {
                let mut options =
                    ChannelSubscriptionOptions::with_defaults(self.default_fan_out_interval);
                options.apply_patch(patch);
                self.subscribers
                    .insert(conn_id, ChannelSubscription::new(options));
                true
            }
        }
    }

    /// Remove a subscription. Returns `true` when an entry was dropped.
    pub fn unsubscribe(&mut self, conn_id: ConnectionId) -> bool {
        self.subscribers.shift_remove(&conn_id).is_some()
    }

    pub fn is_subscribed(&self, conn_id: ConnectionId) -> bool {
        self.subscribers.contains_key(&conn_id)
    }

    pub fn subscription(&self, conn_id: ConnectionId) -> Option<&ChannelSubscription> {
        self.subscribers.get(&conn_id)
    }

    pub fn subscriber_ids(&self) -> Vec<ConnectionId> {
        self.subscribers.keys().copied().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // -------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------

    pub fn data(&self) -> Option<&ChannelData> {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> Option<&mut ChannelData> {
        self.data.as_mut()
    }

    /// Install channel data explicitly (initial payload on create).
    pub fn init_data(&mut self, msg: Record) {
        self.data = Some(ChannelData::new(
            msg,
            MergeOptions::for_channel_type(self.channel_type),
        ));
    }

    /// Get the data, creating it lazily from the channel type's schema on
    /// the first update that targets this channel.
    pub fn ensure_data(&mut self) -> &mut ChannelData {
        let channel_type = self.channel_type;
        self.data.get_or_insert_with(|| {
            ChannelData::new(
                Record::for_channel_type(channel_type),
                MergeOptions::for_channel_type(channel_type),
            )
        })
    }

    /// Count one loop iteration; returns the new total.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick_count += 1;
        self.tick_count
    }

    // -------------------------------------------------------------------
    // Fan-out
    // -------------------------------------------------------------------

    /// One fan-out pass at channel time `now`.
    ///
    /// For each subscriber in insertion order:
    /// - never delivered: emit the full snapshot through its mask and
    ///   start its cursor at `now`;
    /// - cadence elapsed: emit the coalesced delta of buffered updates
    ///   newer than its cursor, filtered through its mask; skip entirely
    ///   (cursor untouched) when the filtered delta is empty;
    /// - otherwise: skip.
    ///
    /// Afterwards the update buffer is pruned of entries no remaining
    /// cursor can reach.
    pub fn tick_data(&mut self, now: ChannelTime) -> Vec<FanOutDelivery> {
        let mut deliveries = Vec::new();
        let Some(data) = self.data.as_mut() else {
            return deliveries;
        };

        for (&conn_id, sub) in self.subscribers.iter_mut() {
            match sub.last_fan_out_time {
                None => {
                    let snapshot = sub.mask.filter_record(data.msg());
                    sub.last_fan_out_time = Some(now);
                    deliveries.push(FanOutDelivery {
                        conn_id,
                        update: snapshot,
                    });
                }
                Some(last) => {
                    if now.duration_since(last) < sub.options.fan_out_interval {
                        continue;
                    }
                    let Some(delta) = data.coalesce_since(last) else {
                        continue;
                    };
                    let filtered = sub.mask.filter_record(&delta);
                    if filtered.is_empty() {
                        continue;
                    }
                    sub.last_fan_out_time = Some(now);
                    deliveries.push(FanOutDelivery {
                        conn_id,
                        update: filtered,
                    });
                }
            }
        }

        match self
            .subscribers
            .values()
            .filter_map(|s| s.last_fan_out_time)
            .min()
        {
            Some(min_cursor) => data.prune_through(min_cursor),
            None => data.prune_all(),
        }

        deliveries
    }
}
