//! Channel and connection registries.
//!
//! A single [`Router`] owns both directories. It is passed by handle to
//! every worker and connection task; tests construct a fresh instance
//! instead of relying on process-global state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::info;

use router_core::{
    Channel, ChannelId, ChannelListing, ChannelState, ChannelType, ConnectionId, Record,
    ServerError, SubscriptionOptionsPatch,
};
use router_protocol::{MessagePack, USER_SPACE_START, WireMsgType};

use crate::config::ChannelSettings;
use crate::types::{ChannelMessage, ConnectionType, InboxTx, OutboundTx};
use crate::worker::{self, ChannelWorker};

/// Shared, lock-free view of one live channel.
///
/// Everything behind the handle is either immutable or a single atomic
/// word, so dispatch and cross-channel authority checks never contend
/// with the channel's own loop.
pub struct ChannelHandle {
    pub id: ChannelId,
    pub channel_type: ChannelType,
    pub metadata: String,
    owner: AtomicU32,
    state: AtomicU8,
    removing: AtomicBool,
    tick_count: AtomicU64,
    inbox_tx: InboxTx,
}

impl ChannelHandle {
    pub fn owner(&self) -> ConnectionId {
        ConnectionId(self.owner.load(Ordering::Acquire))
    }

    pub(crate) fn set_owner(&self, owner: ConnectionId) {
        self.owner.store(owner.0, Ordering::Release);
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ChannelState::Init)
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_removing(&self) -> bool {
        self.removing.load(Ordering::Acquire)
    }

    fn mark_removing(&self) {
        self.removing.store(true, Ordering::Release);
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_tick(&self, count: u64) {
        self.tick_count.store(count, Ordering::Relaxed);
    }

    pub(crate) fn inbox(&self) -> &InboxTx {
        &self.inbox_tx
    }
}

/// One connected peer as seen by the router.
pub struct ConnectionHandle {
    id: ConnectionId,
    conn_type: ConnectionType,
    outbound: OutboundTx,
    removing: AtomicBool,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn conn_type(&self) -> ConnectionType {
        self.conn_type
    }

    pub fn is_removing(&self) -> bool {
        self.removing.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removing(&self) {
        self.removing.store(true, Ordering::Release);
    }

    /// Queue a frame to this peer. Safe from any task; a closed peer
    /// silently swallows the frame.
    pub fn send(&self, pack: MessagePack) {
        let _ = self.outbound.send(pack);
    }

    /// The connection FSM's gate: which message types this peer may send
    /// in its current phase.
    pub fn is_allowed(&self, msg_type: u32) -> bool {
        if msg_type >= USER_SPACE_START {
            return true;
        }
        match self.conn_type {
            ConnectionType::Server => true,
            ConnectionType::Client => matches!(
                WireMsgType::from_u32(msg_type),
                Some(
                    WireMsgType::ListChannel
                        | WireMsgType::SubToChannel
                        | WireMsgType::UnsubFromChannel
                        | WireMsgType::ChannelDataUpdate
                )
            ),
        }
    }
}

/// Everything needed to create a channel.
pub struct ChannelSpec {
    pub channel_type: ChannelType,
    pub metadata: String,
    pub owner: Option<ConnectionId>,
    pub owner_sub_options: Option<SubscriptionOptionsPatch>,
    pub data: Option<Record>,
    pub enable_client_broadcast: bool,
}

impl ChannelSpec {
    pub fn new(channel_type: ChannelType) -> ChannelSpec {
        ChannelSpec {
            channel_type,
            metadata: String::new(),
            owner: None,
            owner_sub_options: None,
            data: None,
            enable_client_broadcast: false,
        }
    }
}

/// Process-wide directory of live channels and connections.
pub struct Router {
    channels: RwLock<HashMap<ChannelId, Arc<ChannelHandle>>>,
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    next_channel_id: AtomicU32,
    next_connection_id: AtomicU32,
    settings: ChannelSettings,
}

impl Router {
    /// Create a router and its GLOBAL channel. Must run inside a tokio
    /// runtime: every channel gets a worker task.
    pub fn new(settings: ChannelSettings) -> Arc<Router> {
        let router = Arc::new(Router {
            channels: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            next_channel_id: AtomicU32::new(0),
            next_connection_id: AtomicU32::new(1),
            settings,
        });
        router
            .clone()
            .create_channel(ChannelSpec::new(ChannelType::Global))
            .expect("creating the GLOBAL channel on a fresh router cannot fail");
        router
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// The owner of the GLOBAL channel: the registry's super-user.
    pub fn global_owner(&self) -> ConnectionId {
        self.get_channel(ChannelId::GLOBAL)
            .map(|h| h.owner())
            .unwrap_or(ConnectionId::NONE)
    }

    pub fn get_channel(&self, id: ChannelId) -> Option<Arc<ChannelHandle>> {
        self.channels
            .read()
            .expect("channel registry lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn channel_count(&self) -> usize {
        self.channels
            .read()
            .expect("channel registry lock poisoned")
            .len()
    }

    /// Create a channel, publish it, and start its worker.
    pub fn create_channel(
        self: Arc<Self>,
        spec: ChannelSpec,
    ) -> Result<Arc<ChannelHandle>, ServerError> {
        if spec.channel_type == ChannelType::Global
            && self.get_channel(ChannelId::GLOBAL).is_some()
        {
            return Err(ServerError::ChannelExists);
        }

        let id = ChannelId(self.next_channel_id.fetch_add(1, Ordering::Relaxed));
        let type_settings = self.settings.get(spec.channel_type).clone();

        let mut channel = Channel::new(
            id,
            spec.channel_type,
            spec.metadata.clone(),
            spec.owner,
            type_settings.default_fan_out_interval(),
        );
        channel.set_enable_client_broadcast(spec.enable_client_broadcast);
        if let Some(data) = spec.data {
            channel.init_data(data);
        }
        if let Some(owner) = spec.owner {
            let patch = spec.owner_sub_options.unwrap_or_default();
            channel.subscribe(owner, &patch);
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(type_settings.inbox_capacity);
        let handle = Arc::new(ChannelHandle {
            id,
            channel_type: spec.channel_type,
            metadata: spec.metadata,
            owner: AtomicU32::new(spec.owner.map_or(0, |c| c.0)),
            state: AtomicU8::new(channel.state().as_u8()),
            removing: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            inbox_tx,
        });

        self.channels
            .write()
            .expect("channel registry lock poisoned")
            .insert(id, handle.clone());

        let worker = ChannelWorker::new(
            self.clone(),
            handle.clone(),
            channel,
            inbox_rx,
            type_settings.tick_interval(),
            Instant::now(),
        );
        tokio::spawn(worker::run_channel_loop(worker));

        info!(
            channel_id = id.0,
            channel_type = %handle.channel_type,
            "channel created"
        );
        Ok(handle)
    }

    /// Remove a channel: mark it removing and unpublish it. Its worker
    /// exits on the next loop iteration; pending queued messages are
    /// discarded.
    pub fn remove_channel(&self, id: ChannelId) -> Result<(), ServerError> {
        if id.is_global() {
            return Err(ServerError::InvalidMessage(
                "the GLOBAL channel cannot be removed".into(),
            ));
        }
        let handle = {
            let mut channels = self.channels.write().expect("channel registry lock poisoned");
            channels.remove(&id).ok_or(ServerError::ChannelNotFound(id))?
        };
        handle.mark_removing();
        info!(channel_id = id.0, channel_type = %handle.channel_type, "channel removed");
        Ok(())
    }

    /// Listings of every live channel, for LIST_CHANNEL.
    pub fn list_channels(&self) -> Vec<ChannelListing> {
        let channels = self.channels.read().expect("channel registry lock poisoned");
        let mut listings: Vec<ChannelListing> = channels
            .values()
            .filter(|h| !h.is_removing())
            .map(|h| ChannelListing {
                channel_id: h.id,
                channel_type: h.channel_type,
                metadata: h.metadata.clone(),
            })
            .collect();
        listings.sort_by_key(|l| l.channel_id);
        listings
    }

    // -------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------

    /// Register a peer and allocate its id.
    pub fn add_connection(
        &self,
        conn_type: ConnectionType,
        outbound: OutboundTx,
    ) -> Arc<ConnectionHandle> {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(ConnectionHandle {
            id,
            conn_type,
            outbound,
            removing: AtomicBool::new(false),
        });
        self.connections
            .write()
            .expect("connection registry lock poisoned")
            .insert(id, handle.clone());
        handle
    }

    /// Mark a peer removing and unpublish it. Channel workers prune its
    /// subscriptions on their next tick.
    pub fn remove_connection(&self, id: ConnectionId) {
        let handle = {
            let mut connections = self
                .connections
                .write()
                .expect("connection registry lock poisoned");
            connections.remove(&id)
        };
        if let Some(handle) = handle {
            handle.mark_removing();
            info!(conn_id = id.0, "connection removed");
        }
    }

    pub fn get_connection(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .expect("connection registry lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .expect("connection registry lock poisoned")
            .len()
    }

    /// Enqueue a handler invocation on a channel's inbox without
    /// blocking. Fails fast with `InboxFull`; callers pick their own
    /// backpressure policy (see `dispatch`).
    pub(crate) fn try_enqueue(
        &self,
        handle: &ChannelHandle,
        message: ChannelMessage,
    ) -> Result<(), ServerError> {
        use tokio::sync::mpsc::error::TrySendError;
        match handle.inbox().try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ServerError::InboxFull(handle.id)),
            // Worker gone: the channel is being torn down, drop silently.
            Err(TrySendError::Closed(_)) => Ok(()),
        }
    }
}
