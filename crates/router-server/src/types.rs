//! Shared types for the router TCP server.
//!
//! This module defines:
//! - `ConnectionType`: which listener a peer came in through
//! - channel aliases between connection tasks and channel workers
//! - `ChannelMessage`: one queued handler invocation

use router_core::MessageContext;
use router_protocol::MessagePack;
use tokio::sync::mpsc;

use crate::worker::ChannelWorker;

/// Which side of the deployment a peer belongs to.
///
/// The connection state machine proper is an external collaborator; what
/// the router needs from it is the `is_allowed` predicate, and that is
/// keyed on this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Upstream authoritative peer (game server). May create, remove, and
    /// administer channels.
    Server,
    /// Downstream subscriber peer. May list, subscribe, update data, and
    /// send user-space messages.
    Client,
}

/// A handler bound to a decoded message, queued on a channel's inbox.
pub struct ChannelMessage {
    pub ctx: MessageContext,
    pub handler: MessageHandlerFn,
}

/// Handlers run on the channel's own worker; they get exclusive access to
/// the channel state for the duration of the call.
pub type MessageHandlerFn = fn(&mut ChannelWorker, MessageContext);

/// Bounded inbox feeding one channel worker.
pub type InboxTx = mpsc::Sender<ChannelMessage>;
pub type InboxRx = mpsc::Receiver<ChannelMessage>;

/// Outbound frames to one connected peer.
pub type OutboundTx = mpsc::UnboundedSender<MessagePack>;
pub type OutboundRx = mpsc::UnboundedReceiver<MessagePack>;
