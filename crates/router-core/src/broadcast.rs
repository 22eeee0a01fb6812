//! Broadcast modes carried in the message envelope.

/// How a message addressed to a channel is propagated to its subscribers.
///
/// Broadcasting is performed by the handler running on the channel's own
/// loop, never by dispatch, so it inherits per-channel ordering.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BroadcastType {
    /// Deliver to the channel (its owner) only.
    NoBroadcast = 0,
    /// Deliver to every subscriber.
    All = 1,
    /// Deliver to every subscriber except the sender.
    AllButSender = 2,
    /// Deliver to every subscriber except the channel owner.
    AllButOwner = 3,
    /// Deliver to a single named connection.
    SingleConnection = 4,
}

impl BroadcastType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(BroadcastType::NoBroadcast),
            1 => Some(BroadcastType::All),
            2 => Some(BroadcastType::AllButSender),
            3 => Some(BroadcastType::AllButOwner),
            4 => Some(BroadcastType::SingleConnection),
            _ => None,
        }
    }
}
