//! Channel lifecycle state.

/// Lifecycle state of a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Created without an owner; a server peer may claim ownership by
    /// subscribing itself.
    Init,
    /// Owned and accepting mutations.
    Open,
    /// Ownership in transition: the channel still receives messages but
    /// data mutations from non-authority peers are rejected.
    Handover,
}

impl ChannelState {
    pub fn as_u8(self) -> u8 {
        match self {
            ChannelState::Init => 0,
            ChannelState::Open => 1,
            ChannelState::Handover => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChannelState::Init),
            1 => Some(ChannelState::Open),
            2 => Some(ChannelState::Handover),
            _ => None,
        }
    }
}
