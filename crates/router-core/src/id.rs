//! Channel and connection identifiers.

use std::fmt;

/// Identifier of a channel.
///
/// `0` is reserved for the GLOBAL channel, which is allocated at startup
/// and never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// The singleton GLOBAL channel.
    pub const GLOBAL: ChannelId = ChannelId(0);

    pub fn is_global(self) -> bool {
        self == ChannelId::GLOBAL
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a connected peer.
///
/// `0` is reserved as "no connection" so that owner slots can live in a
/// single atomic word on the server side. Real connections are allocated
/// ids starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    /// Sentinel meaning "no connection" / "self" depending on context.
    pub const NONE: ConnectionId = ConnectionId(0);

    pub fn is_none(self) -> bool {
        self == ConnectionId::NONE
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
