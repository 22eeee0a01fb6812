//! Channel type tag.

/// Channel type.
///
/// The type determines the record schema of the channel's data and the
/// default tick / fan-out intervals (see the server's channel settings).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// The singleton registry-wide channel at id 0.
    Global,
    /// A game sub-world / room.
    SubWorld,
    /// Test channel with a trivial `{text, num}` schema.
    Test,
}

impl ChannelType {
    pub fn as_u8(self) -> u8 {
        match self {
            ChannelType::Global => 0,
            ChannelType::SubWorld => 1,
            ChannelType::Test => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChannelType::Global),
            1 => Some(ChannelType::SubWorld),
            2 => Some(ChannelType::Test),
            _ => None,
        }
    }

    /// Canonical upper-case name, as used in channel settings files.
    pub fn name(self) -> &'static str {
        match self {
            ChannelType::Global => "GLOBAL",
            ChannelType::SubWorld => "SUBWORLD",
            ChannelType::Test => "TEST",
        }
    }

    /// Parse from a settings-file key (case-sensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "GLOBAL" => Some(ChannelType::Global),
            "SUBWORLD" => Some(ChannelType::SubWorld),
            "TEST" => Some(ChannelType::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
