//! Channel-relative time.

use std::time::{Duration, Instant};

/// Monotonic nanosecond offset from the channel's creation instant.
///
/// Cheap to produce and to add millisecond offsets to; the fan-out pass
/// compares `now - last_fan_out_time` against subscriber cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelTime(pub i64);

impl ChannelTime {
    pub const ZERO: ChannelTime = ChannelTime(0);

    /// Time elapsed since `start`, as channel time.
    pub fn since(start: Instant) -> ChannelTime {
        ChannelTime(start.elapsed().as_nanos().min(i64::MAX as u128) as i64)
    }

    pub fn from_millis(ms: i64) -> ChannelTime {
        ChannelTime(ms.saturating_mul(1_000_000))
    }

    pub fn add_ms(self, ms: u32) -> ChannelTime {
        ChannelTime(self.0.saturating_add(ms as i64 * 1_000_000))
    }

    /// Duration elapsed since `earlier`; zero if `earlier` is in the future.
    pub fn duration_since(self, earlier: ChannelTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}
