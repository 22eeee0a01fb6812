//! Channel data: the canonical record plus its coalescing update log.

use std::collections::VecDeque;

use crate::merge::{merge_with_options, MergeOptions};
use crate::record::Record;
use crate::time::ChannelTime;

/// One buffered incremental update, tagged with its arrival time.
#[derive(Debug, Clone)]
pub struct BufferedUpdate {
    pub arrival_time: ChannelTime,
    pub partial: Record,
}

/// The canonical record of a channel together with the time-ordered
/// update buffer the fan-out pass coalesces from.
///
/// The buffer is *not* the canonical state: `msg` always reflects every
/// update applied so far, while the buffer only holds the tail that some
/// subscriber may still need as a delta.
#[derive(Debug)]
pub struct ChannelData {
    msg: Record,
    merge_options: MergeOptions,
    update_buffer: VecDeque<BufferedUpdate>,
}

impl ChannelData {
    pub fn new(msg: Record, merge_options: MergeOptions) -> ChannelData {
        ChannelData {
            msg,
            merge_options,
            update_buffer: VecDeque::new(),
        }
    }

    /// The canonical record.
    pub fn msg(&self) -> &Record {
        &self.msg
    }

    pub fn merge_options(&self) -> &MergeOptions {
        &self.merge_options
    }

    /// Number of buffered updates (useful for pruning assertions).
    pub fn buffered(&self) -> usize {
        self.update_buffer.len()
    }

    /// Append an incremental update and fold it into the canonical record.
    ///
    /// Arrival times are non-decreasing by construction: all updates to a
    /// channel pass through its single loop.
    pub fn on_update(&mut self, partial: Record, arrival_time: ChannelTime) {
        debug_assert!(
            self.update_buffer
                .back()
                .map_or(true, |last| last.arrival_time <= arrival_time),
            "update buffer must be non-decreasing in arrival time"
        );
        merge_with_options(&mut self.msg, &partial, &self.merge_options);
        self.update_buffer.push_back(BufferedUpdate {
            arrival_time,
            partial,
        });
    }

    /// Merge of every buffered update with `arrival_time > since`, in
    /// arrival order. `None` when the window is empty.
    pub fn coalesce_since(&self, since: ChannelTime) -> Option<Record> {
        let mut delta: Option<Record> = None;
        for update in &self.update_buffer {
            if update.arrival_time <= since {
                continue;
            }
            let acc = delta.get_or_insert_with(Record::new);
            merge_with_options(acc, &update.partial, &self.merge_options);
        }
        delta
    }

    /// Drop buffered updates no subscriber can still need: everything with
    /// `arrival_time <= min_cursor`.
    pub fn prune_through(&mut self, min_cursor: ChannelTime) {
        while self
            .update_buffer
            .front()
            .map_or(false, |u| u.arrival_time <= min_cursor)
        {
            self.update_buffer.pop_front();
        }
    }

    /// Drop the entire buffer (no subscribers left to read it).
    pub fn prune_all(&mut self) {
        self.update_buffer.clear();
    }
}
