//! Subscriptions: per-subscriber fan-out options and delivery cursor.

use std::time::Duration;

use crate::field_mask::FieldMaskTree;
use crate::time::ChannelTime;

/// Options a subscriber registers with a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSubscriptionOptions {
    /// Whether this subscriber may originate data updates.
    pub can_update_data: bool,
    /// Dotted field paths retained in deliveries; empty means all fields.
    pub data_field_masks: Vec<String>,
    /// Cadence chosen by the subscriber.
    pub fan_out_interval: Duration,
}

impl ChannelSubscriptionOptions {
    /// Defaults: no update rights, no masks, the channel type's default
    /// fan-out interval.
    pub fn with_defaults(default_fan_out: Duration) -> ChannelSubscriptionOptions {
        ChannelSubscriptionOptions {
            can_update_data: false,
            data_field_masks: Vec::new(),
            fan_out_interval: default_fan_out,
        }
    }

    /// Apply a partial options update; unspecified fields retain their
    /// prior value.
    pub fn apply_patch(&mut self, patch: &SubscriptionOptionsPatch) {
        if let Some(can_update) = patch.can_update_data {
            self.can_update_data = can_update;
        }
        if let Some(masks) = &patch.data_field_masks {
            self.data_field_masks = masks.clone();
        }
        if let Some(ms) = patch.fan_out_interval_ms {
            self.fan_out_interval = Duration::from_millis(ms as u64);
        }
    }
}

/// Partial subscription options as carried on the wire.
///
/// Re-subscribing merges: `None` fields leave the existing subscription
/// untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionOptionsPatch {
    pub can_update_data: Option<bool>,
    pub data_field_masks: Option<Vec<String>>,
    pub fan_out_interval_ms: Option<u32>,
}

impl SubscriptionOptionsPatch {
    pub fn fan_out_ms(ms: u32) -> SubscriptionOptionsPatch {
        SubscriptionOptionsPatch {
            fan_out_interval_ms: Some(ms),
            ..Default::default()
        }
    }
}

/// A live subscription: options, the pre-parsed mask tree, and the
/// delivery cursor.
#[derive(Debug)]
pub struct ChannelSubscription {
    pub options: ChannelSubscriptionOptions,
    /// Parsed once from `options.data_field_masks`.
    pub mask: FieldMaskTree,
    /// `None` means "never delivered, owes the initial snapshot".
    pub last_fan_out_time: Option<ChannelTime>,
}

impl ChannelSubscription {
    pub fn new(options: ChannelSubscriptionOptions) -> ChannelSubscription {
        let mask = FieldMaskTree::from_paths(&options.data_field_masks);
        ChannelSubscription {
            options,
            mask,
            last_fan_out_time: None,
        }
    }

    /// Merge an options patch. The delivery cursor is deliberately left
    /// alone: a re-subscribe must not replay the snapshot.
    pub fn update_options(&mut self, patch: &SubscriptionOptionsPatch) {
        self.options.apply_patch(patch);
        if patch.data_field_masks.is_some() {
            self.mask = FieldMaskTree::from_paths(&self.options.data_field_masks);
        }
    }
}
