//! The data-merge algorithm: `dst ← dst ⊕ src` over partial records.
//!
//! Semantics:
//! - Scalar fields in `src` overwrite `dst`.
//! - Nested record fields recurse.
//! - Lists append by default; `replace_repeated` swaps in the `src` list.
//!   `list_size_limit = N` retains only the last N elements after merge
//!   (`0` means unbounded).
//! - Map values of record type merge recursively. A `Null` map value is
//!   the deletion sentinel when `delete_nil_map_value` is set; otherwise
//!   the existing entry is preserved untouched.
//! - Fields absent from `src` leave `dst` untouched (presence-tracked).
//!   A `Null` record-field value is likewise ignored: null only carries
//!   meaning inside maps.

use std::collections::BTreeMap;

use crate::channel_type::ChannelType;
use crate::record::{FieldValue, MapKey, Record};

/// Options controlling a merge pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Lists in `src` replace lists in `dst` instead of appending.
    pub replace_repeated: bool,
    /// Post-merge cap on list length, keeping the newest elements.
    /// `0` means unbounded.
    pub list_size_limit: u32,
    /// Map entries whose `src` value is `Null` are removed from `dst`.
    pub delete_nil_map_value: bool,
}

impl MergeOptions {
    /// Merge policy applied to a channel type's canonical data.
    ///
    /// Sub-worlds treat null entity values as despawns and cap their event
    /// log; the other built-in types use the plain policy.
    pub fn for_channel_type(t: ChannelType) -> MergeOptions {
        match t {
            ChannelType::SubWorld => MergeOptions {
                replace_repeated: false,
                list_size_limit: 128,
                delete_nil_map_value: true,
            },
            ChannelType::Global | ChannelType::Test => MergeOptions::default(),
        }
    }
}

/// Merge `src` into `dst` under `opts`.
pub fn merge_with_options(dst: &mut Record, src: &Record, opts: &MergeOptions) {
    for (name, src_value) in src {
        if matches!(src_value, FieldValue::Null) {
            continue;
        }
        match dst.get_mut(name) {
            Some(dst_value) => merge_value(dst_value, src_value, opts),
            None => {
                let mut value = src_value.clone();
                if let FieldValue::List(items) = &mut value {
                    trim_list(items, opts.list_size_limit);
                }
                dst.insert(name.clone(), value);
            }
        }
    }
}

fn merge_value(dst: &mut FieldValue, src: &FieldValue, opts: &MergeOptions) {
    match (dst, src) {
        (FieldValue::Msg(d), FieldValue::Msg(s)) => merge_with_options(d, s, opts),
        (FieldValue::List(d), FieldValue::List(s)) => {
            if opts.replace_repeated {
                *d = s.clone();
            } else {
                d.extend(s.iter().cloned());
            }
            trim_list(d, opts.list_size_limit);
        }
        (FieldValue::Map(d), FieldValue::Map(s)) => merge_map(d, s, opts),
        (dst, src) => *dst = src.clone(),
    }
}

fn merge_map(
    dst: &mut BTreeMap<MapKey, FieldValue>,
    src: &BTreeMap<MapKey, FieldValue>,
    opts: &MergeOptions,
) {
    for (key, src_value) in src {
        if matches!(src_value, FieldValue::Null) {
            if opts.delete_nil_map_value {
                dst.remove(key);
            }
            continue;
        }
        match dst.get_mut(key) {
            Some(existing) => merge_value(existing, src_value, opts),
            None => {
                dst.insert(key.clone(), src_value.clone());
            }
        }
    }
}

/// Keep only the last `limit` elements; `0` disables the cap.
fn trim_list(items: &mut Vec<FieldValue>, limit: u32) {
    let limit = limit as usize;
    if limit > 0 && items.len() > limit {
        items.drain(..items.len() - limit);
    }
}
