//! Field-mask filtering for fan-out deltas.
//!
//! Masks are dotted paths (`"a.b"`). They are pre-parsed into a tree of
//! path segments once per subscription; filtering is a recursive walk
//! that short-circuits on missing paths. A mask applies per element to
//! list fields and inside each value of map fields. An empty mask set
//! means "no filtering".

use std::collections::BTreeMap;

use crate::record::{FieldValue, Record};

/// Pre-parsed set of dotted field paths.
#[derive(Debug, Clone, Default)]
pub struct FieldMaskTree {
    children: BTreeMap<String, FieldMaskTree>,
}

impl FieldMaskTree {
    pub fn new() -> FieldMaskTree {
        FieldMaskTree::default()
    }

    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> FieldMaskTree {
        let mut tree = FieldMaskTree::new();
        for path in paths {
            tree.insert_path(path.as_ref());
        }
        tree
    }

    /// Add one dotted path. Empty segments are ignored.
    pub fn insert_path(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }

    /// True when no paths have been added; filtering is then a no-op.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Produce the masked view of `record`. The input is not mutated.
    pub fn filter_record(&self, record: &Record) -> Record {
        if self.is_empty() {
            return record.clone();
        }
        let mut out = Record::new();
        for (name, subtree) in &self.children {
            if let Some(value) = record.get(name) {
                if let Some(filtered) = subtree.filter_value(value) {
                    out.insert(name.clone(), filtered);
                }
            }
        }
        out
    }

    /// Filter a single value against this subtree.
    ///
    /// A leaf subtree keeps the whole value. A subtree with children
    /// descends into records, list elements, and map values; paths that
    /// reach into a scalar match nothing.
    fn filter_value(&self, value: &FieldValue) -> Option<FieldValue> {
        if self.is_empty() {
            return Some(value.clone());
        }
        match value {
            FieldValue::Msg(record) => {
                let filtered = self.filter_record(record);
                if filtered.is_empty() {
                    None
                } else {
                    Some(FieldValue::Msg(filtered))
                }
            }
            FieldValue::List(items) => {
                let filtered: Vec<FieldValue> = items
                    .iter()
                    .filter_map(|item| self.filter_value(item))
                    .collect();
                if filtered.is_empty() {
                    None
                } else {
                    Some(FieldValue::List(filtered))
                }
            }
            FieldValue::Map(entries) => {
                let filtered: BTreeMap<_, _> = entries
                    .iter()
                    .filter_map(|(k, v)| self.filter_value(v).map(|fv| (k.clone(), fv)))
                    .collect();
                if filtered.is_empty() {
                    None
                } else {
                    Some(FieldValue::Map(filtered))
                }
            }
            _ => None,
        }
    }
}
