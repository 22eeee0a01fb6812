//! Dynamically-shaped structured records used as channel payloads.
//!
//! A [`Record`] is an ordered map of named fields; a [`FieldValue`] covers
//! scalars, nested records, lists, and keyed maps. Updates arrive as
//! *partial* records of the same shape: fields absent from a partial are
//! "unset" and leave the destination untouched on merge, and
//! [`FieldValue::Null`] is the schema's null/empty sentinel (used by map
//! merges to delete entries, see [`crate::merge`]).

use std::collections::BTreeMap;
use std::fmt;

use crate::channel_type::ChannelType;

/// Key of a [`FieldValue::Map`] entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{}", i),
            MapKey::Str(s) => f.write_str(s),
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The null/empty sentinel.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Repeated field. Merge appends by default; see `MergeOptions`.
    List(Vec<FieldValue>),
    /// Keyed map. Values merge per key; `Null` values may delete entries.
    Map(BTreeMap<MapKey, FieldValue>),
    /// Nested record; merges recursively.
    Msg(Record),
}

impl FieldValue {
    pub fn str(s: impl Into<String>) -> FieldValue {
        FieldValue::Str(s.into())
    }

    /// String content, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<MapKey, FieldValue>> {
        match self {
            FieldValue::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// An ordered set of named fields.
///
/// A record with no fields is the empty partial: merging it is a no-op and
/// fan-out skips deltas that filter down to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    /// Builder-style insert, handy for tests and schema constructors.
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Record {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.fields.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Default record shape for a channel type.
    ///
    /// The full schema registry is an external collaborator; these built-in
    /// shapes cover the channel types the router itself knows about.
    pub fn for_channel_type(t: ChannelType) -> Record {
        match t {
            ChannelType::Global => Record::new()
                .with("banner", FieldValue::str(""))
                .with("online", FieldValue::Int(0)),
            ChannelType::SubWorld => Record::new()
                .with("name", FieldValue::str(""))
                .with("entities", FieldValue::Map(BTreeMap::new()))
                .with("events", FieldValue::List(Vec::new())),
            ChannelType::Test => Record::new()
                .with("text", FieldValue::str(""))
                .with("num", FieldValue::Int(0)),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
