//! The primary-key hash index over a node table.

use quiver_primitives::Offset;
use std::collections::HashMap;

use crate::types::Value;

/// A primary-key value in index form. Node primary keys are `INT64`,
/// `STRING`, or `SERIAL` (which indexes as its assigned integer).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Int(i64),
    Str(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Int64(v) => Some(IndexKey::Int(*v)),
            Value::Int32(v) => Some(IndexKey::Int(*v as i64)),
            Value::Int16(v) => Some(IndexKey::Int(*v as i64)),
            Value::String(v) => Some(IndexKey::Str(v.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKey::Int(v) => write!(f, "{v}"),
            IndexKey::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Maps primary keys to row offsets. Shared-read during rel ingest,
/// exclusive-write during node ingest.
#[derive(Debug, Default)]
pub struct PrimaryKeyIndex {
    entries: HashMap<IndexKey, Offset>,
}

impl PrimaryKeyIndex {
    pub fn new() -> PrimaryKeyIndex {
        PrimaryKeyIndex::default()
    }

    /// Inserts a key. Returns the previously mapped offset when the key is
    /// already present, leaving the existing entry in place.
    pub fn insert(&mut self, key: IndexKey, offset: Offset) -> Option<Offset> {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => Some(*entry.get()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(offset);
                None
            }
        }
    }

    pub fn lookup(&self, key: &IndexKey) -> Option<Offset> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry at or beyond `num_rows`, undoing a partial load.
    pub fn truncate(&mut self, num_rows: Offset) {
        self.entries.retain(|_, offset| *offset < num_rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut index = PrimaryKeyIndex::new();
        assert_eq!(index.insert(IndexKey::Int(1), 0), None);
        assert_eq!(index.insert(IndexKey::Str("a".into()), 1), None);
        assert_eq!(index.lookup(&IndexKey::Int(1)), Some(0));
        assert_eq!(index.lookup(&IndexKey::Int(2)), None);
    }

    #[test]
    fn duplicate_insert_reports_existing_offset() {
        let mut index = PrimaryKeyIndex::new();
        index.insert(IndexKey::Int(1), 0);
        assert_eq!(index.insert(IndexKey::Int(1), 5), Some(0));
        assert_eq!(index.lookup(&IndexKey::Int(1)), Some(0));
    }

    #[test]
    fn truncate_drops_tail_entries() {
        let mut index = PrimaryKeyIndex::new();
        for i in 0..10i64 {
            index.insert(IndexKey::Int(i), i as Offset);
        }
        index.truncate(4);
        assert_eq!(index.len(), 4);
        assert_eq!(index.lookup(&IndexKey::Int(3)), Some(3));
        assert_eq!(index.lookup(&IndexKey::Int(7)), None);
    }
}
