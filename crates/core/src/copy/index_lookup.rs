//! Primary-key resolution for edge ingest.
//!
//! Each incoming edge row carries external source and destination keys.
//! They resolve to node offsets through the storage primary-key indexes;
//! a key that resolves nowhere aborts the COPY, never drops the row.

use parking_lot::RwLock;
use quiver_primitives::{Offset, TableId};
use std::sync::Arc;

use crate::binder::statement::RelCopyMember;
use crate::catalog::CatalogContent;
use crate::error::{Error, Result};
use crate::storage::{IndexKey, PrimaryKeyIndex, StorageManager};
use crate::types::{LogicalType, Value};

struct MemberIndexes {
    src_index: Arc<RwLock<PrimaryKeyIndex>>,
    dst_index: Arc<RwLock<PrimaryKeyIndex>>,
    src_pk_type: LogicalType,
    dst_pk_type: LogicalType,
    src_table_name: String,
    dst_table_name: String,
}

/// Resolved index handles for every member table of one rel COPY.
pub struct IndexLookup {
    members: Vec<MemberIndexes>,
}

/// One resolved edge row: which member it belongs to and both offsets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub member_idx: usize,
    pub src_offset: Offset,
    pub dst_offset: Offset,
}

impl IndexLookup {
    pub fn open(
        catalog: &CatalogContent,
        storage: &StorageManager,
        members: &[RelCopyMember],
    ) -> Result<IndexLookup> {
        let mut resolved = Vec::with_capacity(members.len());
        for member in members {
            resolved.push(MemberIndexes {
                src_index: storage.pk_index(member.src_table)?,
                dst_index: storage.pk_index(member.dst_table)?,
                src_pk_type: node_pk_type(catalog, member.src_table),
                dst_pk_type: node_pk_type(catalog, member.dst_table),
                src_table_name: catalog.get(member.src_table).name.clone(),
                dst_table_name: catalog.get(member.dst_table).name.clone(),
            });
        }
        Ok(IndexLookup { members: resolved })
    }

    /// Resolves a chunk's key columns. For a grouped COPY the member is the
    /// first whose indexes hold both keys.
    pub fn lookup_chunk(&self, src_keys: &[Value], dst_keys: &[Value]) -> Result<Vec<ResolvedEdge>> {
        debug_assert_eq!(src_keys.len(), dst_keys.len());
        let mut resolved = Vec::with_capacity(src_keys.len());
        for (src_value, dst_value) in src_keys.iter().zip(dst_keys) {
            resolved.push(self.lookup_row(src_value, dst_value)?);
        }
        Ok(resolved)
    }

    fn lookup_row(&self, src_value: &Value, dst_value: &Value) -> Result<ResolvedEdge> {
        for (member_idx, member) in self.members.iter().enumerate() {
            let src_offset = coerce_key(src_value, &member.src_pk_type)
                .and_then(|key| member.src_index.read().lookup(&key));
            let dst_offset = coerce_key(dst_value, &member.dst_pk_type)
                .and_then(|key| member.dst_index.read().lookup(&key));
            if let (Some(src_offset), Some(dst_offset)) = (src_offset, dst_offset) {
                return Ok(ResolvedEdge {
                    member_idx,
                    src_offset,
                    dst_offset,
                });
            }
        }
        // Report against the first member's source side unless its source
        // key resolved, in which case the destination key is the missing one.
        let first = &self.members[0];
        let src_resolved = coerce_key(src_value, &first.src_pk_type)
            .and_then(|key| first.src_index.read().lookup(&key))
            .is_some();
        let (table, key) = if src_resolved {
            (first.dst_table_name.clone(), dst_value.to_string())
        } else {
            (first.src_table_name.clone(), src_value.to_string())
        };
        Err(Error::KeyNotFound { table, key })
    }
}

fn node_pk_type(catalog: &CatalogContent, table: TableId) -> LogicalType {
    catalog
        .get(table)
        .primary_key()
        .map(|pk| pk.dtype.clone())
        .unwrap_or(LogicalType::String)
}

/// Shapes a key value for the index of a primary key typed `pk_type`.
/// Serial keys index as their assigned integers.
fn coerce_key(value: &Value, pk_type: &LogicalType) -> Option<IndexKey> {
    match pk_type {
        LogicalType::Int64 | LogicalType::Serial => match value {
            Value::Int64(v) => Some(IndexKey::Int(*v)),
            Value::Int32(v) => Some(IndexKey::Int(*v as i64)),
            Value::Int16(v) => Some(IndexKey::Int(*v as i64)),
            Value::String(v) => v.trim().parse().ok().map(IndexKey::Int),
            _ => None,
        },
        LogicalType::String => match value {
            Value::Null => None,
            Value::String(v) => Some(IndexKey::Str(v.clone())),
            other => Some(IndexKey::Str(other.to_string())),
        },
        _ => IndexKey::from_value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RelMultiplicity;
    use pretty_assertions::assert_eq;

    fn setup() -> (CatalogContent, StorageManager, Vec<RelCopyMember>) {
        let mut catalog = CatalogContent::new();
        let person = catalog
            .add_node_table("Person", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        let knows = catalog
            .add_rel_table("Knows", RelMultiplicity::ManyMany, person, person, vec![])
            .unwrap();
        let storage = StorageManager::new();
        for schema in catalog.tables() {
            storage.create_table(schema);
        }
        storage
            .with_node_store(person, |store| {
                store.index_keys(0, &[Value::Int64(1), Value::Int64(2)])
            })
            .unwrap()
            .unwrap();
        let members = vec![RelCopyMember {
            table_id: knows,
            table_name: "Knows".to_string(),
            src_table: person,
            dst_table: person,
        }];
        (catalog, storage, members)
    }

    #[test]
    fn resolves_both_sides() {
        let (catalog, storage, members) = setup();
        let lookup = IndexLookup::open(&catalog, &storage, &members).unwrap();
        let resolved = lookup
            .lookup_chunk(&[Value::Int64(1)], &[Value::Int64(2)])
            .unwrap();
        assert_eq!(
            resolved,
            vec![ResolvedEdge {
                member_idx: 0,
                src_offset: 0,
                dst_offset: 1
            }]
        );
    }

    #[test]
    fn unresolvable_key_is_fatal_and_named() {
        let (catalog, storage, members) = setup();
        let lookup = IndexLookup::open(&catalog, &storage, &members).unwrap();
        let err = lookup
            .lookup_chunk(&[Value::Int64(1)], &[Value::Int64(99)])
            .unwrap_err();
        match err {
            Error::KeyNotFound { key, .. } => assert_eq!(key, "99"),
            other => panic!("expected KeyNotFound, got {other}"),
        }
    }

    #[test]
    fn string_rendering_of_integer_keys_coerces() {
        let (catalog, storage, members) = setup();
        let lookup = IndexLookup::open(&catalog, &storage, &members).unwrap();
        let resolved = lookup
            .lookup_chunk(&[Value::String("2".into())], &[Value::String("1".into())])
            .unwrap();
        assert_eq!(resolved[0].src_offset, 1);
        assert_eq!(resolved[0].dst_offset, 0);
    }
}
