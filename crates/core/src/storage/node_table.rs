//! In-memory column store for one node table.

use indexmap::IndexMap;
use parking_lot::RwLock;
use quiver_primitives::{Offset, PropertyId};
use std::sync::Arc;

use crate::catalog::TableSchema;
use crate::error::{Result, StorageError};
use crate::types::Value;

use super::index::{IndexKey, PrimaryKeyIndex};

/// Columns plus the primary-key index of a node table. Bulk load appends
/// whole chunks at assigned base offsets; morsel workers may arrive out of
/// order, so columns grow to fit and are back-filled.
pub struct NodeTableStore {
    name: String,
    primary_key_pid: PropertyId,
    columns: IndexMap<PropertyId, Vec<Value>>,
    num_rows: Offset,
    pk_index: Arc<RwLock<PrimaryKeyIndex>>,
}

impl NodeTableStore {
    pub fn new(schema: &TableSchema) -> NodeTableStore {
        let node = schema
            .kind
            .as_node()
            .expect("node store requires a node table schema");
        let columns = schema
            .properties
            .iter()
            .map(|p| (p.id, Vec::new()))
            .collect();
        NodeTableStore {
            name: schema.name.clone(),
            primary_key_pid: node.primary_key_pid,
            columns,
            num_rows: 0,
            pk_index: Arc::new(RwLock::new(PrimaryKeyIndex::new())),
        }
    }

    pub fn num_rows(&self) -> Offset {
        self.num_rows
    }

    pub fn pk_index(&self) -> Arc<RwLock<PrimaryKeyIndex>> {
        self.pk_index.clone()
    }

    pub fn column(&self, pid: PropertyId) -> Option<&[Value]> {
        self.columns.get(&pid).map(|c| c.as_slice())
    }

    /// Adds storage for a property created by `ALTER TABLE ... ADD`,
    /// back-filled with `default_value` for existing rows.
    pub fn add_column(&mut self, pid: PropertyId, default_value: Value) {
        self.columns
            .insert(pid, vec![default_value; self.num_rows as usize]);
    }

    pub fn drop_column(&mut self, pid: PropertyId) {
        self.columns.shift_remove(&pid);
    }

    /// Writes `values` for property `pid` starting at row `base`. Gaps left
    /// by out-of-order morsels hold `Null` until their writer arrives.
    pub fn write_column_range(&mut self, pid: PropertyId, base: Offset, values: &[Value]) {
        let name = &self.name;
        let column = self
            .columns
            .get_mut(&pid)
            .unwrap_or_else(|| panic!("unknown property {pid} on table {name}"));
        let end = base as usize + values.len();
        if column.len() < end {
            column.resize(end, Value::Null);
        }
        column[base as usize..end].clone_from_slice(values);
        self.num_rows = self.num_rows.max(end as Offset);
    }

    /// Indexes the primary keys of rows `[base, base + keys.len())`.
    pub fn index_keys(&mut self, base: Offset, keys: &[Value]) -> Result<()> {
        let mut index = self.pk_index.write();
        for (i, key_value) in keys.iter().enumerate() {
            let Some(key) = IndexKey::from_value(key_value) else {
                continue;
            };
            if index.insert(key.clone(), base + i as Offset).is_some() {
                return Err(StorageError::DuplicateKey {
                    table: self.name.clone(),
                    key: key.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn primary_key_pid(&self) -> PropertyId {
        self.primary_key_pid
    }

    /// Undoes everything at or past `num_rows`: the pre-COPY checkpoint state.
    pub fn truncate(&mut self, num_rows: Offset) {
        for column in self.columns.values_mut() {
            column.truncate(num_rows as usize);
        }
        self.pk_index.write().truncate(num_rows);
        self.num_rows = num_rows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::content::CatalogContent;
    use crate::types::LogicalType;
    use pretty_assertions::assert_eq;

    fn person_store() -> (NodeTableStore, PropertyId, PropertyId) {
        let mut content = CatalogContent::new();
        let id = content
            .add_node_table(
                "Person",
                0,
                vec![
                    ("id".to_string(), LogicalType::Int64),
                    ("name".to_string(), LogicalType::String),
                ],
            )
            .unwrap();
        let schema = content.get(id);
        let pid_id = schema.property_id("id").unwrap();
        let pid_name = schema.property_id("name").unwrap();
        (NodeTableStore::new(schema), pid_id, pid_name)
    }

    #[test]
    fn out_of_order_writes_land_at_their_offsets() {
        let (mut store, pid_id, pid_name) = person_store();
        store.write_column_range(pid_id, 2, &[Value::Int64(30), Value::Int64(40)]);
        store.write_column_range(pid_id, 0, &[Value::Int64(10), Value::Int64(20)]);
        store.write_column_range(
            pid_name,
            0,
            &[
                Value::String("a".into()),
                Value::String("b".into()),
                Value::String("c".into()),
                Value::String("d".into()),
            ],
        );
        assert_eq!(store.num_rows(), 4);
        assert_eq!(
            store.column(pid_id).unwrap(),
            &[
                Value::Int64(10),
                Value::Int64(20),
                Value::Int64(30),
                Value::Int64(40)
            ]
        );
    }

    #[test]
    fn duplicate_primary_key_is_fatal() {
        let (mut store, _, _) = person_store();
        store
            .index_keys(0, &[Value::Int64(1), Value::Int64(2)])
            .unwrap();
        let err = store.index_keys(2, &[Value::Int64(1)]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Storage(StorageError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn truncate_restores_checkpoint_state() {
        let (mut store, pid_id, _) = person_store();
        store.write_column_range(pid_id, 0, &[Value::Int64(1), Value::Int64(2)]);
        store
            .index_keys(0, &[Value::Int64(1), Value::Int64(2)])
            .unwrap();
        let checkpoint = store.num_rows();
        store.write_column_range(pid_id, 2, &[Value::Int64(3)]);
        store.index_keys(2, &[Value::Int64(3)]).unwrap();
        store.truncate(checkpoint);
        assert_eq!(store.num_rows(), 2);
        assert_eq!(store.pk_index.read().len(), 2);
    }
}
