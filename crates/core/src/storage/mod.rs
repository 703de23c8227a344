//! The in-memory reference implementation of the storage collaborator.
//!
//! Bulk load needs three things from storage: per-table column/adjacency
//! stores, the primary-key index, and checkpoint/truncate so an aborted COPY
//! leaves no trace. The durable page/buffer/WAL engine behind the same
//! surface lives outside this crate.

pub mod index;
pub mod node_table;
pub mod rel_table;

use parking_lot::{Mutex, RwLock};
use quiver_primitives::{Offset, TableId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::TableSchema;
use crate::error::{Result, StorageError};

pub use index::{IndexKey, PrimaryKeyIndex};
pub use node_table::NodeTableStore;
pub use rel_table::RelTableStore;

enum TableStore {
    Node(NodeTableStore),
    Rel(RelTableStore),
}

/// Row-count snapshot of one table, recorded before the first chunk of a
/// COPY is appended and restored on abort.
#[derive(Copy, Clone, Debug)]
pub struct StoreCheckpoint {
    table: TableId,
    num_rows: Offset,
}

#[derive(Default)]
pub struct StorageManager {
    stores: Mutex<HashMap<TableId, TableStore>>,
}

impl StorageManager {
    pub fn new() -> StorageManager {
        StorageManager::default()
    }

    /// Allocates store structures for a newly committed table.
    pub fn create_table(&self, schema: &TableSchema) {
        let mut stores = self.stores.lock();
        match &schema.kind {
            crate::catalog::TableKind::Node(_) => {
                stores.insert(schema.id, TableStore::Node(NodeTableStore::new(schema)));
            }
            crate::catalog::TableKind::Rel(_) => {
                stores.insert(schema.id, TableStore::Rel(RelTableStore::new(schema)));
            }
            // Composite tables own no storage of their own.
            crate::catalog::TableKind::RelGroup(_) | crate::catalog::TableKind::Rdf(_) => {}
        }
    }

    pub fn drop_table(&self, table: TableId) {
        self.stores.lock().remove(&table);
    }

    pub fn has_table(&self, table: TableId) -> bool {
        self.stores.lock().contains_key(&table)
    }

    pub fn with_node_store<R>(
        &self,
        table: TableId,
        f: impl FnOnce(&mut NodeTableStore) -> R,
    ) -> Result<R> {
        let mut stores = self.stores.lock();
        match stores.get_mut(&table) {
            Some(TableStore::Node(store)) => Ok(f(store)),
            _ => Err(StorageError::UnknownTable(table).into()),
        }
    }

    pub fn with_rel_store<R>(
        &self,
        table: TableId,
        f: impl FnOnce(&mut RelTableStore) -> R,
    ) -> Result<R> {
        let mut stores = self.stores.lock();
        match stores.get_mut(&table) {
            Some(TableStore::Rel(store)) => Ok(f(store)),
            _ => Err(StorageError::UnknownTable(table).into()),
        }
    }

    /// The primary-key index handle of a node table.
    pub fn pk_index(&self, table: TableId) -> Result<Arc<RwLock<PrimaryKeyIndex>>> {
        self.with_node_store(table, |store| store.pk_index())
    }

    pub fn node_row_count(&self, table: TableId) -> Result<Offset> {
        self.with_node_store(table, |store| store.num_rows())
    }

    pub fn rel_count(&self, table: TableId) -> Result<Offset> {
        self.with_rel_store(table, |store| store.num_rels())
    }

    /// Records the pre-COPY row count of `table`.
    pub fn checkpoint(&self, table: TableId) -> Result<StoreCheckpoint> {
        let mut stores = self.stores.lock();
        let num_rows = match stores.get_mut(&table) {
            Some(TableStore::Node(store)) => store.num_rows(),
            Some(TableStore::Rel(store)) => store.num_rels(),
            None => return Err(StorageError::UnknownTable(table).into()),
        };
        Ok(StoreCheckpoint { table, num_rows })
    }

    /// Truncates `checkpoint.table` back to its recorded row count.
    pub fn restore(&self, checkpoint: StoreCheckpoint) {
        let mut stores = self.stores.lock();
        match stores.get_mut(&checkpoint.table) {
            Some(TableStore::Node(store)) => store.truncate(checkpoint.num_rows),
            Some(TableStore::Rel(store)) => store.truncate(checkpoint.num_rows),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::content::CatalogContent;
    use crate::types::{LogicalType, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn checkpoint_and_restore_round_trip() {
        let mut content = CatalogContent::new();
        let person = content
            .add_node_table("Person", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        let storage = StorageManager::new();
        storage.create_table(content.get(person));

        let pid = content.get(person).property_id("id").unwrap();
        storage
            .with_node_store(person, |store| {
                store.write_column_range(pid, 0, &[Value::Int64(1)]);
            })
            .unwrap();
        let checkpoint = storage.checkpoint(person).unwrap();
        storage
            .with_node_store(person, |store| {
                store.write_column_range(pid, 1, &[Value::Int64(2), Value::Int64(3)]);
            })
            .unwrap();
        assert_eq!(storage.node_row_count(person).unwrap(), 3);
        storage.restore(checkpoint);
        assert_eq!(storage.node_row_count(person).unwrap(), 1);
    }

    #[test]
    fn composite_tables_allocate_no_storage() {
        let mut content = CatalogContent::new();
        let graph = content.add_rdf_graph("G").unwrap();
        let storage = StorageManager::new();
        for schema in content.tables() {
            storage.create_table(schema);
        }
        assert!(!storage.has_table(graph));
        let info = content.get(graph).kind.as_rdf().unwrap().clone();
        assert!(storage.has_table(info.resource_node));
        assert!(storage.has_table(info.literal_triple_rel));
    }
}
