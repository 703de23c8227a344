//! The embedded database facade: one catalog, one storage manager, and the
//! statement path binder → planner → executor.

use parking_lot::Mutex;
use quiver_primitives::TableId;
use std::path::Path;
use std::sync::Arc;

use crate::ast;
use crate::binder::statement::{BoundAlterInfo, BoundAlterOp, BoundCreateTableData, BoundCreateTableInfo, BoundDropTableInfo};
use crate::binder::{Binder, ObjectHandle, ObjectRegistry, QueryBinder};
use crate::catalog::{Catalog, CatalogContent, TableKind};
use crate::copy::{execute_copy, CopyExecutionContext};
use crate::error::Result;
use crate::planner::{plan_statement, LogicalOperator, PlannedStatement};
use crate::storage::StorageManager;
use crate::transaction::{Transaction, TxKind};
use crate::types::Value;

/// What a statement did, as reported to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub rows_affected: u64,
    pub table_id: Option<TableId>,
}

/// Storage allocations whose fate follows the transaction outcome.
#[derive(Default)]
struct PendingStorageOps {
    created: Vec<TableId>,
    dropped: Vec<TableId>,
}

pub struct GraphDb {
    catalog: Catalog,
    storage: StorageManager,
    objects: ObjectRegistry,
    pending: Mutex<PendingStorageOps>,
    num_threads: usize,
}

impl GraphDb {
    /// An in-memory database: nothing is flushed to disk.
    pub fn new() -> GraphDb {
        GraphDb {
            catalog: Catalog::new(),
            storage: StorageManager::new(),
            objects: ObjectRegistry::new(),
            pending: Mutex::new(PendingStorageOps::default()),
            num_threads: 4,
        }
    }

    /// Opens (or creates) a database under `directory`, restoring the
    /// catalog and allocating storage for every restored table.
    pub fn open(directory: &Path) -> Result<GraphDb> {
        let catalog = Catalog::open(directory)?;
        let storage = StorageManager::new();
        for schema in catalog.snapshot().tables() {
            storage.create_table(schema);
        }
        Ok(GraphDb {
            catalog,
            storage,
            objects: ObjectRegistry::new(),
            pending: Mutex::new(PendingStorageOps::default()),
            num_threads: 4,
        })
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> GraphDb {
        self.num_threads = num_threads.max(1);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Registers an in-memory relation addressable as `COPY ... FROM <name>`.
    pub fn register_object(&mut self, name: impl Into<String>, handle: ObjectHandle) {
        self.objects.register(name, handle);
    }

    pub fn begin_write(&self) -> Transaction {
        Transaction::new(TxKind::Write)
    }

    pub fn begin_read(&self) -> Transaction {
        Transaction::new(TxKind::ReadOnly)
    }

    /// Binds, plans, and executes one statement under `tx`.
    pub fn run_statement(&self, tx: &Transaction, statement: &ast::Statement) -> Result<ExecutionResult> {
        self.run_statement_with(tx, statement, None)
    }

    /// As [`GraphDb::run_statement`], with a read-query frontend attached
    /// for the COPY forms that embed queries.
    pub fn run_statement_with(
        &self,
        tx: &Transaction,
        statement: &ast::Statement,
        query_binder: Option<&dyn QueryBinder>,
    ) -> Result<ExecutionResult> {
        let version = self.catalog.version_for(tx.id());
        let mut binder = Binder::new(version.clone()).with_objects(&self.objects);
        if let Some(query_binder) = query_binder {
            binder = binder.with_query_binder(query_binder);
        }
        let bound = binder.bind(statement)?;
        let planned = plan_statement(bound)?;
        self.execute_planned(tx, version, planned)
    }

    /// Runs one statement in its own write transaction, committing on
    /// success and rolling back on failure.
    pub fn execute(&self, statement: &ast::Statement) -> Result<ExecutionResult> {
        self.execute_with(statement, None)
    }

    pub fn execute_with(
        &self,
        statement: &ast::Statement,
        query_binder: Option<&dyn QueryBinder>,
    ) -> Result<ExecutionResult> {
        let tx = self.begin_write();
        match self.run_statement_with(&tx, statement, query_binder) {
            Ok(result) => {
                self.commit(&tx)?;
                Ok(result)
            }
            Err(err) => {
                self.rollback(&tx);
                Err(err)
            }
        }
    }

    fn execute_planned(
        &self,
        tx: &Transaction,
        version: Arc<CatalogContent>,
        planned: PlannedStatement,
    ) -> Result<ExecutionResult> {
        match planned {
            PlannedStatement::Plan(plan) => match plan.root {
                LogicalOperator::CreateTable(info) => self.execute_create_table(tx, info),
                LogicalOperator::DropTable(info) => self.execute_drop_table(tx, version, info),
                LogicalOperator::Alter(info) => self.execute_alter(tx, info),
                root => self.execute_copy_statement(
                    tx,
                    version,
                    PlannedStatement::Plan(crate::planner::LogicalPlan::new(root)),
                ),
            },
            planned => self.execute_copy_statement(tx, version, planned),
        }
    }

    fn execute_copy_statement(
        &self,
        tx: &Transaction,
        version: Arc<CatalogContent>,
        planned: PlannedStatement,
    ) -> Result<ExecutionResult> {
        let ctx = CopyExecutionContext {
            catalog: version,
            storage: &self.storage,
            cancel: tx.cancellation_token().clone(),
            num_threads: self.num_threads,
        };
        let rows_affected = execute_copy(planned, &ctx)?;
        Ok(ExecutionResult {
            rows_affected,
            table_id: None,
        })
    }

    fn execute_create_table(
        &self,
        tx: &Transaction,
        info: BoundCreateTableInfo,
    ) -> Result<ExecutionResult> {
        let table_name = info.table_name.clone();
        let created = self.catalog.with_write_version(tx.id(), |content| {
            let id = match info.data {
                BoundCreateTableData::Node {
                    primary_key_idx,
                    properties,
                } => content.add_node_table(&info.table_name, primary_key_idx, properties)?,
                BoundCreateTableData::Rel {
                    multiplicity,
                    src_table,
                    dst_table,
                    properties,
                } => content.add_rel_table(
                    &info.table_name,
                    multiplicity,
                    src_table,
                    dst_table,
                    properties,
                )?,
                BoundCreateTableData::RelGroup {
                    multiplicity,
                    src_dst_pairs,
                    properties,
                    ..
                } => content.add_rel_group(
                    &info.table_name,
                    &src_dst_pairs,
                    multiplicity,
                    properties,
                )?,
                BoundCreateTableData::RdfGraph => content.add_rdf_graph(&info.table_name)?,
            };
            Ok(with_children(content, id))
        })?;
        let version = self.catalog.version_for(tx.id());
        for &id in &created {
            self.storage.create_table(version.get(id));
        }
        self.pending.lock().created.extend(&created);
        log::info!("created table {table_name}");
        Ok(ExecutionResult {
            rows_affected: 0,
            table_id: created.first().copied(),
        })
    }

    fn execute_drop_table(
        &self,
        tx: &Transaction,
        version: Arc<CatalogContent>,
        info: BoundDropTableInfo,
    ) -> Result<ExecutionResult> {
        let to_drop = with_children(&version, info.table_id);
        self.catalog
            .with_write_version(tx.id(), |content| Ok(content.drop_table(info.table_id)?))?;
        self.pending.lock().dropped.extend(to_drop);
        log::info!("dropped table {}", info.table_name);
        Ok(ExecutionResult {
            rows_affected: 0,
            table_id: Some(info.table_id),
        })
    }

    fn execute_alter(&self, tx: &Transaction, info: BoundAlterInfo) -> Result<ExecutionResult> {
        match &info.op {
            BoundAlterOp::RenameTable { new_name } => {
                self.catalog.with_write_version(tx.id(), |content| {
                    Ok(content.rename_table(info.table_id, new_name)?)
                })?;
            }
            BoundAlterOp::AddProperty {
                property_name,
                dtype,
                default_value,
            } => {
                let pid = self.catalog.with_write_version(tx.id(), |content| {
                    Ok(content.add_property(info.table_id, property_name, dtype.clone())?)
                })?;
                let default = default_value.try_into_constant().unwrap_or(Value::Null);
                let version = self.catalog.version_for(tx.id());
                match &version.get(info.table_id).kind {
                    TableKind::Node(_) => {
                        self.storage.with_node_store(info.table_id, |store| {
                            store.add_column(pid, default.clone())
                        })?;
                    }
                    TableKind::Rel(_) => {
                        self.storage.with_rel_store(info.table_id, |store| {
                            store.add_column(pid, default.clone())
                        })?;
                    }
                    _ => {}
                }
            }
            BoundAlterOp::DropProperty { property_id } => {
                self.catalog.with_write_version(tx.id(), |content| {
                    Ok(content.drop_property(info.table_id, *property_id)?)
                })?;
                let version = self.catalog.version_for(tx.id());
                match &version.get(info.table_id).kind {
                    TableKind::Node(_) => {
                        self.storage.with_node_store(info.table_id, |store| {
                            store.drop_column(*property_id)
                        })?;
                    }
                    TableKind::Rel(_) => {
                        self.storage.with_rel_store(info.table_id, |store| {
                            store.drop_column(*property_id)
                        })?;
                    }
                    _ => {}
                }
            }
            BoundAlterOp::RenameProperty {
                property_id,
                new_name,
            } => {
                self.catalog.with_write_version(tx.id(), |content| {
                    Ok(content.rename_property(info.table_id, *property_id, new_name)?)
                })?;
            }
        }
        log::info!("altered table {}", info.table_name);
        Ok(ExecutionResult {
            rows_affected: 0,
            table_id: Some(info.table_id),
        })
    }

    /// Publishes `tx`: the catalog snapshot advances and storage applies
    /// the drops the transaction recorded.
    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        if self.catalog.has_write_version(tx.id()) {
            self.catalog.commit(tx.id())?;
        }
        let mut pending = self.pending.lock();
        for table in pending.dropped.drain(..) {
            self.storage.drop_table(table);
        }
        pending.created.clear();
        Ok(())
    }

    /// Discards `tx`: the write version is dropped and storage allocated
    /// for tables created in this transaction is released.
    pub fn rollback(&self, tx: &Transaction) {
        self.catalog.rollback(tx.id());
        let mut pending = self.pending.lock();
        for table in pending.created.drain(..) {
            self.storage.drop_table(table);
        }
        pending.dropped.clear();
    }
}

impl Default for GraphDb {
    fn default() -> GraphDb {
        GraphDb::new()
    }
}

/// A table id plus, for composite tables, every child it owns.
fn with_children(content: &CatalogContent, id: TableId) -> Vec<TableId> {
    let mut ids = vec![id];
    match &content.get(id).kind {
        TableKind::RelGroup(group) => ids.extend(group.rel_tables.iter().copied()),
        TableKind::Rdf(info) => ids.extend(info.children()),
        _ => {}
    }
    ids
}
