//! Execution of COPY plans: the bulk-load pipeline.

pub mod export;
pub mod index_lookup;
pub mod morsel;
pub mod node_copy;
pub mod partitioner;
pub mod rdf_copy;
pub mod rel_copy;

use std::sync::Arc;

use crate::binder::statement::BoundScanSource;
use crate::catalog::CatalogContent;
use crate::error::{Error, Result};
use crate::planner::{CopyFromTarget, LogicalOperator, LogicalPlan, PlannedStatement};
use crate::reader::turtle::RdfReaderContext;
use crate::reader::FileType;
use crate::storage::StorageManager;
use crate::transaction::CancellationToken;
use crate::types::LogicalType;

pub use morsel::{CallFuncSharedState, Morsel, SharedScanState};

pub struct CopyExecutionContext<'a> {
    pub catalog: Arc<CatalogContent>,
    pub storage: &'a StorageManager,
    pub cancel: CancellationToken,
    pub num_threads: usize,
}

/// Executes a planned COPY statement. Returns the number of rows loaded or
/// exported.
pub fn execute_copy(planned: PlannedStatement, ctx: &CopyExecutionContext<'_>) -> Result<u64> {
    match planned {
        PlannedStatement::Plan(plan) => execute_copy_plan(plan, ctx),
        PlannedStatement::RdfGraphCopy(plans) => rdf_copy::execute_rdf_graph_copy(plans, ctx),
    }
}

struct UnwrappedScan {
    source: BoundScanSource,
    columns: Vec<(String, LogicalType)>,
    distinct: bool,
}

/// Walks the operator chain under a writer down to its scan leaf. The
/// intermediate operators carry no execution state of their own: distinct
/// folds into the scan, and lookup/partition run inside the rel writer.
fn unwrap_scan(mut op: LogicalOperator) -> Result<UnwrappedScan> {
    let mut distinct = false;
    loop {
        op = match op {
            LogicalOperator::ScanSource { source, columns } => {
                return Ok(UnwrappedScan {
                    source,
                    columns,
                    distinct,
                })
            }
            LogicalOperator::Distinct { child } => {
                distinct = true;
                *child
            }
            LogicalOperator::Accumulate { child }
            | LogicalOperator::Projection { child, .. }
            | LogicalOperator::IndexLookup { child, .. }
            | LogicalOperator::Partition { child, .. } => *child,
            _ => {
                return Err(Error::NotImplemented(
                    "unexpected operator below a copy writer".to_string(),
                ))
            }
        };
    }
}

pub(crate) fn execute_copy_plan(plan: LogicalPlan, ctx: &CopyExecutionContext<'_>) -> Result<u64> {
    match plan.root {
        LogicalOperator::CopyFrom { child, info } => match info {
            CopyFromTarget::Node { table_id, .. } => {
                let scan = unwrap_scan(*child)?;
                let strict_types = matches!(
                    &scan.source,
                    BoundScanSource::File(config) if config.file_type == FileType::Npy
                );
                let target = node_copy::NodeCopyTarget::resolve(&ctx.catalog, table_id, strict_types);
                let base = ctx.storage.node_row_count(table_id)?;
                let checkpoint = ctx.storage.checkpoint(table_id)?;
                let shared =
                    SharedScanState::open(&scan.source, &scan.columns, None, base, scan.distinct)?;
                match node_copy::run(ctx.storage, &shared, &target, &ctx.cancel, ctx.num_threads) {
                    Ok(rows) => Ok(rows),
                    Err(err) => {
                        ctx.storage.restore(checkpoint);
                        Err(err)
                    }
                }
            }
            CopyFromTarget::Rel {
                members, rdf_mode, ..
            } => {
                let scan = unwrap_scan(*child)?;
                let target = rel_copy::RelCopyTarget::resolve(&ctx.catalog, members, rdf_mode);
                let mut checkpoints = Vec::new();
                for table in rel_copy::member_tables(&target) {
                    checkpoints.push(ctx.storage.checkpoint(table)?);
                }
                let rdf_context = match rdf_mode {
                    Some(_) => Some(RdfReaderContext {
                        resource_index: ctx.storage.pk_index(target.members[0].src_table)?,
                    }),
                    None => None,
                };
                let shared =
                    SharedScanState::open(&scan.source, &scan.columns, rdf_context, 0, false)?;
                match rel_copy::run(
                    &ctx.catalog,
                    ctx.storage,
                    &shared,
                    &target,
                    &ctx.cancel,
                    ctx.num_threads,
                ) {
                    Ok(rows) => Ok(rows),
                    Err(err) => {
                        for checkpoint in checkpoints {
                            ctx.storage.restore(checkpoint);
                        }
                        Err(err)
                    }
                }
            }
        },
        LogicalOperator::CopyTo { info, .. } => export::run(&info, &ctx.cancel),
        _ => Err(Error::NotImplemented(
            "plan is not a COPY statement".to_string(),
        )),
    }
}
