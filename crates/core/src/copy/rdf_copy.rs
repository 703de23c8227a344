//! Whole-graph RDF ingest.
//!
//! Four plans run strictly in order: resources, literals, resource triples,
//! literal triples. The order is load-bearing: the triple readers resolve
//! IRIs through the resource table's primary-key index, which the first
//! load populates. Any failure aborts the whole ingest and truncates every
//! touched table back to its pre-COPY state.

use quiver_primitives::TableId;

use crate::error::Result;
use crate::planner::{CopyFromTarget, LogicalOperator, LogicalPlan};
use crate::storage::StoreCheckpoint;

use super::CopyExecutionContext;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RdfGraphLoadState {
    Init,
    LoadResources,
    IndexResources,
    LoadLiterals,
    LoadResourceTriples,
    LoadLiteralTriples,
    Done,
}

impl RdfGraphLoadState {
    fn next(self) -> RdfGraphLoadState {
        match self {
            RdfGraphLoadState::Init => RdfGraphLoadState::LoadResources,
            RdfGraphLoadState::LoadResources => RdfGraphLoadState::IndexResources,
            RdfGraphLoadState::IndexResources => RdfGraphLoadState::LoadLiterals,
            RdfGraphLoadState::LoadLiterals => RdfGraphLoadState::LoadResourceTriples,
            RdfGraphLoadState::LoadResourceTriples => RdfGraphLoadState::LoadLiteralTriples,
            RdfGraphLoadState::LoadLiteralTriples | RdfGraphLoadState::Done => {
                RdfGraphLoadState::Done
            }
        }
    }
}

fn plan_target_table(plan: &LogicalPlan) -> Option<TableId> {
    match &plan.root {
        LogicalOperator::CopyFrom { info, .. } => match info {
            CopyFromTarget::Node { table_id, .. } => Some(*table_id),
            CopyFromTarget::Rel { members, .. } => Some(members[0].table_id),
        },
        _ => None,
    }
}

pub fn execute_rdf_graph_copy(
    plans: Vec<LogicalPlan>,
    ctx: &CopyExecutionContext<'_>,
) -> Result<u64> {
    debug_assert_eq!(plans.len(), 4);
    let mut checkpoints: Vec<StoreCheckpoint> = Vec::with_capacity(plans.len());
    for plan in &plans {
        if let Some(table) = plan_target_table(plan) {
            checkpoints.push(ctx.storage.checkpoint(table)?);
        }
    }
    let mut plans = plans.into_iter();
    let mut state = RdfGraphLoadState::Init;
    let mut total = 0u64;
    loop {
        state = state.next();
        log::trace!("rdf graph ingest entering {state:?}");
        let outcome = match state {
            RdfGraphLoadState::Init => unreachable!(),
            RdfGraphLoadState::IndexResources => Ok(0),
            RdfGraphLoadState::Done => return Ok(total),
            RdfGraphLoadState::LoadResources
            | RdfGraphLoadState::LoadLiterals
            | RdfGraphLoadState::LoadResourceTriples
            | RdfGraphLoadState::LoadLiteralTriples => {
                let plan = plans.next().expect("four plans for four load states");
                super::execute_copy_plan(plan, ctx)
            }
        };
        match outcome {
            Ok(rows) => total += rows,
            Err(err) => {
                log::warn!("rdf graph ingest aborted in {state:?}: {err}");
                for checkpoint in checkpoints {
                    ctx.storage.restore(checkpoint);
                }
                return Err(err);
            }
        }
    }
}
