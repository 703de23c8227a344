//! COPY plan shapes.
//!
//! Node load:          ScanSource → CopyFrom(NodeWriter)
//! RDF resource load:  ScanSource → Distinct → CopyFrom(NodeWriter)
//! Rel load:           ScanSource → IndexLookup → Partition → CopyFrom(RelWriter)
//! Triple load:        ScanSource → Partition → CopyFrom(RelWriter)
//! Sub-query sources insert the bound query plan plus an Accumulate in
//! place of the scan.

use crate::binder::statement::{
    BoundCopyExtra, BoundCopyFromInfo, BoundCopyToInfo, BoundScanSource,
};
use crate::binder::Expression;
use crate::error::Result;
use crate::reader::RdfReaderMode;

use super::operator::{CopyFromTarget, LogicalOperator, LogicalPlan, PlannedStatement};

pub fn plan_copy_from(info: BoundCopyFromInfo) -> Result<PlannedStatement> {
    match info.extra {
        BoundCopyExtra::RdfGraph(graph) => {
            let plans = vec![
                plan_single_copy(graph.resource)?,
                plan_single_copy(graph.literal)?,
                plan_single_copy(graph.resource_triple)?,
                plan_single_copy(graph.literal_triple)?,
            ];
            Ok(PlannedStatement::RdfGraphCopy(plans))
        }
        _ => Ok(PlannedStatement::Plan(plan_single_copy(info)?)),
    }
}

fn scan_operator(source: BoundScanSource, columns: Vec<(String, crate::types::LogicalType)>) -> LogicalOperator {
    let is_query = matches!(source, BoundScanSource::Query(_));
    let scan = LogicalOperator::ScanSource { source, columns };
    if is_query {
        LogicalOperator::Accumulate {
            child: Box::new(scan),
        }
    } else {
        scan
    }
}

fn plan_single_copy(info: BoundCopyFromInfo) -> Result<LogicalPlan> {
    let BoundCopyFromInfo {
        table_id,
        table_name,
        source,
        columns,
        contains_serial,
        extra,
    } = info;
    let scan = scan_operator(source, columns.clone());
    let root = match extra {
        BoundCopyExtra::None => {
            let projection = LogicalOperator::Projection {
                child: Box::new(scan),
                exprs: columns
                    .iter()
                    .map(|(name, dtype)| Expression::variable(name.clone(), dtype.clone()))
                    .collect(),
            };
            LogicalOperator::CopyFrom {
                child: Box::new(projection),
                info: CopyFromTarget::Node {
                    table_id,
                    table_name,
                    columns,
                    contains_serial,
                },
            }
        }
        BoundCopyExtra::RdfNode { mode } => {
            // A Turtle file mentions the same IRI many times; the resource
            // table sees each exactly once.
            let child = if mode == RdfReaderMode::Resource {
                LogicalOperator::Distinct {
                    child: Box::new(scan),
                }
            } else {
                scan
            };
            LogicalOperator::CopyFrom {
                child: Box::new(child),
                info: CopyFromTarget::Node {
                    table_id,
                    table_name,
                    columns,
                    contains_serial,
                },
            }
        }
        BoundCopyExtra::Rel { members } => {
            let lookup = LogicalOperator::IndexLookup {
                child: Box::new(scan),
                members: members.clone(),
            };
            let partition = LogicalOperator::Partition {
                child: Box::new(lookup),
                members: members.clone(),
            };
            LogicalOperator::CopyFrom {
                child: Box::new(partition),
                info: CopyFromTarget::Rel {
                    table_name,
                    members,
                    columns,
                    rdf_mode: None,
                },
            }
        }
        BoundCopyExtra::RdfRel { mode, member, .. } => {
            // The Turtle triple reader resolves keys against the resource
            // index itself, so no lookup operator is planned here.
            let members = vec![member];
            let partition = LogicalOperator::Partition {
                child: Box::new(scan),
                members: members.clone(),
            };
            LogicalOperator::CopyFrom {
                child: Box::new(partition),
                info: CopyFromTarget::Rel {
                    table_name,
                    members,
                    columns,
                    rdf_mode: Some(mode),
                },
            }
        }
        BoundCopyExtra::RdfGraph(_) => unreachable!("graph copies split before planning"),
    };
    Ok(LogicalPlan::new(root))
}

pub fn plan_copy_to(info: BoundCopyToInfo) -> Result<PlannedStatement> {
    let scan = LogicalOperator::ScanSource {
        source: BoundScanSource::Query(info.query.clone()),
        columns: info.query.columns.clone(),
    };
    let root = LogicalOperator::CopyTo {
        child: Box::new(scan),
        info,
    };
    Ok(PlannedStatement::Plan(LogicalPlan::new(root)))
}
