//! Logical operators for DDL and bulk-load plans.

use quiver_primitives::TableId;

use crate::binder::statement::{
    BoundAlterInfo, BoundCopyToInfo, BoundCreateTableInfo, BoundDropTableInfo, BoundScanSource,
    RelCopyMember,
};
use crate::binder::Expression;
use crate::reader::RdfReaderMode;
use crate::types::LogicalType;

/// One operator in a bulk-load DAG. Children are executed before parents;
/// chunks flow child to parent.
pub enum LogicalOperator {
    /// Leaf: scan a file set, a registered object, or a bound sub-query.
    ScanSource {
        source: BoundScanSource,
        columns: Vec<(String, LogicalType)>,
    },
    /// Materializes and flattens a sub-query's result before the writer.
    Accumulate { child: Box<LogicalOperator> },
    /// Shapes scanned columns for the writer. Bulk load only ever needs the
    /// identity projection over the expected file columns.
    Projection {
        child: Box<LogicalOperator>,
        exprs: Vec<Expression>,
    },
    /// Row-wise deduplication; the RDF resource plan depends on it.
    Distinct { child: Box<LogicalOperator> },
    /// Resolves external keys to node offsets through the primary-key index.
    IndexLookup {
        child: Box<LogicalOperator>,
        members: Vec<RelCopyMember>,
    },
    /// Buckets resolved edge tuples per direction and bound node table.
    Partition {
        child: Box<LogicalOperator>,
        members: Vec<RelCopyMember>,
    },
    /// Sink: write chunks into the target table.
    CopyFrom {
        child: Box<LogicalOperator>,
        info: CopyFromTarget,
    },
    /// Sink: export a query result to a file.
    CopyTo {
        child: Box<LogicalOperator>,
        info: BoundCopyToInfo,
    },
    CreateTable(BoundCreateTableInfo),
    DropTable(BoundDropTableInfo),
    Alter(BoundAlterInfo),
}

/// What the terminal CopyFrom writes into.
pub enum CopyFromTarget {
    Node {
        table_id: TableId,
        table_name: String,
        /// Column order matches the scan's expected columns; the writer maps
        /// them onto the table's file-facing properties positionally.
        columns: Vec<(String, LogicalType)>,
        contains_serial: bool,
    },
    Rel {
        table_name: String,
        members: Vec<RelCopyMember>,
        columns: Vec<(String, LogicalType)>,
        /// Set for triple-table ingest, whose keys are pre-resolved offsets.
        rdf_mode: Option<RdfReaderMode>,
    },
}

pub struct LogicalPlan {
    pub root: LogicalOperator,
}

impl LogicalPlan {
    pub fn new(root: LogicalOperator) -> LogicalPlan {
        LogicalPlan { root }
    }
}

/// A planned statement: most statements are one DAG; an RDF graph COPY is
/// four, executed strictly in order.
pub enum PlannedStatement {
    Plan(LogicalPlan),
    /// resource, literal, resource-triple, literal-triple.
    RdfGraphCopy(Vec<LogicalPlan>),
}
