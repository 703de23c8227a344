//! The typed statement tree: every name resolved, every expression typed.

use quiver_primitives::{PropertyId, TableId};
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::RelMultiplicity;
use crate::error::Result;
use crate::reader::{CsvOptions, FileType, RdfReaderMode, ReaderConfig};
use crate::types::{DataChunk, LogicalType};

use super::expr::Expression;

/// Name of the synthetic source-key column prepended to rel COPY inputs.
pub const REL_FROM_COLUMN: &str = "from";
/// Name of the synthetic destination-key column prepended to rel COPY inputs.
pub const REL_TO_COLUMN: &str = "to";

pub enum BoundStatement {
    CreateTable(BoundCreateTableInfo),
    DropTable(BoundDropTableInfo),
    Alter(BoundAlterInfo),
    CopyFrom(BoundCopyFromInfo),
    CopyTo(BoundCopyToInfo),
}

pub type BoundProperty = (String, LogicalType);

#[derive(Clone, Debug, PartialEq)]
pub struct BoundCreateTableInfo {
    pub table_name: String,
    pub data: BoundCreateTableData,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundCreateTableData {
    Node {
        primary_key_idx: usize,
        properties: Vec<BoundProperty>,
    },
    Rel {
        multiplicity: RelMultiplicity,
        src_table: TableId,
        dst_table: TableId,
        properties: Vec<BoundProperty>,
    },
    RelGroup {
        multiplicity: RelMultiplicity,
        src_dst_pairs: Vec<(TableId, TableId)>,
        properties: Vec<BoundProperty>,
        /// One synthesized rel-table binding per pair, in pair order.
        children: Vec<BoundCreateTableInfo>,
    },
    RdfGraph,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundDropTableInfo {
    pub table_id: TableId,
    pub table_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundAlterInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub op: BoundAlterOp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundAlterOp {
    RenameTable {
        new_name: String,
    },
    AddProperty {
        property_name: String,
        dtype: LogicalType,
        default_value: Expression,
    },
    DropProperty {
        property_id: PropertyId,
    },
    RenameProperty {
        property_id: PropertyId,
        new_name: String,
    },
}

/// A chunk-producing handle over a bound read query. The read planner and
/// executor live outside this crate; COPY drains this interface.
pub trait QuerySource: Send + Sync {
    fn next_chunk(&self) -> Result<Option<DataChunk>>;
}

/// A read query after binding: its output columns plus the source to drain.
#[derive(Clone)]
pub struct BoundQuery {
    pub columns: Vec<(String, LogicalType)>,
    pub source: Arc<dyn QuerySource>,
}

/// Where the rows of a bound COPY FROM come from.
#[derive(Clone)]
pub enum BoundScanSource {
    File(ReaderConfig),
    Object(Arc<Vec<DataChunk>>),
    Query(BoundQuery),
}

impl BoundScanSource {
    pub fn is_file(&self) -> bool {
        matches!(self, BoundScanSource::File(_))
    }
}

/// Rel COPY resolves source keys against one or more member tables: exactly
/// one for a plain rel table, one per `(src, dst)` pair for a rel group.
#[derive(Clone, Debug, PartialEq)]
pub struct RelCopyMember {
    pub table_id: TableId,
    pub table_name: String,
    pub src_table: TableId,
    pub dst_table: TableId,
}

pub enum BoundCopyExtra {
    /// Plain node-table copy.
    None,
    /// RDF node ingest: `Resource` or `Literal` mode.
    RdfNode { mode: RdfReaderMode },
    /// Edge ingest through index lookup and the partitioner.
    Rel { members: Vec<RelCopyMember> },
    /// RDF triple ingest: offsets resolved against the graph's resource
    /// table index.
    RdfRel {
        resource_table: TableId,
        mode: RdfReaderMode,
        member: RelCopyMember,
    },
    /// Whole-graph ingest: four sequential sub-copies in fixed order.
    RdfGraph(Box<BoundRdfGraphCopy>),
}

pub struct BoundRdfGraphCopy {
    pub resource: BoundCopyFromInfo,
    pub literal: BoundCopyFromInfo,
    pub resource_triple: BoundCopyFromInfo,
    pub literal_triple: BoundCopyFromInfo,
}

pub struct BoundCopyFromInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub source: BoundScanSource,
    /// The expected source columns `(name, type)` in reader order.
    pub columns: Vec<(String, LogicalType)>,
    pub contains_serial: bool,
    pub extra: BoundCopyExtra,
}

pub struct BoundCopyToInfo {
    pub query: BoundQuery,
    pub path: PathBuf,
    pub file_type: FileType,
    pub csv: CsvOptions,
}
