//! The untyped statement tree emitted by the surface parser.
//!
//! The Cypher text parser lives outside this crate; these structures are its
//! output contract. Nothing in here is resolved against the catalog: names
//! are strings, types are their DDL spellings, and the binder turns the lot
//! into a typed [`crate::binder::BoundStatement`].

/// A statement as parsed, before binding.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableInfo),
    DropTable { table_name: String },
    Alter(AlterInfo),
    CopyFrom(CopyFromClause),
    CopyTo(CopyToClause),
}

/// Which flavor of `CREATE ... TABLE` was written.
#[derive(Clone, Debug, PartialEq)]
pub enum CreateTableKind {
    Node {
        primary_key: String,
    },
    Rel {
        multiplicity: String,
        src_table: String,
        dst_table: String,
    },
    RelGroup {
        multiplicity: String,
        src_dst_pairs: Vec<(String, String)>,
    },
    RdfGraph,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateTableInfo {
    pub table_name: String,
    /// `(name, type text)` pairs in declaration order.
    pub properties: Vec<(String, String)>,
    pub kind: CreateTableKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterInfo {
    pub table_name: String,
    pub op: AlterOp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlterOp {
    RenameTable {
        new_name: String,
    },
    AddProperty {
        property_name: String,
        dtype: String,
        default_value: Option<ParsedExpr>,
    },
    DropProperty {
        property_name: String,
    },
    RenameProperty {
        property_name: String,
        new_name: String,
    },
}

/// A literal expression as parsed. The binder types it and casts it to the
/// declared column type; COPY only ever needs literals here.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedExpr {
    Null,
    Boolean(bool),
    Integer(i64),
    FloatingPoint(f64),
    StringLiteral(String),
}

/// Where the rows of a `COPY ... FROM` come from.
#[derive(Clone, Debug, PartialEq)]
pub enum CopySource {
    Files(Vec<String>),
    /// A registered in-memory object, referenced by name.
    Object(String),
    /// A sub-query whose result set is loaded.
    Query(RegularQuery),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CopyFromClause {
    pub table_name: String,
    pub source: CopySource,
    /// `(key, value)` parsing options, validated against a closed set at bind
    /// time.
    pub parsing_options: Vec<(String, String)>,
    pub by_column: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CopyToClause {
    pub query: RegularQuery,
    pub file_path: String,
    pub parsing_options: Vec<(String, String)>,
}

/// The inner read query of `COPY (<query>) TO`. Its structure belongs to the
/// surface parser and the read-query planner; this subsystem carries the raw
/// text and hands it to the [`crate::binder::QueryBinder`] collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct RegularQuery {
    pub text: String,
}
