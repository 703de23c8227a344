use quiver_primitives::{PropertyId, TableId};
use std::path::PathBuf;
use thiserror::Error;

use crate::types::LogicalType;

/// User-visible validation failures raised while binding a statement.
///
/// Binder errors are always returned synchronously at bind time and never
/// mutate the catalog snapshot.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BinderError {
    #[error("{0} already exists in catalog.")]
    TableAlreadyExists(String),
    #[error("Table {0} does not exist.")]
    TableNotFound(String),
    #[error("{name} is not a {expected} table.")]
    UnexpectedTableKind { name: String, expected: &'static str },
    #[error("Duplicated column name: {0}, column name must be unique.")]
    DuplicateColumnName(String),
    #[error("{0} is an internal reserved property name.")]
    ReservedPropertyName(String),
    #[error("Primary key {0} does not match any of the declared properties.")]
    PrimaryKeyNotFound(String),
    #[error("Invalid primary key type: {0}. Expected INT64, STRING or SERIAL.")]
    InvalidPrimaryKeyType(String),
    #[error("Serial property in node table must be the primary key.")]
    SerialNotPrimaryKey,
    #[error("{0} property is not supported in rel table.")]
    ForbiddenRelPropertyType(String),
    #[error("Invalid rel multiplicity string '{0}'.")]
    InvalidMultiplicity(String),
    #[error("Rel table group {0} declares no (src, dst) pairs.")]
    EmptyRelGroup(String),
    #[error("RDF graph {0} does not accept user-declared properties.")]
    RdfGraphWithProperties(String),
    #[error("Table {table} doesn't have property {property}.")]
    PropertyNotFound { table: String, property: String },
    #[error("Table {table} already has property {property}.")]
    PropertyAlreadyExists { table: String, property: String },
    #[error("Cannot {operation} property on table {table} with type {kind}.")]
    AlterOnCompositeTable {
        operation: &'static str,
        table: String,
        kind: &'static str,
    },
    #[error("Cannot drop primary key of a node table.")]
    DropPrimaryKeyForbidden,
    #[error("Cannot delete node table {table} referenced by rel table {referenced_by}.")]
    NodeTableReferenced { table: String, referenced_by: String },
    #[error("Cannot delete rel table {table} referenced by rel group {referenced_by}.")]
    RelTableReferenced { table: String, referenced_by: String },
    #[error("Unrecognized parsing option: {0}.")]
    UnknownOption(String),
    #[error("Invalid value '{value}' for parsing option {option}.")]
    InvalidOptionValue { option: String, value: String },
    #[error("Parsing options are only supported for CSV files.")]
    OptionsOnlyForCsv,
    #[error("Cannot infer file type from path {0}.")]
    UnknownFileExtension(String),
    #[error("Copying multiple file types in one statement is not supported.")]
    MixedFileTypes,
    #[error("COPY FROM npy files requires the BY COLUMN keyword.")]
    NpyRequiresByColumn,
    #[error("BY COLUMN is only valid when copying from npy files.")]
    ByColumnNotAllowed,
    #[error("Number of npy files is not equal to number of properties in table {table}: expected {expected}, got {actual}.")]
    NpyFileCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("Copy npy files to a rel table {0} is not supported.")]
    NpyIntoRelTable(String),
    #[error("COPY TO currently only supports csv and parquet files.")]
    UnsupportedCopyToFormat(String),
    #[error("Expression of type {actual} cannot be implicitly cast to {expected}.")]
    CannotImplicitCast { actual: String, expected: String },
    #[error("Cannot parse data type name {0}.")]
    UnknownDataType(String),
    #[error("No object named {0} is registered with this connection.")]
    UnknownObject(String),
    #[error("Table {0} is not part of an RDF graph; Turtle files can only be copied into RDF tables.")]
    TurtleIntoNonRdfTable(String),
    #[error("COPY into RDF graph {0} requires Turtle files.")]
    RdfGraphRequiresTurtle(String),
    #[error("Query source of COPY declares {actual} columns but table {table} expects {expected}.")]
    QueryColumnCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
}

/// Internal-consistency violations raised by catalog operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Table {0} already exists in catalog.")]
    Duplicate(String),
    #[error("Table with id {0} not found in catalog.")]
    IdNotFound(TableId),
    #[error("Table {0} not found in catalog.")]
    NameNotFound(String),
    #[error("Property with id {property} not found in table {table}.")]
    PropertyIdNotFound { table: String, property: PropertyId },
    #[error("Cannot drop table {table}: referenced by {referenced_by}.")]
    Referenced { table: String, referenced_by: String },
    #[error("Invalid primary key type {0} for a node table.")]
    InvalidPrimaryKey(String),
    #[error("Serial property in node table must be the primary key.")]
    SerialNotPrimaryKey,
    #[error("Property name {0} is reserved.")]
    ReservedName(String),
    #[error("Table {table} referenced as {role} is not a live node table.")]
    BadTableRef { table: TableId, role: &'static str },
    #[error("Type {0} is not allowed on a rel table.")]
    ForbiddenType(String),
    #[error("Cannot drop the primary key property of a node table.")]
    DropPkForbidden,
    #[error("Another transaction holds the catalog write version.")]
    WriteVersionBusy,
    #[error("Transaction {0} holds no catalog write version.")]
    NoWriteVersion(u64),
}

/// Failures raised by the in-memory storage layer during bulk load.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StorageError {
    #[error("Table with id {0} has no storage allocated.")]
    UnknownTable(TableId),
    #[error("Duplicated primary key {key} in table {table}.")]
    DuplicateKey { table: String, key: String },
    #[error("Multiplicity constraint of rel table {table} violated: node {offset} already has a {direction} edge.")]
    MultiplicityViolation {
        table: String,
        direction: String,
        offset: u64,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Binder exception: {0}")]
    Binder(#[from] BinderError),
    #[error("Catalog exception: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Storage exception: {0}")]
    Storage(#[from] StorageError),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("IO exception: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse {value:?} as {dtype} on line {row} of {file}.")]
    ParseData {
        file: String,
        row: u64,
        value: String,
        dtype: LogicalType,
    },
    #[error("Primary key {key} of table {table} not found during rel ingest.")]
    KeyNotFound { table: String, key: String },
    #[error("Catalog file {0} is corrupt: bad magic bytes.")]
    CorruptCatalog(PathBuf),
    #[error("Storage version mismatch: file has {saved}, expected {expected}.")]
    VersionMismatch { saved: u32, expected: u32 },
    #[error("Statement interrupted.")]
    Interrupted,
    #[error("CSV exception: {0}")]
    Csv(#[from] csv::Error),
    #[error("Parquet exception: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the failure indicates corrupt or mismatched durable state,
    /// which callers treat as fatal at startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Error::CorruptCatalog(_) | Error::VersionMismatch { .. })
    }
}
