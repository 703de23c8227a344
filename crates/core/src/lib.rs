//! quiver-core: the catalog, binder, and bulk-ingestion core of an embedded
//! property-graph database.
//!
//! The crate covers the write-side spine of the engine:
//!
//! - [`catalog`]: the versioned schema registry for node, rel, rel-group,
//!   and RDF-graph tables, with durable single-file serialization.
//! - [`binder`]: untyped parser AST in, typed catalog-resolved statements
//!   out.
//! - [`planner`]: bound statements to logical operator DAGs.
//! - [`copy`]: the bulk COPY pipeline: morsel-parallel scans, primary-key
//!   index lookup, the per-direction relationship partitioner, RDF graph
//!   ingest, and CSV/Parquet export.
//! - [`reader`]: CSV, Parquet, npy, and Turtle source readers.
//! - [`storage`]: the in-memory reference implementation of the storage
//!   collaborator the pipeline writes into.
//!
//! [`db::GraphDb`] wires the pieces into an embeddable database handle.

pub mod ast;
pub mod binder;
pub mod catalog;
pub mod copy;
pub mod db;
pub mod error;
pub mod function;
pub mod planner;
pub mod reader;
pub mod storage;
pub mod transaction;
pub mod types;

pub use db::{ExecutionResult, GraphDb};
pub use error::{BinderError, CatalogError, Error, Result, StorageError};
