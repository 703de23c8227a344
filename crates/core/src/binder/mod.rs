//! The binder: untyped AST in, catalog-resolved statements out.
//!
//! A binder instance reads through one catalog snapshot for the whole
//! statement, so concurrent DDL can never produce a half-resolved binding.
//! All failures here are synchronous and leave the catalog untouched.

mod bind_copy;
mod bind_copy_rdf;
mod bind_ddl;
pub mod expr;
pub mod statement;

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast;
use crate::catalog::CatalogContent;
use crate::error::{BinderError, Result};
use crate::types::{DataChunk, LogicalType};

pub use expr::Expression;
pub use statement::{
    BoundAlterInfo, BoundAlterOp, BoundCopyExtra, BoundCopyFromInfo, BoundCopyToInfo,
    BoundCreateTableData, BoundCreateTableInfo, BoundDropTableInfo, BoundProperty, BoundQuery,
    BoundRdfGraphCopy, BoundScanSource, BoundStatement, QuerySource, RelCopyMember,
    REL_FROM_COLUMN, REL_TO_COLUMN,
};

/// Binds the read queries embedded in COPY statements. Implemented by the
/// read-query frontend, which lives outside this crate.
pub trait QueryBinder {
    fn bind_query(&self, query: &ast::RegularQuery) -> Result<BoundQuery>;
}

/// An in-memory relation registered with the connection, addressable as a
/// COPY source by name.
#[derive(Clone)]
pub struct ObjectHandle {
    pub columns: Vec<(String, LogicalType)>,
    pub chunks: Arc<Vec<DataChunk>>,
}

#[derive(Clone, Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, ObjectHandle>,
}

impl ObjectRegistry {
    pub fn new() -> ObjectRegistry {
        ObjectRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handle: ObjectHandle) {
        self.objects.insert(name.into(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ObjectHandle> {
        self.objects.get(name)
    }
}

pub struct Binder<'a> {
    catalog: Arc<CatalogContent>,
    objects: Option<&'a ObjectRegistry>,
    query_binder: Option<&'a dyn QueryBinder>,
}

impl<'a> Binder<'a> {
    pub fn new(catalog: Arc<CatalogContent>) -> Binder<'a> {
        Binder {
            catalog,
            objects: None,
            query_binder: None,
        }
    }

    pub fn with_objects(mut self, objects: &'a ObjectRegistry) -> Binder<'a> {
        self.objects = Some(objects);
        self
    }

    pub fn with_query_binder(mut self, query_binder: &'a dyn QueryBinder) -> Binder<'a> {
        self.query_binder = Some(query_binder);
        self
    }

    pub fn catalog(&self) -> &CatalogContent {
        &self.catalog
    }

    pub fn bind(&self, statement: &ast::Statement) -> Result<BoundStatement> {
        match statement {
            ast::Statement::CreateTable(info) => self.bind_create_table(info),
            ast::Statement::DropTable { table_name } => self.bind_drop_table(table_name),
            ast::Statement::Alter(info) => self.bind_alter(info),
            ast::Statement::CopyFrom(clause) => self.bind_copy_from(clause),
            ast::Statement::CopyTo(clause) => self.bind_copy_to(clause),
        }
    }

    fn bind_query(&self, query: &ast::RegularQuery) -> Result<BoundQuery> {
        match self.query_binder {
            Some(binder) => binder.bind_query(query),
            None => Err(crate::error::Error::NotImplemented(
                "no read-query frontend is attached to this connection".to_string(),
            )),
        }
    }

    fn object(&self, name: &str) -> Result<ObjectHandle> {
        self.objects
            .and_then(|registry| registry.get(name))
            .cloned()
            .ok_or_else(|| BinderError::UnknownObject(name.to_string()).into())
    }
}
