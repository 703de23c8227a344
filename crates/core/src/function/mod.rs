//! Morsel-driven catalog inspection functions: `show_tables`, `table_info`,
//! and `show_connection`.
//!
//! Each function binds against a catalog snapshot into a fixed row set,
//! then workers drain it morsel by morsel through the shared state also
//! used by the COPY readers.

use crate::catalog::{CatalogContent, TableKind};
use crate::copy::CallFuncSharedState;
use crate::error::{BinderError, Result};
use crate::types::{DataChunk, LogicalType, Value, CHUNK_CAPACITY};

/// A bound table function: output columns plus the materialized rows the
/// morsel cursor walks.
pub struct BoundTableFunction {
    columns: Vec<(String, LogicalType)>,
    rows: Vec<Vec<Value>>,
    shared: CallFuncSharedState,
}

impl BoundTableFunction {
    fn new(columns: Vec<(String, LogicalType)>, rows: Vec<Vec<Value>>) -> BoundTableFunction {
        let max_offset = rows.len() as u64;
        BoundTableFunction {
            columns,
            rows,
            shared: CallFuncSharedState::new(max_offset),
        }
    }

    pub fn columns(&self) -> &[(String, LogicalType)] {
        &self.columns
    }

    /// The next output chunk, or `None` once every morsel is drained.
    pub fn next_chunk(&self) -> Option<DataChunk> {
        let morsel = self.shared.next_morsel(CHUNK_CAPACITY as u64)?;
        let mut chunk = DataChunk::new(self.columns.len());
        for offset in morsel.start_offset..morsel.end_offset {
            chunk.push_row(self.rows[offset as usize].clone());
        }
        Some(chunk)
    }
}

/// `CALL show_tables()`: every table with its kind and comment.
pub fn show_tables(catalog: &CatalogContent) -> BoundTableFunction {
    let columns = vec![
        ("name".to_string(), LogicalType::String),
        ("type".to_string(), LogicalType::String),
        ("comment".to_string(), LogicalType::String),
    ];
    let rows = catalog
        .tables()
        .map(|schema| {
            vec![
                Value::String(schema.name.clone()),
                Value::String(schema.kind.name().to_string()),
                Value::String(schema.comment.clone()),
            ]
        })
        .collect();
    BoundTableFunction::new(columns, rows)
}

/// `CALL table_info(name)`: one row per user-visible property. Node tables
/// get an extra `primary key` column; the internal rel `ID` property is
/// hidden.
pub fn table_info(catalog: &CatalogContent, table_name: &str) -> Result<BoundTableFunction> {
    let id = catalog
        .lookup(table_name)
        .ok_or_else(|| BinderError::TableNotFound(table_name.to_string()))?;
    let schema = catalog.get(id);
    let mut columns = vec![
        ("property id".to_string(), LogicalType::Int64),
        ("name".to_string(), LogicalType::String),
        ("type".to_string(), LogicalType::String),
    ];
    if schema.kind.is_node() {
        columns.push(("primary key".to_string(), LogicalType::Bool));
    }
    let mut rows = Vec::with_capacity(schema.properties.len());
    for property in &schema.properties {
        if schema.kind.is_rel() && property.name.eq_ignore_ascii_case("id") {
            continue;
        }
        let mut row = vec![
            Value::Int64(property.id.0 as i64),
            Value::String(property.name.clone()),
            Value::String(property.dtype.to_string()),
        ];
        if let TableKind::Node(node) = &schema.kind {
            row.push(Value::Bool(node.primary_key_pid == property.id));
        }
        rows.push(row);
    }
    Ok(BoundTableFunction::new(columns, rows))
}

/// `CALL show_connection(name)`: the `(src, dst)` table names of a rel
/// table, or of every member of a rel group.
pub fn show_connection(catalog: &CatalogContent, table_name: &str) -> Result<BoundTableFunction> {
    let id = catalog
        .lookup(table_name)
        .ok_or_else(|| BinderError::TableNotFound(table_name.to_string()))?;
    let schema = catalog.get(id);
    let rel_ids: Vec<_> = match &schema.kind {
        TableKind::Rel(_) => vec![id],
        TableKind::RelGroup(group) => group.rel_tables.clone(),
        _ => {
            return Err(BinderError::UnexpectedTableKind {
                name: table_name.to_string(),
                expected: "rel",
            }
            .into())
        }
    };
    let columns = vec![
        ("source table name".to_string(), LogicalType::String),
        ("destination table name".to_string(), LogicalType::String),
    ];
    let rows = rel_ids
        .into_iter()
        .map(|rel_id| {
            let rel = catalog.get(rel_id).kind.as_rel().expect("member is a rel table");
            vec![
                Value::String(catalog.get(rel.src_table).name.clone()),
                Value::String(catalog.get(rel.dst_table).name.clone()),
            ]
        })
        .collect();
    Ok(BoundTableFunction::new(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RelMultiplicity;
    use pretty_assertions::assert_eq;

    fn sample_catalog() -> CatalogContent {
        let mut catalog = CatalogContent::new();
        let person = catalog
            .add_node_table(
                "Person",
                0,
                vec![
                    ("id".to_string(), LogicalType::Int64),
                    ("name".to_string(), LogicalType::String),
                ],
            )
            .unwrap();
        catalog
            .add_rel_table(
                "Knows",
                RelMultiplicity::ManyMany,
                person,
                person,
                vec![("since".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        catalog
    }

    fn drain(function: &BoundTableFunction) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(chunk) = function.next_chunk() {
            for i in 0..chunk.num_rows() {
                rows.push(chunk.row(i));
            }
        }
        rows
    }

    #[test]
    fn show_tables_lists_all_kinds() {
        let catalog = sample_catalog();
        let function = show_tables(&catalog);
        let rows = drain(&function);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Value::String("Person".into()));
        assert_eq!(rows[0][1], Value::String("NODE".into()));
        assert_eq!(rows[1][1], Value::String("REL".into()));
    }

    #[test]
    fn table_info_marks_the_primary_key_and_hides_internal_id() {
        let catalog = sample_catalog();

        let info = table_info(&catalog, "Person").unwrap();
        let rows = drain(&info);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][3], Value::Bool(true));
        assert_eq!(rows[1][3], Value::Bool(false));

        let info = table_info(&catalog, "Knows").unwrap();
        let rows = drain(&info);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::String("since".into()));
    }

    #[test]
    fn show_connection_requires_a_rel_table() {
        let catalog = sample_catalog();
        let connection = show_connection(&catalog, "Knows").unwrap();
        let rows = drain(&connection);
        assert_eq!(
            rows,
            vec![vec![
                Value::String("Person".into()),
                Value::String("Person".into())
            ]]
        );
        assert!(show_connection(&catalog, "Person").is_err());
    }
}
