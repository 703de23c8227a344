//! Binding of COPY FROM and COPY TO.

use itertools::Itertools as _;
use std::path::PathBuf;

use crate::ast;
use crate::catalog::{TableKind, TableSchema};
use crate::error::{BinderError, Result};
use crate::reader::{CsvOptions, FileType, ReaderConfig};
use crate::types::LogicalType;

use super::statement::{
    BoundCopyExtra, BoundCopyFromInfo, BoundCopyToInfo, BoundQuery, BoundScanSource,
    BoundStatement, RelCopyMember, REL_FROM_COLUMN, REL_TO_COLUMN,
};
use super::Binder;

/// npy sources must be loaded column-at-a-time; everything else row-wise.
fn validate_by_column_keyword(file_type: FileType, by_column: bool) -> Result<()> {
    if file_type == FileType::Npy && !by_column {
        return Err(BinderError::NpyRequiresByColumn.into());
    }
    if file_type != FileType::Npy && by_column {
        return Err(BinderError::ByColumnNotAllowed.into());
    }
    Ok(())
}

impl Binder<'_> {
    pub(super) fn bind_copy_from(&self, clause: &ast::CopyFromClause) -> Result<BoundStatement> {
        let schema = self.resolve_table(&clause.table_name)?;
        let info = match &clause.source {
            ast::CopySource::Files(paths) => self.bind_copy_from_files(clause, schema, paths)?,
            ast::CopySource::Object(name) => self.bind_copy_from_object(clause, schema, name)?,
            ast::CopySource::Query(query) => self.bind_copy_from_query(clause, schema, query)?,
        };
        Ok(BoundStatement::CopyFrom(info))
    }

    fn bind_copy_from_files(
        &self,
        clause: &ast::CopyFromClause,
        schema: &TableSchema,
        paths: &[String],
    ) -> Result<BoundCopyFromInfo> {
        let file_type = infer_common_file_type(paths)?;
        validate_by_column_keyword(file_type, clause.by_column)?;
        let csv = self.bind_parsing_options(file_type, &clause.parsing_options)?;
        if file_type == FileType::Npy {
            let expected = schema.file_facing_properties().count();
            if paths.len() != expected {
                return Err(BinderError::NpyFileCountMismatch {
                    table: schema.name.clone(),
                    expected,
                    actual: paths.len(),
                }
                .into());
            }
            if schema.kind.is_rel() || schema.kind.is_rel_group() {
                return Err(BinderError::NpyIntoRelTable(schema.name.clone()).into());
            }
        }
        let mut config = ReaderConfig::new(
            file_type,
            paths.iter().map(PathBuf::from).collect(),
        );
        config.csv = csv;
        match &schema.kind {
            TableKind::Node(_) => {
                if file_type == FileType::Turtle {
                    self.bind_copy_rdf_node_from(config, schema)
                } else {
                    self.bind_copy_node_from(config, schema)
                }
            }
            TableKind::Rel(_) | TableKind::RelGroup(_) => {
                if file_type == FileType::Turtle {
                    self.bind_copy_rdf_rel_from(config, schema)
                } else {
                    self.bind_copy_rel_from(BoundScanSource::File(config), schema)
                }
            }
            TableKind::Rdf(_) => {
                if file_type != FileType::Turtle {
                    return Err(BinderError::RdfGraphRequiresTurtle(schema.name.clone()).into());
                }
                self.bind_copy_rdf_graph_from(config, schema)
            }
        }
    }

    fn bind_parsing_options(
        &self,
        file_type: FileType,
        options: &[(String, String)],
    ) -> Result<CsvOptions> {
        if file_type != FileType::Csv {
            if !options.is_empty() {
                return Err(BinderError::OptionsOnlyForCsv.into());
            }
            return Ok(CsvOptions::default());
        }
        Ok(CsvOptions::from_options(options)?)
    }

    /// Plain node-table load from CSV, Parquet, or npy files.
    fn bind_copy_node_from(
        &self,
        config: ReaderConfig,
        schema: &TableSchema,
    ) -> Result<BoundCopyFromInfo> {
        let columns = expected_node_file_columns(schema, config.file_type);
        Ok(BoundCopyFromInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
            source: BoundScanSource::File(config),
            columns,
            contains_serial: schema.contains_serial_property(),
            extra: BoundCopyExtra::None,
        })
    }

    /// Edge load: the synthetic key columns come first, then the properties.
    fn bind_copy_rel_from(
        &self,
        source: BoundScanSource,
        schema: &TableSchema,
    ) -> Result<BoundCopyFromInfo> {
        let members = self.rel_copy_members(schema);
        let file_type = match &source {
            BoundScanSource::File(config) => config.file_type,
            _ => FileType::Csv,
        };
        let columns = self.expected_rel_file_columns(schema, &members, file_type);
        Ok(BoundCopyFromInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
            source,
            columns,
            contains_serial: schema.contains_serial_property(),
            extra: BoundCopyExtra::Rel { members },
        })
    }

    /// The member tables edge rows may land in: the table itself, or every
    /// child of a rel group.
    fn rel_copy_members(&self, schema: &TableSchema) -> Vec<RelCopyMember> {
        let member_of = |id: quiver_primitives::TableId| {
            let child = self.catalog.get(id);
            let rel = child.kind.as_rel().expect("rel group child must be a rel table");
            RelCopyMember {
                table_id: child.id,
                table_name: child.name.clone(),
                src_table: rel.src_table,
                dst_table: rel.dst_table,
            }
        };
        match &schema.kind {
            TableKind::Rel(_) => vec![member_of(schema.id)],
            TableKind::RelGroup(group) => group.rel_tables.iter().copied().map(member_of).collect(),
            _ => unreachable!("rel copy over a non-rel table"),
        }
    }

    fn expected_rel_file_columns(
        &self,
        schema: &TableSchema,
        members: &[RelCopyMember],
        file_type: FileType,
    ) -> Vec<(String, LogicalType)> {
        let prop_source = match &schema.kind {
            TableKind::RelGroup(group) => self.catalog.get(group.rel_tables[0]),
            _ => schema,
        };
        let mut columns = vec![
            (
                REL_FROM_COLUMN.to_string(),
                self.common_pk_type(members, file_type, |m| m.src_table),
            ),
            (
                REL_TO_COLUMN.to_string(),
                self.common_pk_type(members, file_type, |m| m.dst_table),
            ),
        ];
        for property in prop_source.file_facing_properties() {
            let dtype = match file_type {
                FileType::Csv => property.dtype.clone(),
                _ => LogicalType::ArrowColumn,
            };
            columns.push((property.name.clone(), dtype));
        }
        columns
    }

    /// The key-column type shared by all members on one side; groups whose
    /// members disagree fall back to `STRING` and re-key per member at
    /// lookup time.
    fn common_pk_type(
        &self,
        members: &[RelCopyMember],
        file_type: FileType,
        side: impl Fn(&RelCopyMember) -> quiver_primitives::TableId,
    ) -> LogicalType {
        if file_type != FileType::Csv {
            return LogicalType::ArrowColumn;
        }
        let mut types = members.iter().map(|member| {
            self.catalog
                .get(side(member))
                .primary_key()
                .map(|pk| pk.dtype.clone())
                .unwrap_or(LogicalType::String)
        });
        let first = types.next().unwrap_or(LogicalType::String);
        if types.all(|t| t == first) {
            first
        } else {
            LogicalType::String
        }
    }

    fn bind_copy_from_object(
        &self,
        clause: &ast::CopyFromClause,
        schema: &TableSchema,
        name: &str,
    ) -> Result<BoundCopyFromInfo> {
        if !clause.parsing_options.is_empty() {
            return Err(BinderError::OptionsOnlyForCsv.into());
        }
        if clause.by_column {
            return Err(BinderError::ByColumnNotAllowed.into());
        }
        let handle = self.object(name)?;
        let source = BoundScanSource::Object(handle.chunks.clone());
        self.bind_copy_from_relation(schema, source, handle.columns)
    }

    fn bind_copy_from_query(
        &self,
        clause: &ast::CopyFromClause,
        schema: &TableSchema,
        query: &ast::RegularQuery,
    ) -> Result<BoundCopyFromInfo> {
        if !clause.parsing_options.is_empty() {
            return Err(BinderError::OptionsOnlyForCsv.into());
        }
        if clause.by_column {
            return Err(BinderError::ByColumnNotAllowed.into());
        }
        let bound = self.bind_query(query)?;
        let columns = bound.columns.clone();
        self.bind_copy_from_relation(schema, BoundScanSource::Query(bound), columns)
    }

    /// Shared tail for object and sub-query sources: the incoming relation
    /// must be column-compatible with the target's expected file columns.
    fn bind_copy_from_relation(
        &self,
        schema: &TableSchema,
        source: BoundScanSource,
        incoming: Vec<(String, LogicalType)>,
    ) -> Result<BoundCopyFromInfo> {
        let expected_len = match &schema.kind {
            TableKind::Node(_) => schema.file_facing_properties().count(),
            TableKind::Rel(_) | TableKind::RelGroup(_) => {
                let prop_source = match &schema.kind {
                    TableKind::RelGroup(group) => self.catalog.get(group.rel_tables[0]),
                    _ => schema,
                };
                2 + prop_source.file_facing_properties().count()
            }
            TableKind::Rdf(_) => {
                return Err(BinderError::RdfGraphRequiresTurtle(schema.name.clone()).into())
            }
        };
        if incoming.len() != expected_len {
            return Err(BinderError::QueryColumnCountMismatch {
                table: schema.name.clone(),
                expected: expected_len,
                actual: incoming.len(),
            }
            .into());
        }
        match &schema.kind {
            TableKind::Node(_) => Ok(BoundCopyFromInfo {
                table_id: schema.id,
                table_name: schema.name.clone(),
                source,
                columns: incoming,
                contains_serial: schema.contains_serial_property(),
                extra: BoundCopyExtra::None,
            }),
            _ => self.bind_copy_rel_from(source, schema),
        }
    }

    pub(super) fn bind_copy_to(&self, clause: &ast::CopyToClause) -> Result<BoundStatement> {
        let file_type = FileType::infer(&clause.file_path)?;
        if file_type != FileType::Csv && file_type != FileType::Parquet {
            return Err(BinderError::UnsupportedCopyToFormat(clause.file_path.clone()).into());
        }
        let csv = self.bind_parsing_options(file_type, &clause.parsing_options)?;
        let query: BoundQuery = self.bind_query(&clause.query)?;
        Ok(BoundStatement::CopyTo(BoundCopyToInfo {
            query,
            path: PathBuf::from(&clause.file_path),
            file_type,
            csv,
        }))
    }
}

fn infer_common_file_type(paths: &[String]) -> Result<FileType> {
    let types: Vec<FileType> = paths
        .iter()
        .map(|path| FileType::infer(path))
        .collect::<std::result::Result<_, _>>()?;
    if !types.iter().all_equal() {
        return Err(BinderError::MixedFileTypes.into());
    }
    types
        .first()
        .copied()
        .ok_or_else(|| BinderError::UnknownFileExtension(String::new()).into())
}

pub(super) fn expected_node_file_columns(
    schema: &TableSchema,
    file_type: FileType,
) -> Vec<(String, LogicalType)> {
    schema
        .file_facing_properties()
        .map(|property| {
            let dtype = match file_type {
                FileType::Csv => property.dtype.clone(),
                _ => LogicalType::ArrowColumn,
            };
            (property.name.clone(), dtype)
        })
        .collect()
}
