//! Binding of CREATE, DROP, and ALTER statements.

use std::collections::HashSet;

use quiver_primitives::TableId;

use crate::ast;
use crate::catalog::schema::is_reserved_property_name;
use crate::catalog::{RelMultiplicity, TableKind, TableSchema};
use crate::error::{BinderError, CatalogError, Result};
use crate::types::LogicalType;

use super::expr::{bind_parsed_expr, implicit_cast_if_necessary};
use super::statement::{
    BoundAlterInfo, BoundAlterOp, BoundCreateTableData, BoundCreateTableInfo, BoundDropTableInfo,
    BoundProperty, BoundStatement,
};
use super::Binder;

impl Binder<'_> {
    pub(super) fn bind_create_table(&self, info: &ast::CreateTableInfo) -> Result<BoundStatement> {
        if self.catalog.contains_table(&info.table_name) {
            return Err(BinderError::TableAlreadyExists(info.table_name.clone()).into());
        }
        let bound = match &info.kind {
            ast::CreateTableKind::Node { primary_key } => {
                self.bind_create_node_table(info, primary_key)?
            }
            ast::CreateTableKind::Rel {
                multiplicity,
                src_table,
                dst_table,
            } => self.bind_create_rel_table(
                &info.table_name,
                &info.properties,
                multiplicity,
                src_table,
                dst_table,
            )?,
            ast::CreateTableKind::RelGroup {
                multiplicity,
                src_dst_pairs,
            } => self.bind_create_rel_group(info, multiplicity, src_dst_pairs)?,
            ast::CreateTableKind::RdfGraph => self.bind_create_rdf_graph(info)?,
        };
        Ok(BoundStatement::CreateTable(bound))
    }

    /// Resolves the declared `(name, type text)` pairs, rejecting duplicates
    /// and reserved names.
    fn bind_properties(&self, properties: &[(String, String)]) -> Result<Vec<BoundProperty>> {
        let mut bound = Vec::with_capacity(properties.len());
        let mut seen = HashSet::with_capacity(properties.len());
        for (name, dtype_text) in properties {
            if !seen.insert(name.as_str()) {
                return Err(BinderError::DuplicateColumnName(name.clone()).into());
            }
            if is_reserved_property_name(name) {
                return Err(BinderError::ReservedPropertyName(name.clone()).into());
            }
            bound.push((name.clone(), self.bind_data_type(dtype_text)?));
        }
        Ok(bound)
    }

    fn bind_data_type(&self, text: &str) -> Result<LogicalType> {
        LogicalType::parse(text).ok_or_else(|| BinderError::UnknownDataType(text.to_string()).into())
    }

    fn bind_create_node_table(
        &self,
        info: &ast::CreateTableInfo,
        primary_key: &str,
    ) -> Result<BoundCreateTableInfo> {
        let properties = self.bind_properties(&info.properties)?;
        let primary_key_idx = properties
            .iter()
            .position(|(name, _)| name == primary_key)
            .ok_or_else(|| BinderError::PrimaryKeyNotFound(primary_key.to_string()))?;
        let pk_type = &properties[primary_key_idx].1;
        if !pk_type.is_valid_primary_key() {
            return Err(BinderError::InvalidPrimaryKeyType(pk_type.to_string()).into());
        }
        for (i, (_, dtype)) in properties.iter().enumerate() {
            if dtype.is_serial() && i != primary_key_idx {
                return Err(BinderError::SerialNotPrimaryKey.into());
            }
        }
        Ok(BoundCreateTableInfo {
            table_name: info.table_name.clone(),
            data: BoundCreateTableData::Node {
                primary_key_idx,
                properties,
            },
        })
    }

    fn bind_create_rel_table(
        &self,
        table_name: &str,
        properties: &[(String, String)],
        multiplicity: &str,
        src_table: &str,
        dst_table: &str,
    ) -> Result<BoundCreateTableInfo> {
        let properties = self.bind_properties(properties)?;
        for (_, dtype) in &properties {
            if dtype.is_forbidden_on_rel_table() {
                return Err(BinderError::ForbiddenRelPropertyType(dtype.to_string()).into());
            }
        }
        let multiplicity: RelMultiplicity = multiplicity.parse()?;
        let src_table = self.bind_node_table_id(src_table)?;
        let dst_table = self.bind_node_table_id(dst_table)?;
        Ok(BoundCreateTableInfo {
            table_name: table_name.to_string(),
            data: BoundCreateTableData::Rel {
                multiplicity,
                src_table,
                dst_table,
                properties,
            },
        })
    }

    fn bind_create_rel_group(
        &self,
        info: &ast::CreateTableInfo,
        multiplicity: &str,
        src_dst_pairs: &[(String, String)],
    ) -> Result<BoundCreateTableInfo> {
        if src_dst_pairs.is_empty() {
            return Err(BinderError::EmptyRelGroup(info.table_name.clone()).into());
        }
        let mut children = Vec::with_capacity(src_dst_pairs.len());
        let mut pairs = Vec::with_capacity(src_dst_pairs.len());
        for (src_name, dst_name) in src_dst_pairs {
            let child_name = format!("{}_{}_{}", info.table_name, src_name, dst_name);
            if self.catalog.contains_table(&child_name) {
                return Err(BinderError::TableAlreadyExists(child_name).into());
            }
            let child = self.bind_create_rel_table(
                &child_name,
                &info.properties,
                multiplicity,
                src_name,
                dst_name,
            )?;
            let BoundCreateTableData::Rel {
                src_table,
                dst_table,
                ..
            } = &child.data
            else {
                unreachable!("rel binding produced a non-rel child");
            };
            pairs.push((*src_table, *dst_table));
            children.push(child);
        }
        let properties = match &children[0].data {
            BoundCreateTableData::Rel { properties, .. } => properties.clone(),
            _ => unreachable!(),
        };
        Ok(BoundCreateTableInfo {
            table_name: info.table_name.clone(),
            data: BoundCreateTableData::RelGroup {
                multiplicity: multiplicity.parse()?,
                src_dst_pairs: pairs,
                properties,
                children,
            },
        })
    }

    fn bind_create_rdf_graph(&self, info: &ast::CreateTableInfo) -> Result<BoundCreateTableInfo> {
        if !info.properties.is_empty() {
            return Err(BinderError::RdfGraphWithProperties(info.table_name.clone()).into());
        }
        for child_name in [
            crate::types::rdf::resource_table_name(&info.table_name),
            crate::types::rdf::literal_table_name(&info.table_name),
            crate::types::rdf::resource_triple_table_name(&info.table_name),
            crate::types::rdf::literal_triple_table_name(&info.table_name),
        ] {
            if self.catalog.contains_table(&child_name) {
                return Err(BinderError::TableAlreadyExists(child_name).into());
            }
        }
        Ok(BoundCreateTableInfo {
            table_name: info.table_name.clone(),
            data: BoundCreateTableData::RdfGraph,
        })
    }

    pub(super) fn bind_node_table_id(&self, name: &str) -> Result<TableId> {
        let id = self
            .catalog
            .lookup(name)
            .ok_or_else(|| BinderError::TableNotFound(name.to_string()))?;
        if !self.catalog.get(id).kind.is_node() {
            return Err(BinderError::UnexpectedTableKind {
                name: name.to_string(),
                expected: "node",
            }
            .into());
        }
        Ok(id)
    }

    pub(super) fn resolve_table(&self, name: &str) -> Result<&TableSchema> {
        let id = self
            .catalog
            .lookup(name)
            .ok_or_else(|| BinderError::TableNotFound(name.to_string()))?;
        Ok(self.catalog.get(id))
    }

    pub(super) fn bind_drop_table(&self, table_name: &str) -> Result<BoundStatement> {
        let schema = self.resolve_table(table_name)?;
        // Children of a rel group or RDF graph are dropped through their
        // parent; the catalog owns that refusal.
        if let Some(owner) = self.owning_composite(schema.id) {
            return Err(CatalogError::Referenced {
                table: schema.name.clone(),
                referenced_by: owner.to_string(),
            }
            .into());
        }
        match &schema.kind {
            TableKind::Node(_) => {
                for other in self.catalog.tables() {
                    if let TableKind::Rel(rel) = &other.kind {
                        if rel.is_src_or_dst(schema.id) {
                            return Err(BinderError::NodeTableReferenced {
                                table: schema.name.clone(),
                                referenced_by: other.name.clone(),
                            }
                            .into());
                        }
                    }
                }
            }
            TableKind::Rel(_) | TableKind::RelGroup(_) | TableKind::Rdf(_) => {}
        }
        Ok(BoundStatement::DropTable(BoundDropTableInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
        }))
    }

    fn owning_composite(&self, id: TableId) -> Option<&str> {
        self.catalog.tables().find_map(|schema| match &schema.kind {
            TableKind::RelGroup(group) if group.rel_tables.contains(&id) => {
                Some(schema.name.as_str())
            }
            TableKind::Rdf(info) if info.children().contains(&id) => Some(schema.name.as_str()),
            _ => None,
        })
    }

    pub(super) fn bind_alter(&self, info: &ast::AlterInfo) -> Result<BoundStatement> {
        let schema = self.resolve_table(&info.table_name)?;
        let op = match &info.op {
            ast::AlterOp::RenameTable { new_name } => {
                if self.catalog.contains_table(new_name) {
                    return Err(BinderError::TableAlreadyExists(new_name.clone()).into());
                }
                BoundAlterOp::RenameTable {
                    new_name: new_name.clone(),
                }
            }
            ast::AlterOp::AddProperty {
                property_name,
                dtype,
                default_value,
            } => {
                self.validate_property_ddl_on_table(schema, "add")?;
                if schema.contains_property(property_name) {
                    return Err(BinderError::PropertyAlreadyExists {
                        table: schema.name.clone(),
                        property: property_name.clone(),
                    }
                    .into());
                }
                if is_reserved_property_name(property_name) {
                    return Err(BinderError::ReservedPropertyName(property_name.clone()).into());
                }
                let dtype = self.bind_data_type(dtype)?;
                if dtype.is_serial() {
                    return Err(BinderError::SerialNotPrimaryKey.into());
                }
                let default_value = match default_value {
                    Some(parsed) => bind_parsed_expr(parsed),
                    None => bind_parsed_expr(&ast::ParsedExpr::Null),
                };
                let default_value = implicit_cast_if_necessary(default_value, &dtype)?;
                BoundAlterOp::AddProperty {
                    property_name: property_name.clone(),
                    dtype,
                    default_value,
                }
            }
            ast::AlterOp::DropProperty { property_name } => {
                self.validate_property_ddl_on_table(schema, "drop")?;
                let property_id = self.bind_property_id(schema, property_name)?;
                if let TableKind::Node(node) = &schema.kind {
                    if node.primary_key_pid == property_id {
                        return Err(BinderError::DropPrimaryKeyForbidden.into());
                    }
                }
                BoundAlterOp::DropProperty { property_id }
            }
            ast::AlterOp::RenameProperty {
                property_name,
                new_name,
            } => {
                self.validate_property_ddl_on_table(schema, "rename")?;
                let property_id = self.bind_property_id(schema, property_name)?;
                if schema.contains_property(new_name) {
                    return Err(BinderError::PropertyAlreadyExists {
                        table: schema.name.clone(),
                        property: new_name.clone(),
                    }
                    .into());
                }
                BoundAlterOp::RenameProperty {
                    property_id,
                    new_name: new_name.clone(),
                }
            }
        };
        Ok(BoundStatement::Alter(BoundAlterInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
            op,
        }))
    }

    /// Composite schemas (rel groups, RDF graphs) are altered through their
    /// children, never property-by-property, and the fixed schemas of RDF
    /// child tables are not alterable at all.
    fn validate_property_ddl_on_table(
        &self,
        schema: &TableSchema,
        operation: &'static str,
    ) -> Result<()> {
        match schema.kind {
            TableKind::RelGroup(_) | TableKind::Rdf(_) => {
                return Err(BinderError::AlterOnCompositeTable {
                    operation,
                    table: schema.name.clone(),
                    kind: schema.kind.name(),
                }
                .into())
            }
            _ => {}
        }
        let owned_by_rdf = self.catalog.tables().any(|other| {
            matches!(&other.kind, TableKind::Rdf(info) if info.children().contains(&schema.id))
        });
        if owned_by_rdf {
            return Err(BinderError::AlterOnCompositeTable {
                operation,
                table: schema.name.clone(),
                kind: "RDF",
            }
            .into());
        }
        Ok(())
    }

    fn bind_property_id(
        &self,
        schema: &TableSchema,
        property_name: &str,
    ) -> Result<quiver_primitives::PropertyId> {
        schema.property_id(property_name).ok_or_else(|| {
            BinderError::PropertyNotFound {
                table: schema.name.clone(),
                property: property_name.to_string(),
            }
            .into()
        })
    }

}
