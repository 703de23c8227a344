//! Binding of the RDF COPY variants: per-child Turtle ingest and the
//! four-plan whole-graph form.

use quiver_primitives::TableId;

use crate::catalog::{RdfInfo, TableSchema};
use crate::error::{BinderError, Result};
use crate::reader::{RdfReaderMode, ReaderConfig};
use crate::types::{rdf, LogicalType};

use super::statement::{BoundCopyExtra, BoundCopyFromInfo, BoundRdfGraphCopy, BoundScanSource};
use super::Binder;

impl Binder<'_> {
    /// The RDF graph owning `table`, if any.
    fn owning_rdf_graph(&self, table: TableId) -> Option<&RdfInfo> {
        self.catalog.tables().find_map(|schema| match &schema.kind {
            crate::catalog::TableKind::Rdf(info) if info.children().contains(&table) => Some(info),
            _ => None,
        })
    }

    /// Turtle into one of the two RDF node tables: `RESOURCE` mode emits
    /// deduplicated IRIs, `LITERAL` mode emits typed literal values.
    pub(super) fn bind_copy_rdf_node_from(
        &self,
        mut config: ReaderConfig,
        schema: &TableSchema,
    ) -> Result<BoundCopyFromInfo> {
        let info = self
            .owning_rdf_graph(schema.id)
            .ok_or_else(|| BinderError::TurtleIntoNonRdfTable(schema.name.clone()))?;
        let (mode, columns, contains_serial) = if schema.id == info.resource_node {
            (
                RdfReaderMode::Resource,
                vec![(rdf::IRI.to_string(), LogicalType::String)],
                false,
            )
        } else {
            (
                RdfReaderMode::Literal,
                vec![(rdf::IRI.to_string(), LogicalType::RdfVariant)],
                true,
            )
        };
        config.rdf_mode = Some(mode);
        Ok(BoundCopyFromInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
            source: BoundScanSource::File(config),
            columns,
            contains_serial,
            extra: BoundCopyExtra::RdfNode { mode },
        })
    }

    /// Turtle into one of the two triple tables. Subject, predicate, and
    /// object arrive as offsets resolved through the resource table's
    /// primary-key index, which COPY populates before these plans run.
    pub(super) fn bind_copy_rdf_rel_from(
        &self,
        mut config: ReaderConfig,
        schema: &TableSchema,
    ) -> Result<BoundCopyFromInfo> {
        let info = self
            .owning_rdf_graph(schema.id)
            .ok_or_else(|| BinderError::TurtleIntoNonRdfTable(schema.name.clone()))?;
        let mode = if schema.id == info.resource_triple_rel {
            RdfReaderMode::ResourceTriple
        } else {
            RdfReaderMode::LiteralTriple
        };
        let resource_table = info.resource_node;
        let rel = schema
            .kind
            .as_rel()
            .expect("rdf triple table must be a rel table");
        let member = super::statement::RelCopyMember {
            table_id: schema.id,
            table_name: schema.name.clone(),
            src_table: rel.src_table,
            dst_table: rel.dst_table,
        };
        config.rdf_mode = Some(mode);
        let columns = vec![
            ("subject".to_string(), LogicalType::InternalId),
            ("predicate".to_string(), LogicalType::InternalId),
            ("object".to_string(), LogicalType::InternalId),
        ];
        Ok(BoundCopyFromInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
            source: BoundScanSource::File(config),
            columns,
            contains_serial: false,
            extra: BoundCopyExtra::RdfRel {
                resource_table,
                mode,
                member,
            },
        })
    }

    /// `COPY <graph> FROM 'file.ttl'`: four sequential sub-copies in the
    /// fixed order resource, literal, resource-triple, literal-triple.
    pub(super) fn bind_copy_rdf_graph_from(
        &self,
        config: ReaderConfig,
        schema: &TableSchema,
    ) -> Result<BoundCopyFromInfo> {
        let info = schema
            .kind
            .as_rdf()
            .expect("rdf graph copy over a non-rdf table")
            .clone();
        let resource = self.bind_copy_rdf_node_from(config.clone(), self.catalog.get(info.resource_node))?;
        let literal = self.bind_copy_rdf_node_from(config.clone(), self.catalog.get(info.literal_node))?;
        let resource_triple =
            self.bind_copy_rdf_rel_from(config.clone(), self.catalog.get(info.resource_triple_rel))?;
        let literal_triple =
            self.bind_copy_rdf_rel_from(config.clone(), self.catalog.get(info.literal_triple_rel))?;
        Ok(BoundCopyFromInfo {
            table_id: schema.id,
            table_name: schema.name.clone(),
            source: BoundScanSource::File(config),
            columns: Vec::new(),
            contains_serial: false,
            extra: BoundCopyExtra::RdfGraph(Box::new(BoundRdfGraphCopy {
                resource,
                literal,
                resource_triple,
                literal_triple,
            })),
        })
    }
}
