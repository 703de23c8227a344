//! Property test: catalog serialization round-trips over generated schemas.

use proptest::prelude::*;
use quiver_core::catalog::content::CatalogContent;
use quiver_core::catalog::persist::{deserialize_content, serialize_content};
use quiver_core::catalog::{RelMultiplicity, TableSchema};
use quiver_core::types::LogicalType;
use std::path::Path;

fn property_type() -> impl Strategy<Value = LogicalType> {
    prop_oneof![
        Just(LogicalType::Bool),
        Just(LogicalType::Int64),
        Just(LogicalType::Int32),
        Just(LogicalType::Int16),
        Just(LogicalType::Double),
        Just(LogicalType::Float),
        Just(LogicalType::String),
        Just(LogicalType::Date),
        Just(LogicalType::Timestamp),
        Just(LogicalType::Blob),
        Just(LogicalType::List(Box::new(LogicalType::Int64))),
        Just(LogicalType::List(Box::new(LogicalType::String))),
    ]
}

fn pk_type() -> impl Strategy<Value = LogicalType> {
    prop_oneof![
        Just(LogicalType::Int64),
        Just(LogicalType::String),
        Just(LogicalType::Serial),
    ]
}

prop_compose! {
    fn node_table_def()(
        extra_types in prop::collection::vec(property_type(), 0..4),
        pk in pk_type(),
    ) -> (LogicalType, Vec<LogicalType>) {
        (pk, extra_types)
    }
}

fn schemas_of(content: &CatalogContent) -> Vec<TableSchema> {
    content.tables().cloned().collect()
}

proptest! {
    #[test]
    fn serialize_deserialize_is_identity(
        node_defs in prop::collection::vec(node_table_def(), 1..5),
        rel_prop_types in prop::collection::vec(property_type(), 0..3),
        with_rdf in any::<bool>(),
    ) {
        let mut content = CatalogContent::new();
        let mut node_ids = Vec::new();
        for (i, (pk, extras)) in node_defs.iter().enumerate() {
            let mut props = vec![("pk".to_string(), pk.clone())];
            for (j, dtype) in extras.iter().enumerate() {
                props.push((format!("p{j}"), dtype.clone()));
            }
            let id = content.add_node_table(&format!("node{i}"), 0, props).unwrap();
            node_ids.push(id);
        }
        let rel_props: Vec<(String, LogicalType)> = rel_prop_types
            .iter()
            .enumerate()
            .map(|(j, dtype)| (format!("r{j}"), dtype.clone()))
            .collect();
        content
            .add_rel_table(
                "edge",
                RelMultiplicity::ManyMany,
                node_ids[0],
                *node_ids.last().unwrap(),
                rel_props,
            )
            .unwrap();
        if with_rdf {
            content.add_rdf_graph("graph").unwrap();
        }

        let mut buf = Vec::new();
        serialize_content(&content, &mut buf).unwrap();
        let back = deserialize_content(&mut buf.as_slice(), Path::new("mem")).unwrap();

        prop_assert_eq!(schemas_of(&content), schemas_of(&back));
        for schema in content.tables() {
            prop_assert_eq!(back.lookup(&schema.name), Some(schema.id));
        }
    }
}
