//! The in-memory table registry behind a catalog version.

use quiver_primitives::{PropertyId, TableId};
use std::collections::{BTreeMap, HashMap};

use crate::error::CatalogError;
use crate::types::{rdf, LogicalType};

use super::schema::{
    is_reserved_property_name, NodeInfo, Property, RdfInfo, RelGroupInfo, RelInfo,
    RelMultiplicity, TableKind, TableSchema,
};

/// One version of the catalog: every table schema, plus the name cache.
///
/// A `CatalogContent` is immutable once published as a snapshot; DDL runs
/// against a cloned write version that replaces the snapshot on commit.
#[derive(Clone, Debug, Default)]
pub struct CatalogContent {
    tables: BTreeMap<TableId, TableSchema>,
    /// Cache only: rebuilt from `tables` on deserialize, never persisted.
    name_to_id: HashMap<String, TableId>,
    next_table_id: u64,
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogContent {
    pub fn new() -> CatalogContent {
        CatalogContent::default()
    }

    fn assign_next_table_id(&mut self) -> TableId {
        let id = TableId(self.next_table_id);
        self.next_table_id += 1;
        id
    }

    fn register(&mut self, schema: TableSchema) {
        self.name_to_id.insert(schema.name.clone(), schema.id);
        self.tables.insert(schema.id, schema);
    }

    fn validate_new_table_name(&self, name: &str) -> CatalogResult<()> {
        if self.name_to_id.contains_key(name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    fn validate_property_names(props: &[(String, LogicalType)]) -> CatalogResult<()> {
        for (name, _) in props {
            if is_reserved_property_name(name) {
                return Err(CatalogError::ReservedName(name.clone()));
            }
        }
        Ok(())
    }

    /// Registers a node table. `primary_key_idx` indexes into `props`.
    pub fn add_node_table(
        &mut self,
        name: &str,
        primary_key_idx: usize,
        props: Vec<(String, LogicalType)>,
    ) -> CatalogResult<TableId> {
        self.validate_new_table_name(name)?;
        Self::validate_property_names(&props)?;
        let pk_type = props
            .get(primary_key_idx)
            .map(|(_, dtype)| dtype)
            .ok_or_else(|| CatalogError::InvalidPrimaryKey("<missing>".to_string()))?;
        if !pk_type.is_valid_primary_key() {
            return Err(CatalogError::InvalidPrimaryKey(pk_type.to_string()));
        }
        for (i, (_, dtype)) in props.iter().enumerate() {
            if dtype.is_serial() && i != primary_key_idx {
                return Err(CatalogError::SerialNotPrimaryKey);
            }
        }
        let id = self.assign_next_table_id();
        let mut schema = TableSchema::new(id, name.to_string(), TableKind::Node(NodeInfo::default()));
        let mut primary_key_pid = PropertyId::INVALID;
        for (i, (prop_name, dtype)) in props.into_iter().enumerate() {
            let pid = schema.add_property(prop_name, dtype);
            if i == primary_key_idx {
                primary_key_pid = pid;
            }
        }
        if let TableKind::Node(node) = &mut schema.kind {
            node.primary_key_pid = primary_key_pid;
        }
        self.register(schema);
        Ok(id)
    }

    /// Registers a rel table between two live node tables. The built-in
    /// `ID: INTERNAL_ID` property is inserted at property id 0.
    pub fn add_rel_table(
        &mut self,
        name: &str,
        multiplicity: RelMultiplicity,
        src_table: TableId,
        dst_table: TableId,
        props: Vec<(String, LogicalType)>,
    ) -> CatalogResult<TableId> {
        self.validate_new_table_name(name)?;
        Self::validate_property_names(&props)?;
        for (_, dtype) in &props {
            if dtype.is_forbidden_on_rel_table() {
                return Err(CatalogError::ForbiddenType(dtype.to_string()));
            }
        }
        let src_pk_type = self.node_primary_key_type(src_table, "source")?;
        let dst_pk_type = self.node_primary_key_type(dst_table, "destination")?;
        let id = self.assign_next_table_id();
        let mut schema = TableSchema::new(
            id,
            name.to_string(),
            TableKind::Rel(RelInfo {
                multiplicity,
                src_table,
                dst_table,
                src_pk_type,
                dst_pk_type,
            }),
        );
        schema.properties.push(Property::new(
            super::schema::RESERVED_ID_NAME.to_string(),
            super::schema::INTERNAL_REL_ID_PROPERTY_ID,
            id,
            LogicalType::InternalId,
        ));
        schema.next_property_id = 1;
        for (prop_name, dtype) in props {
            schema.add_property(prop_name, dtype);
        }
        self.register(schema);
        // Maintain the node-side rel caches.
        if let Some(node) = self.tables.get_mut(&src_table).and_then(|t| t.kind.as_node_mut()) {
            node.fwd_rel_tables.insert(id);
        }
        if let Some(node) = self.tables.get_mut(&dst_table).and_then(|t| t.kind.as_node_mut()) {
            node.bwd_rel_tables.insert(id);
        }
        Ok(id)
    }

    fn node_primary_key_type(
        &self,
        table: TableId,
        role: &'static str,
    ) -> CatalogResult<LogicalType> {
        let schema = self
            .tables
            .get(&table)
            .ok_or(CatalogError::BadTableRef { table, role })?;
        if !schema.kind.is_node() {
            return Err(CatalogError::BadTableRef { table, role });
        }
        let pk = schema
            .primary_key()
            .ok_or(CatalogError::BadTableRef { table, role })?;
        Ok(pk.dtype.clone())
    }

    /// Registers a rel group: one rel table per `(src, dst)` pair, named
    /// `name_srcname_dstname`, all sharing the declared properties.
    pub fn add_rel_group(
        &mut self,
        name: &str,
        src_dst_pairs: &[(TableId, TableId)],
        multiplicity: RelMultiplicity,
        props: Vec<(String, LogicalType)>,
    ) -> CatalogResult<TableId> {
        self.validate_new_table_name(name)?;
        let mut rel_tables = Vec::with_capacity(src_dst_pairs.len());
        for &(src, dst) in src_dst_pairs {
            let src_name = self.table_name_checked(src)?.to_string();
            let dst_name = self.table_name_checked(dst)?.to_string();
            let child_name = format!("{name}_{src_name}_{dst_name}");
            let child = self.add_rel_table(&child_name, multiplicity, src, dst, props.clone())?;
            rel_tables.push(child);
        }
        let id = self.assign_next_table_id();
        self.register(TableSchema::new(
            id,
            name.to_string(),
            TableKind::RelGroup(RelGroupInfo { rel_tables }),
        ));
        Ok(id)
    }

    fn table_name_checked(&self, id: TableId) -> CatalogResult<&str> {
        self.tables
            .get(&id)
            .map(|t| t.name.as_str())
            .ok_or(CatalogError::IdNotFound(id))
    }

    /// Registers an RDF graph: the synthetic container plus its four child
    /// tables with the fixed suffixes and schemas.
    pub fn add_rdf_graph(&mut self, name: &str) -> CatalogResult<TableId> {
        let resource_name = rdf::resource_table_name(name);
        let literal_name = rdf::literal_table_name(name);
        let resource_triple_name = rdf::resource_triple_table_name(name);
        let literal_triple_name = rdf::literal_triple_table_name(name);
        for table_name in [
            name,
            resource_name.as_str(),
            literal_name.as_str(),
            resource_triple_name.as_str(),
            literal_triple_name.as_str(),
        ] {
            self.validate_new_table_name(table_name)?;
        }
        let resource_node = self.add_node_table(
            &resource_name,
            0,
            vec![(rdf::IRI.to_string(), LogicalType::String)],
        )?;
        let literal_node = self.add_node_table(
            &literal_name,
            0,
            vec![
                (rdf::ID.to_string(), LogicalType::Serial),
                (rdf::IRI.to_string(), LogicalType::RdfVariant),
            ],
        )?;
        let triple_props = vec![(rdf::PID.to_string(), LogicalType::InternalId)];
        let resource_triple_rel = self.add_rel_table(
            &resource_triple_name,
            RelMultiplicity::ManyMany,
            resource_node,
            resource_node,
            triple_props.clone(),
        )?;
        let literal_triple_rel = self.add_rel_table(
            &literal_triple_name,
            RelMultiplicity::ManyMany,
            resource_node,
            literal_node,
            triple_props,
        )?;
        let id = self.assign_next_table_id();
        self.register(TableSchema::new(
            id,
            name.to_string(),
            TableKind::Rdf(RdfInfo {
                resource_node,
                literal_node,
                resource_triple_rel,
                literal_triple_rel,
            }),
        ));
        Ok(id)
    }

    /// Drops a table, enforcing the reference invariants: a node table may
    /// not be dropped while a rel table points at it, a rel table not while
    /// a group contains it, and RDF children only through their graph.
    pub fn drop_table(&mut self, id: TableId) -> CatalogResult<()> {
        let schema = self.tables.get(&id).ok_or(CatalogError::IdNotFound(id))?;
        if let Some(owner) = self.owning_composite(id) {
            return Err(CatalogError::Referenced {
                table: schema.name.clone(),
                referenced_by: owner.to_string(),
            });
        }
        match &schema.kind {
            TableKind::Node(_) => {
                for other in self.tables.values() {
                    if let TableKind::Rel(rel) = &other.kind {
                        if rel.is_src_or_dst(id) {
                            return Err(CatalogError::Referenced {
                                table: schema.name.clone(),
                                referenced_by: other.name.clone(),
                            });
                        }
                    }
                }
                self.remove_entry(id);
            }
            TableKind::Rel(_) => {
                self.remove_entry(id);
            }
            TableKind::RelGroup(group) => {
                for child in group.rel_tables.clone() {
                    self.remove_entry(child);
                }
                self.remove_entry(id);
            }
            TableKind::Rdf(info) => {
                let info = info.clone();
                // Triple rels reference the node children, so they go first.
                self.remove_entry(info.resource_triple_rel);
                self.remove_entry(info.literal_triple_rel);
                self.remove_entry(info.resource_node);
                self.remove_entry(info.literal_node);
                self.remove_entry(id);
            }
        }
        Ok(())
    }

    /// The rel group or RDF graph holding `id` as a child, if any.
    fn owning_composite(&self, id: TableId) -> Option<&str> {
        self.tables.values().find_map(|schema| match &schema.kind {
            TableKind::RelGroup(group) if group.rel_tables.contains(&id) => {
                Some(schema.name.as_str())
            }
            TableKind::Rdf(info) if info.children().contains(&id) => Some(schema.name.as_str()),
            _ => None,
        })
    }

    fn remove_entry(&mut self, id: TableId) {
        let Some(schema) = self.tables.remove(&id) else {
            return;
        };
        self.name_to_id.remove(&schema.name);
        if let TableKind::Rel(rel) = &schema.kind {
            if let Some(node) = self
                .tables
                .get_mut(&rel.src_table)
                .and_then(|t| t.kind.as_node_mut())
            {
                node.fwd_rel_tables.remove(&id);
            }
            if let Some(node) = self
                .tables
                .get_mut(&rel.dst_table)
                .and_then(|t| t.kind.as_node_mut())
            {
                node.bwd_rel_tables.remove(&id);
            }
        }
    }

    pub fn rename_table(&mut self, id: TableId, new_name: &str) -> CatalogResult<()> {
        if self.name_to_id.contains_key(new_name) {
            return Err(CatalogError::Duplicate(new_name.to_string()));
        }
        let schema = self.tables.get_mut(&id).ok_or(CatalogError::IdNotFound(id))?;
        self.name_to_id.remove(&schema.name);
        schema.name = new_name.to_string();
        self.name_to_id.insert(new_name.to_string(), id);
        Ok(())
    }

    pub fn add_property(
        &mut self,
        id: TableId,
        name: &str,
        dtype: LogicalType,
    ) -> CatalogResult<PropertyId> {
        if is_reserved_property_name(name) {
            return Err(CatalogError::ReservedName(name.to_string()));
        }
        let schema = self.tables.get_mut(&id).ok_or(CatalogError::IdNotFound(id))?;
        if schema.contains_property(name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        Ok(schema.add_property(name.to_string(), dtype))
    }

    pub fn drop_property(&mut self, id: TableId, property: PropertyId) -> CatalogResult<()> {
        let schema = self.tables.get_mut(&id).ok_or(CatalogError::IdNotFound(id))?;
        if let TableKind::Node(node) = &schema.kind {
            if node.primary_key_pid == property {
                return Err(CatalogError::DropPkForbidden);
            }
        }
        schema.drop_property(property)
    }

    pub fn rename_property(
        &mut self,
        id: TableId,
        property: PropertyId,
        new_name: &str,
    ) -> CatalogResult<()> {
        let schema = self.tables.get_mut(&id).ok_or(CatalogError::IdNotFound(id))?;
        if schema.contains_property(new_name) {
            return Err(CatalogError::Duplicate(new_name.to_string()));
        }
        schema.rename_property(property, new_name.to_string())
    }

    pub fn set_comment(&mut self, id: TableId, comment: String) -> CatalogResult<()> {
        let schema = self.tables.get_mut(&id).ok_or(CatalogError::IdNotFound(id))?;
        schema.comment = comment;
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<TableId> {
        self.name_to_id.get(name).copied()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    /// Panics if `id` is not a live table; callers resolve ids through
    /// [`CatalogContent::lookup`] or hold them from a bound statement.
    pub fn get(&self, id: TableId) -> &TableSchema {
        self.try_get(id)
            .unwrap_or_else(|| panic!("table id {id} not present in catalog"))
    }

    pub fn try_get(&self, id: TableId) -> Option<&TableSchema> {
        self.tables.get(&id)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn node_table_ids(&self) -> Vec<TableId> {
        self.tables
            .values()
            .filter(|t| t.kind.is_node())
            .map(|t| t.id)
            .collect()
    }

    pub fn rel_table_ids(&self) -> Vec<TableId> {
        self.tables
            .values()
            .filter(|t| t.kind.is_rel())
            .map(|t| t.id)
            .collect()
    }

    pub(super) fn next_table_id(&self) -> u64 {
        self.next_table_id
    }

    /// Rebuilds caches and the id counter after deserialization.
    pub(super) fn from_schemas(schemas: Vec<TableSchema>) -> CatalogContent {
        let mut content = CatalogContent::new();
        for schema in schemas {
            content.next_table_id = content.next_table_id.max(schema.id.0 + 1);
            content.register(schema);
        }
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn person_props() -> Vec<(String, LogicalType)> {
        vec![
            ("id".to_string(), LogicalType::Int64),
            ("name".to_string(), LogicalType::String),
        ]
    }

    #[test]
    fn create_and_lookup_node_table() {
        let mut content = CatalogContent::new();
        let id = content.add_node_table("Person", 0, person_props()).unwrap();
        assert_eq!(content.lookup("Person"), Some(id));
        assert_eq!(content.get(id).name, "Person");
        assert_eq!(content.get(id).primary_key().unwrap().name, "id");
    }

    #[test]
    fn duplicate_table_name_is_rejected() {
        let mut content = CatalogContent::new();
        content.add_node_table("Person", 0, person_props()).unwrap();
        let err = content.add_node_table("Person", 0, person_props()).unwrap_err();
        assert_eq!(err, CatalogError::Duplicate("Person".into()));
    }

    #[test]
    fn invalid_primary_key_type_is_rejected() {
        let mut content = CatalogContent::new();
        let err = content
            .add_node_table("Bad", 0, vec![("x".to_string(), LogicalType::Double)])
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPrimaryKey(_)));
        assert_eq!(content.lookup("Bad"), None);
    }

    #[test]
    fn serial_must_be_primary_key() {
        let mut content = CatalogContent::new();
        let err = content
            .add_node_table(
                "T",
                0,
                vec![
                    ("id".to_string(), LogicalType::Int64),
                    ("gen".to_string(), LogicalType::Serial),
                ],
            )
            .unwrap_err();
        assert_eq!(err, CatalogError::SerialNotPrimaryKey);
    }

    #[test]
    fn rel_table_gets_internal_id_property() {
        let mut content = CatalogContent::new();
        let person = content.add_node_table("Person", 0, person_props()).unwrap();
        let knows = content
            .add_rel_table(
                "Knows",
                RelMultiplicity::ManyMany,
                person,
                person,
                vec![("since".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        let schema = content.get(knows);
        assert_eq!(schema.properties[0].name, "ID");
        assert_eq!(schema.properties[0].id, PropertyId(0));
        assert_eq!(schema.properties[0].dtype, LogicalType::InternalId);
        let rel = schema.kind.as_rel().unwrap();
        assert_eq!(rel.src_pk_type, LogicalType::Int64);

        let person_schema = content.get(person);
        let node = person_schema.kind.as_node().unwrap();
        assert!(node.fwd_rel_tables.contains(&knows));
        assert!(node.bwd_rel_tables.contains(&knows));
    }

    #[test]
    fn rel_table_rejects_forbidden_types() {
        let mut content = CatalogContent::new();
        let person = content.add_node_table("Person", 0, person_props()).unwrap();
        let err = content
            .add_rel_table(
                "Bad",
                RelMultiplicity::ManyMany,
                person,
                person,
                vec![("s".to_string(), LogicalType::Serial)],
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::ForbiddenType(_)));
    }

    #[test]
    fn node_drop_blocked_by_rel_reference() {
        let mut content = CatalogContent::new();
        let person = content.add_node_table("Person", 0, person_props()).unwrap();
        let knows = content
            .add_rel_table("Knows", RelMultiplicity::ManyMany, person, person, vec![])
            .unwrap();
        let err = content.drop_table(person).unwrap_err();
        assert!(matches!(err, CatalogError::Referenced { .. }));
        content.drop_table(knows).unwrap();
        content.drop_table(person).unwrap();
        assert_eq!(content.table_count(), 0);
    }

    #[test]
    fn rel_group_creates_children_per_pair() {
        let mut content = CatalogContent::new();
        let person = content.add_node_table("Person", 0, person_props()).unwrap();
        let city = content
            .add_node_table(
                "City",
                0,
                vec![("name".to_string(), LogicalType::String)],
            )
            .unwrap();
        let group = content
            .add_rel_group(
                "LivesIn",
                &[(person, city), (person, person)],
                RelMultiplicity::ManyOne,
                vec![("since".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        assert!(content.lookup("LivesIn_Person_City").is_some());
        assert!(content.lookup("LivesIn_Person_Person").is_some());
        let children = content.get(group).kind.as_rel_group().unwrap().rel_tables.clone();
        assert_eq!(children.len(), 2);

        // A grouped rel table cannot be dropped on its own.
        let err = content.drop_table(children[0]).unwrap_err();
        assert!(matches!(err, CatalogError::Referenced { .. }));
        // Dropping the group takes the children with it.
        content.drop_table(group).unwrap();
        assert_eq!(content.lookup("LivesIn_Person_City"), None);
    }

    #[test]
    fn rdf_graph_children_have_fixed_schemas() {
        let mut content = CatalogContent::new();
        let graph = content.add_rdf_graph("G").unwrap();
        let info = content.get(graph).kind.as_rdf().unwrap().clone();

        let resource = content.get(info.resource_node);
        assert_eq!(resource.name, "G_r");
        assert_eq!(resource.primary_key().unwrap().dtype, LogicalType::String);

        let literal = content.get(info.literal_node);
        assert_eq!(literal.name, "G_l");
        assert_eq!(literal.properties[0].dtype, LogicalType::Serial);
        assert_eq!(literal.properties[1].dtype, LogicalType::RdfVariant);

        for rel_id in [info.resource_triple_rel, info.literal_triple_rel] {
            let rel = content.get(rel_id).kind.as_rel().unwrap();
            assert_eq!(rel.src_table, info.resource_node);
        }
        assert_eq!(
            content.get(info.resource_triple_rel).kind.as_rel().unwrap().dst_table,
            info.resource_node
        );

        // Children are protected while the graph lives.
        let err = content.drop_table(info.resource_node).unwrap_err();
        assert!(matches!(err, CatalogError::Referenced { .. }));
        content.drop_table(graph).unwrap();
        assert_eq!(content.table_count(), 0);
    }

    #[test]
    fn rename_table_moves_the_name() {
        let mut content = CatalogContent::new();
        let id = content.add_node_table("Person", 0, person_props()).unwrap();
        content.rename_table(id, "Human").unwrap();
        assert_eq!(content.lookup("Person"), None);
        assert_eq!(content.lookup("Human"), Some(id));
        assert_eq!(content.get(id).name, "Human");
    }

    #[test]
    fn drop_primary_key_property_is_forbidden() {
        let mut content = CatalogContent::new();
        let id = content.add_node_table("Person", 0, person_props()).unwrap();
        let pk = content.get(id).primary_key().unwrap().id;
        let err = content.drop_property(id, pk).unwrap_err();
        assert_eq!(err, CatalogError::DropPkForbidden);
    }
}
