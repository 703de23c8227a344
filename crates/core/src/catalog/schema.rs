//! Table schemas as held by the catalog.

use enum_as_inner::EnumAsInner;
use quiver_primitives::{PropertyId, TableId};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{BinderError, CatalogError};
use crate::types::LogicalType;

/// Property name reserved on every table (case-insensitive): the internal
/// rel id column.
pub const RESERVED_ID_NAME: &str = "ID";

/// Property id of the built-in `ID: INTERNAL_ID` column on rel tables.
pub const INTERNAL_REL_ID_PROPERTY_ID: PropertyId = PropertyId(0);

/// Per-column storage addresses mirroring the column's type tree. Only the
/// columnar storage wiring reads these; the catalog just persists them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataDahInfo {
    pub data_page_idx: u64,
    pub null_page_idx: u64,
    pub children: Vec<MetadataDahInfo>,
}

impl MetadataDahInfo {
    /// An address record shaped like `dtype`'s type tree, all pages unassigned.
    pub fn for_type(dtype: &LogicalType) -> MetadataDahInfo {
        let children = match dtype {
            LogicalType::List(child) => vec![MetadataDahInfo::for_type(child)],
            LogicalType::Struct(fields) | LogicalType::Union(fields) => fields
                .iter()
                .map(|field| MetadataDahInfo::for_type(&field.dtype))
                .collect(),
            LogicalType::Map(key, value) => vec![
                MetadataDahInfo::for_type(key),
                MetadataDahInfo::for_type(value),
            ],
            _ => Vec::new(),
        };
        MetadataDahInfo {
            data_page_idx: u64::MAX,
            null_page_idx: u64::MAX,
            children,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: String,
    pub id: PropertyId,
    pub table: TableId,
    pub dtype: LogicalType,
    pub metadata_dah: MetadataDahInfo,
}

impl Property {
    pub fn new(name: String, id: PropertyId, table: TableId, dtype: LogicalType) -> Property {
        let metadata_dah = MetadataDahInfo::for_type(&dtype);
        Property {
            name,
            id,
            table,
            dtype,
            metadata_dah,
        }
    }
}

/// Returns true for property names users may not declare.
pub fn is_reserved_property_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(RESERVED_ID_NAME)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RelMultiplicity {
    OneOne = 0,
    OneMany = 1,
    ManyOne = 2,
    ManyMany = 3,
}

impl RelMultiplicity {
    pub fn from_u8(value: u8) -> Option<RelMultiplicity> {
        match value {
            0 => Some(RelMultiplicity::OneOne),
            1 => Some(RelMultiplicity::OneMany),
            2 => Some(RelMultiplicity::ManyOne),
            3 => Some(RelMultiplicity::ManyMany),
            _ => None,
        }
    }

    /// True when at most one edge may leave (`Fwd`) or enter (`Bwd`) a node.
    pub fn is_single_in_direction(self, direction: quiver_primitives::RelDirection) -> bool {
        use quiver_primitives::RelDirection;
        self == RelMultiplicity::OneOne
            || self
                == match direction {
                    RelDirection::Fwd => RelMultiplicity::ManyOne,
                    RelDirection::Bwd => RelMultiplicity::OneMany,
                }
    }
}

impl FromStr for RelMultiplicity {
    type Err = BinderError;

    fn from_str(text: &str) -> Result<RelMultiplicity, BinderError> {
        match text {
            "ONE_ONE" => Ok(RelMultiplicity::OneOne),
            "ONE_MANY" => Ok(RelMultiplicity::OneMany),
            "MANY_ONE" => Ok(RelMultiplicity::ManyOne),
            "MANY_MANY" => Ok(RelMultiplicity::ManyMany),
            other => Err(BinderError::InvalidMultiplicity(other.to_string())),
        }
    }
}

impl fmt::Display for RelMultiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RelMultiplicity::OneOne => "ONE_ONE",
            RelMultiplicity::OneMany => "ONE_MANY",
            RelMultiplicity::ManyOne => "MANY_ONE",
            RelMultiplicity::ManyMany => "MANY_MANY",
        };
        write!(f, "{text}")
    }
}

/// Kind-specific schema payload. The exhaustive match over this enum is what
/// keeps persistence and DDL dispatch total.
#[derive(Clone, Debug, PartialEq, EnumAsInner)]
pub enum TableKind {
    Node(NodeInfo),
    Rel(RelInfo),
    RelGroup(RelGroupInfo),
    Rdf(RdfInfo),
}

impl TableKind {
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Node(_) => "NODE",
            TableKind::Rel(_) => "REL",
            TableKind::RelGroup(_) => "REL_GROUP",
            TableKind::Rdf(_) => "RDF",
        }
    }

    pub fn discriminant(&self) -> u8 {
        match self {
            TableKind::Node(_) => 0,
            TableKind::Rel(_) => 1,
            TableKind::RelGroup(_) => 2,
            TableKind::Rdf(_) => 3,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeInfo {
    pub primary_key_pid: PropertyId,
    /// Rel tables with this table as source. Maintained as a cache when rel
    /// tables are created and dropped; rebuilt, never trusted blindly.
    pub fwd_rel_tables: BTreeSet<TableId>,
    /// Rel tables with this table as destination.
    pub bwd_rel_tables: BTreeSet<TableId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelInfo {
    pub multiplicity: RelMultiplicity,
    pub src_table: TableId,
    pub dst_table: TableId,
    pub src_pk_type: LogicalType,
    pub dst_pk_type: LogicalType,
}

impl RelInfo {
    pub fn is_src_or_dst(&self, table: TableId) -> bool {
        self.src_table == table || self.dst_table == table
    }

    pub fn bound_table(&self, direction: quiver_primitives::RelDirection) -> TableId {
        match direction {
            quiver_primitives::RelDirection::Fwd => self.src_table,
            quiver_primitives::RelDirection::Bwd => self.dst_table,
        }
    }

    pub fn nbr_table(&self, direction: quiver_primitives::RelDirection) -> TableId {
        self.bound_table(direction.reverse())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelGroupInfo {
    pub rel_tables: Vec<TableId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RdfInfo {
    pub resource_node: TableId,
    pub literal_node: TableId,
    pub resource_triple_rel: TableId,
    pub literal_triple_rel: TableId,
}

impl RdfInfo {
    pub fn children(&self) -> [TableId; 4] {
        [
            self.resource_node,
            self.literal_node,
            self.resource_triple_rel,
            self.literal_triple_rel,
        ]
    }
}

/// A table as registered in the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub comment: String,
    pub properties: Vec<Property>,
    /// Strictly greater than every property id ever assigned in this table.
    pub next_property_id: u32,
    pub kind: TableKind,
}

impl TableSchema {
    pub fn new(id: TableId, name: String, kind: TableKind) -> TableSchema {
        TableSchema {
            id,
            name,
            comment: String::new(),
            properties: Vec::new(),
            next_property_id: 0,
            kind,
        }
    }

    pub fn contains_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }

    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn property_by_name(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_id(&self, name: &str) -> Option<PropertyId> {
        self.property_by_name(name).map(|p| p.id)
    }

    /// Appends a property, assigning the next id from the per-table counter.
    pub fn add_property(&mut self, name: String, dtype: LogicalType) -> PropertyId {
        let pid = PropertyId(self.next_property_id);
        self.next_property_id += 1;
        self.properties.push(Property::new(name, pid, self.id, dtype));
        pid
    }

    pub fn drop_property(&mut self, id: PropertyId) -> Result<(), CatalogError> {
        let before = self.properties.len();
        self.properties.retain(|p| p.id != id);
        if self.properties.len() == before {
            return Err(CatalogError::PropertyIdNotFound {
                table: self.name.clone(),
                property: id,
            });
        }
        Ok(())
    }

    pub fn rename_property(&mut self, id: PropertyId, new_name: String) -> Result<(), CatalogError> {
        match self.properties.iter_mut().find(|p| p.id == id) {
            Some(property) => {
                property.name = new_name;
                Ok(())
            }
            None => Err(CatalogError::PropertyIdNotFound {
                table: self.name.clone(),
                property: id,
            }),
        }
    }

    /// The primary-key property of a node table.
    pub fn primary_key(&self) -> Option<&Property> {
        let node = self.kind.as_node()?;
        self.property(node.primary_key_pid)
    }

    pub fn contains_serial_property(&self) -> bool {
        self.properties.iter().any(|p| p.dtype.is_serial())
    }

    /// Properties that appear as columns in a COPY FROM source file: everything
    /// except serial columns and reserved internal names.
    pub fn file_facing_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties
            .iter()
            .filter(|p| !p.dtype.is_serial() && !is_reserved_property_name(&p.name))
    }
}
