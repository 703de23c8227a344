//! In-memory adjacency and property store for one rel table.

use indexmap::IndexMap;
use quiver_primitives::{Offset, PropertyId, RelDirection};
use std::collections::HashMap;

use crate::catalog::{RelMultiplicity, TableSchema};
use crate::error::{Result, StorageError};
use crate::types::Value;

/// Adjacency lists per direction plus property columns keyed by rel offset.
///
/// The internal edge-id counter lives here: the partitioner allocates ranges
/// from it so that the FWD and BWD writes of one edge share an id.
pub struct RelTableStore {
    name: String,
    multiplicity: RelMultiplicity,
    fwd: HashMap<Offset, Vec<(Offset, Offset)>>,
    bwd: HashMap<Offset, Vec<(Offset, Offset)>>,
    /// Columns for the non-internal properties, indexed by rel offset.
    props: IndexMap<PropertyId, Vec<Value>>,
    next_rel_offset: Offset,
}

impl RelTableStore {
    pub fn new(schema: &TableSchema) -> RelTableStore {
        let rel = schema
            .kind
            .as_rel()
            .expect("rel store requires a rel table schema");
        let props = schema
            .file_facing_properties()
            .map(|p| (p.id, Vec::new()))
            .collect();
        RelTableStore {
            name: schema.name.clone(),
            multiplicity: rel.multiplicity,
            fwd: HashMap::new(),
            bwd: HashMap::new(),
            props,
            next_rel_offset: 0,
        }
    }

    /// Reserves `count` consecutive edge ids and returns the first.
    pub fn allocate_rel_offsets(&mut self, count: u64) -> Offset {
        let base = self.next_rel_offset;
        self.next_rel_offset += count;
        base
    }

    pub fn num_rels(&self) -> Offset {
        self.next_rel_offset
    }

    fn adjacency_mut(&mut self, direction: RelDirection) -> &mut HashMap<Offset, Vec<(Offset, Offset)>> {
        match direction {
            RelDirection::Fwd => &mut self.fwd,
            RelDirection::Bwd => &mut self.bwd,
        }
    }

    /// Appends `(bound, nbr, rel_id)` adjacency entries for one direction,
    /// enforcing single-multiplicity sides.
    pub fn append_adjacency(
        &mut self,
        direction: RelDirection,
        rows: &[(Offset, Offset, Offset)],
    ) -> Result<()> {
        let single = self.multiplicity.is_single_in_direction(direction);
        let name = self.name.clone();
        let adjacency = self.adjacency_mut(direction);
        for &(bound, nbr, rel_id) in rows {
            let list = adjacency.entry(bound).or_default();
            list.push((nbr, rel_id));
            if single && list.len() > 1 {
                return Err(StorageError::MultiplicityViolation {
                    table: name.clone(),
                    direction: direction.to_string(),
                    offset: bound,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Writes property rows at their rel offsets. Rows may arrive out of
    /// order across partitions; columns grow to fit.
    pub fn write_property_rows(&mut self, rel_ids: &[Offset], rows: &[Vec<Value>]) {
        debug_assert_eq!(rel_ids.len(), rows.len());
        for (row_idx, &rel_id) in rel_ids.iter().enumerate() {
            for (col_idx, column) in self.props.values_mut().enumerate() {
                let end = rel_id as usize + 1;
                if column.len() < end {
                    column.resize(end, Value::Null);
                }
                column[rel_id as usize] = rows[row_idx][col_idx].clone();
            }
        }
    }

    /// Adds storage for a property created by `ALTER TABLE ... ADD`,
    /// back-filled with `default_value` for existing edges.
    pub fn add_column(&mut self, pid: PropertyId, default_value: Value) {
        self.props
            .insert(pid, vec![default_value; self.next_rel_offset as usize]);
    }

    pub fn drop_column(&mut self, pid: PropertyId) {
        self.props.shift_remove(&pid);
    }

    pub fn neighbors(&self, direction: RelDirection, bound: Offset) -> &[(Offset, Offset)] {
        let adjacency = match direction {
            RelDirection::Fwd => &self.fwd,
            RelDirection::Bwd => &self.bwd,
        };
        adjacency.get(&bound).map_or(&[], |list| list.as_slice())
    }

    pub fn property_value(&self, pid: PropertyId, rel_id: Offset) -> Option<&Value> {
        self.props.get(&pid)?.get(rel_id as usize)
    }

    /// Undoes all edges at or past `num_rels`: the pre-COPY checkpoint state.
    pub fn truncate(&mut self, num_rels: Offset) {
        for adjacency in [&mut self.fwd, &mut self.bwd] {
            for list in adjacency.values_mut() {
                list.retain(|&(_, rel_id)| rel_id < num_rels);
            }
            adjacency.retain(|_, list| !list.is_empty());
        }
        for column in self.props.values_mut() {
            column.truncate(num_rels as usize);
        }
        self.next_rel_offset = num_rels;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::content::CatalogContent;
    use crate::types::LogicalType;
    use pretty_assertions::assert_eq;

    fn knows_store(multiplicity: RelMultiplicity) -> RelTableStore {
        let mut content = CatalogContent::new();
        let person = content
            .add_node_table("Person", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        let knows = content
            .add_rel_table(
                "Knows",
                multiplicity,
                person,
                person,
                vec![("since".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        RelTableStore::new(content.get(knows))
    }

    #[test]
    fn adjacency_is_written_per_direction() {
        let mut store = knows_store(RelMultiplicity::ManyMany);
        let base = store.allocate_rel_offsets(2);
        store
            .append_adjacency(RelDirection::Fwd, &[(0, 1, base), (0, 2, base + 1)])
            .unwrap();
        store
            .append_adjacency(RelDirection::Bwd, &[(1, 0, base), (2, 0, base + 1)])
            .unwrap();
        assert_eq!(store.neighbors(RelDirection::Fwd, 0).len(), 2);
        assert_eq!(store.neighbors(RelDirection::Bwd, 1), &[(0, base)]);
    }

    #[test]
    fn many_one_rejects_second_outgoing_edge() {
        let mut store = knows_store(RelMultiplicity::ManyOne);
        let base = store.allocate_rel_offsets(2);
        let err = store
            .append_adjacency(RelDirection::Fwd, &[(0, 1, base), (0, 2, base + 1)])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Storage(StorageError::MultiplicityViolation { .. })
        ));
    }

    #[test]
    fn truncate_drops_edges_past_checkpoint() {
        let mut store = knows_store(RelMultiplicity::ManyMany);
        let base = store.allocate_rel_offsets(1);
        store
            .append_adjacency(RelDirection::Fwd, &[(0, 1, base)])
            .unwrap();
        store
            .append_adjacency(RelDirection::Bwd, &[(1, 0, base)])
            .unwrap();
        let checkpoint = store.num_rels();

        let next = store.allocate_rel_offsets(1);
        store
            .append_adjacency(RelDirection::Fwd, &[(5, 6, next)])
            .unwrap();
        store.truncate(checkpoint);
        assert_eq!(store.num_rels(), 1);
        assert!(store.neighbors(RelDirection::Fwd, 5).is_empty());
        assert_eq!(store.neighbors(RelDirection::Fwd, 0).len(), 1);
    }
}
