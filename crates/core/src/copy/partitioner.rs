//! The relationship-table partitioner.
//!
//! Resolved edge tuples split into per-direction × per-bound-node-table
//! buckets so the writer can commit adjacency for one node table as a
//! contiguous run. For a plain rel table both keys are constants and the
//! split degenerates to pass-through; for rel groups the keying is real.
//!
//! Within a bucket, input order is preserved. Across buckets nothing is
//! guaranteed.

use parking_lot::Mutex;
use quiver_primitives::{Offset, RelDirection, TableId};
use std::collections::HashMap;

use crate::binder::statement::RelCopyMember;
use crate::error::Result;
use crate::storage::StorageManager;
use crate::types::{Value, CHUNK_CAPACITY};

use super::index_lookup::ResolvedEdge;

/// Rows a bucket accumulates before it seals a chunk for the writer.
pub const PARTITIONER_FLUSH_CAPACITY: usize = 8 * CHUNK_CAPACITY;

struct BucketRow {
    member_idx: usize,
    bound_offset: Offset,
    nbr_offset: Offset,
    rel_id: Offset,
    /// Property values ride on the FWD row only; the BWD row re-reads them
    /// by rel id if it ever needs them.
    props: Vec<Value>,
}

#[derive(Default)]
struct Bucket {
    rows: Vec<BucketRow>,
}

type BucketKey = (RelDirection, TableId);

pub struct Partitioner<'a> {
    storage: &'a StorageManager,
    members: Vec<RelCopyMember>,
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
}

impl<'a> Partitioner<'a> {
    pub fn new(storage: &'a StorageManager, members: Vec<RelCopyMember>) -> Partitioner<'a> {
        Partitioner {
            storage,
            members,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes one resolved chunk: assigns edge ids from the member tables'
    /// counters, classifies each row into its two buckets, and flushes any
    /// bucket that crossed the threshold.
    pub fn push_chunk(
        &self,
        resolved: &[ResolvedEdge],
        prop_rows: Vec<Vec<Value>>,
    ) -> Result<()> {
        debug_assert_eq!(resolved.len(), prop_rows.len());
        let rel_ids = self.assign_rel_ids(resolved)?;
        let mut sealed = Vec::new();
        {
            let mut buckets = self.buckets.lock();
            for ((edge, rel_id), props) in resolved.iter().zip(&rel_ids).zip(prop_rows) {
                let member = &self.members[edge.member_idx];
                let fwd = buckets
                    .entry((RelDirection::Fwd, member.src_table))
                    .or_default();
                fwd.rows.push(BucketRow {
                    member_idx: edge.member_idx,
                    bound_offset: edge.src_offset,
                    nbr_offset: edge.dst_offset,
                    rel_id: *rel_id,
                    props,
                });
                let bwd = buckets
                    .entry((RelDirection::Bwd, member.dst_table))
                    .or_default();
                bwd.rows.push(BucketRow {
                    member_idx: edge.member_idx,
                    bound_offset: edge.dst_offset,
                    nbr_offset: edge.src_offset,
                    rel_id: *rel_id,
                    props: Vec::new(),
                });
            }
            for (key, bucket) in buckets.iter_mut() {
                if bucket.rows.len() >= PARTITIONER_FLUSH_CAPACITY {
                    sealed.push((*key, std::mem::take(&mut bucket.rows)));
                }
            }
        }
        for (key, rows) in sealed {
            self.write_sealed(key.0, rows)?;
        }
        Ok(())
    }

    /// Edge ids come from a per-member monotonic counter so the FWD and BWD
    /// writes of one edge share an id.
    fn assign_rel_ids(&self, resolved: &[ResolvedEdge]) -> Result<Vec<Offset>> {
        let mut counts: HashMap<usize, u64> = HashMap::new();
        for edge in resolved {
            *counts.entry(edge.member_idx).or_insert(0) += 1;
        }
        let mut bases: HashMap<usize, Offset> = HashMap::with_capacity(counts.len());
        for (&member_idx, &count) in &counts {
            let table = self.members[member_idx].table_id;
            let base = self
                .storage
                .with_rel_store(table, |store| store.allocate_rel_offsets(count))?;
            bases.insert(member_idx, base);
        }
        let mut rel_ids = Vec::with_capacity(resolved.len());
        for edge in resolved {
            let next = bases.get_mut(&edge.member_idx).expect("base allocated above");
            rel_ids.push(*next);
            *next += 1;
        }
        Ok(rel_ids)
    }

    fn write_sealed(&self, direction: RelDirection, rows: Vec<BucketRow>) -> Result<()> {
        // One sealed bucket may span members; the writer wants per-table runs.
        let mut per_member: HashMap<usize, Vec<BucketRow>> = HashMap::new();
        for row in rows {
            per_member.entry(row.member_idx).or_default().push(row);
        }
        for (member_idx, rows) in per_member {
            let table = self.members[member_idx].table_id;
            let adjacency: Vec<(Offset, Offset, Offset)> = rows
                .iter()
                .map(|row| (row.bound_offset, row.nbr_offset, row.rel_id))
                .collect();
            self.storage.with_rel_store(table, |store| {
                store.append_adjacency(direction, &adjacency)?;
                if direction == RelDirection::Fwd {
                    let rel_ids: Vec<Offset> = rows.iter().map(|row| row.rel_id).collect();
                    let props: Vec<Vec<Value>> =
                        rows.into_iter().map(|row| row.props).collect();
                    store.write_property_rows(&rel_ids, &props);
                }
                Ok::<(), crate::error::Error>(())
            })??;
        }
        Ok(())
    }

    /// Flushes every non-empty bucket at stream end.
    pub fn finish(&self) -> Result<()> {
        let drained: Vec<(BucketKey, Vec<BucketRow>)> = {
            let mut buckets = self.buckets.lock();
            buckets
                .iter_mut()
                .filter(|(_, bucket)| !bucket.rows.is_empty())
                .map(|(key, bucket)| (*key, std::mem::take(&mut bucket.rows)))
                .collect()
        };
        for (key, rows) in drained {
            self.write_sealed(key.0, rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::content::CatalogContent;
    use crate::catalog::RelMultiplicity;
    use crate::types::LogicalType;
    use pretty_assertions::assert_eq;

    fn group_setup() -> (StorageManager, Vec<RelCopyMember>, CatalogContent) {
        let mut catalog = CatalogContent::new();
        let person = catalog
            .add_node_table("Person", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        let city = catalog
            .add_node_table("City", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        let group = catalog
            .add_rel_group(
                "Likes",
                &[(person, person), (person, city)],
                RelMultiplicity::ManyMany,
                vec![("w".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        let storage = StorageManager::new();
        for schema in catalog.tables() {
            storage.create_table(schema);
        }
        let members = catalog
            .get(group)
            .kind
            .as_rel_group()
            .unwrap()
            .rel_tables
            .iter()
            .map(|&id| {
                let schema = catalog.get(id);
                let rel = schema.kind.as_rel().unwrap();
                RelCopyMember {
                    table_id: id,
                    table_name: schema.name.clone(),
                    src_table: rel.src_table,
                    dst_table: rel.dst_table,
                }
            })
            .collect();
        (storage, members, catalog)
    }

    #[test]
    fn fwd_and_bwd_share_edge_ids() {
        let (storage, members, _catalog) = group_setup();
        let knows = members[0].table_id;
        let partitioner = Partitioner::new(&storage, members);
        partitioner
            .push_chunk(
                &[
                    ResolvedEdge {
                        member_idx: 0,
                        src_offset: 0,
                        dst_offset: 1,
                    },
                    ResolvedEdge {
                        member_idx: 0,
                        src_offset: 1,
                        dst_offset: 0,
                    },
                ],
                vec![vec![Value::Int64(10)], vec![Value::Int64(20)]],
            )
            .unwrap();
        partitioner.finish().unwrap();
        storage
            .with_rel_store(knows, |store| {
                let fwd = store.neighbors(RelDirection::Fwd, 0).to_vec();
                let bwd = store.neighbors(RelDirection::Bwd, 1).to_vec();
                assert_eq!(fwd.len(), 1);
                assert_eq!(fwd[0], bwd[0]);
            })
            .unwrap();
    }

    #[test]
    fn rows_route_to_their_member_tables() {
        let (storage, members, _catalog) = group_setup();
        let person_person = members[0].table_id;
        let person_city = members[1].table_id;
        let partitioner = Partitioner::new(&storage, members);
        partitioner
            .push_chunk(
                &[
                    ResolvedEdge {
                        member_idx: 1,
                        src_offset: 0,
                        dst_offset: 5,
                    },
                    ResolvedEdge {
                        member_idx: 0,
                        src_offset: 0,
                        dst_offset: 1,
                    },
                ],
                vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
            )
            .unwrap();
        partitioner.finish().unwrap();
        assert_eq!(storage.rel_count(person_person).unwrap(), 1);
        assert_eq!(storage.rel_count(person_city).unwrap(), 1);
        storage
            .with_rel_store(person_city, |store| {
                assert_eq!(store.neighbors(RelDirection::Fwd, 0), &[(5, 0)]);
            })
            .unwrap();
    }

    #[test]
    fn bucket_order_preserves_input_order() {
        let (storage, members, _catalog) = group_setup();
        let knows = members[0].table_id;
        let partitioner = Partitioner::new(&storage, members);
        let edges: Vec<ResolvedEdge> = (0..5)
            .map(|i| ResolvedEdge {
                member_idx: 0,
                src_offset: 0,
                dst_offset: i,
            })
            .collect();
        let props = (0..5).map(|i| vec![Value::Int64(i)]).collect();
        partitioner.push_chunk(&edges, props).unwrap();
        partitioner.finish().unwrap();
        storage
            .with_rel_store(knows, |store| {
                let neighbors: Vec<Offset> = store
                    .neighbors(RelDirection::Fwd, 0)
                    .iter()
                    .map(|&(nbr, _)| nbr)
                    .collect();
                assert_eq!(neighbors, vec![0, 1, 2, 3, 4]);
            })
            .unwrap();
    }
}
