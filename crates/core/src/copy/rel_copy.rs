//! The rel-table writer path of COPY FROM: lookup, partition, commit.

use crate::binder::statement::RelCopyMember;
use crate::catalog::CatalogContent;
use crate::error::{Error, Result};
use crate::reader::RdfReaderMode;
use crate::storage::StorageManager;
use crate::transaction::CancellationToken;
use crate::types::{DataChunk, LogicalType, Value};

use super::index_lookup::{IndexLookup, ResolvedEdge};
use super::morsel::SharedScanState;
use super::partitioner::Partitioner;

/// Resolved write-side of one rel COPY.
pub struct RelCopyTarget {
    pub table_name: String,
    pub members: Vec<RelCopyMember>,
    /// Property types, shared by every member of a group.
    prop_types: Vec<LogicalType>,
    /// Triple-table ingest reorders the scanned columns; see `split_chunk`.
    rdf_mode: Option<RdfReaderMode>,
}

impl RelCopyTarget {
    pub fn resolve(
        catalog: &CatalogContent,
        members: Vec<RelCopyMember>,
        rdf_mode: Option<RdfReaderMode>,
    ) -> RelCopyTarget {
        let first = catalog.get(members[0].table_id);
        let prop_types = first
            .file_facing_properties()
            .map(|p| p.dtype.clone())
            .collect();
        RelCopyTarget {
            table_name: first.name.clone(),
            members,
            prop_types,
            rdf_mode,
        }
    }

    /// Splits a scanned chunk into key columns and property rows.
    ///
    /// Regular sources put the two keys first and the properties after.
    /// Turtle triple sources scan `(subject, predicate, object)`: subject
    /// and object are the edge's endpoints, the predicate offset is the
    /// single `pid` property.
    fn split_chunk<'c>(
        &self,
        chunk: &'c DataChunk,
    ) -> (&'c [Value], &'c [Value], Vec<Vec<Value>>) {
        match self.rdf_mode {
            Some(RdfReaderMode::ResourceTriple) | Some(RdfReaderMode::LiteralTriple) => {
                let props = chunk
                    .column(1)
                    .iter()
                    .map(|pid| vec![pid.clone()])
                    .collect();
                (chunk.column(0), chunk.column(2), props)
            }
            _ => {
                let props = (0..chunk.num_rows())
                    .map(|row| {
                        (2..chunk.num_columns())
                            .map(|col| chunk.column(col)[row].clone())
                            .collect()
                    })
                    .collect();
                (chunk.column(0), chunk.column(1), props)
            }
        }
    }

    fn conform_props(&self, prop_rows: &mut [Vec<Value>], base_row: u64) -> Result<()> {
        for (row, values) in prop_rows.iter_mut().enumerate() {
            for (value, dtype) in values.iter_mut().zip(&self.prop_types) {
                let conformed = value.clone().widen_to(dtype);
                if !conformed.conforms_to(dtype) {
                    return Err(Error::ParseData {
                        file: self.table_name.clone(),
                        row: base_row + row as u64,
                        value: conformed.to_string(),
                        dtype: dtype.clone(),
                    });
                }
                *value = conformed;
            }
        }
        Ok(())
    }
}

/// Drives one rel COPY: scan → (lookup) → partition → commit. Returns the
/// number of edges written.
pub fn run(
    catalog: &CatalogContent,
    storage: &StorageManager,
    scan: &SharedScanState,
    target: &RelCopyTarget,
    cancel: &CancellationToken,
    num_threads: usize,
) -> Result<u64> {
    let lookup = match target.rdf_mode {
        // Triple readers resolve offsets themselves through the resource
        // index; everything else resolves here.
        Some(_) => None,
        None => Some(IndexLookup::open(catalog, storage, &target.members)?),
    };
    let partitioner = Partitioner::new(storage, target.members.clone());
    let threads = num_threads.max(1);
    let total = std::thread::scope(|scope| -> Result<u64> {
        let lookup = &lookup;
        let partitioner = &partitioner;
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            handles.push(scope.spawn(move || worker(scan, target, lookup, partitioner, cancel)));
        }
        let mut total = 0;
        let mut first_error = None;
        for handle in handles {
            match handle.join().expect("copy worker panicked") {
                Ok(rows) => total += rows,
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(_) => {}
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(total),
        }
    })?;
    partitioner.finish()?;
    log::debug!("copied {total} rels into {}", target.table_name);
    Ok(total)
}

fn worker(
    scan: &SharedScanState,
    target: &RelCopyTarget,
    lookup: &Option<IndexLookup>,
    partitioner: &Partitioner<'_>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut rows_written = 0u64;
    while let Some((chunk, base)) = scan.next_batch()? {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        let (src_keys, dst_keys, mut prop_rows) = target.split_chunk(&chunk);
        target.conform_props(&mut prop_rows, base)?;
        let resolved = match lookup {
            Some(lookup) => lookup.lookup_chunk(src_keys, dst_keys)?,
            None => pre_resolved(src_keys, dst_keys)?,
        };
        partitioner.push_chunk(&resolved, prop_rows)?;
        rows_written += chunk.num_rows() as u64;
    }
    Ok(rows_written)
}

/// Triple sources arrive with offsets already resolved.
fn pre_resolved(src: &[Value], dst: &[Value]) -> Result<Vec<ResolvedEdge>> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| match (s, d) {
            (Value::InternalId(src_offset), Value::InternalId(dst_offset)) => Ok(ResolvedEdge {
                member_idx: 0,
                src_offset: *src_offset,
                dst_offset: *dst_offset,
            }),
            other => Err(Error::NotImplemented(format!(
                "unexpected key values in pre-resolved rel chunk: {other:?}"
            ))),
        })
        .collect()
}

/// Offsets and counters are per member table; one checkpoint per member
/// restores them all on abort.
pub fn member_tables(target: &RelCopyTarget) -> Vec<quiver_primitives::TableId> {
    target.members.iter().map(|m| m.table_id).collect()
}
