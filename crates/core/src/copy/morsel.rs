//! Morsel-driven shared scan state.
//!
//! Worker threads pull batches through a mutex touched only at batch
//! boundaries: take a chunk from the reader, optionally deduplicate it, and
//! assign its base row offset, all in one critical section so offsets follow
//! reader order even when workers race.

use parking_lot::Mutex;
use quiver_primitives::Offset;
use std::collections::HashSet;
use std::sync::Arc;

use crate::binder::statement::{BoundQuery, BoundScanSource};
use crate::error::Result;
use crate::reader::{self, ChunkReader};
use crate::types::{DataChunk, LogicalType, Value};

/// A disjoint interval of rows handed to one worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Morsel {
    pub start_offset: Offset,
    pub end_offset: Offset,
}

impl Morsel {
    pub fn num_rows(&self) -> u64 {
        self.end_offset - self.start_offset
    }
}

/// Shared state for the morsel-emitting call-style table functions: a row
/// cursor over a known-size output, advanced under a mutex.
pub struct CallFuncSharedState {
    inner: Mutex<(Offset, Offset)>,
}

impl CallFuncSharedState {
    pub fn new(max_offset: Offset) -> CallFuncSharedState {
        CallFuncSharedState {
            inner: Mutex::new((0, max_offset)),
        }
    }

    /// The next morsel, or `None` once the output is exhausted.
    pub fn next_morsel(&self, capacity: u64) -> Option<Morsel> {
        let mut guard = self.inner.lock();
        let (cursor, max) = *guard;
        debug_assert!(cursor <= max);
        if cursor == max {
            return None;
        }
        let end = max.min(cursor + capacity);
        guard.0 = end;
        Some(Morsel {
            start_offset: cursor,
            end_offset: end,
        })
    }
}

enum ScanInput {
    Reader(Box<dyn ChunkReader>),
    Object {
        chunks: Arc<Vec<DataChunk>>,
        cursor: usize,
    },
    Query(BoundQuery),
}

struct ScanInner {
    input: ScanInput,
    next_offset: Offset,
    distinct: Option<HashSet<Vec<String>>>,
}

/// One COPY source being drained by a worker pool.
pub struct SharedScanState {
    inner: Mutex<ScanInner>,
}

impl SharedScanState {
    /// Opens the scan. `base_offset` is the target table's pre-COPY row
    /// count; `distinct` enables row-wise deduplication before offsets are
    /// assigned.
    pub fn open(
        source: &BoundScanSource,
        columns: &[(String, LogicalType)],
        rdf: Option<reader::turtle::RdfReaderContext>,
        base_offset: Offset,
        distinct: bool,
    ) -> Result<SharedScanState> {
        let input = match source {
            BoundScanSource::File(config) => {
                ScanInput::Reader(reader::open_reader(config, columns, rdf)?)
            }
            BoundScanSource::Object(chunks) => ScanInput::Object {
                chunks: chunks.clone(),
                cursor: 0,
            },
            BoundScanSource::Query(query) => ScanInput::Query(query.clone()),
        };
        Ok(SharedScanState {
            inner: Mutex::new(ScanInner {
                input,
                next_offset: base_offset,
                distinct: distinct.then(HashSet::new),
            }),
        })
    }

    /// The next batch plus its assigned base offset, or `None` at end of
    /// input. Holding the lock across the read keeps offset assignment in
    /// reader order.
    pub fn next_batch(&self) -> Result<Option<(DataChunk, Offset)>> {
        let mut guard = self.inner.lock();
        loop {
            let chunk = match &mut guard.input {
                ScanInput::Reader(reader) => reader.next_chunk()?,
                ScanInput::Object { chunks, cursor } => {
                    let chunk = chunks.get(*cursor).cloned();
                    *cursor += 1;
                    chunk
                }
                ScanInput::Query(query) => query.source.next_chunk()?,
            };
            let Some(chunk) = chunk else {
                return Ok(None);
            };
            let chunk = match &mut guard.distinct {
                Some(seen) => {
                    let mask: Vec<bool> = (0..chunk.num_rows())
                        .map(|row| seen.insert(row_key(&chunk, row)))
                        .collect();
                    let filtered = chunk.filter(&mask);
                    if filtered.is_empty() {
                        continue;
                    }
                    filtered
                }
                None => chunk,
            };
            let base = guard.next_offset;
            guard.next_offset += chunk.num_rows() as Offset;
            return Ok(Some((chunk, base)));
        }
    }

    /// Rows assigned so far.
    pub fn rows_scanned(&self, base_offset: Offset) -> u64 {
        self.inner.lock().next_offset - base_offset
    }
}

fn row_key(chunk: &DataChunk, row: usize) -> Vec<String> {
    (0..chunk.num_columns())
        .map(|col| match &chunk.column(col)[row] {
            Value::Null => String::new(),
            value => value.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_func_morsels_partition_the_range() {
        let state = CallFuncSharedState::new(5);
        let first = state.next_morsel(2).unwrap();
        assert_eq!((first.start_offset, first.end_offset), (0, 2));
        let second = state.next_morsel(2).unwrap();
        assert_eq!((second.start_offset, second.end_offset), (2, 4));
        let third = state.next_morsel(2).unwrap();
        assert_eq!(third.num_rows(), 1);
        assert!(state.next_morsel(2).is_none());
    }

    #[test]
    fn object_scan_assigns_consecutive_offsets() {
        let mut a = DataChunk::new(1);
        a.push_row(vec![Value::Int64(1)]);
        a.push_row(vec![Value::Int64(2)]);
        let mut b = DataChunk::new(1);
        b.push_row(vec![Value::Int64(3)]);
        let source = BoundScanSource::Object(Arc::new(vec![a, b]));
        let scan = SharedScanState::open(&source, &[], None, 10, false).unwrap();
        let (chunk, base) = scan.next_batch().unwrap().unwrap();
        assert_eq!((chunk.num_rows(), base), (2, 10));
        let (chunk, base) = scan.next_batch().unwrap().unwrap();
        assert_eq!((chunk.num_rows(), base), (1, 12));
        assert!(scan.next_batch().unwrap().is_none());
        assert_eq!(scan.rows_scanned(10), 3);
    }

    #[test]
    fn distinct_filters_before_offset_assignment() {
        let mut a = DataChunk::new(1);
        a.push_row(vec![Value::String("x".into())]);
        a.push_row(vec![Value::String("y".into())]);
        a.push_row(vec![Value::String("x".into())]);
        let mut b = DataChunk::new(1);
        b.push_row(vec![Value::String("y".into())]);
        let source = BoundScanSource::Object(Arc::new(vec![a, b]));
        let scan = SharedScanState::open(&source, &[], None, 0, true).unwrap();
        let (chunk, base) = scan.next_batch().unwrap().unwrap();
        assert_eq!((chunk.num_rows(), base), (2, 0));
        // The second chunk is entirely duplicates.
        assert!(scan.next_batch().unwrap().is_none());
    }
}
