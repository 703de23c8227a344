//! The node-table writer path of COPY FROM.

use quiver_primitives::{Offset, PropertyId, TableId};

use crate::catalog::CatalogContent;
use crate::error::{Error, Result};
use crate::storage::StorageManager;
use crate::transaction::CancellationToken;
use crate::types::{DataChunk, LogicalType, Value};

use super::morsel::SharedScanState;

/// Where a row's primary key comes from during load.
enum PkSource {
    /// The key is a file column (index into the file-facing property list).
    Column(usize),
    /// The key is the serial value the loader assigns.
    Serial,
}

/// Resolved write-side of one node COPY.
pub struct NodeCopyTarget {
    pub table_id: TableId,
    pub table_name: String,
    /// File-facing properties in file-column order.
    file_props: Vec<(PropertyId, LogicalType)>,
    serial: Option<PropertyId>,
    pk: PkSource,
    /// npy sources require the on-disk dtype to equal the property type;
    /// other formats widen narrower integers and floats.
    strict_types: bool,
}

impl NodeCopyTarget {
    pub fn resolve(
        catalog: &CatalogContent,
        table_id: TableId,
        strict_types: bool,
    ) -> NodeCopyTarget {
        let schema = catalog.get(table_id);
        let node = schema
            .kind
            .as_node()
            .expect("node copy requires a node table");
        let file_props: Vec<(PropertyId, LogicalType)> = schema
            .file_facing_properties()
            .map(|p| (p.id, p.dtype.clone()))
            .collect();
        let serial = schema
            .properties
            .iter()
            .find(|p| p.dtype.is_serial())
            .map(|p| p.id);
        let pk = if serial == Some(node.primary_key_pid) {
            PkSource::Serial
        } else {
            PkSource::Column(
                file_props
                    .iter()
                    .position(|(pid, _)| *pid == node.primary_key_pid)
                    .expect("non-serial primary key is file facing"),
            )
        };
        NodeCopyTarget {
            table_id,
            table_name: schema.name.clone(),
            file_props,
            serial,
            pk,
            strict_types,
        }
    }
}

/// Drives one node COPY with `num_threads` workers over the shared scan.
/// Returns the number of rows written.
pub fn run(
    storage: &StorageManager,
    scan: &SharedScanState,
    target: &NodeCopyTarget,
    cancel: &CancellationToken,
    num_threads: usize,
) -> Result<u64> {
    let threads = num_threads.max(1);
    let total = std::thread::scope(|scope| -> Result<u64> {
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            handles.push(scope.spawn(move || worker(storage, scan, target, cancel)));
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
    log::debug!("copied {total} rows into node table {}", target.table_name);
    Ok(total)
}

fn worker(
    storage: &StorageManager,
    scan: &SharedScanState,
    target: &NodeCopyTarget,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut rows_written = 0u64;
    while let Some((chunk, base)) = scan.next_batch()? {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        rows_written += write_chunk(storage, target, &chunk, base)?;
    }
    Ok(rows_written)
}

fn write_chunk(
    storage: &StorageManager,
    target: &NodeCopyTarget,
    chunk: &DataChunk,
    base: Offset,
) -> Result<u64> {
    let num_rows = chunk.num_rows() as u64;
    let mut columns = Vec::with_capacity(target.file_props.len());
    for (idx, (_, dtype)) in target.file_props.iter().enumerate() {
        columns.push(conform_column(target, chunk.column(idx), dtype, base)?);
    }
    let serial_values: Option<Vec<Value>> = target.serial.map(|_| {
        (base..base + num_rows)
            .map(|offset| Value::Int64(offset as i64))
            .collect()
    });
    storage.with_node_store(target.table_id, |store| -> Result<()> {
        for ((pid, _), values) in target.file_props.iter().zip(&columns) {
            store.write_column_range(*pid, base, values);
        }
        if let (Some(pid), Some(values)) = (target.serial, &serial_values) {
            store.write_column_range(pid, base, values);
        }
        let keys = match target.pk {
            PkSource::Column(idx) => &columns[idx],
            PkSource::Serial => serial_values
                .as_ref()
                .expect("serial primary key implies serial values"),
        };
        store.index_keys(base, keys)
    })??;
    Ok(num_rows)
}

fn conform_column(
    target: &NodeCopyTarget,
    values: &[Value],
    dtype: &LogicalType,
    base: Offset,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(values.len());
    for (row, value) in values.iter().enumerate() {
        let value = if target.strict_types {
            value.clone()
        } else {
            value.clone().widen_to(dtype)
        };
        if !value.conforms_to(dtype) {
            return Err(Error::ParseData {
                file: target.table_name.clone(),
                row: base + row as u64,
                value: value.to_string(),
                dtype: dtype.clone(),
            });
        }
        out.push(value);
    }
    Ok(out)
}
