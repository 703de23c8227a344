//! npy source reader: one file per property, loaded `BY COLUMN`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use quiver_primitives::Offset;

use crate::error::Result;
use crate::types::{DataChunk, LogicalType, Value, CHUNK_CAPACITY};

use super::ChunkReader;

const NPY_MAGIC: [u8; 6] = *b"\x93NUMPY";

struct NpyColumn {
    reader: BufReader<File>,
    dtype: LogicalType,
    element_size: usize,
}

/// Reads N aligned single-column files, emitting row-wise chunks.
pub struct NpyChunkReader {
    columns: Vec<NpyColumn>,
    num_rows: Offset,
    cursor: Offset,
}

impl NpyChunkReader {
    pub fn open(paths: &[PathBuf], columns: &[(String, LogicalType)]) -> Result<NpyChunkReader> {
        debug_assert_eq!(paths.len(), columns.len());
        let mut opened = Vec::with_capacity(paths.len());
        let mut num_rows: Option<Offset> = None;
        for path in paths {
            let column = open_column(path)?;
            match num_rows {
                None => num_rows = Some(column.1),
                Some(expected) if expected != column.1 => {
                    return Err(anyhow!(
                        "npy file {} has {} rows, expected {}",
                        path.display(),
                        column.1,
                        expected
                    )
                    .into());
                }
                Some(_) => {}
            }
            opened.push(column.0);
        }
        Ok(NpyChunkReader {
            columns: opened,
            num_rows: num_rows.unwrap_or(0),
            cursor: 0,
        })
    }

    /// The element type each file carries, in file order.
    pub fn column_types(&self) -> Vec<LogicalType> {
        self.columns.iter().map(|c| c.dtype.clone()).collect()
    }
}

fn open_column(path: &Path) -> Result<(NpyColumn, Offset)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if magic != NPY_MAGIC {
        return Err(anyhow!("{} is not an npy file", path.display()).into());
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        other => {
            return Err(anyhow!(
                "unsupported npy version {other} in {}",
                path.display()
            )
            .into());
        }
    };
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);
    let descr = dict_value(&header, "descr")
        .ok_or_else(|| anyhow!("npy header of {} lacks a descr", path.display()))?;
    let (dtype, element_size) = parse_descr(&descr)
        .ok_or_else(|| anyhow!("unsupported npy dtype {descr} in {}", path.display()))?;
    if dict_value(&header, "fortran_order").as_deref() == Some("True") {
        return Err(anyhow!("fortran-ordered npy file {} is not supported", path.display()).into());
    }
    let shape = dict_value(&header, "shape")
        .ok_or_else(|| anyhow!("npy header of {} lacks a shape", path.display()))?;
    let num_rows = parse_1d_shape(&shape).ok_or_else(|| {
        anyhow!(
            "npy file {} must be one-dimensional, got shape {shape}",
            path.display()
        )
    })?;
    Ok((
        NpyColumn {
            reader,
            dtype,
            element_size,
        },
        num_rows,
    ))
}

/// Pulls the value of `key` out of the header's python-dict literal.
fn dict_value(header: &str, key: &str) -> Option<String> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    let rest = header[start..].trim_start();
    if let Some(quoted) = rest.strip_prefix('\'') {
        return Some(quoted[..quoted.find('\'')?].to_string());
    }
    if rest.starts_with('(') {
        return Some(rest[..rest.find(')')? + 1].to_string());
    }
    let end = rest.find([',', '}'])?;
    Some(rest[..end].trim().to_string())
}

fn parse_descr(descr: &str) -> Option<(LogicalType, usize)> {
    match descr {
        "|b1" => Some((LogicalType::Bool, 1)),
        "<i2" => Some((LogicalType::Int16, 2)),
        "<i4" => Some((LogicalType::Int32, 4)),
        "<i8" => Some((LogicalType::Int64, 8)),
        "<f4" => Some((LogicalType::Float, 4)),
        "<f8" => Some((LogicalType::Double, 8)),
        _ => None,
    }
}

fn parse_1d_shape(shape: &str) -> Option<Offset> {
    let inner = shape.strip_prefix('(')?.strip_suffix(')')?;
    let first = inner.split(',').next()?.trim();
    if inner.split(',').filter(|part| !part.trim().is_empty()).count() != 1 {
        return None;
    }
    first.parse().ok()
}

fn read_element(column: &mut NpyColumn) -> Result<Value> {
    let mut buf = [0u8; 8];
    let slot = &mut buf[..column.element_size];
    column.reader.read_exact(slot)?;
    let value = match column.dtype {
        LogicalType::Bool => Value::Bool(slot[0] != 0),
        LogicalType::Int16 => Value::Int16(i16::from_le_bytes([slot[0], slot[1]])),
        LogicalType::Int32 => Value::Int32(i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
        LogicalType::Int64 => Value::Int64(i64::from_le_bytes(buf)),
        LogicalType::Float => Value::Float(f32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
        LogicalType::Double => Value::Double(f64::from_le_bytes(buf)),
        _ => unreachable!("descr parsing admits numeric types only"),
    };
    Ok(value)
}

impl ChunkReader for NpyChunkReader {
    fn next_chunk(&mut self) -> Result<Option<DataChunk>> {
        if self.cursor >= self.num_rows {
            return Ok(None);
        }
        let rows = ((self.num_rows - self.cursor) as usize).min(CHUNK_CAPACITY);
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                values.push(read_element(column)?);
            }
            columns.push(values);
        }
        self.cursor += rows as Offset;
        Ok(Some(DataChunk::from_columns(columns)))
    }
}

#[cfg(test)]
pub(crate) fn write_npy_file(path: &Path, descr: &str, values: &[i64], element_size: usize) {
    use std::io::Write as _;
    let mut header = format!(
        "{{'descr': '{descr}', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    // Pad the header so that magic + version + len + header is 64-aligned.
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');
    let mut file = File::create(path).unwrap();
    file.write_all(&NPY_MAGIC).unwrap();
    file.write_all(&[1, 0]).unwrap();
    file.write_all(&(header.len() as u16).to_le_bytes()).unwrap();
    file.write_all(header.as_bytes()).unwrap();
    for value in values {
        file.write_all(&value.to_le_bytes()[..element_size]).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_aligned_columns() {
        let dir = tempfile::tempdir().unwrap();
        let ids = dir.path().join("ids.npy");
        let scores = dir.path().join("scores.npy");
        write_npy_file(&ids, "<i8", &[10, 20, 30], 8);
        write_npy_file(&scores, "<i4", &[1, 2, 3], 4);
        let columns = vec![
            ("id".to_string(), LogicalType::ArrowColumn),
            ("score".to_string(), LogicalType::ArrowColumn),
        ];
        let mut reader = NpyChunkReader::open(&[ids, scores], &columns).unwrap();
        assert_eq!(
            reader.column_types(),
            vec![LogicalType::Int64, LogicalType::Int32]
        );
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.num_rows(), 3);
        assert_eq!(chunk.column(0)[1], Value::Int64(20));
        assert_eq!(chunk.column(1)[2], Value::Int32(3));
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.npy");
        let b = dir.path().join("b.npy");
        write_npy_file(&a, "<i8", &[1, 2], 8);
        write_npy_file(&b, "<i8", &[1, 2, 3], 8);
        let columns = vec![
            ("a".to_string(), LogicalType::ArrowColumn),
            ("b".to_string(), LogicalType::ArrowColumn),
        ];
        assert!(NpyChunkReader::open(&[a, b], &columns).is_err());
    }

    #[test]
    fn rejects_non_npy_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npy");
        std::fs::write(&path, b"not numpy at all").unwrap();
        let columns = vec![("a".to_string(), LogicalType::ArrowColumn)];
        assert!(NpyChunkReader::open(std::slice::from_ref(&path), &columns).is_err());
    }
}
