//! Parquet source reader. Columns are matched to table properties by name;
//! narrower on-disk integers widen at write time.

use std::collections::VecDeque;
use std::fs::File;
use std::path::PathBuf;

use anyhow::anyhow;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row};

use crate::error::Result;
use crate::types::{DataChunk, LogicalType, Value, CHUNK_CAPACITY};

use super::ChunkReader;

pub struct ParquetChunkReader {
    columns: Vec<(String, LogicalType)>,
    pending: VecDeque<PathBuf>,
    /// Rows of the current file, already mapped to the expected columns.
    buffered: VecDeque<Vec<Value>>,
}

impl ParquetChunkReader {
    pub fn open(paths: &[PathBuf], columns: &[(String, LogicalType)]) -> Result<ParquetChunkReader> {
        let mut reader = ParquetChunkReader {
            columns: columns.to_vec(),
            pending: paths.iter().cloned().collect(),
            buffered: VecDeque::new(),
        };
        reader.advance_file()?;
        Ok(reader)
    }

    fn advance_file(&mut self) -> Result<bool> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(false);
        };
        let path_text = path.display().to_string();
        let file = File::open(&path)?;
        let file_reader = SerializedFileReader::new(file)?;
        for row in file_reader.get_row_iter(None)? {
            let row = row?;
            self.buffered.push_back(self.row_to_values(&row, &path_text)?);
        }
        Ok(true)
    }

    fn row_to_values(&self, row: &Row, path: &str) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.columns.len());
        for (name, _) in &self.columns {
            let field = row
                .get_column_iter()
                .find(|(column_name, _)| column_name.as_str() == name.as_str())
                .map(|(_, field)| field)
                .ok_or_else(|| anyhow!("column {name} not found in parquet file {path}"))?;
            values.push(field_to_value(field, path)?);
        }
        Ok(values)
    }
}

fn field_to_value(field: &Field, path: &str) -> Result<Value> {
    let value = match field {
        Field::Null => Value::Null,
        Field::Bool(v) => Value::Bool(*v),
        Field::Byte(v) => Value::Int16(*v as i16),
        Field::Short(v) => Value::Int16(*v),
        Field::Int(v) => Value::Int32(*v),
        Field::Long(v) => Value::Int64(*v),
        Field::UByte(v) => Value::Int16(*v as i16),
        Field::UShort(v) => Value::Int32(*v as i32),
        Field::UInt(v) => Value::Int64(*v as i64),
        Field::Float(v) => Value::Float(*v),
        Field::Double(v) => Value::Double(*v),
        Field::Str(v) => Value::String(v.clone()),
        Field::Bytes(v) => Value::Blob(v.data().to_vec()),
        Field::Date(v) => Value::Date(*v),
        Field::TimestampMillis(v) => Value::Timestamp(v * 1_000),
        Field::TimestampMicros(v) => Value::Timestamp(*v),
        other => {
            return Err(anyhow!("unsupported parquet field {other:?} in {path}").into());
        }
    };
    Ok(value)
}

impl ChunkReader for ParquetChunkReader {
    fn next_chunk(&mut self) -> Result<Option<DataChunk>> {
        let mut chunk = DataChunk::new(self.columns.len());
        while chunk.num_rows() < CHUNK_CAPACITY {
            match self.buffered.pop_front() {
                Some(row) => chunk.push_row(row),
                None => {
                    if !self.advance_file()? {
                        break;
                    }
                }
            }
        }
        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::export::write_parquet_file;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_the_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.parquet");
        let columns = vec![
            ("id".to_string(), LogicalType::Int64),
            ("name".to_string(), LogicalType::String),
        ];
        let mut chunk = DataChunk::new(2);
        chunk.push_row(vec![Value::Int64(1), Value::String("Alice".into())]);
        chunk.push_row(vec![Value::Int64(2), Value::String("Bob".into())]);
        write_parquet_file(&path, &columns, &[chunk]).unwrap();

        let expected = vec![
            ("id".to_string(), LogicalType::ArrowColumn),
            ("name".to_string(), LogicalType::ArrowColumn),
        ];
        let mut reader =
            ParquetChunkReader::open(std::slice::from_ref(&path), &expected).unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.num_rows(), 2);
        assert_eq!(chunk.column(0)[1], Value::Int64(2));
        assert_eq!(chunk.column(1)[0], Value::String("Alice".into()));
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.parquet");
        let columns = vec![("id".to_string(), LogicalType::Int64)];
        let mut chunk = DataChunk::new(1);
        chunk.push_row(vec![Value::Int64(1)]);
        write_parquet_file(&path, &columns, &[chunk]).unwrap();

        let expected = vec![("absent".to_string(), LogicalType::ArrowColumn)];
        assert!(ParquetChunkReader::open(std::slice::from_ref(&path), &expected).is_err());
    }
}
