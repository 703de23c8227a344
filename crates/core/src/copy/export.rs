//! COPY TO: export a query result to a CSV or Parquet file.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{
    BoolType, ByteArray, ByteArrayType, DoubleType, FloatType, Int32Type, Int64Type,
};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type as SchemaType;

use crate::binder::statement::BoundCopyToInfo;
use crate::error::{Error, Result};
use crate::reader::FileType;
use crate::transaction::CancellationToken;
use crate::types::{DataChunk, LogicalType, Value};

/// Drains the bound query and writes the target file. Returns rows written.
pub fn run(info: &BoundCopyToInfo, cancel: &CancellationToken) -> Result<u64> {
    let mut chunks = Vec::new();
    let mut rows = 0u64;
    while let Some(chunk) = info.query.source.next_chunk()? {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        rows += chunk.num_rows() as u64;
        chunks.push(chunk);
    }
    match info.file_type {
        FileType::Csv => write_csv_file(info, &chunks)?,
        FileType::Parquet => write_parquet_file(&info.path, &info.query.columns, &chunks)?,
        _ => unreachable!("binder restricts COPY TO to csv and parquet"),
    }
    log::debug!("exported {rows} rows to {}", info.path.display());
    Ok(rows)
}

fn write_csv_file(info: &BoundCopyToInfo, chunks: &[DataChunk]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(info.csv.delimiter)
        .quote(info.csv.quote)
        .from_path(&info.path)?;
    writer.write_record(info.query.columns.iter().map(|(name, _)| name.as_str()))?;
    for chunk in chunks {
        for row in 0..chunk.num_rows() {
            let record: Vec<String> = (0..chunk.num_columns())
                .map(|col| match &chunk.column(col)[row] {
                    Value::Null => String::new(),
                    value => value.to_string(),
                })
                .collect();
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn parquet_field(name: &str, dtype: &LogicalType) -> Result<Arc<SchemaType>> {
    let (physical, converted) = match dtype {
        LogicalType::Bool => (PhysicalType::BOOLEAN, ConvertedType::NONE),
        LogicalType::Int16 => (PhysicalType::INT32, ConvertedType::INT_16),
        LogicalType::Int32 => (PhysicalType::INT32, ConvertedType::NONE),
        LogicalType::Int64 | LogicalType::Serial | LogicalType::InternalId => {
            (PhysicalType::INT64, ConvertedType::NONE)
        }
        LogicalType::Float => (PhysicalType::FLOAT, ConvertedType::NONE),
        LogicalType::Double => (PhysicalType::DOUBLE, ConvertedType::NONE),
        LogicalType::String => (PhysicalType::BYTE_ARRAY, ConvertedType::UTF8),
        LogicalType::Blob => (PhysicalType::BYTE_ARRAY, ConvertedType::NONE),
        LogicalType::Date => (PhysicalType::INT32, ConvertedType::DATE),
        LogicalType::Timestamp => (PhysicalType::INT64, ConvertedType::TIMESTAMP_MICROS),
        other => {
            return Err(Error::NotImplemented(format!(
                "exporting {other} columns to parquet"
            )))
        }
    };
    let field = SchemaType::primitive_type_builder(name, physical)
        .with_repetition(Repetition::OPTIONAL)
        .with_converted_type(converted)
        .build()?;
    Ok(Arc::new(field))
}

/// Writes `chunks` as a single-row-group parquet file.
pub fn write_parquet_file(
    path: &Path,
    columns: &[(String, LogicalType)],
    chunks: &[DataChunk],
) -> Result<()> {
    let fields: Vec<Arc<SchemaType>> = columns
        .iter()
        .map(|(name, dtype)| parquet_field(name, dtype))
        .collect::<Result<_>>()?;
    let schema = Arc::new(
        SchemaType::group_type_builder("schema")
            .with_fields(fields)
            .build()?,
    );
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;
    let mut row_group = writer.next_row_group()?;
    let mut column_idx = 0;
    while let Some(mut column_writer) = row_group.next_column()? {
        let dtype = &columns[column_idx].1;
        write_parquet_column(column_writer.untyped(), dtype, chunks, column_idx)?;
        column_writer.close()?;
        column_idx += 1;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

macro_rules! write_typed_column {
    ($writer:expr, $parquet_ty:ty, $values:expr, $defs:expr) => {{
        let typed = parquet::column::writer::get_typed_column_writer_mut::<$parquet_ty>($writer);
        typed.write_batch($values, Some($defs), None)?;
    }};
}

fn write_parquet_column(
    writer: &mut parquet::column::writer::ColumnWriter<'_>,
    dtype: &LogicalType,
    chunks: &[DataChunk],
    column_idx: usize,
) -> Result<()> {
    let values: Vec<&Value> = chunks
        .iter()
        .flat_map(|chunk| chunk.column(column_idx).iter())
        .collect();
    let defs: Vec<i16> = values
        .iter()
        .map(|value| if value.is_null() { 0 } else { 1 })
        .collect();
    match dtype {
        LogicalType::Bool => {
            let data: Vec<bool> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            write_typed_column!(writer, BoolType, &data, &defs);
        }
        LogicalType::Int16 | LogicalType::Int32 | LogicalType::Date => {
            let data: Vec<i32> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Int16(x) => Some(*x as i32),
                    Value::Int32(x) => Some(*x),
                    Value::Date(x) => Some(*x),
                    _ => None,
                })
                .collect();
            write_typed_column!(writer, Int32Type, &data, &defs);
        }
        LogicalType::Int64
        | LogicalType::Serial
        | LogicalType::InternalId
        | LogicalType::Timestamp => {
            let data: Vec<i64> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Int64(x) | Value::Timestamp(x) | Value::Interval(x) => Some(*x),
                    Value::InternalId(x) => Some(*x as i64),
                    _ => None,
                })
                .collect();
            write_typed_column!(writer, Int64Type, &data, &defs);
        }
        LogicalType::Float => {
            let data: Vec<f32> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Float(x) => Some(*x),
                    _ => None,
                })
                .collect();
            write_typed_column!(writer, FloatType, &data, &defs);
        }
        LogicalType::Double => {
            let data: Vec<f64> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Double(x) => Some(*x),
                    _ => None,
                })
                .collect();
            write_typed_column!(writer, DoubleType, &data, &defs);
        }
        LogicalType::String | LogicalType::Blob => {
            let data: Vec<ByteArray> = values
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(ByteArray::from(s.as_bytes().to_vec())),
                    Value::Blob(b) => Some(ByteArray::from(b.clone())),
                    _ => None,
                })
                .collect();
            write_typed_column!(writer, ByteArrayType, &data, &defs);
        }
        other => {
            return Err(Error::NotImplemented(format!(
                "exporting {other} columns to parquet"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::statement::{BoundQuery, QuerySource};
    use crate::reader::CsvOptions;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct MemSource {
        chunks: Mutex<Vec<DataChunk>>,
    }

    impl QuerySource for MemSource {
        fn next_chunk(&self) -> Result<Option<DataChunk>> {
            let mut chunks = self.chunks.lock();
            if chunks.is_empty() {
                Ok(None)
            } else {
                Ok(Some(chunks.remove(0)))
            }
        }
    }

    fn query_over(columns: Vec<(String, LogicalType)>, chunks: Vec<DataChunk>) -> BoundQuery {
        BoundQuery {
            columns,
            source: Arc::new(MemSource {
                chunks: Mutex::new(chunks),
            }),
        }
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut chunk = DataChunk::new(2);
        chunk.push_row(vec![Value::Int64(1), Value::String("Alice".into())]);
        chunk.push_row(vec![Value::Null, Value::String("Bob".into())]);
        let info = BoundCopyToInfo {
            query: query_over(
                vec![
                    ("id".to_string(), LogicalType::Int64),
                    ("name".to_string(), LogicalType::String),
                ],
                vec![chunk],
            ),
            path: path.clone(),
            file_type: FileType::Csv,
            csv: CsvOptions::default(),
        };
        let rows = run(&info, &CancellationToken::new()).unwrap();
        assert_eq!(rows, 2);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "id,name\n1,Alice\n,Bob\n");
    }
}
