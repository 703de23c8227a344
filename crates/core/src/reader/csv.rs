//! CSV source reader.

use std::collections::VecDeque;
use std::fs::File;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::{DataChunk, LogicalType, Value, CHUNK_CAPACITY};

use super::{ChunkReader, CsvOptions};

struct OpenFile {
    records: csv::StringRecordsIntoIter<File>,
    path: String,
    /// 1-based line of the next record, headers and skips included.
    row: u64,
}

pub struct CsvChunkReader {
    columns: Vec<(String, LogicalType)>,
    options: CsvOptions,
    pending: VecDeque<PathBuf>,
    current: Option<OpenFile>,
}

impl CsvChunkReader {
    pub fn open(
        paths: &[PathBuf],
        options: &CsvOptions,
        columns: &[(String, LogicalType)],
    ) -> Result<CsvChunkReader> {
        let mut reader = CsvChunkReader {
            columns: columns.to_vec(),
            options: options.clone(),
            pending: paths.iter().cloned().collect(),
            current: None,
        };
        reader.advance_file()?;
        Ok(reader)
    }

    fn advance_file(&mut self) -> Result<bool> {
        let Some(path) = self.pending.pop_front() else {
            self.current = None;
            return Ok(false);
        };
        let file = File::open(&path)?;
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .escape(Some(self.options.escape))
            .has_headers(self.options.has_header)
            .flexible(true);
        let mut records = builder.from_reader(file).into_records();
        let mut row = if self.options.has_header { 2 } else { 1 };
        for _ in 0..self.options.skip {
            if records.next().is_none() {
                break;
            }
            row += 1;
        }
        self.current = Some(OpenFile {
            records,
            path: path.display().to_string(),
            row,
        });
        Ok(true)
    }

    fn parse_field(&self, text: &str, dtype: &LogicalType, file: &str, row: u64) -> Result<Value> {
        let parse_error = || Error::ParseData {
            file: file.to_string(),
            row,
            value: text.to_string(),
            dtype: dtype.clone(),
        };
        if let LogicalType::List(child) = dtype {
            return self.parse_list(text, child, file, row);
        }
        Value::parse(text, dtype).ok_or_else(parse_error)
    }

    fn parse_list(
        &self,
        text: &str,
        child: &LogicalType,
        file: &str,
        row: u64,
    ) -> Result<Value> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let parse_error = || Error::ParseData {
            file: file.to_string(),
            row,
            value: text.to_string(),
            dtype: LogicalType::List(Box::new(child.clone())),
        };
        let inner = trimmed
            .strip_prefix(self.options.list_begin as char)
            .and_then(|rest| rest.strip_suffix(self.options.list_end as char))
            .ok_or_else(parse_error)?;
        if inner.trim().is_empty() {
            return Ok(Value::List(Vec::new()));
        }
        let mut items = Vec::new();
        for item in inner.split(',') {
            items.push(self.parse_field(item, child, file, row)?);
        }
        Ok(Value::List(items))
    }
}

impl ChunkReader for CsvChunkReader {
    fn next_chunk(&mut self) -> Result<Option<DataChunk>> {
        let mut chunk = DataChunk::new(self.columns.len());
        while chunk.num_rows() < CHUNK_CAPACITY {
            let Some(open) = self.current.as_mut() else {
                break;
            };
            match open.records.next() {
                Some(record) => {
                    let record = record?;
                    let row = open.row;
                    let path = open.path.clone();
                    open.row += 1;
                    let mut values = Vec::with_capacity(self.columns.len());
                    for (idx, (_, dtype)) in self.columns.iter().enumerate() {
                        let text = record.get(idx).unwrap_or("");
                        values.push(self.parse_field(text, dtype, &path, row)?);
                    }
                    chunk.push_row(values);
                }
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
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn int_string_columns() -> Vec<(String, LogicalType)> {
        vec![
            ("id".to_string(), LogicalType::Int64),
            ("name".to_string(), LogicalType::String),
        ]
    }

    #[test]
    fn reads_rows_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(&dir, "a.csv", "1,Alice\n2,Bob\n");
        let b = write_file(&dir, "b.csv", "3,Carol\n");
        let mut reader =
            CsvChunkReader::open(&[a, b], &CsvOptions::default(), &int_string_columns()).unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.num_rows(), 3);
        assert_eq!(chunk.column(0)[2], Value::Int64(3));
        assert_eq!(chunk.column(1)[0], Value::String("Alice".into()));
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn header_and_skip_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.csv", "id,name\n#junk,\n1,Alice\n");
        let options = CsvOptions {
            has_header: true,
            skip: 1,
            ..CsvOptions::default()
        };
        let mut reader = CsvChunkReader::open(
            std::slice::from_ref(&path),
            &options,
            &int_string_columns(),
        )
        .unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.num_rows(), 1);
        assert_eq!(chunk.column(0)[0], Value::Int64(1));
    }

    #[test]
    fn unparseable_field_reports_row_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.csv", "1,Alice\nx,Bob\n");
        let mut reader = CsvChunkReader::open(
            std::slice::from_ref(&path),
            &CsvOptions::default(),
            &int_string_columns(),
        )
        .unwrap();
        let err = reader.next_chunk().unwrap_err();
        match err {
            Error::ParseData { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "x");
            }
            other => panic!("expected ParseData, got {other}"),
        }
    }

    #[test]
    fn custom_delimiter_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.csv", "1|[10,20]\n");
        let options = CsvOptions {
            delimiter: b'|',
            ..CsvOptions::default()
        };
        let columns = vec![
            ("id".to_string(), LogicalType::Int64),
            (
                "xs".to_string(),
                LogicalType::List(Box::new(LogicalType::Int64)),
            ),
        ];
        let mut reader =
            CsvChunkReader::open(std::slice::from_ref(&path), &options, &columns).unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(
            chunk.column(1)[0],
            Value::List(vec![Value::Int64(10), Value::Int64(20)])
        );
    }

    #[test]
    fn missing_trailing_fields_read_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.csv", "1\n");
        let mut reader = CsvChunkReader::open(
            std::slice::from_ref(&path),
            &CsvOptions::default(),
            &int_string_columns(),
        )
        .unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.column(1)[0], Value::Null);
    }
}
