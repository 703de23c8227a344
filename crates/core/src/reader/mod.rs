//! Source-file readers feeding the copy pipeline.

pub mod csv;
pub mod npy;
pub mod parquet;
pub mod turtle;

use std::path::{Path, PathBuf};

use crate::error::{BinderError, Result};
use crate::types::{DataChunk, LogicalType};

pub use turtle::RdfReaderMode;

/// Source file formats COPY understands. Inferred from the file extension,
/// never spelled in the grammar.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Parquet,
    Npy,
    Turtle,
}

impl FileType {
    pub fn infer(path: &str) -> std::result::Result<FileType, BinderError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(FileType::Csv),
            Some("parquet") => Ok(FileType::Parquet),
            Some("npy") => Ok(FileType::Npy),
            Some("ttl") => Ok(FileType::Turtle),
            _ => Err(BinderError::UnknownFileExtension(path.to_string())),
        }
    }
}

/// Parsing options for CSV sources. The key set is closed; unknown keys are
/// binder errors, not warnings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: u8,
    pub has_header: bool,
    pub skip: u64,
    pub list_begin: u8,
    pub list_end: u8,
}

impl Default for CsvOptions {
    fn default() -> CsvOptions {
        CsvOptions {
            delimiter: b',',
            quote: b'"',
            escape: b'\\',
            has_header: false,
            skip: 0,
            list_begin: b'[',
            list_end: b']',
        }
    }
}

impl CsvOptions {
    /// Validates and applies `(key, value)` pairs from the statement.
    pub fn from_options(
        options: &[(String, String)],
    ) -> std::result::Result<CsvOptions, BinderError> {
        let mut parsed = CsvOptions::default();
        for (key, value) in options {
            let invalid = || BinderError::InvalidOptionValue {
                option: key.clone(),
                value: value.clone(),
            };
            match key.to_ascii_lowercase().as_str() {
                "delimiter" => parsed.delimiter = single_byte(value).ok_or_else(invalid)?,
                "quote" => parsed.quote = single_byte(value).ok_or_else(invalid)?,
                "escape" => parsed.escape = single_byte(value).ok_or_else(invalid)?,
                "header" => {
                    parsed.has_header = match value.to_ascii_lowercase().as_str() {
                        "true" => true,
                        "false" => false,
                        _ => return Err(invalid()),
                    }
                }
                "skip" => parsed.skip = value.parse().map_err(|_| invalid())?,
                "list_begin" => parsed.list_begin = single_byte(value).ok_or_else(invalid)?,
                "list_end" => parsed.list_end = single_byte(value).ok_or_else(invalid)?,
                _ => return Err(BinderError::UnknownOption(key.clone())),
            }
        }
        Ok(parsed)
    }
}

fn single_byte(value: &str) -> Option<u8> {
    let bytes = value.as_bytes();
    (bytes.len() == 1).then(|| bytes[0])
}

/// Everything a reader needs to scan one COPY source.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    pub file_type: FileType,
    pub paths: Vec<PathBuf>,
    pub csv: CsvOptions,
    /// Set when the source feeds one of the four RDF ingest targets.
    pub rdf_mode: Option<RdfReaderMode>,
}

impl ReaderConfig {
    pub fn new(file_type: FileType, paths: Vec<PathBuf>) -> ReaderConfig {
        ReaderConfig {
            file_type,
            paths,
            csv: CsvOptions::default(),
            rdf_mode: None,
        }
    }
}

/// A chunk-at-a-time source scanner. Implementations are driven from worker
/// threads through a mutex, so `next_chunk` takes `&mut self`.
pub trait ChunkReader: Send {
    /// The next chunk of rows, or `None` at end of input.
    fn next_chunk(&mut self) -> Result<Option<DataChunk>>;
}

/// Opens the reader for `config` over `columns` (the expected file columns
/// computed at bind time).
pub fn open_reader(
    config: &ReaderConfig,
    columns: &[(String, LogicalType)],
    rdf: Option<turtle::RdfReaderContext>,
) -> Result<Box<dyn ChunkReader>> {
    match config.file_type {
        FileType::Csv => Ok(Box::new(csv::CsvChunkReader::open(
            &config.paths,
            &config.csv,
            columns,
        )?)),
        FileType::Parquet => Ok(Box::new(parquet::ParquetChunkReader::open(
            &config.paths,
            columns,
        )?)),
        FileType::Npy => Ok(Box::new(npy::NpyChunkReader::open(&config.paths, columns)?)),
        FileType::Turtle => {
            let mode = config
                .rdf_mode
                .expect("turtle reader requires an rdf mode");
            Ok(Box::new(turtle::TurtleChunkReader::open(
                &config.paths,
                mode,
                rdf,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_type_inference_is_extension_based() {
        assert_eq!(FileType::infer("people.csv").unwrap(), FileType::Csv);
        assert_eq!(FileType::infer("dir/part.PARQUET").unwrap(), FileType::Parquet);
        assert_eq!(FileType::infer("col.npy").unwrap(), FileType::Npy);
        assert_eq!(FileType::infer("graph.ttl").unwrap(), FileType::Turtle);
        assert!(matches!(
            FileType::infer("data.json"),
            Err(BinderError::UnknownFileExtension(_))
        ));
        assert!(FileType::infer("noextension").is_err());
    }

    #[test]
    fn csv_options_accept_the_closed_key_set() {
        let options = CsvOptions::from_options(&[
            ("DELIMITER".to_string(), "|".to_string()),
            ("header".to_string(), "true".to_string()),
            ("skip".to_string(), "2".to_string()),
        ])
        .unwrap();
        assert_eq!(options.delimiter, b'|');
        assert!(options.has_header);
        assert_eq!(options.skip, 2);
    }

    #[test]
    fn unknown_option_keys_are_rejected() {
        let err = CsvOptions::from_options(&[("delim".to_string(), "|".to_string())]).unwrap_err();
        assert_eq!(err, BinderError::UnknownOption("delim".to_string()));
    }

    #[test]
    fn malformed_option_values_are_rejected() {
        let err =
            CsvOptions::from_options(&[("header".to_string(), "yes".to_string())]).unwrap_err();
        assert!(matches!(err, BinderError::InvalidOptionValue { .. }));
        let err =
            CsvOptions::from_options(&[("delimiter".to_string(), "ab".to_string())]).unwrap_err();
        assert!(matches!(err, BinderError::InvalidOptionValue { .. }));
    }
}
