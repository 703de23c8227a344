//! Logical column types and their durable binary encoding.

pub mod rdf;
pub mod value;

use std::fmt;
use std::io::{self, Read, Write};

pub use value::{DataChunk, Value, CHUNK_CAPACITY};

/// A named field inside a `Struct` or `Union` type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub dtype: LogicalType,
}

/// The type of a column as declared in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Bool,
    Int64,
    Int32,
    Int16,
    Double,
    Float,
    String,
    Date,
    Timestamp,
    Interval,
    Blob,
    /// A `(table, offset)` reference into another table.
    InternalId,
    /// An auto-incrementing integer assigned at load time. Legal only as a
    /// node-table primary key.
    Serial,
    List(Box<LogicalType>),
    Struct(Vec<StructField>),
    Union(Vec<StructField>),
    Map(Box<LogicalType>, Box<LogicalType>),
    /// A column whose values stay in the reader's native columnar layout
    /// until the writer materializes them.
    ArrowColumn,
    /// A dynamically typed RDF literal, encoded as `(type_tag: u8, value: blob)`.
    RdfVariant,
}

impl LogicalType {
    /// Parses a type name as written in DDL text. Case-insensitive.
    pub fn parse(text: &str) -> Option<LogicalType> {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        if let Some(inner) = upper.strip_prefix("LIST(").and_then(|s| s.strip_suffix(')')) {
            // Re-slice the original text so nested names keep their spelling.
            let start = trimmed.len() - inner.len() - 1;
            return LogicalType::parse(&trimmed[start..trimmed.len() - 1])
                .map(|t| LogicalType::List(Box::new(t)));
        }
        match upper.as_str() {
            "BOOL" | "BOOLEAN" => Some(LogicalType::Bool),
            "INT64" => Some(LogicalType::Int64),
            "INT32" | "INT" => Some(LogicalType::Int32),
            "INT16" => Some(LogicalType::Int16),
            "DOUBLE" => Some(LogicalType::Double),
            "FLOAT" => Some(LogicalType::Float),
            "STRING" => Some(LogicalType::String),
            "DATE" => Some(LogicalType::Date),
            "TIMESTAMP" => Some(LogicalType::Timestamp),
            "INTERVAL" => Some(LogicalType::Interval),
            "BLOB" | "BYTEA" => Some(LogicalType::Blob),
            "INTERNAL_ID" => Some(LogicalType::InternalId),
            "SERIAL" => Some(LogicalType::Serial),
            "RDF_VARIANT" => Some(LogicalType::RdfVariant),
            _ => None,
        }
    }

    #[inline]
    pub fn is_serial(&self) -> bool {
        matches!(self, LogicalType::Serial)
    }

    /// Types a node-table primary key may take.
    pub fn is_valid_primary_key(&self) -> bool {
        matches!(
            self,
            LogicalType::Int64 | LogicalType::String | LogicalType::Serial
        )
    }

    /// Types banned on rel tables.
    pub fn is_forbidden_on_rel_table(&self) -> bool {
        matches!(
            self,
            LogicalType::Serial
                | LogicalType::Union(_)
                | LogicalType::Struct(_)
                | LogicalType::Map(_, _)
        )
    }

    /// Whether a value read as `self` may be silently widened to `target`.
    pub fn can_widen_to(&self, target: &LogicalType) -> bool {
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (LogicalType::Int16, LogicalType::Int32)
                | (LogicalType::Int16, LogicalType::Int64)
                | (LogicalType::Int32, LogicalType::Int64)
                | (LogicalType::Float, LogicalType::Double)
        )
    }

    fn discriminant(&self) -> u8 {
        match self {
            LogicalType::Bool => 0,
            LogicalType::Int64 => 1,
            LogicalType::Int32 => 2,
            LogicalType::Int16 => 3,
            LogicalType::Double => 4,
            LogicalType::Float => 5,
            LogicalType::String => 6,
            LogicalType::Date => 7,
            LogicalType::Timestamp => 8,
            LogicalType::Interval => 9,
            LogicalType::Blob => 10,
            LogicalType::InternalId => 11,
            LogicalType::Serial => 12,
            LogicalType::List(_) => 13,
            LogicalType::Struct(_) => 14,
            LogicalType::Union(_) => 15,
            LogicalType::Map(_, _) => 16,
            LogicalType::ArrowColumn => 17,
            LogicalType::RdfVariant => 18,
        }
    }

    /// Writes the self-describing binary form used inside the catalog file.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&[self.discriminant()])?;
        match self {
            LogicalType::List(child) => child.write_to(out)?,
            LogicalType::Struct(fields) | LogicalType::Union(fields) => {
                out.write_all(&(fields.len() as u32).to_le_bytes())?;
                for field in fields {
                    let name = field.name.as_bytes();
                    out.write_all(&(name.len() as u32).to_le_bytes())?;
                    out.write_all(name)?;
                    field.dtype.write_to(out)?;
                }
            }
            LogicalType::Map(key, value) => {
                key.write_to(out)?;
                value.write_to(out)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Inverse of [`LogicalType::write_to`]. Length-driven, not delimiter-driven.
    pub fn read_from<R: Read>(input: &mut R) -> io::Result<LogicalType> {
        let mut tag = [0u8; 1];
        input.read_exact(&mut tag)?;
        let dtype = match tag[0] {
            0 => LogicalType::Bool,
            1 => LogicalType::Int64,
            2 => LogicalType::Int32,
            3 => LogicalType::Int16,
            4 => LogicalType::Double,
            5 => LogicalType::Float,
            6 => LogicalType::String,
            7 => LogicalType::Date,
            8 => LogicalType::Timestamp,
            9 => LogicalType::Interval,
            10 => LogicalType::Blob,
            11 => LogicalType::InternalId,
            12 => LogicalType::Serial,
            13 => LogicalType::List(Box::new(LogicalType::read_from(input)?)),
            14 | 15 => {
                let mut len = [0u8; 4];
                input.read_exact(&mut len)?;
                let len = u32::from_le_bytes(len) as usize;
                let mut fields = Vec::with_capacity(len);
                for _ in 0..len {
                    let mut name_len = [0u8; 4];
                    input.read_exact(&mut name_len)?;
                    let mut name = vec![0u8; u32::from_le_bytes(name_len) as usize];
                    input.read_exact(&mut name)?;
                    let name = String::from_utf8(name)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    fields.push(StructField {
                        name,
                        dtype: LogicalType::read_from(input)?,
                    });
                }
                if tag[0] == 14 {
                    LogicalType::Struct(fields)
                } else {
                    LogicalType::Union(fields)
                }
            }
            16 => {
                let key = LogicalType::read_from(input)?;
                let value = LogicalType::read_from(input)?;
                LogicalType::Map(Box::new(key), Box::new(value))
            }
            17 => LogicalType::ArrowColumn,
            18 => LogicalType::RdfVariant,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown logical type tag {other}"),
                ))
            }
        };
        Ok(dtype)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Bool => write!(f, "BOOL"),
            LogicalType::Int64 => write!(f, "INT64"),
            LogicalType::Int32 => write!(f, "INT32"),
            LogicalType::Int16 => write!(f, "INT16"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::String => write!(f, "STRING"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Timestamp => write!(f, "TIMESTAMP"),
            LogicalType::Interval => write!(f, "INTERVAL"),
            LogicalType::Blob => write!(f, "BLOB"),
            LogicalType::InternalId => write!(f, "INTERNAL_ID"),
            LogicalType::Serial => write!(f, "SERIAL"),
            LogicalType::List(child) => write!(f, "LIST({child})"),
            LogicalType::Struct(fields) => {
                write!(f, "STRUCT(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", field.name, field.dtype)?;
                }
                write!(f, ")")
            }
            LogicalType::Union(fields) => {
                write!(f, "UNION(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", field.name, field.dtype)?;
                }
                write!(f, ")")
            }
            LogicalType::Map(key, value) => write!(f, "MAP({key}, {value})"),
            LogicalType::ArrowColumn => write!(f, "ARROW_COLUMN"),
            LogicalType::RdfVariant => write!(f, "RDF_VARIANT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_accepts_case_insensitive_names() {
        assert_eq!(LogicalType::parse("int64"), Some(LogicalType::Int64));
        assert_eq!(LogicalType::parse("STRING"), Some(LogicalType::String));
        assert_eq!(LogicalType::parse("Serial"), Some(LogicalType::Serial));
        assert_eq!(
            LogicalType::parse("LIST(INT64)"),
            Some(LogicalType::List(Box::new(LogicalType::Int64)))
        );
        assert_eq!(LogicalType::parse("NODE"), None);
    }

    #[test]
    fn widening_is_one_directional() {
        assert!(LogicalType::Int32.can_widen_to(&LogicalType::Int64));
        assert!(!LogicalType::Int64.can_widen_to(&LogicalType::Int32));
        assert!(LogicalType::Float.can_widen_to(&LogicalType::Double));
        assert!(LogicalType::Int64.can_widen_to(&LogicalType::Int64));
    }

    #[test]
    fn binary_encoding_round_trips_nested_types() {
        let dtype = LogicalType::Map(
            Box::new(LogicalType::String),
            Box::new(LogicalType::Struct(vec![
                StructField {
                    name: "xs".into(),
                    dtype: LogicalType::List(Box::new(LogicalType::Int32)),
                },
                StructField {
                    name: "flag".into(),
                    dtype: LogicalType::Bool,
                },
            ])),
        );
        let mut buf = Vec::new();
        dtype.write_to(&mut buf).unwrap();
        let back = LogicalType::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(dtype, back);
    }
}
