//! Durable catalog serialization.
//!
//! The whole catalog is flushed as one blob: magic bytes, storage version,
//! then a length-prefixed table list, then the magic again. Reading is
//! length-driven throughout. Two copies may coexist during recovery
//! (`*.ORIGINAL` and `*.WAL`); the newer valid one wins on open.

use quiver_primitives::{PropertyId, TableId};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::LogicalType;

use super::content::CatalogContent;
use super::schema::{
    MetadataDahInfo, NodeInfo, Property, RdfInfo, RelGroupInfo, RelInfo, RelMultiplicity,
    TableKind, TableSchema,
};

pub const CATALOG_MAGIC: [u8; 8] = *b"KUZUCAT\0";
pub const STORAGE_VERSION: u32 = 1;

/// Which durable copy of the catalog a path refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DbFileType {
    Original,
    WalReplayed,
}

impl DbFileType {
    fn suffix(self) -> &'static str {
        match self {
            DbFileType::Original => "ORIGINAL",
            DbFileType::WalReplayed => "WAL",
        }
    }
}

pub fn catalog_file_path(directory: &Path, file_type: DbFileType) -> PathBuf {
    directory.join(format!("catalog.{}", file_type.suffix()))
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(out: &mut W, value: u64) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_string<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    write_u32(out, text.len() as u32)?;
    out.write_all(text.as_bytes())
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_string<R: Read>(input: &mut R) -> io::Result<String> {
    let len = read_u32(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_metadata<W: Write>(out: &mut W, dah: &MetadataDahInfo) -> io::Result<()> {
    write_u64(out, dah.data_page_idx)?;
    write_u64(out, dah.null_page_idx)?;
    write_u32(out, dah.children.len() as u32)?;
    for child in &dah.children {
        write_metadata(out, child)?;
    }
    Ok(())
}

fn read_metadata<R: Read>(input: &mut R) -> io::Result<MetadataDahInfo> {
    let data_page_idx = read_u64(input)?;
    let null_page_idx = read_u64(input)?;
    let num_children = read_u32(input)? as usize;
    let mut children = Vec::with_capacity(num_children);
    for _ in 0..num_children {
        children.push(read_metadata(input)?);
    }
    Ok(MetadataDahInfo {
        data_page_idx,
        null_page_idx,
        children,
    })
}

fn write_table_id_set<W: Write>(out: &mut W, set: &BTreeSet<TableId>) -> io::Result<()> {
    write_u32(out, set.len() as u32)?;
    for id in set {
        write_u64(out, id.0)?;
    }
    Ok(())
}

fn read_table_id_set<R: Read>(input: &mut R) -> io::Result<BTreeSet<TableId>> {
    let len = read_u32(input)? as usize;
    let mut set = BTreeSet::new();
    for _ in 0..len {
        set.insert(TableId(read_u64(input)?));
    }
    Ok(set)
}

fn write_schema<W: Write>(out: &mut W, schema: &TableSchema) -> io::Result<()> {
    write_u64(out, schema.id.0)?;
    out.write_all(&[schema.kind.discriminant()])?;
    write_string(out, &schema.name)?;
    write_u32(out, schema.properties.len() as u32)?;
    for property in &schema.properties {
        write_string(out, &property.name)?;
        property.dtype.write_to(out)?;
        write_u32(out, property.id.0)?;
        write_metadata(out, &property.metadata_dah)?;
    }
    write_u32(out, schema.next_property_id)?;
    match &schema.kind {
        TableKind::Node(node) => {
            write_u32(out, node.primary_key_pid.0)?;
            write_table_id_set(out, &node.fwd_rel_tables)?;
            write_table_id_set(out, &node.bwd_rel_tables)?;
        }
        TableKind::Rel(rel) => {
            out.write_all(&[rel.multiplicity as u8])?;
            write_u64(out, rel.src_table.0)?;
            write_u64(out, rel.dst_table.0)?;
            rel.src_pk_type.write_to(out)?;
            rel.dst_pk_type.write_to(out)?;
        }
        TableKind::RelGroup(group) => {
            write_u32(out, group.rel_tables.len() as u32)?;
            for id in &group.rel_tables {
                write_u64(out, id.0)?;
            }
        }
        TableKind::Rdf(info) => {
            for id in info.children() {
                write_u64(out, id.0)?;
            }
        }
    }
    Ok(())
}

fn read_schema<R: Read>(input: &mut R) -> io::Result<TableSchema> {
    let id = TableId(read_u64(input)?);
    let kind_tag = read_u8(input)?;
    let name = read_string(input)?;
    let num_props = read_u32(input)? as usize;
    let mut properties = Vec::with_capacity(num_props);
    for _ in 0..num_props {
        let prop_name = read_string(input)?;
        let dtype = LogicalType::read_from(input)?;
        let pid = PropertyId(read_u32(input)?);
        let metadata_dah = read_metadata(input)?;
        properties.push(Property {
            name: prop_name,
            id: pid,
            table: id,
            dtype,
            metadata_dah,
        });
    }
    let next_property_id = read_u32(input)?;
    let kind = match kind_tag {
        0 => TableKind::Node(NodeInfo {
            primary_key_pid: PropertyId(read_u32(input)?),
            fwd_rel_tables: read_table_id_set(input)?,
            bwd_rel_tables: read_table_id_set(input)?,
        }),
        1 => {
            let multiplicity = RelMultiplicity::from_u8(read_u8(input)?).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "bad rel multiplicity tag")
            })?;
            let src_table = TableId(read_u64(input)?);
            let dst_table = TableId(read_u64(input)?);
            let src_pk_type = LogicalType::read_from(input)?;
            let dst_pk_type = LogicalType::read_from(input)?;
            TableKind::Rel(RelInfo {
                multiplicity,
                src_table,
                dst_table,
                src_pk_type,
                dst_pk_type,
            })
        }
        2 => {
            let len = read_u32(input)? as usize;
            let mut rel_tables = Vec::with_capacity(len);
            for _ in 0..len {
                rel_tables.push(TableId(read_u64(input)?));
            }
            TableKind::RelGroup(RelGroupInfo { rel_tables })
        }
        3 => TableKind::Rdf(RdfInfo {
            resource_node: TableId(read_u64(input)?),
            literal_node: TableId(read_u64(input)?),
            resource_triple_rel: TableId(read_u64(input)?),
            literal_triple_rel: TableId(read_u64(input)?),
        }),
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown table kind tag {other}"),
            ))
        }
    };
    Ok(TableSchema {
        id,
        name,
        comment: String::new(),
        properties,
        next_property_id,
        kind,
    })
}

/// Serializes `content` into `out`, magic-framed on both ends.
pub fn serialize_content<W: Write>(content: &CatalogContent, out: &mut W) -> io::Result<()> {
    out.write_all(&CATALOG_MAGIC)?;
    write_u32(out, STORAGE_VERSION)?;
    write_u32(out, content.table_count() as u32)?;
    for schema in content.tables() {
        write_schema(out, schema)?;
    }
    out.write_all(&CATALOG_MAGIC)?;
    Ok(())
}

/// Inverse of [`serialize_content`]. `path` is used only for error reporting.
pub fn deserialize_content<R: Read>(input: &mut R, path: &Path) -> Result<CatalogContent> {
    let mut magic = [0u8; 8];
    input
        .read_exact(&mut magic)
        .map_err(|_| Error::CorruptCatalog(path.to_path_buf()))?;
    if magic != CATALOG_MAGIC {
        return Err(Error::CorruptCatalog(path.to_path_buf()));
    }
    let saved_version = read_u32(input)?;
    if saved_version != STORAGE_VERSION {
        return Err(Error::VersionMismatch {
            saved: saved_version,
            expected: STORAGE_VERSION,
        });
    }
    let num_tables = read_u32(input)? as usize;
    let mut schemas = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        schemas.push(read_schema(input)?);
    }
    input
        .read_exact(&mut magic)
        .map_err(|_| Error::CorruptCatalog(path.to_path_buf()))?;
    if magic != CATALOG_MAGIC {
        return Err(Error::CorruptCatalog(path.to_path_buf()));
    }
    Ok(CatalogContent::from_schemas(schemas))
}

/// Writes the catalog file atomically: serialize into a temp file in the
/// same directory, then rename over the target.
pub fn save_to_file(
    content: &CatalogContent,
    directory: &Path,
    file_type: DbFileType,
) -> Result<()> {
    let target = catalog_file_path(directory, file_type);
    let tmp = directory.join(format!("catalog.{}.tmp", file_type.suffix()));
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serialize_content(content, &mut writer)?;
        writer.flush()?;
    }
    fs::rename(&tmp, &target)?;
    log::debug!(
        "catalog flushed to {} ({} tables)",
        target.display(),
        content.table_count()
    );
    Ok(())
}

pub fn read_from_file(directory: &Path, file_type: DbFileType) -> Result<CatalogContent> {
    let path = catalog_file_path(directory, file_type);
    let mut reader = BufReader::new(File::open(&path)?);
    deserialize_content(&mut reader, &path)
}

/// Opens the catalog directory, preferring the newer valid copy when both
/// the `ORIGINAL` and `WAL` files exist. Magic or version failures on the
/// chosen file are fatal; a missing directory yields an empty catalog.
pub fn open_newest(directory: &Path) -> Result<CatalogContent> {
    let original = catalog_file_path(directory, DbFileType::Original);
    let wal = catalog_file_path(directory, DbFileType::WalReplayed);
    let candidates = [
        (wal.exists().then(|| file_mtime(&wal)), DbFileType::WalReplayed),
        (
            original.exists().then(|| file_mtime(&original)),
            DbFileType::Original,
        ),
    ];
    let mut newest: Option<(std::time::SystemTime, DbFileType)> = None;
    for (mtime, file_type) in candidates {
        if let Some(mtime) = mtime {
            let mtime = mtime?;
            if newest.map_or(true, |(best, _)| mtime > best) {
                newest = Some((mtime, file_type));
            }
        }
    }
    match newest {
        Some((_, file_type)) => read_from_file(directory, file_type),
        None => Ok(CatalogContent::new()),
    }
}

fn file_mtime(path: &Path) -> Result<std::time::SystemTime> {
    Ok(fs::metadata(path)?.modified()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::RelMultiplicity;
    use pretty_assertions::assert_eq;

    fn sample_content() -> CatalogContent {
        let mut content = CatalogContent::new();
        let person = content
            .add_node_table(
                "Person",
                0,
                vec![
                    ("id".to_string(), LogicalType::Int64),
                    ("name".to_string(), LogicalType::String),
                    (
                        "tags".to_string(),
                        LogicalType::List(Box::new(LogicalType::String)),
                    ),
                ],
            )
            .unwrap();
        content
            .add_rel_table(
                "Knows",
                RelMultiplicity::ManyMany,
                person,
                person,
                vec![("since".to_string(), LogicalType::Int64)],
            )
            .unwrap();
        content.add_rdf_graph("G").unwrap();
        content
    }

    fn schemas_of(content: &CatalogContent) -> Vec<TableSchema> {
        content.tables().cloned().collect()
    }

    #[test]
    fn serialize_deserialize_round_trips() {
        let content = sample_content();
        let mut buf = Vec::new();
        serialize_content(&content, &mut buf).unwrap();
        let back = deserialize_content(&mut buf.as_slice(), Path::new("mem")).unwrap();
        assert_eq!(schemas_of(&content), schemas_of(&back));
        assert_eq!(back.lookup("Knows"), content.lookup("Knows"));
    }

    #[test]
    fn new_tables_after_reload_get_fresh_ids() {
        let content = sample_content();
        let mut buf = Vec::new();
        serialize_content(&content, &mut buf).unwrap();
        let mut back = deserialize_content(&mut buf.as_slice(), Path::new("mem")).unwrap();
        let max_id = back.tables().map(|t| t.id.0).max().unwrap();
        let fresh = back
            .add_node_table("Fresh", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        assert!(fresh.0 > max_id);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let content = sample_content();
        let mut buf = Vec::new();
        serialize_content(&content, &mut buf).unwrap();
        buf[0] ^= 0xff;
        let err = deserialize_content(&mut buf.as_slice(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, Error::CorruptCatalog(_)));

        let mut buf2 = Vec::new();
        serialize_content(&content, &mut buf2).unwrap();
        let last = buf2.len() - 1;
        buf2[last] ^= 0xff;
        let err = deserialize_content(&mut buf2.as_slice(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, Error::CorruptCatalog(_)));
    }

    #[test]
    fn version_mismatch_is_reported() {
        let content = sample_content();
        let mut buf = Vec::new();
        serialize_content(&content, &mut buf).unwrap();
        // The version field sits right after the leading magic.
        buf[8..12].copy_from_slice(&(STORAGE_VERSION + 9).to_le_bytes());
        let err = deserialize_content(&mut buf.as_slice(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
    }

    #[test]
    fn newest_file_wins_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = CatalogContent::new();
        content
            .add_node_table("A", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        save_to_file(&content, dir.path(), DbFileType::Original).unwrap();

        content
            .add_node_table("B", 0, vec![("id".to_string(), LogicalType::Int64)])
            .unwrap();
        // Ensure a distinct mtime on filesystems with coarse timestamps.
        std::thread::sleep(std::time::Duration::from_millis(20));
        save_to_file(&content, dir.path(), DbFileType::WalReplayed).unwrap();

        let opened = open_newest(dir.path()).unwrap();
        assert!(opened.lookup("B").is_some());
    }

    #[test]
    fn missing_directory_contents_yield_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let opened = open_newest(dir.path()).unwrap();
        assert_eq!(opened.table_count(), 0);
    }
}
