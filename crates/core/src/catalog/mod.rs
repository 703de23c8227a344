//! The schema catalog: versioned in-memory registry plus durable form.
//!
//! Readers observe an immutable snapshot behind an `Arc`; at most one write
//! version exists at a time, bound to a single writer transaction. Commit
//! builds nothing in place: the write version atomically replaces the
//! snapshot pointer and is flushed to disk in the same step.

pub mod content;
pub mod persist;
pub mod schema;

use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CatalogError, Result};
use crate::transaction::TxId;

pub use content::CatalogContent;
pub use persist::{DbFileType, CATALOG_MAGIC, STORAGE_VERSION};
pub use schema::{
    is_reserved_property_name, MetadataDahInfo, NodeInfo, Property, RdfInfo, RelGroupInfo,
    RelInfo, RelMultiplicity, TableKind, TableSchema,
};

struct WriteVersion {
    tx: TxId,
    content: CatalogContent,
}

pub struct Catalog {
    /// The committed snapshot. Swapped wholesale on commit, never mutated.
    read_version: RwLock<Arc<CatalogContent>>,
    /// The single in-flight write version, if a writer transaction holds one.
    write_version: Mutex<Option<WriteVersion>>,
    /// Where commits are flushed; `None` keeps the catalog memory-only.
    directory: Option<PathBuf>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog {
            read_version: RwLock::new(Arc::new(CatalogContent::new())),
            write_version: Mutex::new(None),
            directory: None,
        }
    }

    /// Opens the catalog from `directory`, restoring the newer valid durable
    /// copy when one exists.
    pub fn open(directory: &Path) -> Result<Catalog> {
        let content = persist::open_newest(directory)?;
        log::info!(
            "catalog opened from {} with {} tables",
            directory.display(),
            content.table_count()
        );
        Ok(Catalog {
            read_version: RwLock::new(Arc::new(content)),
            write_version: Mutex::new(None),
            directory: Some(directory.to_path_buf()),
        })
    }

    /// The committed snapshot. Cheap; safe to hold across a whole statement.
    pub fn snapshot(&self) -> Arc<CatalogContent> {
        self.read_version.read().clone()
    }

    /// Runs `f` against the write version owned by `tx`, creating it from
    /// the current snapshot on first use. A second writer is refused while
    /// the first holds the version.
    pub fn with_write_version<R>(
        &self,
        tx: TxId,
        f: impl FnOnce(&mut CatalogContent) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.write_version.lock();
        match guard.as_mut() {
            Some(version) if version.tx != tx => Err(CatalogError::WriteVersionBusy.into()),
            Some(version) => f(&mut version.content),
            None => {
                let mut version = WriteVersion {
                    tx,
                    content: (*self.snapshot()).clone(),
                };
                let result = f(&mut version.content)?;
                *guard = Some(version);
                Ok(result)
            }
        }
    }

    /// The catalog content visible to `tx`: its own write version when it
    /// holds one, the committed snapshot otherwise.
    pub fn version_for(&self, tx: TxId) -> Arc<CatalogContent> {
        let guard = self.write_version.lock();
        match guard.as_ref() {
            Some(version) if version.tx == tx => Arc::new(version.content.clone()),
            _ => self.snapshot(),
        }
    }

    /// True when `tx` currently owns a write version.
    pub fn has_write_version(&self, tx: TxId) -> bool {
        self.write_version
            .lock()
            .as_ref()
            .is_some_and(|v| v.tx == tx)
    }

    /// Publishes `tx`'s write version: flush to disk, then swap the snapshot
    /// pointer. Readers holding the old snapshot are unaffected.
    pub fn commit(&self, tx: TxId) -> Result<()> {
        let mut guard = self.write_version.lock();
        let version = match guard.take() {
            Some(version) if version.tx == tx => version,
            Some(version) => {
                let holder = version.tx;
                *guard = Some(version);
                log::warn!("commit for tx {} refused: write version held by tx {}", tx.0, holder.0);
                return Err(CatalogError::NoWriteVersion(tx.0).into());
            }
            None => return Err(CatalogError::NoWriteVersion(tx.0).into()),
        };
        if let Some(directory) = &self.directory {
            persist::save_to_file(&version.content, directory, DbFileType::WalReplayed)?;
        }
        *self.read_version.write() = Arc::new(version.content);
        Ok(())
    }

    /// Discards `tx`'s write version without publishing it.
    pub fn rollback(&self, tx: TxId) {
        let mut guard = self.write_version.lock();
        if guard.as_ref().is_some_and(|v| v.tx == tx) {
            *guard = None;
        }
    }

    /// Rewrites the `ORIGINAL` durable copy from the committed snapshot,
    /// as done at checkpoint time once the WAL is folded in.
    pub fn checkpoint(&self) -> Result<()> {
        if let Some(directory) = &self.directory {
            persist::save_to_file(&self.snapshot(), directory, DbFileType::Original)?;
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Catalog {
        Catalog::new()
    }
}
