//! Redb blob backend.
//!
//! Persists named blobs in a single-table embedded redb database.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::BlobBackend;
use crate::error::{Error, Result};

const BLOB_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// Configuration for [`RedbBackend`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedbBackendConfig {
    /// Path to the database file.
    pub path: String,

    /// Create parent directories if they don't exist.
    #[serde(default = "default_create_dirs")]
    pub create_dirs: bool,
}

fn default_create_dirs() -> bool {
    true
}

impl RedbBackendConfig {
    /// Create a new config with the given path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            create_dirs: true,
        }
    }

    /// Set whether to create parent directories.
    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }
}

/// redb-based persistent blob backend.
pub struct RedbBackend {
    db: Database,
    path: PathBuf,
}

impl RedbBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: RedbBackendConfig) -> Result<Self> {
        let path = PathBuf::from(&config.path);
        if config.create_dirs {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = if path.exists() {
            Database::open(&path)?
        } else {
            Database::create(&path)?
        };

        Ok(Self { db, path })
    }

    /// Open or create a backend at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(RedbBackendConfig::new(
            path.as_ref().to_string_lossy().to_string(),
        ))
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobBackend for RedbBackend {
    fn write(&self, name: &str, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BLOB_TABLE)?;
            table.insert(name, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(BLOB_TABLE) {
            Ok(table) => table,
            // First read before any write: the table does not exist yet.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(name)?.map(|v| v.value().to_vec()))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(BLOB_TABLE)?;
            let removed = table.remove(name)?.is_some();
            removed
        };
        txn.commit()?;
        Ok(removed)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(BLOB_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for item in table.iter().map_err(|e| Error::Storage(e.to_string()))? {
            let (key, _) = item.map_err(|e| Error::Storage(e.to_string()))?;
            let key = key.value();
            if key.starts_with(prefix) {
                names.push(key.to_string());
            }
        }
        Ok(names)
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
