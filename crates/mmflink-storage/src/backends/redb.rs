//! Redb storage backend.
//!
//! Persistent settings in a single-file embedded database.

use mmflink_core::storage::{Result, StorageBackend, StorageError};
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

// Single table, keys namespaced as "table:key".
const UNIFIED_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("mmflink_storage");

/// Path value selecting a non-persistent database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for RedbBackend.
#[derive(Debug, Clone)]
pub struct RedbBackendConfig {
    /// Path to the database file.
    pub path: String,

    /// Create parent directories if they don't exist.
    pub create_dirs: bool,
}

impl RedbBackendConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            create_dirs: true,
        }
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            create_dirs: false,
        }
    }
}

fn make_key(table: &str, key: &str) -> String {
    let mut result = String::with_capacity(table.len() + key.len() + 1);
    result.push_str(table);
    result.push(':');
    result.push_str(key);
    result
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// redb-based storage backend.
pub struct RedbBackend {
    db: Arc<Database>,
    path: String,
}

impl RedbBackend {
    pub fn new(config: RedbBackendConfig) -> Result<Self> {
        let db = if config.path == MEMORY_PATH {
            Database::builder()
                .create_with_backend(InMemoryBackend::new())
                .map_err(backend_err)?
        } else {
            let path = Path::new(&config.path);
            if config.create_dirs {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
            // `create` opens an existing file without truncating it.
            Database::create(path).map_err(backend_err)?
        };

        // Make sure the table exists so the first read does not fail.
        let txn = db.begin_write().map_err(backend_err)?;
        txn.open_table(UNIFIED_TABLE).map_err(backend_err)?;
        txn.commit().map_err(backend_err)?;

        tracing::debug!(path = %config.path, "redb storage opened");
        Ok(Self {
            db: Arc::new(db),
            path: config.path,
        })
    }

    /// Open or create a redb backend at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(RedbBackendConfig::new(
            path.as_ref().to_string_lossy().to_string(),
        ))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl StorageBackend for RedbBackend {
    fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()> {
        let namespaced = make_key(table, key);
        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut t = txn.open_table(UNIFIED_TABLE).map_err(backend_err)?;
            t.insert(namespaced.as_str(), value).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let namespaced = make_key(table, key);
        let txn = self.db.begin_read().map_err(backend_err)?;
        let t = txn.open_table(UNIFIED_TABLE).map_err(backend_err)?;
        let value = t.get(namespaced.as_str()).map_err(backend_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let namespaced = make_key(table, key);
        let txn = self.db.begin_write().map_err(backend_err)?;
        let removed = {
            let mut t = txn.open_table(UNIFIED_TABLE).map_err(backend_err)?;
            let removed = t.remove(namespaced.as_str()).map_err(backend_err)?;
            removed.is_some()
        };
        txn.commit().map_err(backend_err)?;
        Ok(removed)
    }

    fn scan(&self, table: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let table_prefix = make_key(table, prefix);
        let table_prefix_len = table.len() + 1;

        let txn = self.db.begin_read().map_err(backend_err)?;
        let t = txn.open_table(UNIFIED_TABLE).map_err(backend_err)?;

        let mut results = Vec::new();
        for item in t
            .range(table_prefix.as_str()..)
            .map_err(backend_err)?
        {
            let (key, value) = item.map_err(backend_err)?;
            let key_str = key.value();
            if !key_str.starts_with(&table_prefix) {
                break;
            }
            if let Some(rest) = key_str.get(table_prefix_len..) {
                results.push((rest.to_string(), value.value().to_vec()));
            }
        }
        Ok(results)
    }

    fn write_batch(&self, table: &str, items: Vec<(String, Vec<u8>)>) -> Result<()> {
        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut t = txn.open_table(UNIFIED_TABLE).map_err(backend_err)?;
            for (key, value) in items {
                let namespaced = make_key(table, &key);
                t.insert(namespaced.as_str(), value.as_slice())
                    .map_err(backend_err)?;
            }
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        self.path != MEMORY_PATH
    }
}
