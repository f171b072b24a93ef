//! In-memory storage backend, for tests and ephemeral sessions.

use mmflink_core::storage::{Result, StorageBackend};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Map-backed storage. Nothing survives a drop.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

fn make_key(table: &str, key: &str) -> String {
    format!("{}:{}", table, key)
}

impl StorageBackend for MemoryBackend {
    fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()> {
        self.data.write().insert(make_key(table, key), value.to_vec());
        Ok(())
    }

    fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(&make_key(table, key)).cloned())
    }

    fn delete(&self, table: &str, key: &str) -> Result<bool> {
        Ok(self.data.write().remove(&make_key(table, key)).is_some())
    }

    fn scan(&self, table: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let table_prefix = make_key(table, prefix);
        let skip = table.len() + 1;
        Ok(self
            .data
            .read()
            .range(table_prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&table_prefix))
            .map(|(k, v)| (k[skip..].to_string(), v.clone()))
            .collect())
    }

    fn write_batch(&self, table: &str, items: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut data = self.data.write();
        for (key, value) in items {
            data.insert(make_key(table, &key), value);
        }
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
