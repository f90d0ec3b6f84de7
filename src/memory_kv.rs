// In-Memory KVStore
// Bundled settings persistence for standalone runs and tests. The host
// platform normally provides this capability; nothing here survives a
// process restart.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::contracts::KVStore;

/// Process-local string map behind a lock. Writes interleave last-write-wins
/// per key, matching the consistency model of the host store it stands in for.
#[derive(Debug, Default)]
pub struct MemoryKVStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys. Test-facing, but harmless in production.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of all keys, for assertions about what a save touched.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Convenience constructor returning the store ready for injection.
pub fn create_memory_kv_store() -> Arc<MemoryKVStore> {
    Arc::new(MemoryKVStore::new())
}

#[async_trait]
impl KVStore for MemoryKVStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_what_put_stored() -> Result<()> {
        let store = MemoryKVStore::new();
        assert_eq!(store.get("portal.settings.global").await?, None);

        store.put("portal.settings.global", "{}").await?;
        assert_eq!(
            store.get("portal.settings.global").await?,
            Some("{}".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn last_write_wins_per_key() -> Result<()> {
        let store = MemoryKVStore::new();
        store.put("k", "first").await?;
        store.put("k", "second").await?;
        assert_eq!(store.get("k").await?, Some("second".to_string()));
        assert_eq!(store.len(), 1);
        Ok(())
    }
}
