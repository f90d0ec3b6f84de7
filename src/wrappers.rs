// Wrapper Components
// Decorators over the host ports. Currently a tracing wrapper for the
// settings store, so every round trip shows up in the logs with timing.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::contracts::KVStore;

/// KVStore wrapper that logs every get/put with elapsed time. There is no
/// caching here; the store contract requires a direct round trip per call.
pub struct TracedKVStore {
    inner: Arc<dyn KVStore>,
    round_trips: AtomicU64,
}

impl TracedKVStore {
    pub fn new(inner: Arc<dyn KVStore>) -> Self {
        Self {
            inner,
            round_trips: AtomicU64::new(0),
        }
    }

    /// Number of store round trips performed through this wrapper.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl KVStore for TracedKVStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = self.inner.get(key).await;
        match &result {
            Ok(value) => debug!(
                key,
                hit = value.is_some(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "settings get"
            ),
            Err(e) => warn!(key, error = %e, "settings get failed"),
        }
        result
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = self.inner.put(key, value).await;
        match &result {
            Ok(()) => debug!(
                key,
                bytes = value.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "settings put"
            ),
            Err(e) => warn!(key, error = %e, "settings put failed"),
        }
        result
    }
}
