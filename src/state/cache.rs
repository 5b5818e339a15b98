use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL runs past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory key/value cache with per-entry TTL. Expiry is checked lazily on
/// read; nothing sweeps in the background.
pub struct EphemeralCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    fill_gate: Mutex<()>,
}

impl<V: Clone + Send + Sync> EphemeralCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fill_gate: Mutex::new(()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
    }

    /// Return the cached value or run `fill` to produce it along with its TTL.
    /// Concurrent misses are coalesced: only one caller runs `fill`, the rest
    /// read what it stored.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, fill: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, Duration), E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let _gate = self.fill_gate.lock().await;
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let (value, ttl) = fill().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }
}

impl<V: Clone + Send + Sync> Default for EphemeralCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
