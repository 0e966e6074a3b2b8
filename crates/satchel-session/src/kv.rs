//! Key/value cache stores holding whole session maps.
//!
//! [`KvStore`] is the contract the cache backend relies on: atomic
//! get/set/delete of one session map per identity, with a miss reported as
//! [`Error::NotFound`]. [`MemoryCache`] is the in-process implementation,
//! bounded by LRU capacity with optional TTL expiry; expiry is the store's
//! own policy, sessions never see it except as a miss.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::session::SessionData;

/// Contract of a key/value store that persists whole session maps.
pub trait KvStore: Send + Sync {
    /// Fetch the map stored under `key`; [`Error::NotFound`] when absent.
    fn get(&self, key: &str) -> Result<SessionData>;

    /// Store `data` under `key`, replacing any previous map.
    fn set(&self, key: &str, data: &SessionData) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool>;

    /// Remove the map under `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Entry stored in the in-process cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The session map.
    pub data: SessionData,

    /// When this entry was last written or read.
    pub touched_at: Instant,
}

impl CacheEntry {
    fn new(data: SessionData) -> Self {
        Self {
            data,
            touched_at: Instant::now(),
        }
    }
}

/// Inner state protected by the mutex.
struct CacheInner {
    lru: LruCache<String, CacheEntry>,
    expired: u64,
}

/// In-process session store with LRU eviction and optional TTL.
///
/// Clones share the same underlying storage.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<CacheInner>>,
    config: CacheConfig,
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                lru: LruCache::new(cap),
                expired: 0,
            })),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        match self.config.ttl {
            None => false,
            Some(ttl) => now.duration_since(entry.touched_at) > ttl,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        if self.config.ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .lru
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            inner.lru.pop(id);
        }
        inner.expired += expired.len() as u64;

        if !expired.is_empty() {
            debug!(count = expired.len(), "Cleaned up expired sessions");
        }
        expired.len()
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) on a tokio interval.
    ///
    /// Returns `None` when the cleanup task is disabled, no TTL is
    /// configured, or no tokio runtime is available.
    pub fn spawn_cleanup_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.enable_cleanup_task || self.config.ttl.is_none() {
            return None;
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let cache = self.clone();
        let period = self.config.cleanup_interval;

        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired();
            }
        }))
    }

    /// Identities currently held (expired entries excluded).
    pub fn ids(&self) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .lru
            .iter()
            .filter(|(_, entry)| !self.is_expired(entry, now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.lru.len(),
            capacity: self.config.max_entries,
            expired: inner.expired,
        }
    }
}

impl KvStore for MemoryCache {
    fn get(&self, key: &str) -> Result<SessionData> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.lru.get(key) {
            None => return Err(Error::NotFound(key.to_string())),
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            debug!(session_id = %key, "Session expired, removing from cache");
            inner.lru.pop(key);
            inner.expired += 1;
            return Err(Error::NotFound(key.to_string()));
        }

        match inner.lru.get_mut(key) {
            Some(entry) => {
                entry.touched_at = now;
                trace!(session_id = %key, "Session found in cache");
                Ok(entry.data.clone())
            }
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    fn set(&self, key: &str, data: &SessionData) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.lru.push(key.to_string(), CacheEntry::new(data.clone()))
            && evicted != key
        {
            debug!(session_id = %evicted, "Evicted LRU session to make room");
        }
        trace!(session_id = %key, cache_size = inner.lru.len(), "Session written to cache");
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner
            .lru
            .peek(key)
            .is_some_and(|entry| !self.is_expired(entry, Instant::now())))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().lru.pop(key);
        Ok(())
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current number of cached sessions.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Entries dropped because their TTL ran out.
    pub expired: u64,
}

/// Named cache containers, one [`MemoryCache`] per name.
#[derive(Clone)]
pub struct CacheRegistry {
    containers: Arc<Mutex<HashMap<String, MemoryCache>>>,
    config: CacheConfig,
}

impl CacheRegistry {
    /// Create a registry whose containers all share `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            containers: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// The container called `name`, created on first use.
    pub fn container(&self, name: &str) -> MemoryCache {
        self.containers
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| MemoryCache::new(self.config.clone()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn data(n: i64) -> SessionData {
        let mut map = SessionData::new();
        map.insert("n".to_string(), json!(n));
        map
    }

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new(CacheConfig::new());
        cache.set("session-1", &data(1)).unwrap();

        assert_eq!(cache.get("session-1").unwrap(), data(1));
        assert!(cache.contains("session-1").unwrap());
    }

    #[test]
    fn test_miss_is_not_found() {
        let cache = MemoryCache::new(CacheConfig::new());
        assert!(matches!(cache.get("nope"), Err(Error::NotFound(_))));
        assert!(!cache.contains("nope").unwrap());
        cache.delete("nope").unwrap();
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::new(CacheConfig::new().with_max_entries(2));
        cache.set("a", &data(1)).unwrap();
        cache.set("b", &data(2)).unwrap();
        cache.get("a").unwrap();
        cache.set("c", &data(3)).unwrap();

        assert!(cache.contains("a").unwrap());
        assert!(!cache.contains("b").unwrap());
        assert!(cache.contains("c").unwrap());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = MemoryCache::new(CacheConfig::new().with_ttl(Duration::from_millis(20)));
        cache.set("a", &data(1)).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert!(!cache.contains("a").unwrap());
        assert!(matches!(cache.get("a"), Err(Error::NotFound(_))));
        assert_eq!(cache.stats().expired, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = MemoryCache::new(CacheConfig::new().with_ttl(Duration::from_millis(20)));
        for id in ["a", "b", "c"] {
            cache.set(id, &data(0)).unwrap();
        }
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.cleanup_expired(), 3);
        assert!(cache.is_empty());
        assert!(cache.ids().is_empty());
    }

    #[test]
    fn test_registry_shares_containers_by_name() {
        let registry = CacheRegistry::new(CacheConfig::new());
        registry.container("web").set("a", &data(1)).unwrap();

        assert!(registry.container("web").contains("a").unwrap());
        assert!(!registry.container("api").contains("a").unwrap());
    }

    #[test]
    fn test_cleanup_task_needs_ttl() {
        let cache = MemoryCache::new(CacheConfig::new());
        assert!(cache.spawn_cleanup_task().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_millis(10))
            .with_cleanup_interval(Duration::from_millis(15));
        let cache = MemoryCache::new(config);
        cache.set("a", &data(1)).unwrap();

        let task = cache.spawn_cleanup_task().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        task.abort();

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired, 1);
    }
}
