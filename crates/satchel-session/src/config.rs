//! Configuration for the in-process cache store.

use std::time::Duration;

use satchel_config::CacheSection;

/// Default maximum number of sessions to keep in memory.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Configuration for [`MemoryCache`](crate::MemoryCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of sessions kept before LRU eviction.
    pub max_entries: usize,

    /// Optional time-to-live. Entries not written or read within this
    /// duration are treated as missing.
    pub ttl: Option<Duration>,

    /// Whether to run periodic cleanup of expired sessions.
    /// If false, expired sessions are only dropped on access.
    pub enable_cleanup_task: bool,

    /// Interval for the cleanup task (if enabled).
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: None,
            enable_cleanup_task: true,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[session.cache]` config section.
    pub fn from_section(section: &CacheSection) -> Self {
        Self {
            max_entries: section.max_entries,
            ttl: section.ttl.map(|t| t.as_duration()),
            enable_cleanup_task: section.enable_cleanup_task,
            cleanup_interval: section.cleanup_interval.as_duration(),
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
