//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::session::SessionData;

/// In-memory [`KvStore`] that counts calls and can be told to fail writes.
#[derive(Default)]
pub struct RecordingStore {
    entries: Mutex<HashMap<String, SessionData>>,
    calls: AtomicUsize,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `get`/`set`/`delete` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Drop an entry behind the sessions' back, as an expiring cache would.
    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

impl KvStore for RecordingStore {
    fn get(&self, key: &str) -> Result<SessionData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, data: &SessionData) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Backend("store refused the write".to_string()));
        }
        self.entries.lock().insert(key.to_string(), data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().remove(key);
        Ok(())
    }
}
