//! Session backend over a key/value cache store.
//!
//! The whole session map is fetched lazily on first access and written back
//! as one value by `store`. In live mode every mutation is written through,
//! and reads refresh from the store so concurrent writers stay visible.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::session::{Identity, SessionBackend, SessionData};

pub struct CacheBackend {
    store: Arc<dyn KvStore>,
    live: bool,
    cached: Option<SessionData>,
}

impl CacheBackend {
    pub fn new(store: Arc<dyn KvStore>, live: bool) -> Self {
        Self {
            store,
            live,
            cached: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    fn fetch(&self, ident: Identity<'_>) -> Result<SessionData> {
        if !ident.persisted {
            return Ok(SessionData::new());
        }
        let key = ident.durable_key();
        match self.store.get(key) {
            Ok(data) => {
                trace!(session_id = %key, keys = data.len(), "Fetched session map");
                Ok(data)
            }
            Err(Error::NotFound(_)) => Ok(SessionData::new()),
            Err(e) => Err(e),
        }
    }

    /// Map to read from, refreshed from the store in live mode.
    fn read_view(&mut self, ident: Identity<'_>) -> Result<&SessionData> {
        if self.cached.is_none() || (self.live && ident.persisted) {
            self.cached = Some(self.fetch(ident)?);
        }
        Ok(self.cached.get_or_insert_with(SessionData::new))
    }

    /// Map to mutate, loaded once and then kept.
    fn write_view(&mut self, ident: Identity<'_>) -> Result<&mut SessionData> {
        if self.cached.is_none() {
            self.cached = Some(self.fetch(ident)?);
        }
        Ok(self.cached.get_or_insert_with(SessionData::new))
    }
}

impl SessionBackend for CacheBackend {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn id_is_valid(&mut self, id: &str) -> Result<bool> {
        self.store.contains(id)
    }

    fn contains(&mut self, ident: Identity<'_>, key: &str) -> Result<bool> {
        Ok(self.read_view(ident)?.contains_key(key))
    }

    fn get(&mut self, ident: Identity<'_>, key: &str) -> Result<Option<Value>> {
        Ok(self.read_view(ident)?.get(key).cloned())
    }

    fn set(&mut self, ident: Identity<'_>, key: &str, value: Value) -> Result<()> {
        self.write_view(ident)?.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, ident: Identity<'_>, key: &str) -> Result<bool> {
        Ok(self.write_view(ident)?.remove(key).is_some())
    }

    fn keys(&mut self, ident: Identity<'_>) -> Result<Vec<String>> {
        Ok(self.read_view(ident)?.keys().cloned().collect())
    }

    fn store(&mut self, ident: Identity<'_>) -> Result<()> {
        let data = self.write_view(ident)?.clone();
        self.store.set(ident.id, &data)?;
        if let Some(retired) = ident.retired
            && retired != ident.id
        {
            self.store.delete(retired)?;
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        self.cached = None;
        Ok(())
    }

    fn writes_through(&self) -> bool {
        self.live
    }
}
