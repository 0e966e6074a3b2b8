//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use satchel_config::{ColumnDecl, ColumnKind, SessionConfig, SqlSection};
use satchel_session::{
    CacheConfig, DataManager, Error, KvStore, MemoryCache, SessionModule, SqlStore, TxInfo,
};
use tempfile::TempDir;

/// A session module over a relational store in a temporary directory.
pub struct SqlFixture {
    pub module: SessionModule,
    pub store: SqlStore,
    _dir: TempDir,
}

impl SqlFixture {
    pub fn new(managed: bool) -> Result<Self> {
        let dir = TempDir::new()?;
        let section = SqlSection {
            path: dir.path().join("sessions.db"),
            managed,
            columns: vec![ColumnDecl::new("user_id", ColumnKind::Integer)],
            ..SqlSection::default()
        };
        let store = SqlStore::from_section(&section)?;
        let config = SessionConfig {
            sql: Some(section),
            ..SessionConfig::default()
        };
        let module = SessionModule::new(config, None, Some(store.clone()))?;
        Ok(Self {
            module,
            store,
            _dir: dir,
        })
    }
}

/// A session module over an in-process cache.
pub fn cache_module(config: SessionConfig) -> Result<(SessionModule, MemoryCache)> {
    let cache = MemoryCache::new(CacheConfig::from_section(&config.cache));
    let store: Arc<dyn KvStore> = Arc::new(cache.clone());
    Ok((SessionModule::new(config, Some(store), None)?, cache))
}

/// Participant that refuses to vote. Sorts after every session and unit of
/// work participant.
pub struct RefusingVoter;

impl DataManager for RefusingVoter {
    fn sort_key(&self) -> String {
        "zzz:refuser".to_string()
    }

    fn abort(&mut self, _tx: &TxInfo) -> satchel_session::Result<()> {
        Ok(())
    }

    fn tpc_begin(&mut self, _tx: &TxInfo) -> satchel_session::Result<()> {
        Ok(())
    }

    fn commit(&mut self, _tx: &TxInfo) -> satchel_session::Result<()> {
        Ok(())
    }

    fn tpc_vote(&mut self, _tx: &TxInfo) -> satchel_session::Result<()> {
        Err(Error::Backend("sibling resource refused the commit".to_string()))
    }

    fn tpc_finish(&mut self, _tx: &TxInfo) -> satchel_session::Result<()> {
        Ok(())
    }

    fn tpc_abort(&mut self, _tx: &TxInfo) -> satchel_session::Result<()> {
        Ok(())
    }
}
