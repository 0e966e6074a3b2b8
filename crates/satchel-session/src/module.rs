//! Backend selection and session construction from configuration.

use std::sync::Arc;

use satchel_config::SessionConfig;
use tracing::{debug, info};

use crate::cache::CacheBackend;
use crate::config::CacheConfig;
use crate::cookie::CookieSettings;
use crate::error::{Error, Result};
use crate::kv::{CacheRegistry, KvStore};
use crate::session::{Session, SessionBackend};
use crate::sql::{RelationalBackend, SqlStore, UnitOfWork};

enum BackendKind {
    Cache { store: Arc<dyn KvStore>, live: bool },
    Sql { store: SqlStore, managed: bool },
}

/// A freshly built backend and, for relational sessions, its unit of work.
pub(crate) struct BuiltBackend {
    pub backend: Box<dyn SessionBackend>,
    pub unit_of_work: Option<Arc<UnitOfWork>>,
}

/// Creates sessions on the configured backend and binds them to request
/// contexts.
pub struct SessionModule {
    config: SessionConfig,
    kind: BackendKind,
    cookie: Option<CookieSettings>,
}

impl SessionModule {
    /// Select a backend: the relational store when `[session.sql]` is
    /// configured and a store is given, otherwise the cache store.
    pub fn new(
        config: SessionConfig,
        cache: Option<Arc<dyn KvStore>>,
        sql: Option<SqlStore>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        let kind = match (config.sql.as_ref(), sql, cache) {
            (Some(section), Some(store), _) => BackendKind::Sql {
                store,
                managed: section.managed,
            },
            (_, _, Some(store)) => BackendKind::Cache {
                store,
                live: config.cache.live_data,
            },
            _ => {
                return Err(Error::InvalidConfiguration(
                    "no session backend configured: provide a cache store or a [session.sql] store"
                        .to_string(),
                ));
            }
        };

        let cookie = CookieSettings::from_section(&config.cookie);
        let module = Self {
            config,
            kind,
            cookie,
        };
        info!(
            backend = module.backend_name(),
            cookie = module.cookie.as_ref().map(|c| c.name.as_str()),
            "Session module ready"
        );
        Ok(module)
    }

    /// Open every store the configuration names. Cache containers come from
    /// `registry`.
    pub fn from_config(config: SessionConfig, registry: &CacheRegistry) -> Result<Self> {
        let sql = match &config.sql {
            Some(section) => Some(SqlStore::from_section(section)?),
            None => None,
        };
        let cache: Option<Arc<dyn KvStore>> = match &sql {
            Some(_) => None,
            None => Some(Arc::new(registry.container(&config.cache.container))),
        };
        Self::new(config, cache, sql)
    }

    /// Registry sized by the `[session.cache]` section.
    pub fn cache_registry(config: &SessionConfig) -> CacheRegistry {
        CacheRegistry::new(CacheConfig::from_section(&config.cache))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        match self.kind {
            BackendKind::Cache { .. } => "cache",
            BackendKind::Sql { .. } => "sql",
        }
    }

    pub fn cookie(&self) -> Option<&CookieSettings> {
        self.cookie.as_ref()
    }

    /// Name under which sessions are bound to request contexts, `None` when
    /// binding is disabled.
    pub fn context_member(&self) -> Option<&str> {
        self.config.context_member()
    }

    /// Whether relational sessions wait for an external transaction.
    pub fn is_managed(&self) -> bool {
        matches!(self.kind, BackendKind::Sql { managed: true, .. })
    }

    pub(crate) fn build_backend(&self) -> Result<BuiltBackend> {
        match &self.kind {
            BackendKind::Cache { store, live } => Ok(BuiltBackend {
                backend: Box::new(CacheBackend::new(store.clone(), *live)),
                unit_of_work: None,
            }),
            BackendKind::Sql { store, managed } => {
                let uow = store.unit_of_work(*managed)?;
                Ok(BuiltBackend {
                    backend: Box::new(RelationalBackend::new(uow.clone())),
                    unit_of_work: Some(uow),
                })
            }
        }
    }

    /// A new, empty session.
    pub fn create(&self) -> Result<Session> {
        Ok(Session::create(self.build_backend()?.backend))
    }

    /// The session for `id`, or a fresh one when `id` is absent or unknown.
    pub fn load(&self, id: Option<&str>) -> Result<Session> {
        let session = Session::load(self.build_backend()?.backend, id)?;
        debug!(
            session_id = ?session.id(),
            backend = session.backend_name(),
            "Session loaded"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStore;
    use satchel_config::SqlSection;
    use serde_json::json;
    use tempfile::TempDir;

    fn recording() -> Option<Arc<dyn KvStore>> {
        let store: Arc<dyn KvStore> = RecordingStore::new();
        Some(store)
    }

    #[test]
    fn test_no_backend_is_invalid_configuration() {
        let err = SessionModule::new(SessionConfig::default(), None, None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_sql_section_without_store_falls_back_to_cache() {
        let config = SessionConfig {
            sql: Some(SqlSection::default()),
            ..SessionConfig::default()
        };
        let module = SessionModule::new(config, recording(), None).unwrap();
        assert_eq!(module.backend_name(), "cache");
    }

    #[test]
    fn test_invalid_section_is_rejected() {
        let mut config = SessionConfig::default();
        config.cache.container = String::new();
        let err = SessionModule::new(config, recording(), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_config_prefers_sql() {
        let dir = TempDir::new().unwrap();
        let config = SessionConfig {
            sql: Some(SqlSection {
                path: dir.path().join("s.db"),
                ..SqlSection::default()
            }),
            ..SessionConfig::default()
        };
        let registry = SessionModule::cache_registry(&config);
        let module = SessionModule::from_config(config, &registry).unwrap();
        assert_eq!(module.backend_name(), "sql");

        let mut session = module.create().unwrap();
        session.set("a", 1).unwrap();
        session.store().unwrap();
        let id = session.id().unwrap().to_string();

        let mut resumed = module.load(Some(&id)).unwrap();
        assert_eq!(resumed.get("a").unwrap(), json!(1));
    }

    #[test]
    fn test_from_config_uses_named_container() {
        let config = SessionConfig::default();
        let registry = SessionModule::cache_registry(&config);
        let module = SessionModule::from_config(config, &registry).unwrap();

        let mut session = module.create().unwrap();
        session.set("a", 1).unwrap();
        session.store().unwrap();
        let id = session.id().unwrap().to_string();

        assert!(registry.container("satchel.session").contains(&id).unwrap());
    }
}
