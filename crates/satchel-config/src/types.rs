//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [session]           # context binding
//! [session.cache]     # in-process cache store backend
//! [session.sql]       # relational backend (selected when present)
//! [session.cookie]    # cookie issuance
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, Result};
use crate::interval::Interval;

/// Placeholder value that switches an optional feature off.
const DISABLED: &str = "None";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    /// Session storage configuration.
    pub session: Option<SessionConfig>,
}

impl SatchelConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: SatchelConfig = toml::from_str(toml_str)?;
        if let Some(ref session) = config.session {
            session.validate()?;
        }
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: SatchelConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }
    }

    /// The session section, or the defaults when none was configured.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name under which the session is bound to a request context.
    /// The string `"None"` disables the binding.
    pub context_member: Option<String>,

    /// Cache store backend settings.
    pub cache: CacheSection,

    /// Relational backend settings. When present, this backend wins.
    pub sql: Option<SqlSection>,

    /// Cookie issuance settings.
    pub cookie: CookieSection,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_member: Some("session".to_string()),
            cache: CacheSection::default(),
            sql: None,
            cookie: CookieSection::default(),
        }
    }
}

impl SessionConfig {
    /// The effective context member name, if the binding is enabled.
    pub fn context_member(&self) -> Option<&str> {
        enabled(self.context_member.as_deref())
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.cache.container.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.cache.container".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.cache.max_entries".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(ref sql) = self.sql
            && sql.table.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "session.sql.table".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.cookie.same_site == Some(SameSite::None) && !self.cookie.secure {
            return Err(ConfigError::InvalidValue {
                field: "session.cookie.same_site".to_string(),
                reason: "SameSite=None requires secure = true".to_string(),
            });
        }
        Ok(())
    }
}

/// `[session.cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Name of the cache container holding session data.
    pub container: String,

    /// Write every mutation through immediately and re-read on every access.
    ///
    /// Makes session data visible across processes at once, at the price of
    /// one store round-trip per operation. `revert` cannot undo live writes.
    #[serde(deserialize_with = "de_flag")]
    pub live_data: bool,

    /// Maximum number of sessions kept by the in-process store.
    pub max_entries: usize,

    /// Optional time-to-live for entries in the in-process store.
    pub ttl: Option<Interval>,

    /// Whether to sweep expired entries periodically.
    #[serde(deserialize_with = "de_flag")]
    pub enable_cleanup_task: bool,

    /// Interval of the periodic sweep.
    pub cleanup_interval: Interval,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            container: "satchel.session".to_string(),
            live_data: false,
            max_entries: 10_000,
            ttl: None,
            enable_cleanup_task: true,
            cleanup_interval: Interval::from_secs(60),
        }
    }
}

/// `[session.sql]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSection {
    /// Path of the SQLite database file.
    pub path: PathBuf,

    /// Table holding one row per session.
    pub table: String,

    /// Whether an external transaction manager owns commit and rollback.
    #[serde(deserialize_with = "de_flag")]
    pub managed: bool,

    /// First-class columns that shadow session keys of the same name.
    pub columns: Vec<ColumnDecl>,
}

impl Default for SqlSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sessions.db"),
            table: "sessions".to_string(),
            managed: false,
            columns: Vec::new(),
        }
    }
}

/// Declaration of a first-class session column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDecl {
    /// Column name, identical to the session key it shadows.
    pub name: String,

    /// SQL storage type.
    #[serde(rename = "type", default)]
    pub kind: ColumnKind,
}

impl ColumnDecl {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Storage type of a first-class column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Text,
    Integer,
    Real,
    Boolean,
    Json,
}

impl ColumnKind {
    /// SQLite type affinity used in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Json => "TEXT",
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie
// ─────────────────────────────────────────────────────────────────────────────

/// `[session.cookie]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSection {
    /// Cookie name. The string `"None"` disables cookies.
    pub name: Option<String>,

    /// Cookie `Path` attribute.
    pub path: String,

    /// Cookie `Domain` attribute.
    pub domain: Option<String>,

    /// Cookie `Secure` attribute. Disabling it exposes sessions to
    /// man-in-the-middle attacks.
    #[serde(deserialize_with = "de_flag")]
    pub secure: bool,

    /// Cookie `HttpOnly` attribute. Disabling it lets injected scripts read
    /// the session identity.
    #[serde(deserialize_with = "de_flag")]
    pub http_only: bool,

    /// Cookie `SameSite` attribute; unset omits it.
    pub same_site: Option<SameSite>,

    /// Cookie `Max-Age`. When set, the cookie is re-sent with every response
    /// to keep a rolling expiry alive; when unset the cookie lasts until the
    /// browser closes.
    pub max_age: Option<Interval>,
}

impl Default for CookieSection {
    fn default() -> Self {
        Self {
            name: Some("session".to_string()),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: None,
            max_age: None,
        }
    }
}

impl CookieSection {
    /// The cookie name, if cookies are enabled.
    pub fn enabled_name(&self) -> Option<&str> {
        enabled(self.name.as_deref())
    }
}

/// Cookie `SameSite` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn enabled(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != DISABLED)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Accept TOML booleans as well as the usual textual spellings.
fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "invalid boolean value {other}"
        ))),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(serde::de::Error::custom(format!(
                "invalid boolean value '{text}'"
            ))),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let session = SatchelConfig::new().session();
        assert_eq!(session.context_member(), Some("session"));
        assert_eq!(session.cache.container, "satchel.session");
        assert!(!session.cache.live_data);
        assert!(session.sql.is_none());
        assert_eq!(session.cookie.enabled_name(), Some("session"));
        assert_eq!(session.cookie.path, "/");
        assert!(session.cookie.secure);
        assert!(session.cookie.http_only);
        assert!(session.cookie.max_age.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = SatchelConfig::from_toml(
            r#"
[session]
context_member = "sess"

[session.cache]
container = "web.sessions"
live_data = "yes"
ttl = "1h"

[session.sql]
path = "/tmp/sessions.db"
table = "web_sessions"
managed = true
columns = [
    { name = "user_id", type = "integer" },
    { name = "locale" },
]

[session.cookie]
name = "sid"
domain = "example.org"
same_site = "Lax"
max_age = "30d"
"#,
        )
        .unwrap();

        let session = config.session();
        assert_eq!(session.context_member(), Some("sess"));
        assert!(session.cache.live_data);
        assert_eq!(session.cache.ttl.unwrap().as_secs(), 3_600);

        let sql = session.sql.unwrap();
        assert_eq!(sql.table, "web_sessions");
        assert!(sql.managed);
        assert_eq!(
            sql.columns,
            vec![
                ColumnDecl::new("user_id", ColumnKind::Integer),
                ColumnDecl::new("locale", ColumnKind::Text),
            ]
        );

        assert_eq!(session.cookie.enabled_name(), Some("sid"));
        assert_eq!(session.cookie.domain.as_deref(), Some("example.org"));
        assert_eq!(session.cookie.same_site, Some(SameSite::Lax));
        assert_eq!(session.cookie.max_age.unwrap().as_secs(), 30 * 86_400);
    }

    #[test]
    fn test_none_disables_features() {
        let config = SatchelConfig::from_toml(
            r#"
[session]
context_member = "None"

[session.cookie]
name = "None"
"#,
        )
        .unwrap();
        let session = config.session();
        assert_eq!(session.context_member(), None);
        assert_eq!(session.cookie.enabled_name(), None);
    }

    #[test]
    fn test_invalid_flag_rejected() {
        let err = SatchelConfig::from_toml("[session.cache]\nlive_data = \"maybe\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let err = SatchelConfig::from_toml("[session.cookie]\nmax_age = \"forever\"\n").unwrap_err();
        assert!(err.to_string().contains("forever"));
    }

    #[test]
    fn test_same_site_none_requires_secure() {
        let err = SatchelConfig::from_toml(
            "[session.cookie]\nsame_site = \"None\"\nsecure = false\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_merge_replaces_session_section() {
        let mut base = SatchelConfig::from_toml("[session.cache]\ncontainer = \"a\"\n").unwrap();
        base.merge(SatchelConfig::from_toml("[session.cache]\ncontainer = \"b\"\n").unwrap());
        assert_eq!(base.session().cache.container, "b");

        base.merge(SatchelConfig::new());
        assert_eq!(base.session().cache.container, "b");
    }

    #[test]
    fn test_toml_roundtrip_keeps_intervals_readable() {
        let config = SatchelConfig::from_toml("[session.cookie]\nmax_age = 86400\n").unwrap();
        let text = config.to_toml().unwrap();
        assert!(text.contains("max_age = \"1d\""));
        let back = SatchelConfig::from_toml(&text).unwrap();
        assert_eq!(back.session().cookie.max_age, config.session().cookie.max_age);
    }
}
