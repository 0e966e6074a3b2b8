//! The session state machine and its dict-style contract.
//!
//! A [`Session`] owns the identity and dirty-tracking state and delegates the
//! actual key/value storage to a [`SessionBackend`]. Identity is assigned
//! lazily on the first mutation; until then every read behaves as though the
//! session were empty and never reaches the backend.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The key/value bag of one session.
pub type SessionData = Map<String, Value>;

/// A session shared between a request context and its transaction participant.
pub type SharedSession = Arc<Mutex<Session>>;

/// Identity state handed to backend primitives.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    /// Current identity of the session.
    pub id: &'a str,

    /// Identity replaced by [`Session::regenerate_id`] and not yet retired by
    /// a successful store.
    pub retired: Option<&'a str>,

    /// Whether durable data may exist for this session (it was loaded with a
    /// valid identity, or stored at least once).
    pub persisted: bool,
}

impl Identity<'_> {
    /// Identity under which durable data for this session currently lives.
    pub fn durable_key(&self) -> &str {
        self.retired.unwrap_or(self.id)
    }
}

/// Storage primitives every session backend provides.
///
/// Primitives are only invoked for sessions that have an identity; the
/// [`Session`] answers on its own for identity-less sessions.
pub trait SessionBackend: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Existence probe for a candidate identity, evaluated once at load time.
    fn id_is_valid(&mut self, id: &str) -> Result<bool>;

    fn contains(&mut self, ident: Identity<'_>, key: &str) -> Result<bool>;

    /// Owned copy of the value under `key`, `None` when absent.
    fn get(&mut self, ident: Identity<'_>, key: &str) -> Result<Option<Value>>;

    fn set(&mut self, ident: Identity<'_>, key: &str, value: Value) -> Result<()>;

    /// Remove `key`, reporting whether anything changed.
    fn delete(&mut self, ident: Identity<'_>, key: &str) -> Result<bool>;

    /// All live keys, including uncommitted in-memory mutations.
    fn keys(&mut self, ident: Identity<'_>) -> Result<Vec<String>>;

    /// Persist pending mutations.
    fn store(&mut self, ident: Identity<'_>) -> Result<()>;

    /// Discard pending mutations.
    fn revert(&mut self) -> Result<()>;

    /// Whether every mutation is written through immediately.
    fn writes_through(&self) -> bool {
        false
    }

    /// Whether `store` only stages data for an external transaction to commit.
    fn commit_deferred(&self) -> bool {
        false
    }
}

/// What a call to [`Session::revert`] accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    /// Pending mutations were discarded.
    Discarded,
    /// There was nothing to discard.
    Clean,
    /// The backend writes through; earlier mutations are already visible
    /// and cannot be taken back.
    WriteThrough,
}

/// A dict-like object managing the data of one session.
///
/// Modified data is persisted by [`store`](Session::store). If a dirty
/// session is dropped without an explicit `store` or `revert`, a final
/// `store` is attempted and any failure is logged.
pub struct Session {
    id: Option<String>,
    original_id: Option<String>,
    retired_id: Option<String>,
    persisted: bool,
    was_changed: bool,
    dirty: bool,
    backend: Box<dyn SessionBackend>,
}

impl Session {
    /// Create a new, empty session.
    pub fn create(backend: Box<dyn SessionBackend>) -> Self {
        Self {
            id: None,
            original_id: None,
            retired_id: None,
            persisted: false,
            was_changed: false,
            dirty: false,
            backend,
        }
    }

    /// Load the session with the given candidate identity.
    ///
    /// An empty or unknown identity is not an error: the result behaves
    /// exactly like [`Session::create`].
    pub fn load(mut backend: Box<dyn SessionBackend>, candidate: Option<&str>) -> Result<Self> {
        let id = match candidate.filter(|c| !c.is_empty()) {
            Some(candidate) if backend.id_is_valid(candidate)? => Some(candidate.to_string()),
            Some(candidate) => {
                debug!(
                    candidate = %candidate,
                    backend = backend.name(),
                    "Unknown session identity, starting a fresh session"
                );
                None
            }
            None => None,
        };

        let mut session = Self::create(backend);
        session.persisted = id.is_some();
        session.original_id = id.clone();
        session.id = id;
        Ok(session)
    }

    /// Wrap this session for sharing with a transaction participant.
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // ── State ───────────────────────────────────────────────────────

    /// Current identity, `None` until the first mutation of a fresh session.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Identity the session was loaded with.
    pub fn original_id(&self) -> Option<&str> {
        self.original_id.as_deref()
    }

    /// Whether this session was created rather than resumed.
    pub fn is_new(&self) -> bool {
        self.original_id.is_none()
    }

    /// Whether the identity differs from the one the session was loaded with,
    /// meaning the client must be told about it.
    pub fn identity_changed(&self) -> bool {
        self.id.is_some() && self.id != self.original_id
    }

    /// Whether a modifying operation was performed on this session.
    pub fn was_changed(&self) -> bool {
        self.was_changed
    }

    /// Whether there are mutations a `store` would persist.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the backend writes every mutation through immediately.
    pub fn writes_through(&self) -> bool {
        self.backend.writes_through()
    }

    /// Whether `store` leaves the final commit to an external transaction.
    pub fn commit_deferred(&self) -> bool {
        self.backend.commit_deferred()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // ── Primitives ──────────────────────────────────────────────────

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        match self.bound() {
            None => Ok(false),
            Some((ident, backend)) => backend.contains(ident, key),
        }
    }

    /// Copy of the value under `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] when the key is absent or the
    /// session has no identity.
    pub fn get(&mut self, key: &str) -> Result<Value> {
        let Some((ident, backend)) = self.bound() else {
            return Err(Error::KeyNotFound(key.to_string()));
        };
        backend
            .get(ident, key)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Assign `value` to `key`.
    ///
    /// Writing a value equal to the stored one is a no-op and leaves the
    /// session clean.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();

        if let Some((ident, backend)) = self.bound()
            && let Some(existing) = backend.get(ident, &key)?
            && existing == value
        {
            trace!(session_id = %ident.id, key = %key, "Skipping write of unchanged value");
            return Ok(());
        }

        let id: &str = self.id.get_or_insert_with(|| {
            let id = Uuid::new_v4().to_string();
            debug!(session_id = %id, "Assigned session identity");
            id
        });
        let ident = Identity {
            id,
            retired: self.retired_id.as_deref(),
            persisted: self.persisted,
        };
        trace!(session_id = %ident.id, key = %key, "Setting session key");
        self.backend.set(ident, &key, value)?;
        self.mark_dirty()
    }

    /// Remove `key`. Absent keys and identity-less sessions are left alone.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let Some((ident, backend)) = self.bound() else {
            return Ok(());
        };
        if !backend.contains(ident, key)? || !backend.delete(ident, key)? {
            return Ok(());
        }
        trace!(session_id = %ident.id, key = %key, "Deleted session key");
        self.mark_dirty()
    }

    /// All live keys. Each call returns a fresh sequence.
    pub fn keys(&mut self) -> Result<Vec<String>> {
        match self.bound() {
            None => Ok(Vec::new()),
            Some((ident, backend)) => backend.keys(ident),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Persist pending mutations, making them available to other processes.
    ///
    /// A failed write leaves the session dirty so the caller can retry.
    pub fn store(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some((ident, backend)) = self.bound() {
            backend.store(ident)?;
            debug!(session_id = %ident.id, backend = backend.name(), "Session stored");
        }
        self.dirty = false;
        self.persisted = true;
        self.retired_id = None;
        Ok(())
    }

    /// Throw away pending mutations.
    ///
    /// Has no effect on write-through sessions, whose mutations are already
    /// visible elsewhere; callers relying on `revert` must not use live mode.
    pub fn revert(&mut self) -> Result<RevertOutcome> {
        if self.backend.writes_through() {
            warn!(
                session_id = ?self.id,
                "Revert on a write-through session; live writes are kept"
            );
            if self.dirty {
                self.backend.revert()?;
                self.dirty = false;
            }
            return Ok(RevertOutcome::WriteThrough);
        }
        if !self.dirty {
            return Ok(RevertOutcome::Clean);
        }

        self.backend.revert()?;
        self.dirty = false;
        if let Some(previous) = self.retired_id.take() {
            self.id = Some(previous);
        }
        debug!(session_id = ?self.id, backend = self.backend.name(), "Session reverted");
        Ok(RevertOutcome::Discarded)
    }

    /// Replace the identity with a fresh one, keeping the data.
    ///
    /// The previous identity is retired by the next successful `store` and
    /// restored by `revert`. Does nothing for an identity-less session.
    pub fn regenerate_id(&mut self) -> Result<()> {
        let Some(previous) = self.id.take() else {
            return Ok(());
        };
        let fresh = Uuid::new_v4().to_string();
        debug!(previous = %previous, session_id = %fresh, "Regenerating session identity");
        if self.retired_id.is_none() {
            self.retired_id = Some(previous);
        }
        self.id = Some(fresh);
        self.mark_dirty()
    }

    // ── Dict conveniences ───────────────────────────────────────────

    /// Value under `key`, or `default` when it is missing.
    pub fn get_or(&mut self, key: &str, default: impl Into<Value>) -> Result<Value> {
        match self.get(key) {
            Err(Error::KeyNotFound(_)) => Ok(default.into()),
            other => other,
        }
    }

    /// Deserialize the value under `key`.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<T> {
        Ok(serde_json::from_value(self.get(key)?)?)
    }

    /// Serialize `value` and store it under `key`.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    pub fn items(&mut self) -> Result<Vec<(String, Value)>> {
        let Some((ident, backend)) = self.bound() else {
            return Ok(Vec::new());
        };
        let mut items = Vec::new();
        for key in backend.keys(ident)? {
            if let Some(value) = backend.get(ident, &key)? {
                items.push((key, value));
            }
        }
        Ok(items)
    }

    pub fn values(&mut self) -> Result<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Copy of the whole live key/value view.
    pub fn snapshot(&mut self) -> Result<SessionData> {
        Ok(self.items()?.into_iter().collect())
    }

    /// Remove `key` and return its value, if it had one.
    pub fn pop(&mut self, key: &str) -> Result<Option<Value>> {
        let value = match self.get(key) {
            Ok(value) => value,
            Err(Error::KeyNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.delete(key)?;
        Ok(Some(value))
    }

    /// Remove and return the first key/value pair.
    pub fn pop_item(&mut self) -> Result<(String, Value)> {
        let key = self
            .keys()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::KeyNotFound("pop_item on empty session".to_string()))?;
        let value = self.get(&key)?;
        self.delete(&key)?;
        Ok((key, value))
    }

    /// Value under `key`, storing `default` first when it is missing.
    pub fn set_default(&mut self, key: &str, default: impl Into<Value>) -> Result<Value> {
        match self.get(key) {
            Err(Error::KeyNotFound(_)) => {
                let default = default.into();
                self.set(key, default.clone())?;
                Ok(default)
            }
            other => other,
        }
    }

    pub fn update<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Delete every key.
    pub fn clear(&mut self) -> Result<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Identity and backend, when the session has an identity.
    fn bound(&mut self) -> Option<(Identity<'_>, &mut (dyn SessionBackend + 'static))> {
        let id = self.id.as_deref()?;
        let ident = Identity {
            id,
            retired: self.retired_id.as_deref(),
            persisted: self.persisted,
        };
        Some((ident, self.backend.as_mut()))
    }

    fn mark_dirty(&mut self) -> Result<()> {
        self.was_changed = true;
        self.dirty = true;
        if self.backend.writes_through() {
            self.store()?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Err(e) = self.store() {
            error!(
                session_id = ?self.id,
                backend = self.backend.name(),
                error = %e,
                "Failed to persist session at scope end"
            );
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("original_id", &self.original_id)
            .field("was_changed", &self.was_changed)
            .field("dirty", &self.dirty)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
