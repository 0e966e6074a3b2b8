//! Helpers web frameworks commonly build on top of a session.
//!
//! Everything is stored as ordinary session keys, so the helpers work on any
//! backend and are persisted together with the rest of the session.

use chrono::Utc;
use rand::RngCore;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::Session;

const CREATED_KEY: &str = "__created__";
const CSRF_KEY: &str = "__csrf_token__";
const CSRF_TOKEN_BYTES: usize = 20;

fn flash_key(queue: &str) -> String {
    format!("__flash({queue})__")
}

/// Creation time of the session in seconds since the epoch, recorded on
/// first access.
pub fn created(session: &mut Session) -> Result<i64> {
    let value = session.set_default(CREATED_KEY, Utc::now().timestamp())?;
    value.as_i64().ok_or_else(|| Error::TypeMismatch {
        column: CREATED_KEY.to_string(),
        expected: "integer",
    })
}

/// Append `message` to the flash queue `queue`.
///
/// Unless `allow_duplicate` is set, a message already queued is not added
/// again.
pub fn flash(
    session: &mut Session,
    message: impl Into<Value>,
    queue: &str,
    allow_duplicate: bool,
) -> Result<()> {
    let key = flash_key(queue);
    let message = message.into();
    let mut messages = peek_flash(session, queue)?;
    if !allow_duplicate && messages.contains(&message) {
        return Ok(());
    }
    messages.push(message);
    session.set(key, Value::Array(messages))
}

/// Remove and return every message in `queue`.
pub fn pop_flash(session: &mut Session, queue: &str) -> Result<Vec<Value>> {
    Ok(match session.pop(&flash_key(queue))? {
        Some(Value::Array(messages)) => messages,
        _ => Vec::new(),
    })
}

/// Messages in `queue`, leaving them queued.
pub fn peek_flash(session: &mut Session, queue: &str) -> Result<Vec<Value>> {
    Ok(match session.get_or(&flash_key(queue), Value::Null)? {
        Value::Array(messages) => messages,
        _ => Vec::new(),
    })
}

/// Generate and store a fresh CSRF token.
pub fn new_csrf_token(session: &mut Session) -> Result<String> {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    session.set(CSRF_KEY, token.clone())?;
    Ok(token)
}

/// The stored CSRF token, generating one when none exists.
pub fn csrf_token(session: &mut Session) -> Result<String> {
    match session.get_or(CSRF_KEY, Value::Null)? {
        Value::String(token) => Ok(token),
        _ => new_csrf_token(session),
    }
}

/// Drop every key of the session.
pub fn invalidate(session: &mut Session) -> Result<()> {
    session.clear()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;
    use crate::testing::RecordingStore;
    use serde_json::json;

    fn session() -> Session {
        Session::create(Box::new(CacheBackend::new(RecordingStore::new(), false)))
    }

    #[test]
    fn test_created_is_stable() {
        let mut s = session();
        let first = created(&mut s).unwrap();
        assert!(first > 0);
        assert_eq!(created(&mut s).unwrap(), first);
        s.revert().unwrap();
    }

    #[test]
    fn test_flash_queues() {
        let mut s = session();
        flash(&mut s, "saved", "", false).unwrap();
        flash(&mut s, "saved", "", false).unwrap();
        flash(&mut s, "saved", "", true).unwrap();
        flash(&mut s, "oops", "errors", false).unwrap();

        assert_eq!(peek_flash(&mut s, "").unwrap(), vec![json!("saved"), json!("saved")]);
        assert_eq!(pop_flash(&mut s, "errors").unwrap(), vec![json!("oops")]);
        assert!(pop_flash(&mut s, "errors").unwrap().is_empty());
        assert!(s.contains("__flash()__").unwrap());
        s.revert().unwrap();
    }

    #[test]
    fn test_csrf_token() {
        let mut s = session();
        let token = csrf_token(&mut s).unwrap();
        assert_eq!(token.len(), CSRF_TOKEN_BYTES * 2);
        assert_eq!(csrf_token(&mut s).unwrap(), token);
        assert_ne!(new_csrf_token(&mut s).unwrap(), token);
        s.revert().unwrap();
    }

    #[test]
    fn test_invalidate_clears() {
        let mut s = session();
        s.set("user", "ada").unwrap();
        invalidate(&mut s).unwrap();
        assert!(s.keys().unwrap().is_empty());
        s.revert().unwrap();
    }
}
