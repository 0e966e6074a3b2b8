//! Per-user session state with cache and relational backends.
//!
//! This crate provides:
//! - A [`Session`] with lazy identity, dirty tracking, and a dict-style API
//! - A cache backend over any [`KvStore`], with an optional live
//!   (write-through) mode, and the in-process [`MemoryCache`]
//! - A relational backend on SQLite with first-class columns and a JSON
//!   payload, staged through a [`UnitOfWork`]
//! - A [`SessionParticipant`] that joins a two-phase-commit [`Transaction`]
//! - A context binder ([`SessionModule::scope`]) that loads the session from
//!   a cookie, persists or reverts it, and issues the cookie
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel_session::{RequestContext, SessionModule};
//!
//! let module = SessionModule::from_config(config, &registry)?;
//! let mut ctx = RequestContext::new().with_http(cookie_header);
//! module.scope(&mut ctx, |_, session| session.lock().set("user", "ada"))?;
//! ```

mod cache;
mod config;
mod context;
mod cookie;
mod error;
mod kv;
mod module;
mod participant;
mod session;
pub mod sql;
#[cfg(test)]
mod testing;
mod txn;
pub mod web;

pub use cache::CacheBackend;
pub use config::{CacheConfig, DEFAULT_MAX_ENTRIES};
pub use context::{HttpExchange, RequestContext};
pub use cookie::{CookieSettings, SetCookie, cookie_value};
pub use error::{Error, Result};
pub use kv::{CacheEntry, CacheRegistry, CacheStats, KvStore, MemoryCache};
pub use module::SessionModule;
pub use participant::SessionParticipant;
pub use session::{
    Identity, RevertOutcome, Session, SessionBackend, SessionData, SharedSession,
};
pub use sql::{RelationalBackend, SessionRow, SqlStore, TableSchema, UnitOfWork};
pub use txn::{DataManager, Transaction, TxInfo};
