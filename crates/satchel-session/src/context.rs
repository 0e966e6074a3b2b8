//! Binding sessions to request contexts.
//!
//! A [`RequestContext`] carries what one request knows about its session:
//! an identity from an earlier binding, the request cookies, the cookies to
//! send back, and an optional two-phase-commit [`Transaction`]. The binder
//! operations on [`SessionModule`] open the session at context start and
//! persist or revert it at context end.

use std::fmt;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cookie::SetCookie;
use crate::error::{Error, Result};
use crate::module::SessionModule;
use crate::participant::SessionParticipant;
use crate::session::SharedSession;
use crate::txn::Transaction;

/// Cookies of one HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpExchange {
    /// Value of the request's `Cookie` header.
    pub request_cookies: Option<String>,

    /// Cookies to send with the response.
    pub response_cookies: Vec<SetCookie>,
}

impl HttpExchange {
    pub fn new(cookie_header: Option<&str>) -> Self {
        Self {
            request_cookies: cookie_header.map(str::to_string),
            response_cookies: Vec::new(),
        }
    }

    /// `Set-Cookie` header values for the response.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.response_cookies.iter().map(|c| c.to_string()).collect()
    }
}

/// State of one request as seen by the session binder.
pub struct RequestContext {
    id: String,
    session_id: Option<String>,
    session_changed: bool,
    session: Option<SharedSession>,
    http: Option<HttpExchange>,
    transaction: Option<Transaction>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            session_changed: false,
            session: None,
            http: None,
            transaction: None,
        }
    }

    /// Attach the request's `Cookie` header.
    pub fn with_http(mut self, cookie_header: Option<&str>) -> Self {
        self.http = Some(HttpExchange::new(cookie_header));
        self
    }

    /// Carry a session identity without a cookie.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Final session identity, recorded when the session was closed.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the closed session had been modified.
    pub fn session_changed(&self) -> bool {
        self.session_changed
    }

    /// The bound session, while it is open.
    pub fn session(&self) -> Option<&SharedSession> {
        self.session.as_ref()
    }

    pub fn http(&self) -> Option<&HttpExchange> {
        self.http.as_ref()
    }

    pub fn transaction_mut(&mut self) -> Option<&mut Transaction> {
        self.transaction.as_mut()
    }

    pub fn take_transaction(&mut self) -> Option<Transaction> {
        self.transaction.take()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("session_changed", &self.session_changed)
            .field("bound", &self.session.is_some())
            .field("http", &self.http)
            .field("transaction", &self.transaction)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Binder
// ─────────────────────────────────────────────────────────────────────────────

impl SessionModule {
    /// Bind a session to `ctx`, or return the one already bound.
    ///
    /// The identity comes from the context first, then from the request
    /// cookie; without either a fresh session is created. When the context
    /// carries a transaction, the session joins it as a participant.
    pub fn open(&self, ctx: &mut RequestContext) -> Result<SharedSession> {
        let Some(member) = self.context_member() else {
            return Err(Error::InvalidConfiguration(
                "context binding is disabled".to_string(),
            ));
        };
        if let Some(session) = &ctx.session {
            return Ok(session.clone());
        }
        if self.is_managed() && ctx.transaction.is_none() {
            return Err(Error::InvalidConfiguration(
                "managed sessions need a transaction on the request context".to_string(),
            ));
        }

        let from_cookie = || {
            let settings = self.cookie()?;
            let header = ctx.http.as_ref()?.request_cookies.as_deref()?;
            settings.find_in_header(header)
        };
        let candidate = ctx.session_id.clone().or_else(from_cookie);

        let built = self.build_backend()?;
        let session = crate::session::Session::load(built.backend, candidate.as_deref())?;
        debug!(
            ctx = %ctx.id,
            member,
            session_id = ?session.id(),
            "Session bound to context"
        );
        let shared = session.into_shared();

        if let Some(tx) = ctx.transaction.as_mut() {
            tx.join(Box::new(SessionParticipant::new(shared.clone(), ctx.id.clone())?));
            if let Some(uow) = built.unit_of_work.filter(|uow| uow.is_managed()) {
                tx.join(Box::new(uow.participant()));
            }
        }

        ctx.session = Some(shared.clone());
        Ok(shared)
    }

    /// Unbind the session from `ctx`, reverting it when the request failed
    /// and storing it otherwise.
    ///
    /// A cookie is issued only after a successful store, when the identity
    /// changed or a max-age keeps the cookie alive.
    pub fn close(&self, ctx: &mut RequestContext, failed: bool) -> Result<()> {
        let Some(shared) = ctx.session.take() else {
            return Ok(());
        };
        let mut session = shared.lock();
        ctx.session_id = session.id().map(str::to_string);
        ctx.session_changed = session.was_changed();

        if failed {
            session.revert()?;
            debug!(ctx = %ctx.id, session_id = ?session.id(), "Request failed, session reverted");
            return Ok(());
        }
        session.store()?;

        if let (Some(settings), Some(id)) = (self.cookie(), session.id())
            && (session.identity_changed() || settings.keep_alive())
        {
            match ctx.http.as_mut() {
                Some(http) => {
                    http.response_cookies.push(settings.issue(id));
                    debug!(ctx = %ctx.id, session_id = %id, "Session cookie issued");
                }
                None => debug!(ctx = %ctx.id, "No HTTP exchange, session cookie skipped"),
            }
        }
        Ok(())
    }

    /// Run `f` with the session bound to `ctx`.
    ///
    /// The session is closed on every exit path, then the context's
    /// transaction is committed when everything succeeded and aborted
    /// otherwise.
    pub fn scope<T, E, F>(&self, ctx: &mut RequestContext, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut RequestContext, &SharedSession) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let shared = match self.open(ctx) {
            Ok(shared) => shared,
            Err(e) => {
                if let Some(tx) = ctx.transaction.take()
                    && let Err(abort) = tx.abort()
                {
                    warn!(ctx = %ctx.id, error = %abort, "Transaction abort failed");
                }
                return Err(e.into());
            }
        };

        let outcome = f(ctx, &shared);
        drop(shared);
        let closed = self.close(ctx, outcome.is_err());

        let finished = match ctx.transaction.take() {
            Some(tx) if outcome.is_ok() && closed.is_ok() => tx.commit(),
            Some(tx) => {
                if let Err(abort) = tx.abort() {
                    warn!(ctx = %ctx.id, error = %abort, "Transaction abort failed");
                }
                Ok(())
            }
            None => Ok(()),
        };

        let value = outcome?;
        closed?;
        finished?;
        Ok(value)
    }
}
