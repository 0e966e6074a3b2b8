//! A session as a voting member of a two-phase-commit transaction.

use tracing::debug;

use crate::error::Result;
use crate::session::{SessionData, SharedSession};
use crate::txn::{DataManager, TxInfo};

/// Stores the session during the commit phase and restores it if the
/// transaction aborts afterwards.
///
/// `baseline` is the view that was durable before the running transaction.
/// Each commit phase moves it into the revert buffer and replaces it with
/// the post-commit snapshot, so `tpc_abort` restores the state the session
/// had before this transaction mutated it.
pub struct SessionParticipant {
    session: SharedSession,
    context_id: String,
    baseline: SessionData,
    buffer: Option<SessionData>,
}

impl SessionParticipant {
    /// Wrap `session`, capturing its current view as the restore point.
    pub fn new(session: SharedSession, context_id: impl Into<String>) -> Result<Self> {
        let baseline = session.lock().snapshot()?;
        Ok(Self {
            session,
            context_id: context_id.into(),
            baseline,
            buffer: None,
        })
    }

    /// Whether a commit phase ran and its effects can still be undone.
    pub fn has_revert_buffer(&self) -> bool {
        self.buffer.is_some()
    }
}

impl DataManager for SessionParticipant {
    fn sort_key(&self) -> String {
        format!("session:{}", self.context_id)
    }

    fn abort(&mut self, _tx: &TxInfo) -> Result<()> {
        self.session.lock().revert()?;
        Ok(())
    }

    fn tpc_begin(&mut self, _tx: &TxInfo) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self, tx: &TxInfo) -> Result<()> {
        let mut session = self.session.lock();
        session.store()?;
        let committed = session.snapshot()?;
        self.buffer = Some(std::mem::replace(&mut self.baseline, committed));
        debug!(tx = %tx.id(), session_id = ?session.id(), "Session committed, revert buffer held");
        Ok(())
    }

    fn tpc_vote(&mut self, _tx: &TxInfo) -> Result<()> {
        Ok(())
    }

    fn tpc_finish(&mut self, _tx: &TxInfo) -> Result<()> {
        self.buffer = None;
        Ok(())
    }

    fn tpc_abort(&mut self, tx: &TxInfo) -> Result<()> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(());
        };
        let mut session = self.session.lock();
        session.clear()?;
        session.update(buffer.clone())?;
        self.baseline = buffer;
        if !session.commit_deferred() {
            session.store()?;
        }
        debug!(tx = %tx.id(), session_id = ?session.id(), "Session restored from revert buffer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;
    use crate::session::Session;
    use crate::testing::RecordingStore;
    use crate::txn::Transaction;
    use crate::txn::tests::Recorder;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn shared(store: &Arc<RecordingStore>) -> SharedSession {
        Session::create(Box::new(CacheBackend::new(store.clone(), false))).into_shared()
    }

    #[test]
    fn test_abort_after_commit_restores_prior_state() {
        let store = RecordingStore::new();
        let session = shared(&store);
        {
            let mut s = session.lock();
            s.set("keep", 1).unwrap();
            s.store().unwrap();
        }

        let participant = SessionParticipant::new(session.clone(), "ctx").unwrap();
        session.lock().set("a", 1).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tx = Transaction::new();
        tx.join(Box::new(participant));
        tx.join(Box::new(Recorder::new("zzz", &log).failing("vote")));
        assert!(tx.commit().is_err());

        let mut s = session.lock();
        assert!(!s.contains("a").unwrap());
        assert_eq!(s.get("keep").unwrap(), json!(1));
        assert!(!s.is_dirty());
        let id = s.id().unwrap().to_string();
        drop(s);

        let mut durable =
            Session::load(Box::new(CacheBackend::new(store.clone(), false)), Some(&id)).unwrap();
        assert!(!durable.contains("a").unwrap());
        assert_eq!(durable.get("keep").unwrap(), json!(1));
    }

    #[test]
    fn test_finish_drops_buffer() {
        let store = RecordingStore::new();
        let session = shared(&store);
        let mut participant = SessionParticipant::new(session.clone(), "ctx").unwrap();
        session.lock().set("a", 1).unwrap();

        let tx = TxInfo::new();
        participant.commit(&tx).unwrap();
        assert!(participant.has_revert_buffer());
        assert!(!session.lock().is_dirty());

        participant.tpc_finish(&tx).unwrap();
        assert!(!participant.has_revert_buffer());
        participant.tpc_abort(&tx).unwrap();
        assert_eq!(session.lock().get("a").unwrap(), json!(1));
    }

    #[test]
    fn test_abort_before_commit_reverts() {
        let store = RecordingStore::new();
        let session = shared(&store);
        let mut participant = SessionParticipant::new(session.clone(), "ctx").unwrap();
        session.lock().set("a", 1).unwrap();

        participant.abort(&TxInfo::new()).unwrap();
        assert!(!session.lock().is_dirty());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_sort_key_names_context() {
        let store = RecordingStore::new();
        let participant = SessionParticipant::new(shared(&store), "req-1").unwrap();
        assert_eq!(participant.sort_key(), "session:req-1");
    }
}
