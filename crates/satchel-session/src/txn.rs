//! A minimal two-phase-commit transaction.
//!
//! Participants implement [`DataManager`] and join a [`Transaction`]. On
//! commit they are driven in `sort_key` order through `tpc_begin`, `commit`,
//! `tpc_vote`, and `tpc_finish`. A failure in any phase before finish aborts
//! every participant with `tpc_abort`.

use std::fmt;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identity of the transaction a participant is being driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo {
    id: Uuid,
}

impl TxInfo {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for TxInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// A voting member of a two-phase-commit transaction.
pub trait DataManager: Send {
    /// Participants are committed in ascending order of this key.
    fn sort_key(&self) -> String;

    /// The transaction was abandoned before commit started.
    fn abort(&mut self, tx: &TxInfo) -> Result<()>;

    fn tpc_begin(&mut self, tx: &TxInfo) -> Result<()>;

    /// Perform the work of the transaction, keeping it undoable.
    fn commit(&mut self, tx: &TxInfo) -> Result<()>;

    /// Last chance to refuse the commit.
    fn tpc_vote(&mut self, tx: &TxInfo) -> Result<()>;

    /// Make the work durable. Must not fail in practice.
    fn tpc_finish(&mut self, tx: &TxInfo) -> Result<()>;

    /// Undo the work done since `tpc_begin`.
    fn tpc_abort(&mut self, tx: &TxInfo) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Begin,
    Commit,
    Vote,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Begin => write!(f, "tpc_begin"),
            Phase::Commit => write!(f, "commit"),
            Phase::Vote => write!(f, "tpc_vote"),
        }
    }
}

/// A set of participants committed or aborted together.
pub struct Transaction {
    info: TxInfo,
    participants: Vec<Box<dyn DataManager>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            info: TxInfo::new(),
            participants: Vec::new(),
        }
    }

    pub fn info(&self) -> &TxInfo {
        &self.info
    }

    pub fn join(&mut self, participant: Box<dyn DataManager>) {
        debug!(tx = %self.info.id, participant = %participant.sort_key(), "Participant joined");
        self.participants.push(participant);
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Run the two-phase commit over every participant.
    pub fn commit(mut self) -> Result<()> {
        self.participants.sort_by_key(|p| p.sort_key());
        let tx = self.info;

        let mut failure = None;
        'phases: for phase in [Phase::Begin, Phase::Commit, Phase::Vote] {
            for participant in self.participants.iter_mut() {
                let outcome = match phase {
                    Phase::Begin => participant.tpc_begin(&tx),
                    Phase::Commit => participant.commit(&tx),
                    Phase::Vote => participant.tpc_vote(&tx),
                };
                if let Err(e) = outcome {
                    warn!(
                        tx = %tx.id,
                        participant = %participant.sort_key(),
                        phase = %phase,
                        error = %e,
                        "Participant failed, aborting transaction"
                    );
                    failure = Some(format!("{phase} failed for {}: {e}", participant.sort_key()));
                    break 'phases;
                }
            }
        }
        if let Some(reason) = failure {
            self.tpc_abort_all();
            return Err(Error::Transaction(reason));
        }

        for participant in self.participants.iter_mut() {
            if let Err(e) = participant.tpc_finish(&tx) {
                error!(
                    tx = %tx.id,
                    participant = %participant.sort_key(),
                    error = %e,
                    "tpc_finish failed after a successful vote"
                );
            }
        }
        debug!(tx = %tx.id, participants = self.participants.len(), "Transaction committed");
        Ok(())
    }

    /// Abandon the transaction before commit.
    pub fn abort(mut self) -> Result<()> {
        let tx = self.info;
        let mut first_error = None;
        for participant in self.participants.iter_mut() {
            if let Err(e) = participant.abort(&tx) {
                error!(
                    tx = %tx.id,
                    participant = %participant.sort_key(),
                    error = %e,
                    "Participant abort failed"
                );
                first_error.get_or_insert(e);
            }
        }
        debug!(tx = %tx.id, "Transaction aborted");
        match first_error {
            Some(e) => Err(Error::Transaction(format!("abort failed: {e}"))),
            None => Ok(()),
        }
    }

    fn tpc_abort_all(&mut self) {
        let tx = self.info;
        for participant in self.participants.iter_mut() {
            if let Err(e) = participant.tpc_abort(&tx) {
                error!(
                    tx = %tx.id,
                    participant = %participant.sort_key(),
                    error = %e,
                    "tpc_abort failed"
                );
            }
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.info.id)
            .field("participants", &self.participants.len())
            .finish()
    }
}
