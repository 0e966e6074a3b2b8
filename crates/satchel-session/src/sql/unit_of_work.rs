//! SQLite-backed session table and the unit of work that stages its rows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use satchel_config::SqlSection;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::row::SessionRow;
use super::schema::{IDENTITY_COLUMN, TableSchema};
use crate::error::{Error, Result};
use crate::txn::{DataManager, TxInfo};

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// A session table in a SQLite database file.
///
/// Every [`UnitOfWork`] opens its own connection; the file uses WAL mode so
/// readers are not blocked by a writer.
#[derive(Debug, Clone)]
pub struct SqlStore {
    path: PathBuf,
    schema: Arc<TableSchema>,
}

impl SqlStore {
    /// Open (or create) the database at `path` and create the table.
    pub fn open(path: impl AsRef<Path>, schema: TableSchema) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|_| Error::Database(rusqlite::Error::InvalidPath(path.to_path_buf())))?;
        }

        let store = Self {
            path: path.to_path_buf(),
            schema: Arc::new(schema),
        };
        let conn = store.connect()?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(&store.schema.create_table_sql())?;

        info!(path = %path.display(), table = store.schema.table(), "Session store opened");
        Ok(store)
    }

    /// Open the store described by a `[session.sql]` section.
    pub fn from_section(section: &SqlSection) -> Result<Self> {
        Self::open(&section.path, TableSchema::from_section(section)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Start a unit of work on a fresh connection.
    ///
    /// A managed unit of work is committed or rolled back only by the
    /// transaction it joins through [`UnitOfWork::participant`].
    pub fn unit_of_work(&self, managed: bool) -> Result<Arc<UnitOfWork>> {
        Ok(Arc::new(UnitOfWork {
            id: Uuid::new_v4(),
            schema: self.schema.clone(),
            managed,
            state: Mutex::new(UowState {
                conn: self.connect()?,
                staged: Vec::new(),
                tx_open: false,
            }),
        }))
    }

    /// Load one row outside any unit of work.
    pub fn fetch(&self, id: &str) -> Result<Option<SessionRow>> {
        SessionRow::read(&self.connect()?, &self.schema, id)
    }

    /// Every stored identity, in insertion order.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMN} FROM \"{}\" ORDER BY rowid",
            self.schema.table()
        ))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

struct UowState {
    conn: Connection,
    staged: Vec<SessionRow>,
    tx_open: bool,
}

impl UowState {
    fn begin(&mut self) -> Result<()> {
        if !self.tx_open {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.tx_open = true;
        }
        Ok(())
    }

    fn flush(&mut self, schema: &TableSchema) -> Result<usize> {
        let rows = std::mem::take(&mut self.staged);
        for row in &rows {
            row.write(&self.conn, schema)?;
        }
        Ok(rows.len())
    }

    fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        if self.tx_open {
            self.tx_open = false;
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

/// Staged session rows awaiting a commit on one connection.
pub struct UnitOfWork {
    id: Uuid,
    schema: Arc<TableSchema>,
    managed: bool,
    state: Mutex<UowState>,
}

impl UnitOfWork {
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Whether an external transaction owns commit and rollback.
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    /// Whether a row with identity `id` is staged or stored.
    pub fn exists(&self, id: &str) -> Result<bool> {
        let state = self.state.lock();
        if state.staged.iter().any(|row| row.uuid() == id) {
            return Ok(true);
        }
        let found = state
            .conn
            .query_row(
                &format!(
                    "SELECT 1 FROM \"{}\" WHERE {IDENTITY_COLUMN} = ?1",
                    self.schema.table()
                ),
                [id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The row with identity `id`, preferring a staged copy.
    pub fn fetch(&self, id: &str) -> Result<Option<SessionRow>> {
        let state = self.state.lock();
        if let Some(row) = state.staged.iter().find(|row| row.uuid() == id) {
            return Ok(Some(row.clone()));
        }
        SessionRow::read(&state.conn, &self.schema, id)
    }

    /// Stage a copy of `row`, replacing an earlier staged copy of it.
    pub fn add(&self, row: &SessionRow) {
        let mut state = self.state.lock();
        let key = row.staging_key();
        state.staged.retain(|staged| staged.staging_key() != key);
        state.staged.push(row.clone());
        trace!(session_id = %row.uuid(), staged = state.staged.len(), "Staged session row");
    }

    /// Write every staged row in one transaction.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.begin()?;
        let written = match state.flush(&self.schema) {
            Ok(n) => n,
            Err(e) => {
                if let Err(rollback) = state.rollback() {
                    warn!(error = %rollback, "Rollback after failed flush also failed");
                }
                return Err(e);
            }
        };
        if let Err(e) = state.conn.execute_batch("COMMIT") {
            if let Err(rollback) = state.rollback() {
                warn!(error = %rollback, "Rollback after failed commit also failed");
            }
            return Err(e.into());
        }
        state.tx_open = false;
        debug!(rows = written, "Committed session rows");
        Ok(())
    }

    /// Discard staged rows and any open transaction.
    pub fn rollback(&self) -> Result<()> {
        self.state.lock().rollback()
    }

    /// Join an external transaction as a data manager.
    pub fn participant(self: &Arc<Self>) -> UnitOfWorkParticipant {
        UnitOfWorkParticipant { uow: self.clone() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Participant
// ─────────────────────────────────────────────────────────────────────────────

/// Drives a managed [`UnitOfWork`] through the two-phase-commit protocol.
///
/// Rows are written during the commit phase inside an open SQLite
/// transaction, made durable at `tpc_finish`, and rolled back on abort.
pub struct UnitOfWorkParticipant {
    uow: Arc<UnitOfWork>,
}

impl DataManager for UnitOfWorkParticipant {
    /// Sorts after `session:` keys, so rows staged by session participants
    /// are written in the same transaction.
    fn sort_key(&self) -> String {
        format!("sql:{}:{}", self.uow.schema.table(), self.uow.id)
    }

    fn abort(&mut self, _tx: &TxInfo) -> Result<()> {
        self.uow.rollback()
    }

    fn tpc_begin(&mut self, _tx: &TxInfo) -> Result<()> {
        self.uow.state.lock().begin()
    }

    fn commit(&mut self, tx: &TxInfo) -> Result<()> {
        let mut state = self.uow.state.lock();
        state.begin()?;
        let written = state.flush(&self.uow.schema)?;
        trace!(tx = %tx.id(), rows = written, "Wrote staged session rows");
        Ok(())
    }

    fn tpc_vote(&mut self, _tx: &TxInfo) -> Result<()> {
        if self.uow.state.lock().tx_open {
            Ok(())
        } else {
            Err(Error::Transaction(
                "unit of work has no open transaction".to_string(),
            ))
        }
    }

    fn tpc_finish(&mut self, tx: &TxInfo) -> Result<()> {
        let mut state = self.uow.state.lock();
        if state.tx_open {
            state.conn.execute_batch("COMMIT")?;
            state.tx_open = false;
        }
        state.staged.clear();
        debug!(tx = %tx.id(), "Unit of work committed");
        Ok(())
    }

    fn tpc_abort(&mut self, tx: &TxInfo) -> Result<()> {
        debug!(tx = %tx.id(), "Unit of work rolled back");
        self.uow.rollback()
    }
}
