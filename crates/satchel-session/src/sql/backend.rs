//! Session backend over a relational table.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::row::SessionRow;
use super::schema::{self, PAYLOAD_COLUMN};
use super::unit_of_work::UnitOfWork;
use crate::error::Result;
use crate::session::{Identity, SessionBackend};

/// Stores one session per row: declared keys in their own columns, all
/// other keys in the JSON payload.
pub struct RelationalBackend {
    uow: Arc<UnitOfWork>,
    row: Option<SessionRow>,
}

impl RelationalBackend {
    pub fn new(uow: Arc<UnitOfWork>) -> Self {
        Self { uow, row: None }
    }

    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.uow
    }

    /// The row image, fetched by its durable identity on first access or
    /// created when none is stored.
    fn row(&mut self, ident: Identity<'_>) -> Result<&mut SessionRow> {
        if self.row.is_none() {
            let fetched = if ident.persisted {
                self.uow.fetch(ident.durable_key())?
            } else {
                None
            };
            let row = match fetched {
                Some(row) => {
                    trace!(session_id = %row.uuid(), "Fetched session row");
                    row
                }
                None => SessionRow::new(ident.id),
            };
            self.row = Some(row);
        }
        Ok(self.row.get_or_insert_with(|| SessionRow::new(ident.id)))
    }
}

impl SessionBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn id_is_valid(&mut self, id: &str) -> Result<bool> {
        self.uow.exists(id)
    }

    fn contains(&mut self, ident: Identity<'_>, key: &str) -> Result<bool> {
        if self.uow.schema().is_column(key) {
            return Ok(true);
        }
        Ok(self.row(ident)?.data().contains_key(key))
    }

    fn get(&mut self, ident: Identity<'_>, key: &str) -> Result<Option<Value>> {
        let is_column = self.uow.schema().is_column(key);
        let row = self.row(ident)?;
        if is_column {
            return Ok(Some(row.column(key)));
        }
        Ok(row.data().get(key).cloned())
    }

    fn set(&mut self, ident: Identity<'_>, key: &str, value: Value) -> Result<()> {
        if let Some(decl) = self.uow.schema().column(key) {
            schema::to_column(decl, &value)?;
            self.row(ident)?.set_column(key, value);
        } else {
            self.row(ident)?.data_mut().insert(key.to_string(), value);
        }
        Ok(())
    }

    fn delete(&mut self, ident: Identity<'_>, key: &str) -> Result<bool> {
        let is_column = self.uow.schema().is_column(key);
        let row = self.row(ident)?;
        if !is_column {
            return Ok(row.data_mut().remove(key).is_some());
        }
        if row.column(key).is_null() {
            return Ok(false);
        }
        row.set_column(key, Value::Null);
        Ok(true)
    }

    fn keys(&mut self, ident: Identity<'_>) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .uow
            .schema()
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        keys.extend(self.row(ident)?.data().keys().cloned());
        Ok(keys)
    }

    fn store(&mut self, ident: Identity<'_>) -> Result<()> {
        let uow = self.uow.clone();
        let row = self.row(ident)?;
        row.set_uuid(ident.id);
        row.flag_modified(PAYLOAD_COLUMN);
        uow.add(row);
        if !uow.is_managed() {
            uow.commit()?;
            row.mark_flushed();
        }
        Ok(())
    }

    /// Drops the row image so the next access re-reads it. A managed unit
    /// of work keeps its staged rows; the managing transaction rolls them back.
    fn revert(&mut self) -> Result<()> {
        if self.uow.is_managed() {
            debug!("Row image dropped, rollback left to the managing transaction");
        } else {
            self.uow.rollback()?;
        }
        self.row = None;
        Ok(())
    }

    fn commit_deferred(&self) -> bool {
        self.uow.is_managed()
    }
}
