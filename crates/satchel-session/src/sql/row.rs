//! In-memory image of one session row.

use std::collections::{HashMap, HashSet};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use serde_json::Value;
use tracing::trace;

use super::schema::{self, IDENTITY_COLUMN, PAYLOAD_COLUMN, TableSchema};
use crate::error::Result;
use crate::session::SessionData;

/// One session row: identity, first-class column values, and JSON payload.
///
/// Change tracking only sees column assignments made through
/// [`set_column`](Self::set_column). Edits made through
/// [`data_mut`](Self::data_mut) are invisible until
/// [`flag_modified`](Self::flag_modified) names the payload column.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    uuid: String,
    stored_uuid: Option<String>,
    columns: HashMap<String, Value>,
    data: SessionData,
    modified: HashSet<String>,
}

impl SessionRow {
    /// A row that does not exist in the table yet.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            stored_uuid: None,
            columns: HashMap::new(),
            data: SessionData::new(),
            modified: HashSet::new(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Identity under which this row currently lives in the table.
    pub fn stored_uuid(&self) -> Option<&str> {
        self.stored_uuid.as_deref()
    }

    pub fn set_uuid(&mut self, uuid: &str) {
        if self.uuid != uuid {
            self.uuid = uuid.to_string();
            self.modified.insert(IDENTITY_COLUMN.to_string());
        }
    }

    /// Value of a first-class column; unset columns read as null.
    pub fn column(&self, name: &str) -> Value {
        self.columns.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn set_column(&mut self, name: &str, value: Value) {
        self.columns.insert(name.to_string(), value);
        self.modified.insert(name.to_string());
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// Mutable payload. Changes are not tracked.
    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    /// Mark `column` as changed so the next flush writes it.
    pub fn flag_modified(&mut self, column: &str) {
        self.modified.insert(column.to_string());
    }

    pub fn is_modified(&self, column: &str) -> bool {
        self.modified.contains(column)
    }

    /// Record that the row image now matches the table.
    pub(crate) fn mark_flushed(&mut self) {
        self.stored_uuid = Some(self.uuid.clone());
        self.modified.clear();
    }

    /// Identity used to match staged copies of this row.
    pub(crate) fn staging_key(&self) -> &str {
        self.stored_uuid.as_deref().unwrap_or(&self.uuid)
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub(crate) fn read(conn: &Connection, schema: &TableSchema, uuid: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&schema.select_sql())?;
        let raw = stmt
            .query_row([uuid], |row| {
                let payload: String = row.get(0)?;
                let mut values = Vec::with_capacity(schema.columns().len());
                for idx in 0..schema.columns().len() {
                    values.push(row.get::<_, SqlValue>(idx + 1)?);
                }
                Ok((payload, values))
            })
            .optional()?;

        let Some((payload, values)) = raw else {
            return Ok(None);
        };

        let mut data: SessionData = serde_json::from_str(&payload)?;
        data.retain(|key, _| !schema.is_column(key));

        let mut columns = HashMap::new();
        for (decl, value) in schema.columns().iter().zip(values.iter()) {
            columns.insert(decl.name.clone(), schema::from_column(decl, value.into())?);
        }

        Ok(Some(Self {
            uuid: uuid.to_string(),
            stored_uuid: Some(uuid.to_string()),
            columns,
            data,
            modified: HashSet::new(),
        }))
    }

    /// Write this row inside the connection's current transaction.
    pub(crate) fn write(&self, conn: &Connection, schema: &TableSchema) -> Result<()> {
        let payload = serde_json::to_string(&self.data)?;
        let mut values = Vec::with_capacity(schema.columns().len());
        for decl in schema.columns() {
            values.push(schema::to_column(decl, &self.column(&decl.name))?);
        }

        if let Some(stored) = self.stored_uuid.as_deref()
            && stored != self.uuid
        {
            let mut sql = format!(
                "UPDATE \"{}\" SET {IDENTITY_COLUMN} = ?1, {PAYLOAD_COLUMN} = ?2",
                schema.table()
            );
            for (idx, decl) in schema.columns().iter().enumerate() {
                sql.push_str(&format!(", \"{}\" = ?{}", decl.name, idx + 3));
            }
            sql.push_str(&format!(
                " WHERE {IDENTITY_COLUMN} = ?{}",
                schema.columns().len() + 3
            ));

            let mut params = vec![SqlValue::Text(self.uuid.clone()), SqlValue::Text(payload.clone())];
            params.extend(values.iter().cloned());
            params.push(SqlValue::Text(stored.to_string()));

            if conn.execute(&sql, params_from_iter(params))? > 0 {
                trace!(session_id = %self.uuid, previous = %stored, "Renamed session row");
                return Ok(());
            }
        }

        let mut names = vec![IDENTITY_COLUMN.to_string(), PAYLOAD_COLUMN.to_string()];
        names.extend(schema.columns().iter().map(|c| format!("\"{}\"", c.name)));
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();

        let mut updates = Vec::new();
        if self.is_modified(PAYLOAD_COLUMN) {
            updates.push(format!("{PAYLOAD_COLUMN} = excluded.{PAYLOAD_COLUMN}"));
        }
        for decl in schema.columns() {
            if self.is_modified(&decl.name) {
                updates.push(format!("\"{0}\" = excluded.\"{0}\"", decl.name));
            }
        }
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) ON CONFLICT({IDENTITY_COLUMN}) {on_conflict}",
            schema.table(),
            names.join(", "),
            placeholders.join(", "),
        );

        let mut params = vec![SqlValue::Text(self.uuid.clone()), SqlValue::Text(payload)];
        params.extend(values);
        conn.execute(&sql, params_from_iter(params))?;
        trace!(session_id = %self.uuid, "Wrote session row");
        Ok(())
    }
}
