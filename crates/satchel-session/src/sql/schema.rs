//! Table layout of the relational session store.

use std::collections::HashSet;

use rusqlite::types::{Value as SqlValue, ValueRef};
use satchel_config::{ColumnDecl, ColumnKind, SqlSection};
use serde_json::Value;

use crate::error::{Error, Result};

/// Column holding the session identity.
pub const IDENTITY_COLUMN: &str = "_uuid";

/// Column holding the JSON payload of all non-column keys.
pub const PAYLOAD_COLUMN: &str = "_data";

/// Validated table layout: identity, payload, and declared first-class columns.
///
/// The set of first-class names is resolved once here; session keys matching
/// one of them are stored in that column instead of the payload.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    columns: Vec<ColumnDecl>,
    names: HashSet<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDecl>) -> Result<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(Error::InvalidConfiguration(format!(
                "invalid session table name '{table}'"
            )));
        }

        let mut names = HashSet::new();
        for column in &columns {
            if column.name == IDENTITY_COLUMN || column.name == PAYLOAD_COLUMN {
                return Err(Error::InvalidConfiguration(format!(
                    "column name '{}' is reserved",
                    column.name
                )));
            }
            if !is_identifier(&column.name) {
                return Err(Error::InvalidConfiguration(format!(
                    "invalid column name '{}'",
                    column.name
                )));
            }
            if !names.insert(column.name.clone()) {
                return Err(Error::InvalidConfiguration(format!(
                    "column '{}' declared twice",
                    column.name
                )));
            }
        }

        Ok(Self {
            table,
            columns,
            names,
        })
    }

    /// Build from the `[session.sql]` config section.
    pub fn from_section(section: &SqlSection) -> Result<Self> {
        Self::new(section.table.clone(), section.columns.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// First-class columns in declaration order.
    pub fn columns(&self) -> &[ColumnDecl] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDecl> {
        if !self.names.contains(name) {
            return None;
        }
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_column(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub(crate) fn create_table_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {IDENTITY_COLUMN} TEXT NOT NULL UNIQUE,\n    {PAYLOAD_COLUMN} TEXT NOT NULL",
            self.table
        );
        for column in &self.columns {
            sql.push_str(&format!(",\n    \"{}\" {}", column.name, column.kind.sql_type()));
        }
        sql.push_str("\n)");
        sql
    }

    /// `SELECT` of the payload and every column, keyed by identity.
    pub(crate) fn select_sql(&self) -> String {
        let mut sql = format!("SELECT {PAYLOAD_COLUMN}");
        for column in &self.columns {
            sql.push_str(&format!(", \"{}\"", column.name));
        }
        sql.push_str(&format!(
            " FROM \"{}\" WHERE {IDENTITY_COLUMN} = ?1",
            self.table
        ));
        sql
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─────────────────────────────────────────────────────────────────────────────
// Value conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a session value into the storage form of a column.
pub(crate) fn to_column(column: &ColumnDecl, value: &Value) -> Result<SqlValue> {
    let mismatch = |expected| Error::TypeMismatch {
        column: column.name.clone(),
        expected,
    };

    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match column.kind {
        ColumnKind::Text => value
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .ok_or_else(|| mismatch("text")),
        ColumnKind::Integer => value
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| mismatch("integer")),
        ColumnKind::Real => value
            .as_f64()
            .map(SqlValue::Real)
            .ok_or_else(|| mismatch("real")),
        ColumnKind::Boolean => value
            .as_bool()
            .map(|b| SqlValue::Integer(i64::from(b)))
            .ok_or_else(|| mismatch("boolean")),
        ColumnKind::Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
    }
}

/// Convert a stored column value back into a session value.
pub(crate) fn from_column(column: &ColumnDecl, raw: ValueRef<'_>) -> Result<Value> {
    let value = match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match column.kind {
            ColumnKind::Boolean => Value::Bool(i != 0),
            ColumnKind::Real => serde_json::Number::from_f64(i as f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            _ => Value::from(i),
        },
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match column.kind {
                ColumnKind::Json => serde_json::from_str(&text)?,
                _ => Value::String(text.into_owned()),
            }
        }
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::new(
            "sessions",
            vec![
                ColumnDecl::new("user_id", ColumnKind::Integer),
                ColumnDecl::new("locale", ColumnKind::Text),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_resolves_first_class_columns() {
        let schema = schema();
        assert!(schema.is_column("user_id"));
        assert!(schema.is_column("locale"));
        assert!(!schema.is_column("cart"));
        assert!(!schema.is_column(IDENTITY_COLUMN));
        assert_eq!(schema.column("locale").unwrap().kind, ColumnKind::Text);
    }

    #[test]
    fn test_rejects_reserved_names() {
        let err = TableSchema::new("sessions", vec![ColumnDecl::new("_data", ColumnKind::Text)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rejects_duplicate_and_malformed_names() {
        let dup = vec![
            ColumnDecl::new("a", ColumnKind::Text),
            ColumnDecl::new("a", ColumnKind::Integer),
        ];
        assert!(TableSchema::new("sessions", dup).is_err());
        assert!(TableSchema::new("sessions", vec![ColumnDecl::new("a b", ColumnKind::Text)]).is_err());
        assert!(TableSchema::new("drop table", Vec::new()).is_err());
    }

    #[test]
    fn test_create_table_sql_lists_columns() {
        let sql = schema().create_table_sql();
        assert!(sql.contains("_uuid TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("_data TEXT NOT NULL"));
        assert!(sql.contains("\"user_id\" INTEGER"));
        assert!(sql.contains("\"locale\" TEXT"));
    }

    #[test]
    fn test_typed_conversion() {
        let int = ColumnDecl::new("n", ColumnKind::Integer);
        assert_eq!(to_column(&int, &json!(5)).unwrap(), SqlValue::Integer(5));
        assert_eq!(to_column(&int, &Value::Null).unwrap(), SqlValue::Null);
        assert!(matches!(
            to_column(&int, &json!("five")),
            Err(Error::TypeMismatch { expected: "integer", .. })
        ));

        let flag = ColumnDecl::new("f", ColumnKind::Boolean);
        assert_eq!(to_column(&flag, &json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(from_column(&flag, ValueRef::Integer(0)).unwrap(), json!(false));

        let doc = ColumnDecl::new("d", ColumnKind::Json);
        let stored = to_column(&doc, &json!({"a": [1]})).unwrap();
        let SqlValue::Text(text) = stored else {
            panic!("json column should store text");
        };
        assert_eq!(
            from_column(&doc, ValueRef::Text(text.as_bytes())).unwrap(),
            json!({"a": [1]})
        );
    }
}
