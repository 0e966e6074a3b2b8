//! Relational session storage on SQLite.
//!
//! Each session is one row of a table with an identity column (`_uuid`), a
//! JSON payload column (`_data`), and any number of declared first-class
//! columns. Keys naming a declared column are stored in that column; every
//! other key lives in the payload.
//!
//! Writes are staged in a [`UnitOfWork`]. An unmanaged unit of work commits
//! on every `store`; a managed one is committed or rolled back by the
//! two-phase-commit [`Transaction`](crate::Transaction) it joins.

mod backend;
mod row;
mod schema;
mod unit_of_work;

pub use backend::RelationalBackend;
pub use row::SessionRow;
pub use schema::{IDENTITY_COLUMN, PAYLOAD_COLUMN, TableSchema};
pub use unit_of_work::{SqlStore, UnitOfWork, UnitOfWorkParticipant};
