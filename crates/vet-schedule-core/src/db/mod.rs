//! Database layer for vet-schedule.
//!
//! The store and registry traits are implemented for [`rusqlite::Connection`],
//! so the same calls work on a plain connection and inside a transaction
//! (a `Transaction` derefs to `Connection`).

mod schema;
mod appointments;
mod types;

pub use schema::*;
pub use appointments::*;
pub use types::*;

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

/// How long a writer waits for another connection's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction that takes the database lock up front.
    ///
    /// Count-then-insert sequences must run inside one of these so two
    /// writers cannot both pass a capacity check.
    pub fn immediate_transaction(&mut self) -> DbResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn time_to_sql(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn date_from_sql(s: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| DbError::Constraint(format!("Malformed date: {}", s)))
}

pub(crate) fn time_from_sql(s: &str) -> DbResult<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|_| DbError::Constraint(format!("Malformed time: {}", s)))
}
