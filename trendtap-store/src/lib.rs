//! Document persistence for ingested records.
//!
//! The ingestion loop only needs "insert one document into a named collection"
//! and a way to tell a write the store refused (recoverable, the record is
//! dropped) from a store that cannot be reached (fatal). [`DocumentCollection`]
//! is that seam; [`sqlite::SqliteCollection`] is the production backend, one
//! table per collection with each document kept as a JSON column.
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod sqlite;

pub use sqlite::{connect, SqliteCollection};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store accepted the request but rejected the write (constraint,
    /// trigger, validation). Safe to skip the document and carry on.
    #[error("store rejected the operation: {0}")]
    Operation(String),
    /// The store could not be reached or the connection is unusable.
    #[error("store connection failure: {0}")]
    Connection(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("invalid store configuration: {0}")]
    Config(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_operational(&self) -> bool {
        matches!(self, StoreError::Operation(_))
    }
}

// SQLite primary result codes (the low byte of an extended code).
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_READONLY: i32 = 8;
const SQLITE_IOERR: i32 = 10;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_TOOBIG: i32 = 18;
const SQLITE_CONSTRAINT: i32 = 19;
const SQLITE_MISMATCH: i32 = 20;
const SQLITE_NOTADB: i32 = 26;

/// Classify a database-reported failure by its SQLite result code.
///
/// Only rejections of the document itself are operational. Codes meaning the
/// database is unwritable, unreachable or damaged are connection failures;
/// anything unrecognised is a backend failure. Both of those abort the run.
fn from_database_code(code: Option<i32>, message: String) -> StoreError {
    match code.map(|c| c & 0xff) {
        Some(SQLITE_CONSTRAINT | SQLITE_MISMATCH | SQLITE_TOOBIG) => StoreError::Operation(message),
        Some(
            SQLITE_BUSY | SQLITE_LOCKED | SQLITE_READONLY | SQLITE_IOERR | SQLITE_CORRUPT
            | SQLITE_FULL | SQLITE_CANTOPEN | SQLITE_NOTADB,
        ) => StoreError::Connection(message),
        _ => StoreError::Backend(message),
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().and_then(|c| c.parse::<i32>().ok());
                from_database_code(code, db.to_string())
            }
            e @ (sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed) => StoreError::Connection(e.to_string()),
            sqlx::Error::Configuration(e) => StoreError::Config(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// A named collection accepting single-document inserts.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert one JSON object and return the generated document id.
    async fn insert_one(&self, document: &Value) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_operation_errors_are_operational() {
        assert!(StoreError::Operation("dup".into()).is_operational());
        assert!(!StoreError::Connection("gone".into()).is_operational());
        assert!(!StoreError::InvalidDocument("array".into()).is_operational());
    }

    #[test]
    fn pool_errors_map_to_connection() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn constraint_codes_are_operational() {
        // 275 = SQLITE_CONSTRAINT_CHECK, 1811 = SQLITE_CONSTRAINT_TRIGGER, 2067 = SQLITE_CONSTRAINT_UNIQUE
        for code in [19, 1811, 2067, 275, 18, 20] {
            let err = from_database_code(Some(code), format!("code {code}"));
            assert!(err.is_operational(), "code {code} gave {err:?}");
        }
    }

    #[test]
    fn unusable_database_codes_are_fatal() {
        // 264 = SQLITE_READONLY_RECOVERY, 266 = SQLITE_IOERR_READ, 517 = SQLITE_BUSY_SNAPSHOT
        for code in [5, 6, 8, 10, 11, 13, 14, 26, 264, 266, 517] {
            let err = from_database_code(Some(code), format!("code {code}"));
            assert!(
                matches!(err, StoreError::Connection(_)),
                "code {code} gave {err:?}"
            );
        }
    }

    #[test]
    fn unknown_or_missing_codes_are_backend_failures() {
        assert!(matches!(
            from_database_code(Some(1), "no such table".into()),
            StoreError::Backend(_)
        ));
        assert!(matches!(
            from_database_code(None, "?".into()),
            StoreError::Backend(_)
        ));
    }
}
