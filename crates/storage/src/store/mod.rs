#![forbid(unsafe_code)]

mod branches;
mod config;
mod error;
mod pending;
mod query;
mod quips;
mod requests;
mod revision;
mod support;
mod tags;

pub use config::{DEFAULT_BUSY_TIMEOUT, DEFAULT_DB_FILE_NAME, StoreConfig};
pub use error::StoreError;
pub use requests::*;
pub use tags::TagSubject;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};

/// Handle over one SQLite connection.
///
/// The engine keeps no state between calls besides the connection itself, so
/// concurrent units of work each open their own `SqliteStore` against the same
/// database file and coordinate purely through transactions and uniqueness
/// constraints.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(storage_dir, StoreConfig::default())
    }

    pub fn open_with_config(
        storage_dir: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(&config.db_file_name);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if config.wal {
            let mode: String =
                conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            tracing::debug!(path = %db_path.display(), journal_mode = %mode, "opened store");
        }

        support::schema::preflight_gate(&conn)?;
        support::schema::install_schema(&conn)?;

        Ok(Self {
            conn,
            storage_dir: Some(storage_dir),
        })
    }

    /// Private in-memory database; visible to this handle only.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        support::schema::install_schema(&conn)?;
        Ok(Self {
            conn,
            storage_dir: None,
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Write transactions take the database write lock up front so that two
    /// writers serialize on `busy_timeout` instead of failing a lock upgrade.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

fn is_uniqueness_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                && (code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || message.as_deref().is_some_and(|value| {
                        value.contains("UNIQUE constraint failed")
                            || value.contains("PRIMARY KEY constraint failed")
                    }))
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Validation("numeric overflow"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
