#![forbid(unsafe_code)]

use std::time::Duration;

pub const DEFAULT_DB_FILE_NAME: &str = "groboversion.db";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Knobs for opening a file-backed store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_file_name: String,
    /// How long a writer waits on the database lock before the operation
    /// fails with a storage error.
    pub busy_timeout: Duration,
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal: true,
        }
    }
}

impl StoreConfig {
    pub fn with_db_file_name(mut self, name: impl Into<String>) -> Self {
        self.db_file_name = name.into();
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}
