//! DuckDB layer errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuckdbError {
    #[error("DuckDB error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("DuckDB connection is closed")]
    Closed,
}

impl DuckdbError {
    /// Wrap a failed `spawn_blocking` join
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(e))
    }
}

/// Errors returned by the write pipeline
#[derive(Error, Debug)]
pub enum WriteError {
    /// The pipeline has been shut down; nothing was queued
    #[error("write pipeline is shut down")]
    ShutDown,

    /// The caller cancelled before the batch was queued
    #[error("write cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] DuckdbError),
}

/// Errors returned by the read path
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("read pool is shut down")]
    ShutDown,

    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] DuckdbError),
}

impl From<duckdb::Error> for ReadError {
    fn from(e: duckdb::Error) -> Self {
        Self::Store(DuckdbError::Database(e))
    }
}
