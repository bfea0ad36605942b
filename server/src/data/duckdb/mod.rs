//! DuckDB span store
//!
//! Owns the database file, its schema and the background maintenance tasks.
//! The write pipeline, the read pool and archival runs each work on their own
//! connection cloned from the primary one.

pub mod archive;
pub mod error;
mod migrations;
pub mod pool;
pub mod repositories;
pub mod schema;
pub mod writer;

pub use repositories::session as session_repository;
pub use repositories::span as span_repository;
pub use repositories::stats as stats_repository;

pub use archive::ArchiveOutcome;
pub use error::{DuckdbError, ReadError, WriteError};
pub use pool::{ReadLease, ReadPool};
pub use writer::WritePipeline;

use std::sync::Arc;
use std::time::Duration;

use duckdb::Connection;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{
    DUCKDB_CHECKPOINT_INTERVAL_SECS, DUCKDB_DB_FILENAME, DUCKDB_QUERY_TIMEOUT_SECS,
};
use crate::core::storage::{AppStorage, DataSubdir};

/// Statements run on every freshly opened database
const INIT_SQL: &str = "SET autoinstall_known_extensions = false;
     SET autoload_known_extensions = false;
     SET extension_directory = '';
     SET force_compression = 'auto';
     PRAGMA enable_checkpoint_on_shutdown;
     LOAD parquet;";

/// DuckDB span store
///
/// Keeps the primary connection behind a mutex. Other components clone it
/// through [`DuckdbService::connect`].
pub struct DuckdbService {
    conn: Mutex<Option<Connection>>,
}

impl Drop for DuckdbService {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            // Best-effort close - log but don't panic on error
            if let Err((_, e)) = conn.close() {
                tracing::warn!("DuckDB connection close failed during drop: {}", e);
            }
        }
    }
}

impl DuckdbService {
    /// Open (or create) the span store under the data directory
    pub async fn init(storage: &AppStorage) -> Result<Self, DuckdbError> {
        let db_path = storage.subdir(DataSubdir::Duckdb).join(DUCKDB_DB_FILENAME);
        let open_path = db_path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&open_path)?;
            conn.execute_batch(INIT_SQL)?;
            migrations::run_migrations(&conn)?;
            Ok::<_, DuckdbError>(conn)
        })
        .await
        .map_err(DuckdbError::join)??;

        tracing::debug!(path = %db_path.display(), "DuckdbService initialized");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Open an in-memory store with the full schema
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, DuckdbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(INIT_SQL)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Open a new connection to the same database
    pub fn connect(&self) -> Result<Connection, DuckdbError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(DuckdbError::Closed)?;
        Ok(conn.try_clone()?)
    }

    /// Run `f` against the primary connection
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DuckdbError>,
    ) -> Result<T, DuckdbError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(DuckdbError::Closed)?;
        f(conn)
    }

    /// Check if the connection is still open (test utility only)
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Run a blocking DuckDB query with timeout
    pub async fn run_query<T, F>(f: F) -> Result<T, DuckdbError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let timeout = Duration::from_secs(DUCKDB_QUERY_TIMEOUT_SECS);
        tokio::time::timeout(timeout, tokio::task::spawn_blocking(f))
            .await
            .map_err(|_| {
                tracing::warn!(
                    "DuckDB query timed out after {}s",
                    DUCKDB_QUERY_TIMEOUT_SECS
                );
                DuckdbError::Timeout {
                    timeout_secs: DUCKDB_QUERY_TIMEOUT_SECS,
                }
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "DuckDB query task failed");
                DuckdbError::join(e)
            })
    }

    /// Run a checkpoint to flush WAL to the main database file.
    ///
    /// Returns `Ok(())` if the connection is already closed (no-op).
    pub async fn checkpoint(self: &Arc<Self>) -> Result<(), DuckdbError> {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn_guard = db.conn.lock();
            if let Some(ref conn) = *conn_guard {
                conn.execute("CHECKPOINT", [])?;
                tracing::debug!("DuckDB checkpoint completed");
            }
            Ok(())
        })
        .await
        .map_err(DuckdbError::join)?
    }

    /// Close the primary connection.
    ///
    /// The database file stays open until every cloned connection (writer,
    /// read pool) has been dropped as well.
    pub async fn close(self: Arc<Self>) -> Result<(), DuckdbError> {
        tokio::task::spawn_blocking(move || {
            let mut conn_guard = self.conn.lock();
            if let Some(conn) = conn_guard.take() {
                // Best-effort checkpoint before close - log but don't fail on error
                if let Err(e) = conn.execute("CHECKPOINT", []) {
                    tracing::warn!("CHECKPOINT failed during close: {}", e);
                }
                conn.close().map_err(|(_, e)| DuckdbError::Database(e))?;
                tracing::debug!("DuckDB connection closed");
            }
            Ok(())
        })
        .await
        .map_err(DuckdbError::join)?
    }

    pub fn start_checkpoint_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(DUCKDB_CHECKPOINT_INTERVAL_SECS));
            // First tick fires immediately; nothing to flush yet
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("DuckDB checkpoint task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = db.checkpoint().await {
                            tracing::warn!("DuckDB checkpoint failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// Execute a function within a transaction, automatically rolling back on error.
pub(crate) fn in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, DuckdbError>
where
    F: FnOnce(&Connection) -> Result<T, DuckdbError>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(val) => {
            conn.execute_batch("COMMIT")?;
            Ok(val)
        }
        Err(e) => {
            // Best-effort rollback - log but return original error
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("ROLLBACK failed after transaction error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use duckdb::Connection;

    use crate::data::types::SpanRow;

    /// In-memory connection with the span schema applied
    pub fn open_test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory duckdb");
        super::migrations::run_migrations(&conn).expect("apply schema");
        conn
    }

    /// Minimal non-GenAI span lasting 10ns
    pub fn sample_row(trace_id: &str, span_id: &str, start: u64) -> SpanRow {
        SpanRow {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            name: "op".to_string(),
            start_time_unix_nano: start,
            end_time_unix_nano: start + 10,
            duration_ns: 10,
            service_name: "svc".to_string(),
            attributes_json: "{}".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, AppStorage) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = AppStorage::init_for_test(temp_dir.path().to_path_buf());
        (temp_dir, storage)
    }

    #[tokio::test]
    async fn test_service_init_applies_schema() {
        let (_temp_dir, storage) = create_test_storage();
        let service = DuckdbService::init(&storage)
            .await
            .expect("Init should succeed");

        let version: i32 = service
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT version FROM schema_version WHERE id = 1",
                    [],
                    |row| row.get(0),
                )?)
            })
            .expect("Should read schema version");
        assert_eq!(version, schema::SCHEMA_VERSION);
        assert!(
            storage
                .subdir(DataSubdir::Duckdb)
                .join(DUCKDB_DB_FILENAME)
                .exists()
        );
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let (_temp_dir, storage) = create_test_storage();
        {
            let service = Arc::new(DuckdbService::init(&storage).await.unwrap());
            let conn = service.connect().unwrap();
            span_repository::upsert_batch(&conn, &[test_support::sample_row("t1", "s1", 1)])
                .unwrap();
            drop(conn);
            service.close().await.unwrap();
        }

        let service = DuckdbService::init(&storage).await.unwrap();
        let spans = service
            .with_conn(|conn| span_repository::get_trace(conn, "t1"))
            .unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[tokio::test]
    async fn test_cloned_connection_sees_writes() {
        let service = DuckdbService::open_in_memory().unwrap();
        let writer = service.connect().unwrap();
        let reader = service.connect().unwrap();

        span_repository::upsert_batch(&writer, &[test_support::sample_row("t1", "s1", 1)])
            .unwrap();
        assert_eq!(span_repository::get_trace(&reader, "t1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_service_checkpoint() {
        let (_temp_dir, storage) = create_test_storage();
        let service = Arc::new(
            DuckdbService::init(&storage)
                .await
                .expect("Init should succeed"),
        );

        let result = service.checkpoint().await;
        assert!(result.is_ok(), "Checkpoint should succeed");
    }

    #[tokio::test]
    async fn test_service_close() {
        let (_temp_dir, storage) = create_test_storage();
        let service = Arc::new(
            DuckdbService::init(&storage)
                .await
                .expect("Init should succeed"),
        );
        let handle = Arc::clone(&service);

        assert!(service.is_open());
        service.close().await.expect("Close should succeed");
        assert!(!handle.is_open());
        assert!(matches!(handle.connect(), Err(DuckdbError::Closed)));
    }

    #[tokio::test]
    async fn test_checkpoint_after_close_is_noop() {
        let (_temp_dir, storage) = create_test_storage();
        let service = Arc::new(
            DuckdbService::init(&storage)
                .await
                .expect("Init should succeed"),
        );

        // Clone before close since close consumes Arc
        let service_for_checkpoint = Arc::clone(&service);

        service.close().await.expect("Close should succeed");

        let result = service_for_checkpoint.checkpoint().await;
        assert!(
            result.is_ok(),
            "Checkpoint after close should succeed as no-op"
        );
    }

    #[tokio::test]
    async fn test_checkpoint_task_stops_on_shutdown() {
        let service = Arc::new(DuckdbService::open_in_memory().unwrap());
        let (tx, rx) = watch::channel(false);
        let handle = service.start_checkpoint_task(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop")
            .unwrap();
    }

    #[test]
    fn test_in_transaction_rolls_back_on_error() {
        let conn = test_support::open_test_db();
        let result: Result<(), DuckdbError> = in_transaction(&conn, |conn| {
            span_repository::upsert_rows(conn, &[test_support::sample_row("t1", "s1", 1)])?;
            Err(DuckdbError::Closed)
        });
        assert!(result.is_err());
        assert!(span_repository::get_trace(&conn, "t1").unwrap().is_empty());
    }
}
