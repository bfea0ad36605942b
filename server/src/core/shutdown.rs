//! Centralized shutdown management

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::constants::SHUTDOWN_TIMEOUT_SECS;
use crate::data::{DuckdbService, ReadPool, WritePipeline};

/// Centralized shutdown service for coordinating graceful shutdown
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    writer: Arc<WritePipeline>,
    pool: Arc<ReadPool>,
    duckdb: Arc<DuckdbService>,
}

impl ShutdownService {
    pub fn new(
        writer: Arc<WritePipeline>,
        pool: Arc<ReadPool>,
        duckdb: Arc<DuckdbService>,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            handles: Arc::new(Mutex::new(Vec::new())),
            writer,
            pool,
            duckdb,
        }
    }

    /// Register a background task handle to be awaited during shutdown
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().await.push(handle);
    }

    /// Subscribe to shutdown signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Trigger shutdown and wait for all registered tasks to complete
    ///
    /// Shutdown order (to prevent data loss):
    /// 1. Signal listeners and background tasks to stop
    /// 2. Wait for background tasks (gRPC listener, archival, checkpoints)
    /// 3. Drain the write queue; later writes fail with `ShutDown`
    /// 4. Close the read pool; later reads fail with `ShutDown`
    /// 5. Checkpoint and close the database
    pub async fn shutdown(&self) {
        tracing::debug!("Initiating graceful shutdown...");
        self.trigger();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let task_count = handles.len();
        tracing::debug!(
            count = task_count,
            "Waiting for background tasks to finish..."
        );

        let timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(_) => {
                tracing::debug!("All background tasks completed");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Timeout waiting for background tasks"
                );
            }
        }

        self.writer.shutdown().await;
        self.pool.close();

        tracing::debug!("Closing database connection...");
        if let Err(e) = self.duckdb.checkpoint().await {
            tracing::warn!("DuckDB checkpoint failed: {}", e);
        }
        if let Err(e) = Arc::clone(&self.duckdb).close().await {
            tracing::warn!("DuckDB close failed: {}", e);
        }

        tracing::debug!("Shutdown complete");
    }

    /// Wait for shutdown signal (for use with axum graceful shutdown)
    /// Returns an owned future that can be passed to graceful_shutdown
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let _ = rx.wait_for(|&v| v).await;
        }
    }

    /// Install OS signal handlers and auto-trigger on Ctrl+C/SIGTERM
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::debug!("Received Ctrl+C, shutting down"),
                _ = terminate => tracing::debug!("Received SIGTERM, shutting down"),
            }

            service.trigger();
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::data::duckdb::{ReadError, WriteError};
    use crate::data::duckdb::test_support::sample_row;

    struct Parts {
        shutdown: ShutdownService,
        writer: Arc<WritePipeline>,
        pool: Arc<ReadPool>,
        duckdb: Arc<DuckdbService>,
    }

    fn make_shutdown() -> Parts {
        let duckdb = Arc::new(DuckdbService::open_in_memory().unwrap());
        let writer = Arc::new(WritePipeline::start(duckdb.connect().unwrap(), 8));
        let pool = Arc::new(ReadPool::new(&duckdb, 2).unwrap());
        let shutdown = ShutdownService::new(
            Arc::clone(&writer),
            Arc::clone(&pool),
            Arc::clone(&duckdb),
        );
        Parts {
            shutdown,
            writer,
            pool,
            duckdb,
        }
    }

    #[tokio::test]
    async fn test_shutdown_not_triggered_initially() {
        let parts = make_shutdown();
        assert!(!parts.shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_trigger() {
        let parts = make_shutdown();
        parts.shutdown.trigger();
        assert!(parts.shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_wait_returns_after_trigger() {
        let parts = make_shutdown();
        let handle = tokio::spawn(parts.shutdown.wait());

        tokio::task::yield_now().await;
        parts.shutdown.trigger();

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_shutdown() {
        let parts = make_shutdown();
        let rx = parts.shutdown.subscribe();

        assert!(!*rx.borrow());
        parts.shutdown.trigger();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_shutdown_drains_writes_then_closes_everything() {
        let parts = make_shutdown();
        let cancel = CancellationToken::new();
        parts
            .writer
            .enqueue(vec![sample_row("t1", "s1", 1_000)], &cancel)
            .await
            .unwrap();

        // Check what the writer committed on a connection that outlives the pool
        let reader = parts.duckdb.connect().unwrap();
        parts.shutdown.shutdown().await;

        let n: i64 = reader
            .query_row("SELECT COUNT(*) FROM spans", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);

        assert!(parts.writer.is_shut_down());
        assert!(parts.pool.is_closed());
        assert!(!parts.duckdb.is_open());
        assert!(matches!(
            parts.writer.enqueue(vec![sample_row("t1", "s2", 2_000)], &cancel).await,
            Err(WriteError::ShutDown)
        ));
        assert!(matches!(
            parts.pool.get_trace("t1", &cancel).await,
            Err(ReadError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_registered_tasks() {
        let parts = make_shutdown();
        let mut rx = parts.shutdown.subscribe();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        parts
            .shutdown
            .register(tokio::spawn(async move {
                let _ = rx.wait_for(|&v| v).await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }))
            .await;

        parts.shutdown.shutdown().await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
