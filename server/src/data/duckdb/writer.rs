//! Span write pipeline
//!
//! A bounded queue drained by one blocking writer thread. Every batch is
//! upserted in its own transaction, so readers see all of a batch or none of
//! it. Batches are applied in the order they were queued.

use std::time::Duration;

use duckdb::Connection;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{DuckdbError, WriteError};
use super::repositories::span as span_repository;
use crate::core::constants::{WRITER_BASE_DELAY_MS, WRITER_DRAIN_TIMEOUT_SECS, WRITER_MAX_ATTEMPTS};
use crate::data::types::SpanBatch;
use crate::utils::retry::retry_blocking;

type Ack = oneshot::Sender<Result<(), WriteError>>;

enum Command {
    Batch { rows: SpanBatch, ack: Option<Ack> },
    Flush(oneshot::Sender<()>),
}

/// Bounded queue plus single writer
pub struct WritePipeline {
    tx: RwLock<Option<mpsc::Sender<Command>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl WritePipeline {
    /// Spawn the writer on `conn` with room for `capacity` queued batches
    pub fn start(conn: Connection, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = tokio::task::spawn_blocking(move || run_writer(conn, rx));
        tracing::debug!(capacity, "Write pipeline started");
        Self {
            tx: RwLock::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>, WriteError> {
        self.tx.read().clone().ok_or(WriteError::ShutDown)
    }

    /// Queue a batch without waiting for it to be committed.
    ///
    /// Suspends while the queue is full. If `cancel` fires first the batch is
    /// not queued at all.
    pub async fn enqueue(&self, batch: SpanBatch, cancel: &CancellationToken) -> Result<(), WriteError> {
        self.submit(batch, None, cancel).await
    }

    /// Queue a batch and wait until its transaction has committed.
    ///
    /// Cancelling after the batch was queued stops the wait only; the batch is
    /// still committed as a whole.
    pub async fn write(&self, batch: SpanBatch, cancel: &CancellationToken) -> Result<(), WriteError> {
        if batch.is_empty() {
            return self.sender().map(drop);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.submit(batch, Some(ack_tx), cancel).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WriteError::Cancelled),
            ack = ack_rx => ack.unwrap_or(Err(WriteError::ShutDown)),
        }
    }

    async fn submit(
        &self,
        batch: SpanBatch,
        ack: Option<Ack>,
        cancel: &CancellationToken,
    ) -> Result<(), WriteError> {
        let tx = self.sender()?;
        if batch.is_empty() {
            return Ok(());
        }

        let command = Command::Batch { rows: batch, ack };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WriteError::Cancelled),
            sent = tx.send(command) => sent.map_err(|_| WriteError::ShutDown),
        }
    }

    /// Wait until every batch queued before this call has been applied
    pub async fn flush(&self) -> Result<(), WriteError> {
        let tx = self.sender()?;
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(Command::Flush(done_tx))
            .await
            .map_err(|_| WriteError::ShutDown)?;
        done_rx.await.map_err(|_| WriteError::ShutDown)
    }

    pub fn is_shut_down(&self) -> bool {
        self.tx.read().is_none()
    }

    /// Stop accepting batches and drain the queue.
    ///
    /// Later calls to `enqueue`, `write` and `flush` fail with
    /// [`WriteError::ShutDown`]. Calling this twice is harmless.
    pub async fn shutdown(&self) {
        let Some(tx) = self.tx.write().take() else {
            return;
        };
        drop(tx);

        let Some(writer) = self.writer.lock().take() else {
            return;
        };
        tracing::debug!("Draining write queue");
        let timeout = Duration::from_secs(WRITER_DRAIN_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, writer).await {
            Ok(Ok(())) => tracing::debug!("Write pipeline drained"),
            Ok(Err(e)) => tracing::error!(error = %e, "Span writer task failed"),
            Err(_) => tracing::warn!(
                timeout_secs = WRITER_DRAIN_TIMEOUT_SECS,
                "Timeout draining write queue"
            ),
        }
    }
}

fn run_writer(conn: Connection, mut rx: mpsc::Receiver<Command>) {
    let mut batches = 0u64;
    let mut failed = 0u64;

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Batch { rows, ack } => {
                let result = write_batch(&conn, &rows);
                batches += 1;
                if result.is_err() {
                    failed += 1;
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result.map(drop).map_err(WriteError::from));
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    tracing::debug!(batches, failed, "Span writer stopped");
}

fn write_batch(conn: &Connection, rows: &SpanBatch) -> Result<usize, DuckdbError> {
    let mut written = 0;
    let result = retry_blocking(WRITER_MAX_ATTEMPTS, WRITER_BASE_DELAY_MS, || {
        span_repository::upsert_batch(conn, rows).map(|n| written = n)
    });

    match result {
        Ok(attempts) => {
            tracing::trace!(batch_size = rows.len(), written, attempts, "Span batch committed");
            Ok(written)
        }
        Err((e, attempts)) => {
            tracing::error!(
                error = %e,
                batch_size = rows.len(),
                attempts,
                "Span batch failed after retries"
            );
            Err(e)
        }
    }
}
