//! Read connection pool and query surface
//!
//! A fixed set of connections cloned from the primary one. A semaphore caps
//! concurrent reads at the pool size; a [`ReadLease`] puts its connection
//! back when dropped, whichever way the caller exits.

use std::ops::Deref;
use std::sync::Arc;

use duckdb::Connection;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use super::DuckdbService;
use super::error::{DuckdbError, ReadError};
use super::repositories::{
    session as session_repository, span as span_repository, stats as stats_repository,
};
use crate::data::types::{
    GenAiStats, SessionFilter, SessionSummary, SpanFilter, SpanRow, StatsFilter, StorageStats,
};

type Idle = Arc<Mutex<Vec<Connection>>>;

/// Fixed-size pool of read connections
pub struct ReadPool {
    idle: Idle,
    permits: Arc<Semaphore>,
    size: usize,
}

/// A pooled connection, returned to the pool on drop
pub struct ReadLease {
    conn: Option<Connection>,
    idle: Idle,
    permits: Arc<Semaphore>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for ReadLease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop
        self.conn.as_ref().unwrap_or_else(|| unreachable!("lease used after drop"))
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && !self.permits.is_closed()
        {
            self.idle.lock().push(conn);
        }
    }
}

impl ReadPool {
    /// Open `size` read connections against `service`
    pub fn new(service: &DuckdbService, size: usize) -> Result<Self, DuckdbError> {
        let size = size.max(1);
        let conns = (0..size)
            .map(|_| service.connect())
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(size, "Read pool opened");
        Ok(Self {
            idle: Arc::new(Mutex::new(conns)),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently leased
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free connection.
    ///
    /// Fails with [`ReadError::Cancelled`] if `cancel` fires first and with
    /// [`ReadError::ShutDown`] once the pool is closed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<ReadLease, ReadError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| ReadError::ShutDown)?
            }
        };

        let conn = self.idle.lock().pop().ok_or(ReadError::ShutDown)?;
        Ok(ReadLease {
            conn: Some(conn),
            idle: Arc::clone(&self.idle),
            permits: Arc::clone(&self.permits),
            _permit: permit,
        })
    }

    /// Run `f` on a pooled connection off the async runtime.
    ///
    /// On cancellation the caller gets [`ReadError::Cancelled`] right away;
    /// the connection returns to the pool once the running statement ends.
    pub async fn query<T, F>(&self, cancel: &CancellationToken, f: F) -> Result<T, ReadError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DuckdbError> + Send + 'static,
    {
        let lease = self.acquire(cancel).await?;
        let task = DuckdbService::run_query(move || f(&lease));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReadError::Cancelled),
            result = task => Ok(result??),
        }
    }

    /// All spans of a trace, earliest first
    pub async fn get_trace(
        &self,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpanRow>, ReadError> {
        let trace_id = trace_id.to_string();
        self.query(cancel, move |conn| span_repository::get_trace(conn, &trace_id))
            .await
    }

    /// All spans of a session, earliest first
    pub async fn get_session_spans(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpanRow>, ReadError> {
        let session_id = session_id.to_string();
        self.query(cancel, move |conn| {
            span_repository::get_session_spans(conn, &session_id)
        })
        .await
    }

    /// Spans matching every filter that is set, newest first
    pub async fn query_spans(
        &self,
        filter: SpanFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpanRow>, ReadError> {
        self.query(cancel, move |conn| span_repository::query_spans(conn, &filter))
            .await
    }

    /// Aggregated GenAI usage
    pub async fn genai_stats(
        &self,
        filter: StatsFilter,
        cancel: &CancellationToken,
    ) -> Result<GenAiStats, ReadError> {
        self.query(cancel, move |conn| stats_repository::genai_stats(conn, &filter))
            .await
    }

    /// Sessions rolled up from their spans, most recently active first
    pub async fn list_sessions(
        &self,
        filter: SessionFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<SessionSummary>, ReadError> {
        self.query(cancel, move |conn| {
            session_repository::list_sessions(conn, &filter)
        })
        .await
    }

    /// Span counts, time extent and database size
    pub async fn storage_stats(&self, cancel: &CancellationToken) -> Result<StorageStats, ReadError> {
        self.query(cancel, stats_repository::storage_stats).await
    }

    /// Close the pool. Waiting and later acquisitions fail with
    /// [`ReadError::ShutDown`]; leased connections are dropped on release.
    pub fn close(&self) {
        self.permits.close();
        let dropped = {
            let mut idle = self.idle.lock();
            std::mem::take(&mut *idle)
        };
        tracing::debug!(idle = dropped.len(), "Read pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
