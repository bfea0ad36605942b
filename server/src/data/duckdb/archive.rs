//! Parquet archival of old spans
//!
//! Each run exports every span older than the cutoff to one Parquet file and
//! deletes the same rows, inside a single transaction. The export and the
//! delete read the same snapshot, so the file holds exactly the deleted rows.
//! The file is synced and renamed into place before the delete commits; any
//! failure rolls back the delete and removes the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::schema::SPAN_COLUMNS;
use super::{DuckdbError, DuckdbService, in_transaction};
use crate::core::config::ArchiveConfig;
use crate::core::constants::PARQUET_ROW_GROUP_SIZE;
use crate::utils::time::{days_to_nanos, nanos_to_datetime, now_unix_nanos};

/// Substrings never allowed in a path spliced into a COPY statement
const FORBIDDEN_PATH_PATTERNS: &[&str] = &["'", ";", "--", "\0", "\r", "\n"];

/// Result of one archival run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// Spans moved out of the live store
    pub archived: u64,
    /// Archive file written, `None` when nothing was old enough
    pub file: Option<PathBuf>,
    /// Spans starting before this instant were selected
    pub cutoff_unix_nano: u64,
}

/// Archive spans older than `retention_days` into `dest_dir`
pub fn archive(
    conn: &Connection,
    dest_dir: &Path,
    retention_days: u32,
) -> Result<ArchiveOutcome, DuckdbError> {
    let now = now_unix_nanos();
    let cutoff = now.saturating_sub(days_to_nanos(retention_days));
    archive_before(conn, dest_dir, cutoff, nanos_to_datetime(now))
}

/// Archive spans with `start_time_unix_nano < cutoff`.
///
/// `run_at` names the output file.
pub fn archive_before(
    conn: &Connection,
    dest_dir: &Path,
    cutoff: u64,
    run_at: DateTime<Utc>,
) -> Result<ArchiveOutcome, DuckdbError> {
    validate_path(dest_dir)?;
    fs::create_dir_all(dest_dir)?;

    let file = unique_archive_path(dest_dir, run_at);
    let tmp = file.with_extension("parquet.tmp");
    let tmp_sql = validate_path(&tmp)?;

    let result = in_transaction(conn, |conn| {
        let selected: i64 = conn.query_row(
            "SELECT COUNT(*) FROM spans WHERE start_time_unix_nano < ?",
            params![cutoff],
            |row| row.get(0),
        )?;
        if selected == 0 {
            return Ok(0);
        }

        // COPY takes no bind parameters; cutoff is an integer and the path is validated
        conn.execute_batch(&format!(
            "COPY (SELECT {SPAN_COLUMNS} FROM spans WHERE start_time_unix_nano < {cutoff} \
             ORDER BY start_time_unix_nano) \
             TO '{tmp_sql}' (FORMAT PARQUET, COMPRESSION ZSTD, ROW_GROUP_SIZE {PARQUET_ROW_GROUP_SIZE})"
        ))?;
        fs::File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, &file)?;

        let deleted = conn.execute(
            "DELETE FROM spans WHERE start_time_unix_nano < ?",
            params![cutoff],
        )?;
        if deleted as i64 != selected {
            return Err(DuckdbError::Io(std::io::Error::other(format!(
                "archive selected {selected} spans but deleted {deleted}"
            ))));
        }
        Ok(deleted as u64)
    });

    match result {
        Ok(0) => {
            tracing::debug!(cutoff, "No spans old enough to archive");
            Ok(ArchiveOutcome {
                archived: 0,
                file: None,
                cutoff_unix_nano: cutoff,
            })
        }
        Ok(archived) => {
            tracing::info!(archived, file = %file.display(), "Archived spans to Parquet");
            Ok(ArchiveOutcome {
                archived,
                file: Some(file),
                cutoff_unix_nano: cutoff,
            })
        }
        Err(e) => {
            for path in [&tmp, &file] {
                if path.exists()
                    && let Err(rm) = fs::remove_file(path)
                {
                    tracing::warn!(error = %rm, path = %path.display(), "Failed to remove partial archive");
                }
            }
            tracing::error!(error = %e, cutoff, "Archival run failed, live spans kept");
            Err(e)
        }
    }
}

/// Reject paths that could break out of a quoted SQL literal
fn validate_path(path: &Path) -> Result<&str, DuckdbError> {
    let s = path
        .to_str()
        .ok_or_else(|| DuckdbError::InvalidPath(path.display().to_string()))?;
    if FORBIDDEN_PATH_PATTERNS.iter().any(|p| s.contains(p)) {
        return Err(DuckdbError::InvalidPath(s.to_string()));
    }
    Ok(s)
}

/// `spans_{YYYYMMDD_HHMMSS}.parquet`, with `_N` appended on collision
fn unique_archive_path(dest_dir: &Path, run_at: DateTime<Utc>) -> PathBuf {
    let stem = format!("spans_{}", run_at.format("%Y%m%d_%H%M%S"));
    let mut path = dest_dir.join(format!("{stem}.parquet"));
    let mut n = 1u32;
    while path.exists() {
        path = dest_dir.join(format!("{stem}_{n}.parquet"));
        n += 1;
    }
    path
}

impl DuckdbService {
    /// One archival run on a dedicated connection
    pub async fn archive(
        self: &Arc<Self>,
        dest_dir: PathBuf,
        retention_days: u32,
    ) -> Result<ArchiveOutcome, DuckdbError> {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn = db.connect()?;
            archive(&conn, &dest_dir, retention_days)
        })
        .await
        .map_err(DuckdbError::join)?
    }

    /// Archive on every interval tick until shutdown; `None` when disabled
    pub fn start_archive_task(
        self: &Arc<Self>,
        config: &ArchiveConfig,
        dest_dir: PathBuf,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        if !config.enabled {
            tracing::debug!("Archival disabled");
            return None;
        }

        let db = Arc::clone(self);
        let retention_days = config.retention_days;
        let interval_secs = config.interval_secs;
        tracing::debug!(
            retention_days,
            interval_secs,
            dest = %dest_dir.display(),
            "Starting archive task"
        );

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("Archive task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = db.archive(dest_dir.clone(), retention_days).await {
                            tracing::warn!("Archival failed: {}", e);
                        }
                    }
                }
            }
        }))
    }
}
