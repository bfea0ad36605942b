//! Platform-aware data storage directory management
//!
//! ## Platform Paths
//!
//! | Type | Windows | macOS | Linux |
//! |------|---------|-------|-------|
//! | Data | `%APPDATA%\Qyl\` | `~/Library/Application Support/Qyl/` | `$XDG_DATA_HOME/qyl/` |
//!
//! The archive directory defaults to `<data>/archive` and can point anywhere.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use super::config::AppConfig;
use super::constants::{APP_DOT_FOLDER, APP_NAME, ARCHIVE_DIR_NAME, ENV_DATA_DIR};
use crate::utils::file::expand_path;

/// Data subdirectories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSubdir {
    Duckdb,
    Archive,
}

impl DataSubdir {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataSubdir::Duckdb => "duckdb",
            DataSubdir::Archive => ARCHIVE_DIR_NAME,
        }
    }

    /// Subdirectories created under the data directory
    pub const fn all() -> &'static [DataSubdir] {
        &[DataSubdir::Duckdb, DataSubdir::Archive]
    }
}

/// Application storage manager
#[derive(Debug, Clone)]
pub struct AppStorage {
    data_dir: PathBuf,
    archive_dir: PathBuf,
}

impl AppStorage {
    /// Resolve and create the data and archive directories
    pub async fn init(config: &AppConfig) -> Result<Self> {
        let data_dir = config
            .storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::resolve_data_dir);

        Self::ensure_directories(&data_dir).await?;
        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);

        let archive_dir = match &config.archive.directory {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await.with_context(|| {
                    format!("Failed to create archive directory: {}", dir.display())
                })?;
                dir.canonicalize().unwrap_or_else(|_| dir.clone())
            }
            None => data_dir.join(DataSubdir::Archive.as_str()),
        };

        tracing::debug!(
            data_dir = %data_dir.display(),
            archive_dir = %archive_dir.display(),
            "Storage initialized"
        );

        Ok(Self {
            data_dir,
            archive_dir,
        })
    }

    /// Resolve data directory from env var or platform default
    pub fn resolve_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            return expand_path(&dir);
        }

        if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            return proj_dirs.data_dir().to_path_buf();
        }

        // Fallback to local .qyl
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        cwd.join(APP_DOT_FOLDER)
    }

    async fn ensure_directories(data_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        for subdir in DataSubdir::all() {
            let path = data_dir.join(subdir.as_str());
            tokio::fs::create_dir_all(&path).await.with_context(|| {
                format!(
                    "Failed to create {} directory: {}",
                    subdir.as_str(),
                    path.display()
                )
            })?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Where archival runs write Parquet files
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Get path to a subdirectory (canonicalized)
    pub fn subdir(&self, subdir: DataSubdir) -> PathBuf {
        let path = self.data_dir.join(subdir.as_str());
        path.canonicalize().unwrap_or(path)
    }

    /// Create AppStorage for testing with a specific data directory.
    ///
    /// Subdirectories are created synchronously.
    #[cfg(test)]
    pub fn init_for_test(data_dir: PathBuf) -> Self {
        for subdir in DataSubdir::all() {
            std::fs::create_dir_all(data_dir.join(subdir.as_str()))
                .expect("Failed to create test subdir");
        }
        let archive_dir = data_dir.join(DataSubdir::Archive.as_str());
        Self {
            data_dir,
            archive_dir,
        }
    }
}
