use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, ARCHIVE_INTERVAL_SECS, CONFIG_FILE_NAME, DEFAULT_GRPC_PORT, DEFAULT_HOST,
    DEFAULT_PORT, DEFAULT_READ_POOL_SIZE, DEFAULT_RETENTION_DAYS, DEFAULT_WRITE_QUEUE_CAPACITY,
    PROFILE_CONFIG_FILE_NAME,
};

// =============================================================================
// File Config (JSON, all fields optional)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// gRPC listener section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GrpcFileConfig {
    pub enabled: Option<bool>,
    pub port: Option<u16>,
}

/// Storage engine section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StorageFileConfig {
    pub data_dir: Option<String>,
    pub write_queue_capacity: Option<usize>,
    pub read_pool_size: Option<usize>,
}

/// Archival section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ArchiveFileConfig {
    pub enabled: Option<bool>,
    pub retention_days: Option<u32>,
    pub directory: Option<String>,
    pub interval_minutes: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub grpc: Option<GrpcFileConfig>,
    pub storage: Option<StorageFileConfig>,
    pub archive: Option<ArchiveFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                tracing::trace!(host = ?server.host, "Merging server.host");
                current.host = server.host;
            }
            if server.port.is_some() {
                tracing::trace!(port = ?server.port, "Merging server.port");
                current.port = server.port;
            }
        }

        if let Some(grpc) = other.grpc {
            let current = self.grpc.get_or_insert_with(GrpcFileConfig::default);
            if grpc.enabled.is_some() {
                tracing::trace!(enabled = ?grpc.enabled, "Merging grpc.enabled");
                current.enabled = grpc.enabled;
            }
            if grpc.port.is_some() {
                tracing::trace!(port = ?grpc.port, "Merging grpc.port");
                current.port = grpc.port;
            }
        }

        if let Some(storage) = other.storage {
            let current = self.storage.get_or_insert_with(StorageFileConfig::default);
            if storage.data_dir.is_some() {
                tracing::trace!(data_dir = ?storage.data_dir, "Merging storage.data_dir");
                current.data_dir = storage.data_dir;
            }
            if storage.write_queue_capacity.is_some() {
                current.write_queue_capacity = storage.write_queue_capacity;
            }
            if storage.read_pool_size.is_some() {
                current.read_pool_size = storage.read_pool_size;
            }
        }

        if let Some(archive) = other.archive {
            let current = self.archive.get_or_insert_with(ArchiveFileConfig::default);
            if archive.enabled.is_some() {
                tracing::trace!(enabled = ?archive.enabled, "Merging archive.enabled");
                current.enabled = archive.enabled;
            }
            if archive.retention_days.is_some() {
                current.retention_days = archive.retention_days;
            }
            if archive.directory.is_some() {
                current.directory = archive.directory;
            }
            if archive.interval_minutes.is_some() {
                current.interval_minutes = archive.interval_minutes;
            }
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// OTLP gRPC listener configuration
#[derive(Debug, Clone)]
pub struct GrpcConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Explicit data directory; platform default when unset
    pub data_dir: Option<PathBuf>,
    pub write_queue_capacity: usize,
    pub read_pool_size: usize,
}

/// Archival configuration
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub retention_days: u32,
    /// Explicit archive directory; `<data_dir>/archive` when unset
    pub directory: Option<PathBuf>,
    pub interval_secs: u64,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub grpc: GrpcConfig,
    pub storage: StorageConfig,
    pub archive: ArchiveConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.qyl/config.json)
    /// 3. Local directory config (qyl.json) OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::from_layers(cli, file_config);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, merged file config and CLI/env overrides
    pub(crate) fn from_layers(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_grpc = file_config.grpc.unwrap_or_default();
        let file_storage = file_config.storage.unwrap_or_default();
        let file_archive = file_config.archive.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        // --no-grpc wins over any file setting
        let grpc = GrpcConfig {
            enabled: !cli.no_grpc && file_grpc.enabled.unwrap_or(true),
            port: cli.grpc_port.or(file_grpc.port).unwrap_or(DEFAULT_GRPC_PORT),
        };

        let storage = StorageConfig {
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file_storage.data_dir.map(|d| expand_path(&d))),
            write_queue_capacity: file_storage
                .write_queue_capacity
                .unwrap_or(DEFAULT_WRITE_QUEUE_CAPACITY),
            read_pool_size: file_storage
                .read_pool_size
                .unwrap_or(DEFAULT_READ_POOL_SIZE),
        };

        let archive = ArchiveConfig {
            enabled: file_archive.enabled.unwrap_or(true),
            retention_days: cli
                .retention_days
                .or(file_archive.retention_days)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            directory: cli
                .archive_dir
                .clone()
                .or_else(|| file_archive.directory.map(|d| expand_path(&d))),
            interval_secs: file_archive
                .interval_minutes
                .map(|m| m.saturating_mul(60))
                .unwrap_or(ARCHIVE_INTERVAL_SECS),
        };

        Self {
            server,
            grpc,
            storage,
            archive,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }

        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.grpc.enabled && self.grpc.port == 0 {
            anyhow::bail!("Configuration error: grpc.port must be greater than 0");
        }

        if self.grpc.enabled && self.server.port == self.grpc.port {
            anyhow::bail!(
                "Configuration error: server.port ({}) and grpc.port ({}) cannot be the same",
                self.server.port,
                self.grpc.port
            );
        }

        if self.storage.write_queue_capacity == 0 {
            anyhow::bail!("Configuration error: storage.write_queue_capacity must be at least 1");
        }
        if self.storage.read_pool_size == 0 {
            anyhow::bail!("Configuration error: storage.read_pool_size must be at least 1");
        }

        if self.archive.retention_days == 0 {
            anyhow::bail!("Configuration error: archive.retention_days must be at least 1");
        }
        if self.archive.enabled && self.archive.interval_secs == 0 {
            anyhow::bail!("Configuration error: archive.interval_minutes must be at least 1");
        }
        if self.archive.retention_days == 1 {
            tracing::warn!(
                "archive.retention_days is 1, spans leave the live store after a day"
            );
        }

        Ok(())
    }
}

/// Get the profile config path (~/.qyl/config.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(PROFILE_CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered(cli: CliConfig, json: &str) -> AppConfig {
        let file_config: FileConfig = serde_json::from_str(json).unwrap();
        AppConfig::from_layers(&cli, file_config)
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "server": { "host": "0.0.0.0", "port": 8080 },
            "grpc": { "enabled": false, "port": 4318 },
            "storage": { "write_queue_capacity": 64, "read_pool_size": 2 },
            "archive": { "retention_days": 7, "directory": "/var/qyl/archive", "interval_minutes": 15 }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, Some("0.0.0.0".to_string()));
        assert_eq!(server.port, Some(8080));
        let grpc = config.grpc.as_ref().unwrap();
        assert_eq!(grpc.enabled, Some(false));
        assert_eq!(grpc.port, Some(4318));
        let storage = config.storage.as_ref().unwrap();
        assert_eq!(storage.write_queue_capacity, Some(64));
        assert_eq!(storage.read_pool_size, Some(2));
        let archive = config.archive.as_ref().unwrap();
        assert_eq!(archive.retention_days, Some(7));
        assert_eq!(archive.interval_minutes, Some(15));
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.archive.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "server": { "host": "localhost" }, "otel": { "grpc": {} } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert!(config.extra.get("otel").is_some());
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "server": { "host": "base.host", "port": 1000 }, "archive": { "retention_days": 10 } }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{ "server": { "port": 2000 }, "archive": { "directory": "/tmp/a" } }"#,
        )
        .unwrap();

        base.merge(overlay);

        let server = base.server.unwrap();
        assert_eq!(server.host, Some("base.host".to_string()));
        assert_eq!(server.port, Some(2000));
        let archive = base.archive.unwrap();
        assert_eq!(archive.retention_days, Some(10));
        assert_eq!(archive.directory, Some("/tmp/a".to_string()));
    }

    #[test]
    fn test_defaults() {
        let config = layered(CliConfig::default(), "{}");

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.grpc.enabled);
        assert_eq!(config.grpc.port, DEFAULT_GRPC_PORT);
        assert_eq!(
            config.storage.write_queue_capacity,
            DEFAULT_WRITE_QUEUE_CAPACITY
        );
        assert_eq!(config.storage.read_pool_size, DEFAULT_READ_POOL_SIZE);
        assert_eq!(config.archive.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(config.archive.interval_secs, ARCHIVE_INTERVAL_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = CliConfig {
            host: Some("cli.host".to_string()),
            port: Some(3000),
            no_grpc: true,
            retention_days: Some(2),
            archive_dir: Some(PathBuf::from("/cli/archive")),
            ..Default::default()
        };
        let config = layered(
            cli,
            r#"{
                "server": { "host": "file.host", "port": 9000 },
                "grpc": { "enabled": true },
                "archive": { "retention_days": 90, "directory": "/file/archive", "interval_minutes": 5 }
            }"#,
        );

        assert_eq!(config.server.host, "cli.host");
        assert_eq!(config.server.port, 3000);
        assert!(!config.grpc.enabled);
        assert_eq!(config.archive.retention_days, 2);
        assert_eq!(
            config.archive.directory,
            Some(PathBuf::from("/cli/archive"))
        );
        assert_eq!(config.archive.interval_secs, 300);
    }

    #[test]
    fn test_validation_port_collision() {
        let cli = CliConfig {
            port: Some(4317),
            grpc_port: Some(4317),
            ..Default::default()
        };
        let err = layered(cli, "{}").validate().unwrap_err();
        assert!(err.to_string().contains("cannot be the same"));
    }

    #[test]
    fn test_validation_port_collision_disabled_grpc() {
        let cli = CliConfig {
            port: Some(4317),
            grpc_port: Some(4317),
            no_grpc: true,
            ..Default::default()
        };
        assert!(layered(cli, "{}").validate().is_ok());
    }

    #[test]
    fn test_validation_empty_host() {
        let cli = CliConfig {
            host: Some(String::new()),
            ..Default::default()
        };
        let err = layered(cli, "{}").validate().unwrap_err();
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_validation_zero_queue_and_pool() {
        let config = layered(
            CliConfig::default(),
            r#"{ "storage": { "write_queue_capacity": 0 } }"#,
        );
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("write_queue_capacity")
        );

        let config = layered(
            CliConfig::default(),
            r#"{ "storage": { "read_pool_size": 0 } }"#,
        );
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("read_pool_size")
        );
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/definitely/not/here/qyl.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
