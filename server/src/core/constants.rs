// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "Qyl";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "qyl_collector";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".qyl";

// =============================================================================
// Configuration Files
// =============================================================================

/// Local config file name (working directory)
pub const CONFIG_FILE_NAME: &str = "qyl.json";

/// Profile config file name (inside the dotfile folder)
pub const PROFILE_CONFIG_FILE_NAME: &str = "config.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "QYL_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for HTTP host
pub const ENV_HOST: &str = "QYL_HOST";

/// Environment variable for HTTP port
pub const ENV_PORT: &str = "QYL_PORT";

/// Environment variable for gRPC port
pub const ENV_GRPC_PORT: &str = "QYL_GRPC_PORT";

/// Environment variable to disable the gRPC listener
pub const ENV_NO_GRPC: &str = "QYL_NO_GRPC";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "QYL_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5100;

/// Default OTLP gRPC port (standard OTLP gRPC port)
pub const DEFAULT_GRPC_PORT: u16 = 4317;

// =============================================================================
// Environment Variables - Storage
// =============================================================================

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "QYL_DATA_DIR";

/// Environment variable for archive destination directory
pub const ENV_ARCHIVE_DIR: &str = "QYL_ARCHIVE_DIR";

/// Environment variable for live-store retention in days
pub const ENV_RETENTION_DAYS: &str = "QYL_RETENTION_DAYS";

// =============================================================================
// DuckDB Database
// =============================================================================

/// DuckDB database filename
pub const DUCKDB_DB_FILENAME: &str = "qyl.duckdb";

/// DuckDB checkpoint interval in seconds (5 minutes)
pub const DUCKDB_CHECKPOINT_INTERVAL_SECS: u64 = 300;

/// DuckDB API query timeout in seconds
pub const DUCKDB_QUERY_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Write Pipeline
// =============================================================================

/// Bounded write queue capacity (batches)
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 1000;

/// Attempts per batch before the writer gives up on it
pub const WRITER_MAX_ATTEMPTS: u32 = 3;

/// Base delay for writer retry backoff
pub const WRITER_BASE_DELAY_MS: u64 = 100;

/// Time allowed for the writer to drain its queue on shutdown
pub const WRITER_DRAIN_TIMEOUT_SECS: u64 = 3;

// =============================================================================
// Read Pool
// =============================================================================

/// Number of pooled read connections (max concurrent queries)
pub const DEFAULT_READ_POOL_SIZE: usize = 8;

/// Default row limit for span queries
pub const DEFAULT_QUERY_LIMIT: u32 = 1000;

/// Upper bound for the span query limit
pub const MAX_QUERY_LIMIT: u32 = 10_000;

// =============================================================================
// Archival
// =============================================================================

/// Default live-store retention in days
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Interval between archival runs (1 hour)
pub const ARCHIVE_INTERVAL_SECS: u64 = 60 * 60;

/// Archive subdirectory name under the data directory
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Parquet row group size for archive files
pub const PARQUET_ROW_GROUP_SIZE: u32 = 100_000;

// =============================================================================
// Request Body Limits
// =============================================================================

/// Body limit for OTLP endpoints (64 MB)
pub const OTLP_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Retry-After header value for shutdown/backpressure responses (in seconds)
pub const RETRY_AFTER_SECS: u64 = 1;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout for background tasks in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
