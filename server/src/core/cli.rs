use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_ARCHIVE_DIR, ENV_CONFIG, ENV_DATA_DIR, ENV_GRPC_PORT, ENV_HOST, ENV_NO_GRPC, ENV_PORT,
    ENV_RETENTION_DAYS,
};

#[derive(Parser)]
#[command(name = "qyl-collector")]
#[command(version, about = "OTLP trace collector with GenAI analytics", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// HTTP port (OTLP/HTTP ingestion and query API)
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// OTLP gRPC port
    #[arg(long, global = true, env = ENV_GRPC_PORT)]
    pub grpc_port: Option<u16>,

    /// Disable the OTLP gRPC listener
    #[arg(long, global = true, env = ENV_NO_GRPC)]
    pub no_grpc: bool,

    /// Data directory (DuckDB file and default archive location)
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Spans older than this many days are archived to Parquet
    #[arg(long, global = true, env = ENV_RETENTION_DAYS, value_parser = parse_retention_days)]
    pub retention_days: Option<u32>,

    /// Destination directory for Parquet archive files
    #[arg(long, global = true, env = ENV_ARCHIVE_DIR)]
    pub archive_dir: Option<PathBuf>,
}

/// Parse retention days from CLI/env string
fn parse_retention_days(s: &str) -> Result<u32, String> {
    match s.trim().parse::<u32>() {
        Ok(0) => Err("Retention must be at least 1 day".to_string()),
        Ok(days) => Ok(days),
        Err(_) => Err(format!("Invalid retention '{}'. Expected a number of days", s)),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the collector (default command)
    Start,
    /// Run one archival pass against the local store and exit
    Archive,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub grpc_port: Option<u16>,
    pub no_grpc: bool,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub retention_days: Option<u32>,
    pub archive_dir: Option<PathBuf>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        grpc_port: cli.grpc_port,
        no_grpc: cli.no_grpc,
        data_dir: cli.data_dir,
        config: cli.config,
        retention_days: cli.retention_days,
        archive_dir: cli.archive_dir,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retention_days() {
        assert_eq!(parse_retention_days("7"), Ok(7));
        assert_eq!(parse_retention_days(" 30 "), Ok(30));
        assert!(parse_retention_days("0").is_err());
        assert!(parse_retention_days("-1").is_err());
        assert!(parse_retention_days("week").is_err());
    }

    #[test]
    fn test_cli_parses_archive_subcommand() {
        let cli = Cli::try_parse_from(["qyl-collector", "archive", "--retention-days", "3"])
            .expect("archive command should parse");
        assert!(matches!(cli.command, Some(Commands::Archive)));
        assert_eq!(cli.retention_days, Some(3));
    }

    #[test]
    fn test_cli_global_flags_without_subcommand() {
        let cli = Cli::try_parse_from(["qyl-collector", "--port", "6000", "--no-grpc"])
            .expect("flags should parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(6000));
        assert!(cli.no_grpc);
    }
}
