//! Startup banner and URL display

use std::path::Path;

use super::config::AppConfig;
use super::constants::APP_NAME;

/// Host to show in URLs; wildcard binds are reachable on localhost
fn display_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "::" | "[::]" => "localhost",
        other => other,
    }
}

/// Print the startup banner with endpoints and storage locations
pub fn print_banner(config: &AppConfig, data_dir: &Path, archive_dir: &Path) {
    let host = display_host(&config.server.host);
    let port = config.server.port;

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    // Label width: "OpenTelemetry HTTP:" is 19 chars, pad to 21 for alignment
    const W: usize = 21;

    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m http://{}:{}/api",
        "Query API:", host, port
    );
    println!(
        "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m http://{}:{}/v1/traces",
        "OpenTelemetry HTTP:", host, port
    );
    if config.grpc.enabled {
        println!(
            "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}:{}",
            "OpenTelemetry gRPC:", config.server.host, config.grpc.port
        );
    }

    println!("  \x1b[90m➜  {:<W$} {}\x1b[0m", "Data:", data_dir.display());
    if config.archive.enabled {
        println!(
            "  \x1b[90m➜  {:<W$} {} (after {} days)\x1b[0m",
            "Archive:",
            archive_dir.display(),
            config.archive.retention_days
        );
    } else {
        println!("  \x1b[90m➜  {:<W$} disabled\x1b[0m", "Archive:");
    }

    println!();
}
