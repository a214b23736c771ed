//! # WorkPlanner Server
//!
//! Weekly office/home schedules with manager approval, team polls with live
//! updates, and the engagement board.
//!
//! Usage:
//!   workplanner                          # Start with ~/.workplanner/config.toml
//!   workplanner --port 8080              # Custom port
//!   workplanner --db-path :memory:       # Throwaway database
//!   workplanner --print-config           # Show the effective config and exit

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use workplanner_core::PlannerConfig;
use workplanner_engine::{BroadcastPublisher, PlannerDb};

#[derive(Parser)]
#[command(
    name = "workplanner",
    version,
    about = "🗓️ WorkPlanner: hybrid work schedules, polls and team board"
)]
struct Cli {
    /// Config file (defaults to $WORKPLANNER_CONFIG or ~/.workplanner/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override gateway host
    #[arg(long)]
    host: Option<String>,

    /// Override gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override SQLite database path
    #[arg(long)]
    db_path: Option<String>,

    /// Print the effective config as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(cli: &Cli) -> Result<PlannerConfig> {
    let mut config = match &cli.config {
        Some(path) => PlannerConfig::load_from(path)?,
        None => PlannerConfig::load()?,
    };
    if let Some(host) = &cli.host {
        config.gateway.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db_path) = &cli.db_path {
        config.storage.db_path = db_path.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "workplanner=debug,workplanner_engine=debug,workplanner_gateway=debug,tower_http=debug"
    } else {
        "workplanner=info,workplanner_engine=info,workplanner_gateway=info"
    };
    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false);
    if cli.log_json {
        logger.json().init();
    } else {
        logger.init();
    }

    let config = load_config(&cli)?;
    if cli.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Open database
    let db_path = expand_path(&config.storage.db_path);
    if db_path != ":memory:" {
        if let Some(parent) = Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Arc::new(PlannerDb::open(Path::new(&db_path))?);
    tracing::info!("📂 Database: {}", db_path);

    let realtime = if config.realtime.enabled {
        Some(Arc::new(BroadcastPublisher::new(config.realtime.channel_capacity)))
    } else {
        tracing::info!("Realtime channel disabled");
        None
    };

    workplanner_gateway::start(&config.gateway, db, realtime).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "workplanner",
            "--config",
            "/nonexistent/workplanner.toml",
            "--port",
            "8080",
        ]);
        // A named config file that does not exist is an error.
        assert!(load_config(&cli).is_err());

        let cli = Cli::parse_from(["workplanner", "--host", "127.0.0.1", "--db-path", ":memory:"]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.db_path.as_deref(), Some(":memory:"));
        assert!(!cli.verbose);
        assert!(!cli.log_json);
    }

    #[test]
    fn test_expand_path_keeps_memory_marker() {
        assert_eq!(expand_path(":memory:"), ":memory:");
        assert_eq!(expand_path("/var/lib/workplanner.db"), "/var/lib/workplanner.db");
    }
}
