//! # Main: CLI Entry Point
//!
//! Routes subcommands to the API server, the migration runner and the KPI
//! recomputation jobs. Handles the shared concerns: `.env` loading, logging
//! setup and configuration-file parsing.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection string.
//! - `--config` / `PLANTKEEPER_CONFIG`: optional TOML settings file.
//!
//! ## Logging
//!
//! `LOG_FORMAT=json` switches to JSON lines; otherwise human-readable output
//! on stderr. `RUST_LOG` filters as usual and defaults to `info`.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "plantkeeper",
    version,
    about = "Plant-care tracking backend with ad telemetry and KPIs"
)]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Path to a TOML settings file (defaults apply when omitted)
    #[arg(long, env = "PLANTKEEPER_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,
    },
    /// Apply pending database migrations and exit
    Migrate,
    /// Recompute daily ad KPIs from stored activity and impressions
    Kpi {
        #[command(subcommand)]
        action: KpiAction,
    },
}

#[derive(Subcommand)]
enum KpiAction {
    /// Recompute a single day (today when --date is omitted)
    Daily {
        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Recompute every day in an inclusive range
    Historical {
        /// First date, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last date, YYYY-MM-DD
        #[arg(long)]
        end: String,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let config = plantkeeper::config::load(cli.config.as_deref())?;
    let rt = tokio::runtime::Runtime::new()?;

    match &cli.command {
        Commands::Serve { port, bind } => rt.block_on(cli::run_serve(&cli, config, *bind, *port)),
        Commands::Migrate => rt.block_on(cli::run_migrate(&cli)),
        Commands::Kpi { action } => rt.block_on(cli::run_kpi(&cli, &config, action)),
    }
}
