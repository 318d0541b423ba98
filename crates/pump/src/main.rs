//! Sluice - line-to-JSON pump
//!
//! Reads lines from stdin, parses each as JSON and writes the result to
//! stdout, one pipeline end to end.
//!
//! # Usage
//!
//! ```bash
//! # Parse JSON lines with defaults
//! tail -f app.log | sluice
//!
//! # Pretty output, keep going past malformed lines
//! sluice --config configs/sluice.toml --pretty --keep-going
//!
//! # Pass lines through untouched
//! sluice --raw
//! ```
//!
//! # Signals
//!
//! - `SIGUSR1` (unix) clears the error of every pipeline so it resumes
//! - `Ctrl-C` / `SIGTERM` stops the pipelines gracefully

mod logging;
mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sluice_config::Config;
use tracing::{error, info};

/// Sluice - line-to-JSON pump
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log filter, overrides `[log] level` (e.g. debug, sluice_pipeline=trace)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Pipeline id, also selects the `[pipelines.<id>]` section
    #[arg(short, long, default_value = "main")]
    pub pipeline: String,

    /// Pretty-print output events
    #[arg(long)]
    pub pretty: bool,

    /// Skip JSON parsing and forward lines as strings
    #[arg(long)]
    pub raw: bool,

    /// Drop malformed events instead of stopping the pipeline
    #[arg(long)]
    pub keep_going: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).context("failed to load configuration")?
        }
        None => Config::default(),
    };

    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.filter_directive());
    logging::init(&config.log, &filter)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pipeline = %cli.pipeline,
        config = %cli.config.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(default)".into()),
        "sluice starting"
    );

    if let Err(e) = run::run(config, &cli).await {
        error!(error = %e, "sluice failed");
        return Err(e);
    }

    info!("sluice shutdown complete");
    Ok(())
}
