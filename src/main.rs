//! CLI entry point for capture-session
//!
//! Opens a capture session on the mock device and runs one workload:
//!
//! ```bash
//! capture-session burst --count 5
//! capture-session repeat --frames 30
//! capture-session check-config --config config/capture_session.toml
//! ```

use anyhow::{anyhow, Result};
use capture_session::config::{AppConfig, DEFAULT_CONFIG_PATH};
use capture_session::logging;
use capture_session::runner::{RunSummary, SessionRunner};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "capture-session")]
#[command(about = "Capture session coordinator driven against a mock device", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a burst of still frames
    Burst {
        /// Number of frames in the burst
        #[arg(long, default_value = "3")]
        count: usize,
    },

    /// Stream a repeating preview, then stop it
    Repeat {
        /// Results to receive before stopping
        #[arg(long, default_value = "10")]
        frames: usize,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    config.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::CheckConfig => {
            println!("{} is valid", cli.config.display());
            println!("{:#?}", config);
            Ok(())
        }
        Commands::Burst { count } => {
            let runner = SessionRunner::open(&config).await?;
            let summary = runner.burst(count).await;
            runner.close().await?;
            report(&summary?, cli.json)
        }
        Commands::Repeat { frames } => {
            let runner = SessionRunner::open(&config).await?;
            let summary = runner.repeat(frames).await;
            runner.close().await?;
            report(&summary?, cli.json)
        }
    }
}

fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!(
            "Request {} finished at frame {}: {} completed, {} partial, {} errors",
            summary.request_id,
            summary.last_frame,
            summary.stats.completed,
            summary.stats.partials,
            summary.stats.errors
        );
    }
    Ok(())
}
