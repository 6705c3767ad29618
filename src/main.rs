//! CLI entry point for glove-stream.
//!
//! Two modes:
//!
//! - `glove-stream serve`: start the WebSocket streaming server with the
//!   built-in mock classifier;
//! - `glove-stream process`: reprocess a recorded CSV file through the
//!   regularization pipeline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use glove_stream::batch::{self, BatchMethod};
use glove_stream::classifier::MockClassifier;
use glove_stream::config::Config;
use glove_stream::stream::coordinator::Coordinator;
use glove_stream::stream::server::{self, AppState};
use glove_stream::telemetry;
use std::path::PathBuf;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "glove-stream")]
#[command(about = "Glove sensor regularization and streaming inference", long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket streaming server.
    Serve,

    /// Reprocess a recorded CSV file.
    Process {
        /// Input CSV (raw sensor rows).
        #[arg(long)]
        input: PathBuf,

        /// Output CSV (regularized rows).
        #[arg(long)]
        output: PathBuf,

        /// Regularization method: adaptive, combined, kalman, weighted,
        /// exponential.
        #[arg(long, default_value = "adaptive")]
        method: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config)?;
    config.validate()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Process {
            input,
            output,
            method,
        } => {
            let method = BatchMethod::parse(&method)?;
            let rows = batch::process_csv(&input, &output, method, &config.pipeline)?;
            println!("Processed {rows} rows -> {}", output.display());
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let classifier = Arc::new(MockClassifier::default());
    let coordinator = Coordinator::new(
        classifier,
        config.server.inference_workers,
        config.server.mailbox_notify_capacity,
    );
    coordinator.spawn_workers();

    let state = AppState {
        coordinator,
        config: Arc::new(config),
    };
    server::serve(state).await?;
    Ok(())
}
