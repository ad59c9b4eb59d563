//! allure-bridge CLI - Main Entry Point
//!
//! Replays recorded host test-runner event streams into Allure results and
//! inspects the reports they produce.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{inspect, replay};

/// allure-bridge - Allure reports from recorded test-runner events
#[derive(Parser)]
#[command(name = "allure-bridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay event streams and write results
    Replay(replay::ReplayArgs),

    /// Show the tests an event stream produces
    Inspect(inspect::InspectArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Replay(args) => replay::execute(args, cli.format).await?,
        Commands::Inspect(args) => inspect::execute(args, cli.format).await?,
        Commands::Version => {
            println!("allure-bridge v{}", allure_bridge_common::VERSION);
        }
    }

    Ok(())
}
