//! Bazaar CLI - operator tool for the background job system.
//!
//! Reads queue status, looks jobs up, forces cleanups and lists scheduled
//! tasks through the server's HTTP status surface.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, health, jobs, scheduler};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Bazaar - background job operator CLI
#[derive(Parser)]
#[command(
    name = "bazaar",
    version,
    about = "Bazaar - background job operator CLI",
    long_about = "Inspect the Bazaar image and email queues and the interval scheduler that drains them.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "BAZAAR_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue status, job lookup and cleanup
    #[command(subcommand)]
    Jobs(jobs::JobsCommands),

    /// Scheduled task inspection
    #[command(subcommand)]
    Scheduler(scheduler::SchedulerCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Jobs(cmd) => jobs::execute(cmd, &client, format).await,
        Commands::Scheduler(cmd) => scheduler::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
