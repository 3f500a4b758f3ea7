//! Runwatch CLI - Main Entry Point
//!
//! Starts test runs on the run-execution backend and follows them to
//! their outcome.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{config, run, status, stop, watch, Context};
use runwatch_monitor::ClientConfig;

/// Runwatch - follow server-executed test runs from the terminal
#[derive(Parser)]
#[command(name = "runwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ~/.runwatch/config.toml)
    #[arg(long, global = true, env = "RUNWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the configuration file
    #[arg(long, global = true, env = "RUNWATCH_BASE_URL")]
    base_url: Option<String>,

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
    /// Start a run and follow it to its outcome
    Run(run::RunArgs),

    /// Follow a run that is already in progress
    Watch {
        /// Session ID
        session: String,
    },

    /// Show the current status of a run
    Status {
        /// Session ID
        session: String,
    },

    /// Ask the backend to stop a run
    Stop {
        /// Session ID
        session: String,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging. Run output goes to stdout, diagnostics to stderr.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !cli.format.is_interactive() {
        colored::control::set_override(false);
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(runwatch_common::default_config_path);
    let mut client_config = ClientConfig::load(&config_path)?;
    if let Some(base_url) = cli.base_url {
        client_config.backend.base_url = base_url;
    }

    let ctx = Context {
        config: client_config,
        config_path,
        format: cli.format,
    };

    let code = match cli.command {
        Commands::Run(args) => run::execute(args, &ctx).await?,
        Commands::Watch { session } => watch::execute(session, &ctx).await?,
        Commands::Status { session } => status::execute(session, &ctx).await?,
        Commands::Stop { session } => stop::execute(session, &ctx).await?,
        Commands::Config(cmd) => config::execute(cmd, &ctx)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
