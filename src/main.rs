//! pcache - persistent read cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use pcache::cli::{Cli, CommandContext, Commands};
use pcache::config::ConfigManager;
use pcache::error::PcacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PcacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("pcache=warn"),
        1 => EnvFilter::new("pcache=info"),
        _ => EnvFilter::new("pcache=debug"),
    };

    // Logs go to stderr; stdout carries file data for `read`
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config {}", config_manager.path().display());
    let ctx = CommandContext::new(&cli, config, config_manager.path().to_path_buf());

    match cli.command {
        Commands::Read(args) => pcache::cli::commands::read(args, &ctx).await,
        Commands::Warm(args) => pcache::cli::commands::warm(args, &ctx).await,
        Commands::Status(args) => pcache::cli::commands::status(args, &ctx).await,
        Commands::Forget(args) => pcache::cli::commands::forget(args, &ctx).await,
        Commands::Clear(args) => pcache::cli::commands::clear(args, &ctx).await,
        Commands::Config(args) => pcache::cli::commands::config(args, &ctx).await,
    }
}
