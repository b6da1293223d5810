//! rmirror - remote directory mirroring over rsync/ssh
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use rmirror::cli::{Cli, Commands};
use rmirror::config::ConfigManager;
use rmirror::error::RmirrorResult;
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
            } else if e.is_retryable() {
                eprintln!("{} the failure looks transient, retrying may succeed", style("Hint:").yellow());
            }
            ExitCode::from(e.class().exit_code())
        }
    }
}

async fn run() -> RmirrorResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);
    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Sync(args) => rmirror::cli::commands::sync(args, &config).await,
        Commands::Status(args) => rmirror::cli::commands::status(args, &config).await,
        Commands::List(args) => rmirror::cli::commands::list(args, &config).await,
        Commands::Cleanup(args) => rmirror::cli::commands::cleanup(args, &config).await,
        Commands::Unlock(args) => rmirror::cli::commands::unlock(args, &config).await,
        Commands::Check(args) => rmirror::cli::commands::check(args, &config).await,
        Commands::Config(args) => {
            rmirror::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// RUST_LOG wins; otherwise 0 = warn (spinners only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("rmirror=warn"),
        1 => EnvFilter::new("rmirror=info"),
        _ => EnvFilter::new("rmirror=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
