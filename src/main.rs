// ABOUTME: Main entry point for robodeploy
//
// Binary: robodeploy
// Usage: robodeploy [TARGET] | robodeploy [COMMAND]
// - No command: deploy to TARGET (sync, then run)
// - deploy/sync/run: the full pipeline or one half of it
// - hosts: list known robots
// - auth: store a robot password in the keychain

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

mod cli;

use robodeploy::deploy::Stages;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();
    let config = args.config.as_deref();

    match args.command {
        Some(cli::Commands::Deploy(target)) => cli::deploy::execute(target, Stages::DEPLOY, config).await,
        Some(cli::Commands::Sync(target)) => cli::deploy::execute(target, Stages::SYNC_ONLY, config).await,
        Some(cli::Commands::Run(target)) => cli::deploy::execute(target, Stages::RUN_ONLY, config).await,
        Some(cli::Commands::Hosts) => cli::hosts::execute(args.format, config),
        Some(cli::Commands::Auth(auth_args)) => cli::auth::execute(&auth_args, config),
        None => {
            let target = cli::TargetArgs {
                target: args.target,
            };
            cli::deploy::execute(target, Stages::DEPLOY, config).await
        }
    }
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use tracing_subscriber::prelude::*;

    // Create log directory if it doesn't exist
    let log_dir = dirs::home_dir()
        .map(|home| home.join(".robodeploy").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".robodeploy/logs"));

    let _ = std::fs::create_dir_all(&log_dir);

    // Create JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "robodeploy-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "robodeploy=info".into());

    match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()             // Output in JSON Lines format
                    .with_target(true)  // Include target module in JSON
                    .with_writer(file)
                    .with_ansi(false),
            )
            .with(filter)
            .init(),
        Err(e) => {
            // No writable log dir: only warnings, on stderr, so stdout stays clean
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(tracing_subscriber::EnvFilter::new("robodeploy=warn"))
                .init();
            tracing::warn!("Could not open log file {}: {}", log_file.display(), e);
        }
    }
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs in ~/.robodeploy/logs for more details.");
    }));
}
