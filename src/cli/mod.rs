// ABOUTME: CLI argument parsing and command routing for robodeploy
//
// Provides command-line interface for:
// - Deploying to robots: sync then run (default, or `deploy`)
// - Syncing without running (sync) and running without syncing (run)
// - Listing known robots (hosts)
// - Storing a robot password in the keychain (auth)

pub mod auth;
pub mod deploy;
pub mod hosts;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deploy build artifacts to robot controllers and start them
#[derive(Parser)]
#[command(name = "robodeploy")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Robot to deploy to: a robot name or "all"
    pub target: Option<String>,

    /// Extra config file merged over the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for commands
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build (if configured), sync and start the program (default)
    Deploy(TargetArgs),

    /// Build (if configured) and sync, without starting anything
    Sync(TargetArgs),

    /// Start the already deployed program without syncing
    Run(TargetArgs),

    /// List known robots
    Hosts,

    /// Store a robot's password in the system keychain
    Auth(AuthArgs),
}

/// Robot selection shared by deploy, sync and run
#[derive(clap::Args)]
pub struct TargetArgs {
    /// A robot name or "all"; anything else does nothing
    pub target: Option<String>,
}

/// Arguments for the auth command
#[derive(clap::Args)]
pub struct AuthArgs {
    /// Robot name
    pub robot: String,
}
