// ABOUTME: CLI deploy/sync/run commands
//
// Resolves the selector against the configured robots and drives the pipeline.
// A missing or unknown selector is a successful no-op.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use robodeploy::config::DeployConfig;
use robodeploy::console::Console;
use robodeploy::deploy::{DeployReport, Deployer, Stages};
use robodeploy::hosts::{RunSet, Selector};
use robodeploy::transport::SshConnector;

use super::TargetArgs;

/// Execute a deploy, sync or run command
pub async fn execute(args: TargetArgs, stages: Stages, config_path: Option<&Path>) -> Result<()> {
    let config = DeployConfig::load(config_path).context("Failed to load configuration")?;

    let Some(raw) = args.target.as_deref() else {
        debug!("No robot selected, nothing to do");
        return Ok(());
    };
    let Some(selector) = Selector::parse(raw, &config) else {
        debug!("Unknown robot selector '{}', nothing to do", raw);
        return Ok(());
    };

    let (run_set, unresolved) = RunSet::resolve(&selector, &config);
    info!("Selected robots: {:?}, stages: {:?}", run_set.names(), stages);

    let (console, writer) = Console::stdout();
    let connector = SshConnector::new(config.connect_timeout(), config.preserve_mtime);
    let deployer = Deployer::new(connector, config, console.clone());

    // Credential failures are reported before any robot is contacted
    let mut report = DeployReport::default();
    report.record_unresolved(unresolved, &console);
    let report = deployer.deploy_with_report(report, &run_set, stages).await;

    // The writer exits once every console handle is gone
    drop(deployer);
    drop(console);
    writer.finish().await.context("Failed to flush console output")?;

    for (robot, sync) in &report.synced {
        println!(
            "{robot}: {} uploaded, {} director{} created, {} up to date",
            sync.uploaded.len(),
            sync.created_dirs.len(),
            if sync.created_dirs.len() == 1 { "y" } else { "ies" },
            sync.up_to_date
        );
    }

    report.into_result()
}
