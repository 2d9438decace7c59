// ABOUTME: CLI hosts command - list configured robots and where their password comes from

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use robodeploy::config::{DeployConfig, RobotConfig};
use robodeploy::credentials::{self, CredentialSource};
use robodeploy::DeployError;

use super::OutputFormat;

/// One robot as displayed in the list
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: &'static str,
    pub build_command: Option<String>,
}

impl HostInfo {
    fn new(name: &str, robot: &RobotConfig) -> Self {
        let credential = match credentials::resolve_password(name, robot) {
            Ok((_, CredentialSource::Config)) => "config",
            Ok((_, CredentialSource::Environment)) => "environment",
            Ok((_, CredentialSource::Keychain)) => "keychain",
            Err(DeployError::MissingCredential(_)) => "missing",
            Err(_) => "unavailable",
        };
        Self {
            name: name.to_string(),
            host: robot.host.clone(),
            port: robot.port,
            username: robot.username.clone(),
            credential,
            build_command: robot.build_command.clone(),
        }
    }
}

/// Execute the hosts command
pub fn execute(format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
    let config = DeployConfig::load(config_path).context("Failed to load configuration")?;
    let hosts: Vec<HostInfo> = config
        .robots
        .iter()
        .map(|(name, robot)| HostInfo::new(name, robot))
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&hosts)?);
        }
        OutputFormat::Text => {
            if hosts.is_empty() {
                println!("No robots configured.");
                return Ok(());
            }
            println!("{:<12} {:<28} {:<12}", "ROBOT", "ADDRESS", "PASSWORD");
            for host in &hosts {
                let address = format!("{}@{}:{}", host.username, host.host, host.port);
                println!("{:<12} {:<28} {:<12}", host.name, address, host.credential);
            }
        }
    }

    Ok(())
}
