// ABOUTME: CLI auth command - store a robot password in the system keychain

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;

use robodeploy::config::DeployConfig;
use robodeploy::credentials;

use super::AuthArgs;

/// Execute the auth command
pub fn execute(args: &AuthArgs, config_path: Option<&Path>) -> Result<()> {
    let config = DeployConfig::load(config_path).context("Failed to load configuration")?;
    let robot = config
        .robots
        .get(&args.robot)
        .with_context(|| format!("Unknown robot '{}'", args.robot))?;

    print!("Password for {}@{}: ", robot.username, robot.host);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin()
        .lock()
        .read_line(&mut password)
        .context("Failed to read password")?;
    let password = password.trim_end_matches(['\r', '\n']);

    credentials::store_password(&args.robot, password)?;
    println!("Stored password for '{}' in the system keychain.", args.robot);
    Ok(())
}
