// ABOUTME: Robot password lookup and storage
// Resolves a password from config, environment, then the system keychain (keyring crate)

use keyring::Entry;

use crate::config::RobotConfig;
use crate::error::{DeployError, Result};

const SERVICE_NAME: &str = "robodeploy";

/// Where a resolved password came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Keychain,
}

/// Name of the environment variable holding a robot's password
pub fn env_var_name(robot: &str) -> String {
    let sanitized: String = robot
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("ROBODEPLOY_{sanitized}_PASSWORD")
}

/// Resolve the password for `robot`, trying config, environment, then keychain
pub fn resolve_password(robot: &str, config: &RobotConfig) -> Result<(String, CredentialSource)> {
    resolve_with(robot, config, |name| std::env::var(name).ok(), get_keychain_password)
}

/// Resolution with injectable lookups (testable version)
pub fn resolve_with<E, K>(
    robot: &str,
    config: &RobotConfig,
    env_lookup: E,
    keychain_lookup: K,
) -> Result<(String, CredentialSource)>
where
    E: FnOnce(&str) -> Option<String>,
    K: FnOnce(&str) -> Result<Option<String>>,
{
    if let Some(password) = &config.password {
        return Ok((password.clone(), CredentialSource::Config));
    }

    if let Some(password) = env_lookup(&env_var_name(robot)) {
        return Ok((password, CredentialSource::Environment));
    }

    match keychain_lookup(robot)? {
        Some(password) => Ok((password, CredentialSource::Keychain)),
        None => Err(DeployError::MissingCredential(robot.to_string())),
    }
}

/// Store a robot's password in the system keychain
pub fn store_password(robot: &str, password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(DeployError::Credential("Password cannot be empty".to_string()));
    }

    let entry = Entry::new(SERVICE_NAME, robot)
        .map_err(|e| DeployError::Credential(format!("Failed to create keyring entry: {e}")))?;

    entry
        .set_password(password)
        .map_err(|e| DeployError::Credential(format!("Failed to store password in keychain: {e}")))?;

    tracing::info!("Stored password for robot: {}", robot);
    Ok(())
}

/// Retrieve a robot's password from the system keychain
pub fn get_keychain_password(robot: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE_NAME, robot)
        .map_err(|e| DeployError::Credential(format!("Failed to create keyring entry: {e}")))?;

    match entry.get_password() {
        Ok(password) => {
            tracing::debug!("Retrieved keychain password for: {}", robot);
            Ok(Some(password))
        }
        Err(keyring::Error::NoEntry) => {
            tracing::debug!("No keychain password for: {}", robot);
            Ok(None)
        }
        Err(e) => {
            tracing::warn!("Failed to read keychain password for {}: {}", robot, e);
            Err(DeployError::Credential(format!("Failed to retrieve password: {e}")))
        }
    }
}
