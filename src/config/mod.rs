// ABOUTME: Configuration management for robodeploy
// Handles deploy paths, the remote start command and the table of known robots

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level deploy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Local build-output directory that gets mirrored onto each robot
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Absolute destination directory on the robot (must already exist)
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Command line that starts the deployed program on the robot.
    /// Defaults to running `./main` inside `remote_dir` with stderr merged.
    #[serde(default)]
    pub command: Option<String>,

    /// TCP connect and SSH handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Copy local modification times onto uploaded files
    #[serde(default = "default_true")]
    pub preserve_mtime: bool,

    /// Treat a nonzero remote exit status as a failed deploy
    #[serde(default = "default_true")]
    pub fail_on_exit_status: bool,

    /// Known robots keyed by selector name
    #[serde(default)]
    pub robots: BTreeMap<String, RobotConfig>,
}

/// One configuration file as written: only the keys it actually sets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayer {
    pub local_dir: Option<PathBuf>,
    pub remote_dir: Option<String>,
    pub command: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub preserve_mtime: Option<bool>,
    pub fail_on_exit_status: Option<bool>,
    #[serde(default)]
    pub robots: BTreeMap<String, RobotConfig>,
}

/// Connection details for one robot controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Hostname or IP address
    pub host: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    #[serde(default = "default_username")]
    pub username: String,

    /// Password; when absent it is looked up in the environment or keychain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Local command that builds this robot's artifacts before syncing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,

    /// Overrides the global `local_dir` for this robot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,
}

impl RobotConfig {
    /// Robot reachable under `<name>.local` with ev3dev defaults
    pub fn mdns_default(name: &str) -> Self {
        Self {
            host: format!("{name}.local"),
            port: default_port(),
            username: default_username(),
            password: None,
            build_command: None,
            local_dir: None,
        }
    }
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("bin")
}

fn default_remote_dir() -> String {
    "/home/robot/bin".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_port() -> u16 {
    22
}

fn default_username() -> String {
    "robot".to_string()
}

fn default_true() -> bool {
    true
}

impl DeployConfig {
    /// Load configuration from default locations, then from `explicit` if given
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        for path in Self::get_config_paths() {
            if path.exists() {
                config.merge(Self::read_file(&path)?);
            }
        }

        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            config.merge(Self::read_file(path)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a single configuration file
    pub fn read_file(path: &Path) -> Result<ConfigLayer> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get configuration file paths in order of increasing precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/robodeploy/config.toml")];

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".robodeploy").join("config.toml"));
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("robodeploy.toml"));
        }

        paths
    }

    /// Merge one config file over this one; every key the file sets wins
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(local_dir) = layer.local_dir {
            self.local_dir = local_dir;
        }
        if let Some(remote_dir) = layer.remote_dir {
            self.remote_dir = remote_dir;
        }
        if layer.command.is_some() {
            self.command = layer.command;
        }
        if let Some(secs) = layer.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(preserve_mtime) = layer.preserve_mtime {
            self.preserve_mtime = preserve_mtime;
        }
        if let Some(fail_on_exit_status) = layer.fail_on_exit_status {
            self.fail_on_exit_status = fail_on_exit_status;
        }

        // Robot entries replace built-ins wholesale
        self.robots.extend(layer.robots);
    }

    /// Reject configurations that cannot possibly deploy
    pub fn validate(&self) -> Result<()> {
        if !self.remote_dir.starts_with('/') {
            anyhow::bail!("remote_dir must be an absolute path, got '{}'", self.remote_dir);
        }
        for (name, robot) in &self.robots {
            if name.eq_ignore_ascii_case("all") {
                anyhow::bail!("'all' is reserved and cannot be used as a robot name");
            }
            if robot.host.trim().is_empty() {
                anyhow::bail!("Robot '{name}' has an empty host");
            }
        }
        Ok(())
    }

    /// Command line executed on each robot after syncing
    pub fn command_line(&self) -> String {
        self.command.clone().unwrap_or_else(|| {
            let dir = shell_escape::unix::escape(self.remote_dir.as_str().into());
            format!("cd {dir} && ./main 2>&1")
        })
    }

    /// Local directory to sync for the given robot
    pub fn local_dir_for(&self, robot: &str) -> &Path {
        self.robots
            .get(robot)
            .and_then(|r| r.local_dir.as_deref())
            .unwrap_or(&self.local_dir)
    }

    /// TCP connect / handshake timeout
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        let robots = ["ferenc", "viktor"]
            .into_iter()
            .map(|name| (name.to_string(), RobotConfig::mdns_default(name)))
            .collect();

        Self {
            local_dir: default_local_dir(),
            remote_dir: default_remote_dir(),
            command: None,
            connect_timeout_secs: default_connect_timeout(),
            preserve_mtime: true,
            fail_on_exit_status: true,
            robots,
        }
    }
}
