// ABOUTME: Host targets and robot selection
//
// A HostTarget is the immutable identity of one robot for the duration of a
// run. The Selector turns the operator's single CLI argument into a RunSet,
// which never contains the same robot twice.

use std::fmt;

use serde::Serialize;

use crate::config::DeployConfig;
use crate::credentials::{self, CredentialSource};
use crate::error::Result;

/// One remote robot controller
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct HostTarget {
    /// Selector name, e.g. `ferenc`
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    #[serde(skip)]
    pub password: String,
}

impl HostTarget {
    /// `user@host:port`
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.username, self.hostname, self.port)
    }
}

// Keeps the password out of logs
impl fmt::Debug for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTarget")
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Which robots the operator asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every known robot
    All,
    /// A single robot by name
    One(String),
}

impl Selector {
    /// Parse a selector case-insensitively against the known robot names.
    ///
    /// Returns `None` for unknown names; callers decide whether that is an
    /// error or a no-op.
    pub fn parse(raw: &str, config: &DeployConfig) -> Option<Self> {
        let wanted = raw.trim().to_lowercase();
        if wanted == "all" {
            return Some(Self::All);
        }
        config
            .robots
            .keys()
            .find(|name| name.to_lowercase() == wanted)
            .map(|name| Self::One(name.clone()))
    }

    /// Robot names selected, in config order, without duplicates
    pub fn names<'a>(&'a self, config: &'a DeployConfig) -> Vec<&'a str> {
        match self {
            Self::All => config.robots.keys().map(String::as_str).collect(),
            Self::One(name) => vec![name.as_str()],
        }
    }
}

/// A robot whose credential could not be resolved
#[derive(Debug)]
pub struct Unresolved {
    pub name: String,
    pub error: crate::error::DeployError,
}

/// The set of robots targeted by this invocation
#[derive(Debug, Clone, Default)]
pub struct RunSet {
    targets: Vec<HostTarget>,
}

impl RunSet {
    /// Build a run set, dropping any target whose name is already present
    pub fn new(targets: impl IntoIterator<Item = HostTarget>) -> Self {
        let mut set = Self::default();
        for target in targets {
            set.insert(target);
        }
        set
    }

    /// Add a target; returns false if a robot with that name is already present
    pub fn insert(&mut self, target: HostTarget) -> bool {
        if self.targets.iter().any(|t| t.name == target.name) {
            return false;
        }
        self.targets.push(target);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HostTarget> {
        self.targets.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    /// Resolve the selected robots into targets, looking up each password.
    ///
    /// Robots without a usable credential are returned separately so the
    /// caller can report them without aborting the others.
    pub fn resolve(selector: &Selector, config: &DeployConfig) -> (Self, Vec<Unresolved>) {
        Self::resolve_with(selector, config, credentials::resolve_password)
    }

    /// Resolution with an injectable password lookup (testable version)
    pub fn resolve_with<F>(
        selector: &Selector,
        config: &DeployConfig,
        mut lookup: F,
    ) -> (Self, Vec<Unresolved>)
    where
        F: FnMut(&str, &crate::config::RobotConfig) -> Result<(String, CredentialSource)>,
    {
        let mut set = Self::default();
        let mut unresolved = Vec::new();

        for name in selector.names(config) {
            let Some(robot) = config.robots.get(name) else {
                continue;
            };
            match lookup(name, robot) {
                Ok((password, source)) => {
                    tracing::debug!("Password for {} from {:?}", name, source);
                    set.insert(HostTarget {
                        name: name.to_string(),
                        hostname: robot.host.clone(),
                        port: robot.port,
                        username: robot.username.clone(),
                        password,
                    });
                }
                Err(error) => unresolved.push(Unresolved {
                    name: name.to_string(),
                    error,
                }),
            }
        }

        (set, unresolved)
    }
}

impl<'a> IntoIterator for &'a RunSet {
    type Item = &'a HostTarget;
    type IntoIter = std::slice::Iter<'a, HostTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}
