// ABOUTME: Deploy pipeline: build, sync each robot, then run everywhere at once
//
// Per robot, sync happens-before run. A robot that fails at any stage is
// recorded and dropped from later stages; the others carry on. Failures are
// surfaced once, after every unit has finished.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::build_hook;
use crate::config::DeployConfig;
use crate::console::Console;
use crate::error::DeployError;
use crate::fanout::{FanOut, HostRun};
use crate::hosts::{HostTarget, RunSet, Unresolved};
use crate::runner::RunOutcome;
use crate::sync::{SyncReport, Synchronizer};
use crate::transport::Connector;

/// Pipeline stage a robot failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Credentials,
    Build,
    Connect,
    Sync,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Credentials => "credentials",
            Self::Build => "build",
            Self::Connect => "connect",
            Self::Sync => "sync",
            Self::Run => "run",
        };
        f.write_str(name)
    }
}

/// A host-scoped failure
#[derive(Debug)]
pub struct HostFailure {
    pub host: String,
    pub stage: Stage,
    pub error: DeployError,
}

/// Which stages to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub sync: bool,
    pub run: bool,
}

impl Stages {
    pub const DEPLOY: Self = Self { sync: true, run: true };
    pub const SYNC_ONLY: Self = Self { sync: true, run: false };
    pub const RUN_ONLY: Self = Self { sync: false, run: true };
}

/// Everything that happened during one invocation
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Robots attempted, including ones that failed before connecting
    pub attempted: usize,
    pub synced: Vec<(String, SyncReport)>,
    /// Robots whose remote command ran to completion
    pub runs: Vec<(String, RunOutcome)>,
    pub failures: Vec<HostFailure>,
}

impl DeployReport {
    /// Record robots dropped because their credentials could not be resolved
    pub fn record_unresolved(&mut self, unresolved: Vec<Unresolved>, console: &Console) {
        for Unresolved { name, error } in unresolved {
            console.failure(&name, format!("{}: {error}", Stage::Credentials));
            self.attempted += 1;
            self.failures.push(HostFailure {
                host: name,
                stage: Stage::Credentials,
                error,
            });
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse into a single error naming every failed robot
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("  {} ({}): {}", f.host, f.stage, f.error))
            .collect();
        Err(anyhow::anyhow!(
            "{} of {} robot(s) failed:\n{}",
            self.failures.len(),
            self.attempted,
            details.join("\n")
        ))
    }
}

/// Drives the deploy pipeline over any `Connector`
pub struct Deployer<C: Connector> {
    connector: Arc<C>,
    config: DeployConfig,
    console: Console,
}

impl<C: Connector> Deployer<C> {
    pub fn new(connector: C, config: DeployConfig, console: Console) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            console,
        }
    }

    /// Run the requested stages against every robot in `run_set`
    pub async fn deploy(&self, run_set: &RunSet, stages: Stages) -> DeployReport {
        self.deploy_with_report(DeployReport::default(), run_set, stages)
            .await
    }

    /// Like `deploy`, continuing a report that already holds earlier failures
    /// (for example robots whose credentials could not be resolved)
    pub async fn deploy_with_report(
        &self,
        mut report: DeployReport,
        run_set: &RunSet,
        stages: Stages,
    ) -> DeployReport {
        report.attempted += run_set.len();

        let ready: Vec<HostTarget> = if stages.sync {
            self.sync_phase(run_set, &mut report).await
        } else {
            run_set.iter().cloned().collect()
        };

        if stages.run && !ready.is_empty() {
            self.run_phase(ready, &mut report).await;
        }

        if !report.is_success() {
            warn!("{} robot(s) failed", report.failures.len());
        }
        report
    }

    /// Build and sync robot by robot; builds share the local output directory
    async fn sync_phase(&self, run_set: &RunSet, report: &mut DeployReport) -> Vec<HostTarget> {
        let mut ready = Vec::new();

        for target in run_set {
            match self.prepare_host(target).await {
                Ok(sync_report) => {
                    report.synced.push((target.name.clone(), sync_report));
                    ready.push(target.clone());
                }
                Err((stage, error)) => self.fail(report, &target.name, stage, error),
            }
        }

        ready
    }

    async fn prepare_host(
        &self,
        target: &HostTarget,
    ) -> std::result::Result<SyncReport, (Stage, DeployError)> {
        let robot = self.config.robots.get(&target.name);
        if let Some(command) = robot.and_then(|r| r.build_command.as_deref()) {
            build_hook::run_build(&target.name, command, &self.console)
                .await
                .map_err(|e| (Stage::Build, e))?;
        }

        let local_dir = self.config.local_dir_for(&target.name).to_path_buf();
        self.sync_host(target.clone(), local_dir).await
    }

    async fn sync_host(
        &self,
        target: HostTarget,
        local_dir: PathBuf,
    ) -> std::result::Result<SyncReport, (Stage, DeployError)> {
        let connector = Arc::clone(&self.connector);
        let console = self.console.clone();
        let remote_dir = self.config.remote_dir.clone();

        let joined = tokio::task::spawn_blocking(move || {
            console.status(&target.name, format!("connecting to {}", target.address()));
            let mut session = connector
                .open_sync(&target)
                .map_err(|e| (Stage::Connect, e))?;
            Synchronizer::new(&mut session, &console, &target.name)
                .sync(&local_dir, &remote_dir)
                .map_err(|e| (Stage::Sync, e))
        })
        .await;

        joined.unwrap_or_else(|join_err| Err((Stage::Sync, DeployError::Task(join_err.to_string()))))
    }

    /// Open one command session per robot concurrently, then fan out the run
    async fn run_phase(&self, ready: Vec<HostTarget>, report: &mut DeployReport) {
        let opening: Vec<_> = ready
            .into_iter()
            .map(|target| {
                let connector = Arc::clone(&self.connector);
                let name = target.name.clone();
                (name, tokio::task::spawn_blocking(move || connector.open_command(&target)))
            })
            .collect();

        let mut sessions = Vec::new();
        for (name, handle) in opening {
            match handle.await {
                Ok(Ok(session)) => sessions.push((name, session)),
                Ok(Err(error)) => self.fail(report, &name, Stage::Connect, error),
                Err(join_err) => {
                    self.fail(report, &name, Stage::Connect, DeployError::Task(join_err.to_string()));
                }
            }
        }

        let fanout = FanOut::new(self.config.command_line(), self.console.clone())
            .fail_on_exit_status(self.config.fail_on_exit_status);

        // FanOut already printed each failure as it happened
        for HostRun { host, result } in fanout.run_all(sessions).await.runs {
            match result {
                Ok(outcome) => report.runs.push((host, outcome)),
                Err(error) => report.failures.push(HostFailure {
                    host,
                    stage: Stage::Run,
                    error,
                }),
            }
        }
        info!("Run phase finished, {} robot(s) completed", report.runs.len());
    }

    fn fail(&self, report: &mut DeployReport, host: &str, stage: Stage, error: DeployError) {
        self.console.failure(host, format!("{stage}: {error}"));
        report.failures.push(HostFailure {
            host: host.to_string(),
            stage,
            error,
        });
    }
}
