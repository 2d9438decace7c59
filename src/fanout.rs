// ABOUTME: Fan-out/fan-in of remote runs across robots
//
// Starts one blocking unit per robot before awaiting any of them, then joins
// all of them. A failing robot never cancels or hides the others.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::console::Console;
use crate::error::{DeployError, Result};
use crate::runner::{self, RunOutcome};
use crate::transport::CommandSession;

/// Outcome of one robot's unit
#[derive(Debug)]
pub struct HostRun {
    pub host: String,
    pub result: Result<RunOutcome>,
}

impl HostRun {
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Joined results of every unit, in launch order
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub runs: Vec<HostRun>,
}

impl FanoutReport {
    pub fn failures(&self) -> impl Iterator<Item = &HostRun> {
        self.runs.iter().filter(|run| !run.is_ok())
    }

    pub fn all_succeeded(&self) -> bool {
        self.runs.iter().all(HostRun::is_ok)
    }
}

/// Runs the same command on many robots at once
#[derive(Debug, Clone)]
pub struct FanOut {
    command_line: String,
    fail_on_exit_status: bool,
    console: Console,
}

impl FanOut {
    pub fn new(command_line: impl Into<String>, console: Console) -> Self {
        Self {
            command_line: command_line.into(),
            fail_on_exit_status: true,
            console,
        }
    }

    /// Whether a nonzero remote exit status counts as a failed unit
    #[must_use]
    pub const fn fail_on_exit_status(mut self, enabled: bool) -> Self {
        self.fail_on_exit_status = enabled;
        self
    }

    /// Launch one unit per session, then wait for every one of them
    pub async fn run_all<S>(&self, sessions: Vec<(String, S)>) -> FanoutReport
    where
        S: CommandSession + 'static,
    {
        info!("Launching `{}` on {} robot(s)", self.command_line, sessions.len());

        let handles: Vec<(String, JoinHandle<Result<RunOutcome>>)> = sessions
            .into_iter()
            .map(|(host, session)| {
                let handle = self.spawn_unit(host.clone(), session);
                (host, handle)
            })
            .collect();

        let mut runs = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let result = handle.await.unwrap_or_else(|join_err| {
                self.console
                    .failure(&host, format!("runner task aborted: {join_err}"));
                Err(DeployError::Task(join_err.to_string()))
            });
            runs.push(HostRun { host, result });
        }

        let failed = runs.iter().filter(|run| !run.is_ok()).count();
        if failed > 0 {
            warn!("{} of {} remote run(s) failed", failed, runs.len());
        }
        FanoutReport { runs }
    }

    fn spawn_unit<S>(&self, host: String, mut session: S) -> JoinHandle<Result<RunOutcome>>
    where
        S: CommandSession + 'static,
    {
        let console = self.console.clone();
        let command_line = self.command_line.clone();
        let fail_on_exit_status = self.fail_on_exit_status;

        tokio::task::spawn_blocking(move || {
            console.status(&host, format!("$ {command_line}"));
            let result = runner::run(&mut session, &command_line, &host, &console).and_then(|outcome| {
                match outcome.exit_status {
                    Some(code) if code != 0 && fail_on_exit_status => {
                        Err(DeployError::ExitStatus { code })
                    }
                    Some(code) => {
                        console.status(&host, format!("exited with status {code}"));
                        Ok(outcome)
                    }
                    None => {
                        console.status(&host, "finished");
                        Ok(outcome)
                    }
                }
            });
            if let Err(e) = &result {
                console.failure(&host, format!("run: {e}"));
            }
            result
        })
    }
}
