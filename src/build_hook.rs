// ABOUTME: Optional local build step run before a robot is synced
// Runs the configured shell command and streams its output to the console

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::console::Console;
use crate::error::{DeployError, Result};

/// Environment variable telling the build which robot it targets
pub const ROBOT_ENV: &str = "ROBODEPLOY_ROBOT";

/// Run `command` through `sh -c` for `robot`, forwarding stdout and stderr lines
pub async fn run_build(robot: &str, command: &str, console: &Console) -> Result<()> {
    info!("Building for {}: {}", robot, command);
    console.status(robot, format!("build: {command}"));

    let build_err = |status: String| DeployError::Build {
        command: command.to_string(),
        status,
    };

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .env(ROBOT_ENV, robot)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| build_err(format!("could not start: {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tokio::join!(
        forward_lines(stdout, robot, console),
        forward_lines(stderr, robot, console)
    );

    let status = child
        .wait()
        .await
        .map_err(|e| build_err(format!("could not wait: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(build_err(status.to_string()))
    }
}

async fn forward_lines<R>(stream: Option<R>, robot: &str, console: &Console)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    // Raw bytes so a non-UTF-8 line never stops the drain and stalls the build
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                console.status(robot, String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => {
                warn!("Stopped reading build output for {}: {}", robot, e);
                break;
            }
        }
    }
}
