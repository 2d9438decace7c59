// ABOUTME: Runs one command on one robot and streams its output line by line
//
// Blocking: returns only after the remote side closes its output stream.

use std::io::{self, BufRead, BufReader, Read};

use tracing::{debug, info};

use crate::console::Console;
use crate::error::{DeployError, Result};
use crate::transport::CommandSession;

/// Lazy sequence of lines read from a byte stream.
///
/// Yields each line as soon as its newline (or end of stream) arrives. Line
/// endings are stripped and invalid UTF-8 is replaced rather than rejected.
pub struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }
}

impl<R: Read> Iterator for OutputLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        loop {
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
        }

        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Result of a remote command that ran to end of stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Number of output lines forwarded
    pub lines: usize,
    /// Exit status, if the server reported one
    pub exit_status: Option<i32>,
}

impl RunOutcome {
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_status, None | Some(0))
    }
}

/// Execute `command_line` through `session`, forwarding every output line to
/// the console under `host`.
pub fn run<S: CommandSession + ?Sized>(
    session: &mut S,
    command_line: &str,
    host: &str,
    console: &Console,
) -> Result<RunOutcome> {
    info!("Running `{}` on {}", command_line, host);
    let mut process = session.execute(command_line)?;

    let mut lines = 0;
    for line in OutputLines::new(&mut process) {
        let line = line.map_err(|source| DeployError::Exec {
            command: command_line.to_string(),
            source,
        })?;
        console.output(host, line);
        lines += 1;
    }

    let exit_status = process.wait()?;
    debug!("`{}` on {} closed after {} lines, status {:?}", command_line, host, lines, exit_status);

    Ok(RunOutcome { lines, exit_status })
}
