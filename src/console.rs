// ABOUTME: Shared operator console for concurrent robot units
//
// Every unit (sync or remote run) sends whole lines over an unbounded channel;
// a single writer drains the channel, so lines from different robots interleave
// but are never torn.

use std::fmt;
use std::io::{self, Write};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What produced a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Directory created or file uploaded
    Sync,
    /// A line printed by the remote program
    Output,
    /// Pipeline progress (connecting, starting, finished)
    Status,
    /// A host-scoped failure
    Failure,
}

/// One line destined for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub host: String,
    pub kind: LineKind,
    pub text: String,
}

impl fmt::Display for ConsoleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LineKind::Failure => write!(f, "[{}] error: {}", self.host, self.text),
            _ => write!(f, "[{}] {}", self.host, self.text),
        }
    }
}

/// Cloneable handle that units use to report lines
#[derive(Debug, Clone)]
pub struct Console {
    tx: mpsc::UnboundedSender<ConsoleLine>,
}

impl Console {
    /// Create a console and the receiving end of its line channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConsoleLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a console whose lines are written to standard output
    pub fn stdout() -> (Self, ConsoleWriter) {
        let (console, rx) = Self::channel();
        (console, ConsoleWriter::spawn(rx, io::stdout()))
    }

    /// Send one line. Lines sent after the writer has stopped are dropped.
    pub fn emit(&self, host: &str, kind: LineKind, text: impl Into<String>) {
        let _ = self.tx.send(ConsoleLine {
            host: host.to_string(),
            kind,
            text: text.into(),
        });
    }

    pub fn sync(&self, host: &str, text: impl Into<String>) {
        self.emit(host, LineKind::Sync, text);
    }

    pub fn output(&self, host: &str, text: impl Into<String>) {
        self.emit(host, LineKind::Output, text);
    }

    pub fn status(&self, host: &str, text: impl Into<String>) {
        self.emit(host, LineKind::Status, text);
    }

    pub fn failure(&self, host: &str, text: impl Into<String>) {
        self.emit(host, LineKind::Failure, text);
    }
}

/// Background task that owns the real output stream
#[derive(Debug)]
pub struct ConsoleWriter {
    handle: JoinHandle<io::Result<()>>,
}

impl ConsoleWriter {
    /// Drain `rx` into `writer` until every `Console` clone is dropped
    pub fn spawn<W>(mut rx: mpsc::UnboundedReceiver<ConsoleLine>, mut writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(move || {
            while let Some(line) = rx.blocking_recv() {
                // One write per line keeps it atomic with respect to other writers
                let rendered = format!("{line}\n");
                writer.write_all(rendered.as_bytes())?;
                writer.flush()?;
            }
            Ok(())
        });
        Self { handle }
    }

    /// Wait for the writer to flush everything. Drop all `Console` handles first.
    pub async fn finish(self) -> io::Result<()> {
        self.handle
            .await
            .map_err(|e| io::Error::other(format!("console writer task failed: {e}")))?
    }
}

/// Collect every line currently buffered in `rx`
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ConsoleLine>) -> Vec<ConsoleLine> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}
