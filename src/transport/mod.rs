// ABOUTME: Session capabilities consumed by the synchronizer and the remote runner
//
// The core never talks to ssh2 directly. It is written against these traits so
// the same code runs over a live SFTP/SSH session or an in-memory fake.

pub mod ssh;

use std::io::Read;
use std::path::Path;

use crate::error::Result;
use crate::hosts::HostTarget;

pub use ssh::{SftpSession, SshCommandSession, SshConnector};

/// File-transfer capabilities of one authenticated session
#[cfg_attr(test, mockall::automock)]
pub trait SyncSession {
    /// Names (not paths) of the immediate entries of a remote directory
    fn list_dir(&mut self, path: &str) -> Result<Vec<String>>;

    /// Modification time of a remote file in whole seconds, if the server reports one
    fn modified(&mut self, path: &str) -> Result<Option<u64>>;

    /// Copy a local file to `remote`, overwriting whatever is there
    fn upload(&mut self, local: &Path, remote: &str) -> Result<()>;

    /// Create a remote directory. With `ignore_existing`, an already existing
    /// directory is not an error.
    fn create_dir(&mut self, path: &str, ignore_existing: bool) -> Result<()>;
}

/// A launched remote command. Reading yields its merged stdout/stderr until
/// the remote side closes the stream.
pub trait RemoteProcess: Read + Send {
    /// Wait for the channel to close and return the exit status, if reported
    fn wait(&mut self) -> Result<Option<i32>>;
}

/// Command-execution capability of one authenticated session
pub trait CommandSession: Send {
    /// Start `command_line` remotely. Its stdin is closed immediately.
    fn execute(&mut self, command_line: &str) -> Result<Box<dyn RemoteProcess>>;
}

/// Opens sessions to robots
pub trait Connector: Send + Sync + 'static {
    type Files: SyncSession + Send + 'static;
    type Shell: CommandSession + 'static;

    /// Open a session used for one robot's directory sync
    fn open_sync(&self, target: &HostTarget) -> Result<Self::Files>;

    /// Open a session used for one remote command execution
    fn open_command(&self, target: &HostTarget) -> Result<Self::Shell>;
}
