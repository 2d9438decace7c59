// ABOUTME: Error taxonomy for robot deployment
//
// Every failure that can happen while deploying to one robot maps to a
// DeployError variant. Failures are host-scoped: the pipeline records them per
// robot and keeps going with the others.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Remote filesystem operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    /// Reading a remote directory listing
    List,
    /// Reading remote file metadata
    Stat,
    /// Writing a file to the remote host
    Upload,
    /// Creating a remote directory
    CreateDir,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "listing",
            Self::Stat => "stat of",
            Self::Upload => "upload to",
            Self::CreateDir => "mkdir of",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while deploying to a single robot
#[derive(Error, Debug)]
pub enum DeployError {
    /// TCP connection could not be established
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH protocol handshake failed
    #[error("SSH handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Username/password rejected
    #[error("Authentication as {user}@{host} failed")]
    Auth { host: String, user: String },

    /// No password configured anywhere for this robot
    #[error("No password configured for robot '{0}'")]
    MissingCredential(String),

    /// A remote filesystem call failed
    #[error("Remote {op} {path} failed: {source}")]
    Remote {
        op: RemoteOp,
        path: String,
        #[source]
        source: io::Error,
    },

    /// A local filesystem call failed
    #[error("Local I/O on {path} failed: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The remote command could not be launched or its output could not be read
    #[error("Remote command `{command}` failed: {source}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The remote command finished with a nonzero exit status
    #[error("Remote command exited with status {code}")]
    ExitStatus { code: i32 },

    /// The local build hook failed
    #[error("Build command `{command}` failed: {status}")]
    Build { command: String, status: String },

    /// The system keychain could not be queried
    #[error("Credential store error: {0}")]
    Credential(String),

    /// A background unit panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl DeployError {
    /// Wrap an I/O error from a remote filesystem call
    pub fn remote(op: RemoteOp, path: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Remote {
            op,
            path: path.into(),
            source: source.into(),
        }
    }

    /// Wrap an I/O error from a local filesystem call
    pub fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Local {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, DeployError>;
