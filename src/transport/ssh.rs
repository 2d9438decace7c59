// ABOUTME: ssh2-backed sessions for robot controllers
//
// One TCP connection per session, password authentication only. SFTP calls and
// the remote command channel are blocking; callers run them on blocking tasks.

use std::fs::{self, File};
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use ssh2::{Channel, ExtendedData, FileStat, OpenFlags, OpenType, Session, Sftp};
use tracing::{debug, info};

use super::{CommandSession, Connector, RemoteProcess, SyncSession};
use crate::error::{DeployError, RemoteOp, Result};
use crate::hosts::HostTarget;

const DEFAULT_FILE_MODE: i32 = 0o644;
const DIR_MODE: i32 = 0o755;
#[cfg(unix)]
const OWNER_WRITE: i32 = 0o200;

/// Opens password-authenticated ssh2 sessions
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    preserve_mtime: bool,
}

impl SshConnector {
    pub const fn new(connect_timeout: Duration, preserve_mtime: bool) -> Self {
        Self {
            connect_timeout,
            preserve_mtime,
        }
    }

    /// Connect, handshake and authenticate.
    ///
    /// The timeout only covers session setup; it is cleared afterwards so a
    /// long-running remote program is never cut off.
    fn connect(&self, target: &HostTarget) -> Result<Session> {
        info!("Connecting to {}", target.address());

        let connect_err = |source: io::Error| DeployError::Connect {
            host: target.hostname.clone(),
            port: target.port,
            source,
        };

        let addr = (target.hostname.as_str(), target.port)
            .to_socket_addrs()
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| {
                connect_err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "hostname resolved to no addresses",
                ))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(connect_err)?;

        let handshake_err = |e: ssh2::Error| DeployError::Handshake {
            host: target.hostname.clone(),
            source: e.into(),
        };

        let mut session = Session::new().map_err(handshake_err)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(self.connect_timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake().map_err(handshake_err)?;

        debug!("Authenticating as user: {}", target.username);
        let auth_err = || DeployError::Auth {
            host: target.hostname.clone(),
            user: target.username.clone(),
        };
        session
            .userauth_password(&target.username, &target.password)
            .map_err(|_| auth_err())?;
        if !session.authenticated() {
            return Err(auth_err());
        }

        session.set_timeout(0);
        debug!("SSH session to {} established", target.name);
        Ok(session)
    }
}

impl Connector for SshConnector {
    type Files = SftpSession;
    type Shell = SshCommandSession;

    fn open_sync(&self, target: &HostTarget) -> Result<SftpSession> {
        let session = self.connect(target)?;
        let sftp = session.sftp().map_err(|e| DeployError::Handshake {
            host: target.hostname.clone(),
            source: e.into(),
        })?;
        Ok(SftpSession {
            sftp,
            preserve_mtime: self.preserve_mtime,
        })
    }

    fn open_command(&self, target: &HostTarget) -> Result<SshCommandSession> {
        Ok(SshCommandSession {
            session: self.connect(target)?,
        })
    }
}

/// SFTP subsystem of one robot session
pub struct SftpSession {
    sftp: Sftp,
    preserve_mtime: bool,
}

impl SftpSession {
    /// Apply the local file's permissions (and optionally mtime) to the remote copy
    fn copy_attributes(&self, meta: &fs::Metadata, remote: &str) -> Result<()> {
        let mtime = if self.preserve_mtime {
            meta.modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
        } else {
            None
        };

        let stat = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: u32::try_from(local_mode(meta)).ok(),
            atime: mtime,
            mtime,
        };
        self.sftp
            .setstat(Path::new(remote), stat)
            .map_err(|e| DeployError::remote(RemoteOp::Upload, remote, e))
    }
}

impl SyncSession for SftpSession {
    fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        let entries = self
            .sftp
            .readdir(Path::new(path))
            .map_err(|e| DeployError::remote(RemoteOp::List, path, e))?;

        Ok(entries
            .into_iter()
            .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    fn modified(&mut self, path: &str) -> Result<Option<u64>> {
        let stat = self
            .sftp
            .stat(Path::new(path))
            .map_err(|e| DeployError::remote(RemoteOp::Stat, path, e))?;
        Ok(stat.mtime)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut local_file = File::open(local).map_err(|e| DeployError::local(local, e))?;
        let meta = local_file
            .metadata()
            .map_err(|e| DeployError::local(local, e))?;

        let mut remote_file = self
            .sftp
            .open_mode(
                Path::new(remote),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                local_mode(&meta),
                OpenType::File,
            )
            .map_err(|e| DeployError::remote(RemoteOp::Upload, remote, e))?;

        io::copy(&mut local_file, &mut remote_file)
            .map_err(|e| DeployError::remote(RemoteOp::Upload, remote, e))?;
        drop(remote_file);

        self.copy_attributes(&meta, remote)
    }

    fn create_dir(&mut self, path: &str, ignore_existing: bool) -> Result<()> {
        match self.sftp.mkdir(Path::new(path), DIR_MODE) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Servers report "already exists" as a generic failure, so ask directly
                let exists = ignore_existing
                    && self
                        .sftp
                        .stat(Path::new(path))
                        .is_ok_and(|stat| stat.is_dir());
                if exists {
                    Ok(())
                } else {
                    Err(DeployError::remote(RemoteOp::CreateDir, path, e))
                }
            }
        }
    }
}

/// A session dedicated to running one remote command
pub struct SshCommandSession {
    session: Session,
}

impl CommandSession for SshCommandSession {
    fn execute(&mut self, command_line: &str) -> Result<Box<dyn RemoteProcess>> {
        let exec_err = |e: ssh2::Error| DeployError::Exec {
            command: command_line.to_string(),
            source: e.into(),
        };

        let mut channel = self.session.channel_session().map_err(exec_err)?;
        channel
            .handle_extended_data(ExtendedData::Merge)
            .map_err(exec_err)?;
        channel.exec(command_line).map_err(exec_err)?;
        channel.send_eof().map_err(exec_err)?;

        Ok(Box::new(SshProcess {
            channel,
            command: command_line.to_string(),
        }))
    }
}

struct SshProcess {
    channel: Channel,
    command: String,
}

impl Read for SshProcess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }
}

impl RemoteProcess for SshProcess {
    fn wait(&mut self) -> Result<Option<i32>> {
        let exec_err = |e: ssh2::Error| DeployError::Exec {
            command: self.command.clone(),
            source: e.into(),
        };
        self.channel.wait_close().map_err(exec_err)?;
        self.channel.exit_status().map(Some).map_err(exec_err)
    }
}

/// Local permission bits, always owner-writable so a later upload can overwrite the file
#[cfg(unix)]
fn local_mode(meta: &fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    i32::try_from(meta.permissions().mode() & 0o7777).map_or(DEFAULT_FILE_MODE, |mode| mode | OWNER_WRITE)
}

#[cfg(not(unix))]
fn local_mode(_meta: &fs::Metadata) -> i32 {
    DEFAULT_FILE_MODE
}
