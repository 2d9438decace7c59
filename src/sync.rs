// ABOUTME: One-way, mtime-gated directory synchronization over a SyncSession
//
// Walks the local tree depth-first and, level by level, uploads files the
// remote is missing or holds an older copy of. Remote-only files are never
// touched. The first failure aborts the rest of the walk.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info};

use crate::console::Console;
use crate::error::{DeployError, Result};
use crate::transport::SyncSession;

/// One immediate entry of a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    /// Modification time truncated to whole seconds
    pub modified: Option<u64>,
}

/// What a sync call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote paths that were uploaded, in upload order
    pub uploaded: Vec<String>,
    /// Remote directories that were created
    pub created_dirs: Vec<String>,
    /// Files skipped because the remote copy was current
    pub up_to_date: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.uploaded.is_empty() && self.created_dirs.is_empty()
    }
}

/// Synchronizes a local tree onto one robot through a borrowed session
pub struct Synchronizer<'a, S: SyncSession + ?Sized> {
    session: &'a mut S,
    console: &'a Console,
    host: &'a str,
}

impl<'a, S: SyncSession + ?Sized> Synchronizer<'a, S> {
    pub fn new(session: &'a mut S, console: &'a Console, host: &'a str) -> Self {
        Self {
            session,
            console,
            host,
        }
    }

    /// Make `remote_dir` hold every file of `local_dir` at least as new as the
    /// local copy. `remote_dir` must already exist.
    pub fn sync(&mut self, local_dir: &Path, remote_dir: &str) -> Result<SyncReport> {
        info!("Syncing {} -> {}:{}", local_dir.display(), self.host, remote_dir);
        let mut report = SyncReport::default();
        self.sync_level(local_dir, remote_dir, &mut report)?;
        info!(
            "Sync to {} done: {} uploaded, {} dirs created, {} up to date",
            self.host,
            report.uploaded.len(),
            report.created_dirs.len(),
            report.up_to_date
        );
        Ok(report)
    }

    fn sync_level(&mut self, local_dir: &Path, remote_dir: &str, report: &mut SyncReport) -> Result<()> {
        let remote_names: HashSet<String> = self.session.list_dir(remote_dir)?.into_iter().collect();

        for entry in list_local(local_dir)? {
            let local_path = local_dir.join(&entry.name);
            let remote_path = remote_join(remote_dir, &entry.name);
            let present = remote_names.contains(&entry.name);

            if entry.is_dir {
                if present {
                    debug!("Remote directory {} exists", remote_path);
                } else {
                    self.console.sync(self.host, format!("mkdir {remote_path}"));
                    self.session.create_dir(&remote_path, true)?;
                    report.created_dirs.push(remote_path.clone());
                }
                self.sync_level(&local_path, &remote_path, report)?;
                continue;
            }

            let remote_mtime = if present {
                self.session.modified(&remote_path)?
            } else {
                None
            };

            if is_stale(present, remote_mtime, entry.modified) {
                self.console
                    .sync(self.host, format!("{} -> {}", local_path.display(), remote_path));
                self.session.upload(&local_path, &remote_path)?;
                report.uploaded.push(remote_path);
            } else {
                debug!("{} is up to date", remote_path);
                report.up_to_date += 1;
            }
        }

        Ok(())
    }
}

/// Whether a remote file needs (re)uploading.
///
/// Missing remote files are always stale. Otherwise only a remote mtime
/// strictly older than the local one counts; equal times are current. An
/// unknown mtime on either side is treated as stale.
pub const fn is_stale(present: bool, remote: Option<u64>, local: Option<u64>) -> bool {
    if !present {
        return true;
    }
    match (remote, local) {
        (Some(remote), Some(local)) => remote < local,
        _ => true,
    }
}

/// Join a remote directory and an entry name with `/`
pub fn remote_join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{dir}/{name}")
}

/// List the immediate entries of a local directory, following symlinks
pub fn list_local(dir: &Path) -> Result<Vec<FileEntry>> {
    let read_dir = fs::read_dir(dir).map_err(|e| DeployError::local(dir, e))?;

    let mut entries = Vec::new();
    for item in read_dir {
        let item = item.map_err(|e| DeployError::local(dir, e))?;
        let path: PathBuf = item.path();
        let name = item.file_name().into_string().map_err(|raw| {
            DeployError::local(
                &path,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("file name {raw:?} is not valid UTF-8"),
                ),
            )
        })?;
        let meta = fs::metadata(&path).map_err(|e| DeployError::local(&path, e))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        entries.push(FileEntry {
            name,
            is_dir: meta.is_dir(),
            modified,
        });
    }
    Ok(entries)
}
