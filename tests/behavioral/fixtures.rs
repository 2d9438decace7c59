// ABOUTME: Shared test fixtures and utilities for behavioral tests
//
// Provides:
// - FakeRemote: in-memory remote filesystem implementing SyncSession
// - ScriptedShell: command session that emits scripted lines with delays
// - FakeConnector: hands out fakes per robot and records the order of events
// - LocalTree: temporary local build-output directory with controlled mtimes

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

use robodeploy::console::{self, ConsoleLine};
use robodeploy::error::{DeployError, RemoteOp, Result};
use robodeploy::hosts::HostTarget;
use robodeploy::transport::{CommandSession, Connector, RemoteProcess, SyncSession};

/// One file stored on the fake remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub contents: Vec<u8>,
    pub mtime: u64,
}

#[derive(Debug, Default)]
struct RemoteState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, RemoteFile>,
    uploads: Vec<String>,
    mkdirs: Vec<String>,
    upload_attempts: usize,
    fail_on: Option<(RemoteOp, String)>,
    fail_next_upload: bool,
}

/// In-memory remote filesystem. Clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    /// A remote where only `root` (and its ancestors) exist
    pub fn with_root(root: &str) -> Self {
        let remote = Self::default();
        {
            let mut state = remote.state.lock().unwrap();
            let mut path = String::new();
            for part in root.split('/').filter(|p| !p.is_empty()) {
                path.push('/');
                path.push_str(part);
                state.dirs.insert(path.clone());
            }
            state.dirs.insert("/".to_string());
        }
        remote
    }

    pub fn put_file(&self, path: &str, contents: &[u8], mtime: u64) {
        self.state.lock().unwrap().files.insert(
            path.to_string(),
            RemoteFile {
                contents: contents.to_vec(),
                mtime,
            },
        );
    }

    pub fn put_dir(&self, path: &str) {
        self.state.lock().unwrap().dirs.insert(path.to_string());
    }

    /// Make the next `op` on `path` fail
    pub fn fail_on(&self, op: RemoteOp, path: &str) {
        self.state.lock().unwrap().fail_on = Some((op, path.to_string()));
    }

    /// Make the first upload received fail, whichever file it is
    pub fn fail_next_upload(&self) {
        self.state.lock().unwrap().fail_next_upload = true;
    }

    /// Uploads tried so far, failed ones included
    pub fn upload_attempts(&self) -> usize {
        self.state.lock().unwrap().upload_attempts
    }

    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    /// Every upload performed so far, in order
    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Every directory creation performed so far, in order
    pub fn mkdirs(&self) -> Vec<String> {
        self.state.lock().unwrap().mkdirs.clone()
    }

    fn check_failure(state: &RemoteState, op: RemoteOp, path: &str) -> Result<()> {
        match &state.fail_on {
            Some((fail_op, fail_path)) if *fail_op == op && fail_path == path => Err(
                DeployError::remote(op, path, io::Error::new(io::ErrorKind::PermissionDenied, "injected")),
            ),
            _ => Ok(()),
        }
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn not_found(op: RemoteOp, path: &str) -> DeployError {
    DeployError::remote(op, path, io::Error::new(io::ErrorKind::NotFound, "no such file"))
}

impl SyncSession for FakeRemote {
    fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Self::check_failure(&state, RemoteOp::List, path)?;
        if !state.dirs.contains(path) {
            return Err(not_found(RemoteOp::List, path));
        }

        let children = state
            .dirs
            .iter()
            .chain(state.files.keys())
            .filter(|child| child.as_str() != path && parent_of(child) == path)
            .map(|child| child.rsplit('/').next().unwrap_or_default().to_string())
            .collect();
        Ok(children)
    }

    fn modified(&mut self, path: &str) -> Result<Option<u64>> {
        let state = self.state.lock().unwrap();
        Self::check_failure(&state, RemoteOp::Stat, path)?;
        state
            .files
            .get(path)
            .map(|file| Some(file.mtime))
            .ok_or_else(|| not_found(RemoteOp::Stat, path))
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.upload_attempts += 1;
        if std::mem::take(&mut state.fail_next_upload) {
            return Err(DeployError::remote(
                RemoteOp::Upload,
                remote,
                io::Error::other("disk full"),
            ));
        }
        Self::check_failure(&state, RemoteOp::Upload, remote)?;
        if !state.dirs.contains(parent_of(remote)) {
            return Err(not_found(RemoteOp::Upload, remote));
        }

        let contents = fs::read(local).map_err(|e| DeployError::local(local, e))?;
        let mtime = mtime_of(local);
        state
            .files
            .insert(remote.to_string(), RemoteFile { contents, mtime });
        state.uploads.push(remote.to_string());
        Ok(())
    }

    fn create_dir(&mut self, path: &str, ignore_existing: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&state, RemoteOp::CreateDir, path)?;
        if state.dirs.contains(path) {
            if ignore_existing {
                return Ok(());
            }
            return Err(DeployError::remote(
                RemoteOp::CreateDir,
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "exists"),
            ));
        }
        if !state.dirs.contains(parent_of(path)) {
            return Err(not_found(RemoteOp::CreateDir, path));
        }
        state.dirs.insert(path.to_string());
        state.mkdirs.push(path.to_string());
        Ok(())
    }
}

/// Whole-second mtime of a local file
pub fn mtime_of(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// What a scripted remote command does
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub lines: Vec<String>,
    pub delay: Duration,
    pub exit_status: Option<i32>,
    /// Fail at `execute` instead of launching
    pub refuse: bool,
}

impl Script {
    /// Host `k` prints `k-1` .. `k-5`
    pub fn numbered(host: &str, delay: Duration) -> Self {
        Self {
            lines: (1..=5).map(|i| format!("{host}-{i}")).collect(),
            delay,
            exit_status: Some(0),
            refuse: false,
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }
}

/// Command session that plays back a Script
#[derive(Debug, Clone)]
pub struct ScriptedShell {
    pub script: Script,
    pub executed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedShell {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            executed: Arc::default(),
        }
    }
}

impl CommandSession for ScriptedShell {
    fn execute(&mut self, command_line: &str) -> Result<Box<dyn RemoteProcess>> {
        if self.script.refuse {
            return Err(DeployError::Exec {
                command: command_line.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "channel closed"),
            });
        }
        self.executed.lock().unwrap().push(command_line.to_string());
        Ok(Box::new(ScriptedProcess {
            pending: VecDeque::new(),
            lines: self.script.lines.clone().into(),
            delay: self.script.delay,
            exit_status: self.script.exit_status,
        }))
    }
}

/// Emits one scripted line per read, sleeping before each
struct ScriptedProcess {
    pending: VecDeque<u8>,
    lines: VecDeque<String>,
    delay: Duration,
    exit_status: Option<i32>,
}

impl Read for ScriptedProcess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            let Some(line) = self.lines.pop_front() else {
                return Ok(0);
            };
            thread::sleep(self.delay);
            self.pending.extend(line.bytes());
            self.pending.push_back(b'\n');
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl RemoteProcess for ScriptedProcess {
    fn wait(&mut self) -> Result<Option<i32>> {
        Ok(self.exit_status)
    }
}

/// Hands out fakes per robot name and logs `open_sync:<host>`,
/// `open_command:<host>` events in the order they happen
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    remotes: HashMap<String, FakeRemote>,
    scripts: HashMap<String, Script>,
    unreachable: BTreeSet<String>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_robot(mut self, name: &str, remote: FakeRemote, script: Script) -> Self {
        self.remotes.insert(name.to_string(), remote);
        self.scripts.insert(name.to_string(), script);
        self
    }

    /// Connections to `name` fail as if the robot were switched off
    pub fn unreachable(mut self, name: &str) -> Self {
        self.unreachable.insert(name.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn check_reachable(&self, target: &HostTarget) -> Result<()> {
        if self.unreachable.contains(&target.name) {
            return Err(DeployError::Connect {
                host: target.hostname.clone(),
                port: target.port,
                source: io::Error::new(io::ErrorKind::TimedOut, "connection timed out"),
            });
        }
        Ok(())
    }
}

impl Connector for FakeConnector {
    type Files = FakeRemote;
    type Shell = ScriptedShell;

    fn open_sync(&self, target: &HostTarget) -> Result<FakeRemote> {
        self.check_reachable(target)?;
        self.events
            .lock()
            .unwrap()
            .push(format!("open_sync:{}", target.name));
        Ok(self.remotes.get(&target.name).cloned().unwrap_or_default())
    }

    fn open_command(&self, target: &HostTarget) -> Result<ScriptedShell> {
        self.check_reachable(target)?;
        self.events
            .lock()
            .unwrap()
            .push(format!("open_command:{}", target.name));
        let script = self.scripts.get(&target.name).cloned().unwrap_or_default();
        Ok(ScriptedShell::new(script))
    }
}

/// Temporary local build-output directory
pub struct LocalTree {
    pub dir: TempDir,
}

impl LocalTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `relative` with the given whole-second mtime, creating parents
    pub fn write(&self, relative: &str, contents: &str, mtime: u64) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        set_mtime(&path, mtime);
        path
    }

    pub fn mkdir(&self, relative: &str) {
        fs::create_dir_all(self.dir.path().join(relative)).unwrap();
    }
}

pub fn set_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Texts of the lines for `host`, in arrival order
pub fn lines_for<'a>(lines: &'a [ConsoleLine], host: &str) -> Vec<&'a str> {
    lines
        .iter()
        .filter(|line| line.host == host)
        .map(|line| line.text.as_str())
        .collect()
}

pub use console::drain;

pub fn target(name: &str) -> HostTarget {
    HostTarget {
        name: name.to_string(),
        hostname: format!("{name}.local"),
        port: 22,
        username: "robot".to_string(),
        password: "maker".to_string(),
    }
}
