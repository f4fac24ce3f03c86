//! Pidfiles: `<dir>/<app>.pid`, one decimal pid per file.

use anyhow::{bail, Context, Result};
use nix::fcntl::{flock, FlockArg};
use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::signal::{send_signal, SignalKind};

pub const PIDDIR_ENV: &str = "PROCWATCH_PIDDIR";

const PIDFILE_SUFFIX: &str = ".pid";

/// Get the pidfile directory
pub fn pidfile_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(PIDDIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join("pids");
    }

    PathBuf::from("/tmp/procwatch/pids")
}

/// Perform operation on file with exclusive lock
pub fn with_lock<F, R>(path: &Path, operation: F) -> Result<R>
where
    F: FnOnce(&mut File) -> Result<R>,
{
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open pidfile: {:?}", path))?;

    flock(file.as_raw_fd(), FlockArg::LockExclusive)
        .with_context(|| format!("Failed to acquire lock on: {:?}", path))?;

    // Lock is released when file is dropped
    operation(&mut file)
}

/// Translate an app-name glob (`*`, `?`) into a regex over pidfile names.
fn pattern_regex(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() || pattern.contains('/') {
        bail!("Invalid pidfile pattern: {:?}", pattern);
    }

    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push_str(&regex::escape(PIDFILE_SUFFIX));
    expr.push('$');

    Regex::new(&expr).with_context(|| format!("Invalid pidfile pattern: {:?}", pattern))
}

/// Read the pid stored in `path`, `None` if missing or not a positive integer.
pub fn read_pid(path: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(path).ok()?;
    match contents.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Some(pid),
        _ => {
            debug!(?path, "pidfile does not hold a valid pid");
            None
        }
    }
}

/// Directory of pidfiles keyed by application name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidStore {
    dir: PathBuf,
}

impl PidStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store at `PROCWATCH_PIDDIR`, `$HOME/pids` or `/tmp/procwatch/pids`.
    pub fn from_env() -> Self {
        Self::new(pidfile_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure pidfile directory exists
    fn ensure_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create pidfile directory: {:?}", self.dir))?;
        Ok(&self.dir)
    }

    /// Get path to the pidfile for `app`
    pub fn path_for(&self, app: &str) -> Result<PathBuf> {
        if app.is_empty() || app.contains('/') || app.contains(['*', '?']) {
            bail!("Invalid application name: {:?}", app);
        }
        Ok(self.dir.join(format!("{}{}", app, PIDFILE_SUFFIX)))
    }

    /// Write `pid` (default: this process) as the pidfile for `app`.
    pub fn write(&self, app: &str, pid: Option<i32>) -> Result<PathBuf> {
        let pid = pid.unwrap_or_else(|| std::process::id() as i32);
        if pid <= 0 {
            bail!("Refusing to record non-positive pid {}", pid);
        }

        let path = self.path_for(app)?;
        self.ensure_dir()?;
        with_lock(&path, |file| {
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
            file.write_all(pid.to_string().as_bytes())?;
            file.sync_all()?;
            Ok(())
        })?;

        debug!(app, pid, ?path, "wrote pidfile");
        Ok(path)
    }

    /// Pidfiles whose app name matches the glob `pattern`, sorted by path.
    pub fn resolve(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let regex = pattern_regex(pattern)?;

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read pidfile directory: {:?}", self.dir))
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| regex.is_match(name))
                    .unwrap_or(false)
            })
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Pids recorded for every app matching `pattern`; unreadable files are skipped.
    pub fn read_pids(&self, pattern: &str) -> Result<Vec<i32>> {
        Ok(self
            .resolve(pattern)?
            .iter()
            .filter_map(|path| read_pid(path))
            .collect())
    }

    /// Remove every pidfile matching `pattern`, returning how many were removed.
    pub fn remove(&self, pattern: &str) -> Result<usize> {
        let mut removed = 0;
        for path in self.resolve(pattern)? {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => debug!(?path, error = %e, "failed to remove pidfile"),
            }
        }
        Ok(removed)
    }

    /// Signal every process recorded for apps matching `pattern`.
    ///
    /// Returns the number of processes signaled. With `remove_after`, the
    /// matching pidfiles are deleted whether or not the signal landed.
    pub fn kill(&self, pattern: &str, kind: SignalKind, remove_after: bool) -> Result<usize> {
        let pids = self.read_pids(pattern)?;
        let signaled = send_signal(pids, kind);

        if remove_after {
            self.remove(pattern)?;
        }

        Ok(signaled)
    }
}

impl Default for PidStore {
    fn default() -> Self {
        Self::from_env()
    }
}
