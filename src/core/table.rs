//! Read-only access to the OS process table.
//!
//! Every call is a fresh read: nothing here caches pids or argument vectors,
//! since a pid is only meaningful for the poll iteration that observed it.

use anyhow::{anyhow, bail, Context, Result};
use nix::unistd::{sysconf, SysconfVar};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use super::health::is_process_alive;
use super::start_time::ElapsedTime;

/// A running process and its argument vector (`args[0]` is the program path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessDescriptor {
    pub pid: i32,
    pub args: Vec<String>,
}

/// Source of process information.
pub trait ProcessTable {
    /// Pids whose registered command name is `name`.
    ///
    /// Errors only when the table itself can't be queried.
    fn pids_named(&self, name: &str) -> Result<Vec<i32>>;

    /// Argument vector of `pid`, or `None` if it exited or can't be read.
    fn arguments(&self, pid: i32) -> Option<Vec<String>>;

    /// Elapsed running time of `pid`, or `None` if it exited or the data is
    /// missing or unparseable.
    fn elapsed(&self, pid: i32) -> Option<ElapsedTime>;

    fn is_alive(&self, pid: i32) -> bool;

    fn describe(&self, pid: i32) -> Option<ProcessDescriptor> {
        self.arguments(pid)
            .map(|args| ProcessDescriptor { pid, args })
    }
}

impl<T: ProcessTable + ?Sized> ProcessTable for &T {
    fn pids_named(&self, name: &str) -> Result<Vec<i32>> {
        (**self).pids_named(name)
    }

    fn arguments(&self, pid: i32) -> Option<Vec<String>> {
        (**self).arguments(pid)
    }

    fn elapsed(&self, pid: i32) -> Option<ElapsedTime> {
        (**self).elapsed(pid)
    }

    fn is_alive(&self, pid: i32) -> bool {
        (**self).is_alive(pid)
    }
}

impl<T: ProcessTable + ?Sized> ProcessTable for Box<T> {
    fn pids_named(&self, name: &str) -> Result<Vec<i32>> {
        (**self).pids_named(name)
    }

    fn arguments(&self, pid: i32) -> Option<Vec<String>> {
        (**self).arguments(pid)
    }

    fn elapsed(&self, pid: i32) -> Option<ElapsedTime> {
        (**self).elapsed(pid)
    }

    fn is_alive(&self, pid: i32) -> bool {
        (**self).is_alive(pid)
    }
}

/// pidof semantics: the kernel command name, or the basename of argv[0].
pub(crate) fn command_name_matches(name: &str, comm: &str, argv0: Option<&str>) -> bool {
    if comm == name {
        return true;
    }
    argv0
        .and_then(|arg| Path::new(arg).file_name())
        .map(|base| base == name)
        .unwrap_or(false)
}

/// The fields of `/proc/<pid>/stat` we care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StatLine {
    pub state: char,
    pub start_ticks: u64,
}

impl StatLine {
    pub fn is_running(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parse `/proc/<pid>/stat`. The command name is parenthesised and may itself
/// contain spaces or parentheses, so fields are counted from the last `)`.
pub(crate) fn parse_stat(contents: &str) -> Option<StatLine> {
    let (_, rest) = contents.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is field 3 (state); starttime is field 22
    let state = fields.first()?.chars().next()?;
    let start_ticks = fields.get(19)?.parse().ok()?;
    Some(StatLine { state, start_ticks })
}

pub(crate) fn clock_ticks_per_second() -> Option<u64> {
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => Some(ticks as u64),
        _ => None,
    }
}

/// Linux backend reading `/proc` directly.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read a procfs tree mounted somewhere other than `/proc`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_dir(&self, pid: i32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn stat(&self, pid: i32) -> Option<StatLine> {
        let contents = fs::read_to_string(self.pid_dir(pid).join("stat")).ok()?;
        parse_stat(&contents)
    }

    fn uptime_secs(&self) -> Option<f64> {
        let contents = fs::read_to_string(self.root.join("uptime")).ok()?;
        contents.split_whitespace().next()?.parse().ok()
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn pids_named(&self, name: &str) -> Result<Vec<i32>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read process table: {:?}", self.root))?;

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };

            // Vanished between read_dir and here
            let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            let comm = comm.trim_end_matches('\n');

            let named = comm == name || {
                let argv0 = self.arguments(pid).and_then(|args| args.into_iter().next());
                command_name_matches(name, comm, argv0.as_deref())
            };

            // Zombies keep their name until reaped
            if named && self.is_alive(pid) {
                pids.push(pid);
            }
        }

        pids.sort_unstable();
        Ok(pids)
    }

    fn arguments(&self, pid: i32) -> Option<Vec<String>> {
        let raw = fs::read(self.pid_dir(pid).join("cmdline")).ok()?;
        // Kernel threads and zombies expose an empty cmdline
        if raw.is_empty() {
            return None;
        }

        let raw = raw.strip_suffix(b"\0").unwrap_or(&raw);
        Some(
            raw.split(|b| *b == 0)
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect(),
        )
    }

    fn elapsed(&self, pid: i32) -> Option<ElapsedTime> {
        let stat = self.stat(pid)?;
        let ticks = clock_ticks_per_second()?;
        let uptime = self.uptime_secs()?;

        let started = stat.start_ticks as f64 / ticks as f64;
        Some(ElapsedTime::from_secs((uptime - started).max(0.0).floor() as u64))
    }

    fn is_alive(&self, pid: i32) -> bool {
        pid > 0 && self.stat(pid).map(|stat| stat.is_running()).unwrap_or(false)
    }
}

/// Portable POSIX backend driving `ps`.
///
/// Name matching uses the basename of the `comm` column only. Argument vectors
/// come from `ps -o args=` split on whitespace, so arguments containing spaces
/// are not preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsTable;

impl PsTable {
    fn run(args: &[&str]) -> Result<std::process::Output> {
        Command::new("ps")
            .args(args)
            .output()
            .with_context(|| format!("Failed to run ps {}", args.join(" ")))
    }

    /// Single-pid queries: a non-zero exit means the pid is unknown.
    fn query_pid(pid: i32, column: &str) -> Option<String> {
        let output = Self::run(&["-p", &pid.to_string(), "-o", column]).ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Parse `ps -axo pid=,comm=` output into `(pid, comm)` pairs.
pub(crate) fn parse_ps_listing(output: &str) -> Vec<(i32, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (pid, comm) = line.trim_start().split_once(char::is_whitespace)?;
            Some((pid.parse().ok()?, comm.trim().to_string()))
        })
        .collect()
}

impl ProcessTable for PsTable {
    fn pids_named(&self, name: &str) -> Result<Vec<i32>> {
        let output = Self::run(&["-axo", "pid=,comm="])?;
        if !output.status.success() {
            bail!(
                "ps exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let mut pids: Vec<i32> = parse_ps_listing(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .filter(|(_, comm)| command_name_matches(name, "", Some(comm)))
            .map(|(pid, _)| pid)
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn arguments(&self, pid: i32) -> Option<Vec<String>> {
        let line = Self::query_pid(pid, "args=")?;
        Some(line.split_whitespace().map(str::to_string).collect())
    }

    fn elapsed(&self, pid: i32) -> Option<ElapsedTime> {
        Self::query_pid(pid, "etime=")?.parse().ok()
    }

    fn is_alive(&self, pid: i32) -> bool {
        is_process_alive(pid)
    }
}

/// Which backend answers process-table queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Procfs,
    Ps,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Procfs => "procfs",
            Backend::Ps => "ps",
        }
    }
}

impl Default for Backend {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Backend::Procfs
    }

    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        Backend::Ps
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "procfs" | "proc" => Ok(Backend::Procfs),
            "ps" => Ok(Backend::Ps),
            other => Err(anyhow!("Unknown process table backend: {} (expected procfs or ps)", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host's process table through the selected backend.
#[derive(Debug, Clone)]
pub enum SystemTable {
    Procfs(ProcFs),
    Ps(PsTable),
}

impl SystemTable {
    pub fn new(backend: Backend) -> Self {
        match backend {
            Backend::Procfs => SystemTable::Procfs(ProcFs::new()),
            Backend::Ps => SystemTable::Ps(PsTable),
        }
    }
}

impl Default for SystemTable {
    fn default() -> Self {
        Self::new(Backend::default())
    }
}

impl ProcessTable for SystemTable {
    fn pids_named(&self, name: &str) -> Result<Vec<i32>> {
        match self {
            SystemTable::Procfs(table) => table.pids_named(name),
            SystemTable::Ps(table) => table.pids_named(name),
        }
    }

    fn arguments(&self, pid: i32) -> Option<Vec<String>> {
        match self {
            SystemTable::Procfs(table) => table.arguments(pid),
            SystemTable::Ps(table) => table.arguments(pid),
        }
    }

    fn elapsed(&self, pid: i32) -> Option<ElapsedTime> {
        match self {
            SystemTable::Procfs(table) => table.elapsed(pid),
            SystemTable::Ps(table) => table.elapsed(pid),
        }
    }

    fn is_alive(&self, pid: i32) -> bool {
        match self {
            SystemTable::Procfs(table) => table.is_alive(pid),
            SystemTable::Ps(table) => table.is_alive(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a fake procfs tree: one directory per process plus `uptime`.
    struct FakeProc {
        dir: TempDir,
    }

    impl FakeProc {
        fn new(uptime: &str) -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("uptime"), format!("{} 0.00\n", uptime)).unwrap();
            fs::create_dir(dir.path().join("self")).unwrap();
            Self { dir }
        }

        fn process(&self, pid: i32, comm: &str, cmdline: &[u8], state: char, start_ticks: u64) {
            let pid_dir = self.dir.path().join(pid.to_string());
            fs::create_dir(&pid_dir).unwrap();
            fs::write(pid_dir.join("comm"), format!("{}\n", comm)).unwrap();
            fs::write(pid_dir.join("cmdline"), cmdline).unwrap();

            let mut fields = vec!["0".to_string(); 19];
            fields[18] = start_ticks.to_string();
            fs::write(
                pid_dir.join("stat"),
                format!("{} ({}) {} {}\n", pid, comm, state, fields.join(" ")),
            )
            .unwrap();
        }

        fn table(&self) -> ProcFs {
            ProcFs::with_root(self.dir.path())
        }
    }

    #[test]
    fn test_parse_stat_with_awkward_command_name() {
        let stat = parse_stat(
            "42 (my (odd) proc) S 1 42 42 0 -1 4194560 100 0 0 0 1 2 0 0 20 0 1 0 123456 1000 50",
        )
        .unwrap();
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.start_ticks, 123456);
        assert!(stat.is_running());

        assert!(parse_stat("garbage").is_none());
        assert!(parse_stat("1 (short) S 1 2").is_none());
    }

    #[test]
    fn test_procfs_name_lookup_uses_comm_and_argv0() {
        let proc = FakeProc::new("100.00");
        proc.process(10, "nginx", b"nginx\0-g\0daemon off;\0", 'S', 0);
        proc.process(11, "python3", b"/usr/bin/python3\0job.py\0", 'S', 0);
        proc.process(12, "worker", b"/opt/app/bin/nginx\0", 'S', 0);
        proc.process(13, "bash", b"bash\0", 'S', 0);

        let table = proc.table();
        assert_eq!(table.pids_named("nginx").unwrap(), vec![10, 12]);
        assert_eq!(table.pids_named("python3").unwrap(), vec![11]);
        assert!(table.pids_named("job.py").unwrap().is_empty());
    }

    #[test]
    fn test_procfs_arguments() {
        let proc = FakeProc::new("100.00");
        proc.process(10, "nginx", b"nginx\0-g\0daemon off;\0", 'S', 0);
        proc.process(11, "kthreadd", b"", 'S', 0);

        let table = proc.table();
        assert_eq!(
            table.arguments(10).unwrap(),
            vec!["nginx", "-g", "daemon off;"]
        );
        assert_eq!(table.arguments(11), None);
        assert_eq!(table.arguments(99), None);
        assert_eq!(
            table.describe(10).map(|d| d.pid),
            Some(10)
        );
    }

    #[test]
    fn test_procfs_elapsed_from_start_ticks() {
        let ticks = clock_ticks_per_second().unwrap();
        let proc = FakeProc::new("1000.50");
        proc.process(10, "server", b"server\0", 'S', 910 * ticks);

        assert_eq!(proc.table().elapsed(10), Some(ElapsedTime::from_secs(90)));
        assert_eq!(proc.table().elapsed(11), None);
    }

    #[test]
    fn test_procfs_zombies_are_not_alive() {
        let proc = FakeProc::new("100.00");
        proc.process(10, "server", b"server\0", 'S', 0);
        proc.process(11, "defunct", b"", 'Z', 0);

        let table = proc.table();
        assert!(table.is_alive(10));
        assert!(!table.is_alive(11));
        assert!(!table.is_alive(12));
    }

    #[test]
    fn test_procfs_name_lookup_skips_zombies() {
        let proc = FakeProc::new("100.00");
        proc.process(10, "server", b"", 'Z', 0);
        proc.process(11, "server", b"server\0", 'S', 0);
        proc.process(12, "server", b"", 'X', 0);

        let table = proc.table();
        assert_eq!(table.pids_named("server").unwrap(), vec![11]);
        // The zombie still has readable stat data
        assert!(table.elapsed(10).is_some());
    }

    #[test]
    fn test_procfs_missing_root_is_a_hard_error() {
        let table = ProcFs::with_root("/nonexistent/procwatch-proc");
        assert!(table.pids_named("anything").is_err());
    }

    #[test]
    fn test_parse_ps_listing() {
        let listing = "    1 /sbin/launchd\n  312 sleep\nbogus line\n 4000 /Applications/My App.app/Contents/MacOS/My App\n";
        assert_eq!(
            parse_ps_listing(listing),
            vec![
                (1, "/sbin/launchd".to_string()),
                (312, "sleep".to_string()),
                (4000, "/Applications/My App.app/Contents/MacOS/My App".to_string()),
            ]
        );
    }

    #[test]
    fn test_command_name_matches() {
        assert!(command_name_matches("sleep", "sleep", None));
        assert!(command_name_matches("nginx", "", Some("/usr/sbin/nginx")));
        assert!(!command_name_matches("nginx", "worker", Some("nginx-debug")));
        assert!(!command_name_matches("Sleep", "sleep", Some("sleep")));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("procfs".parse::<Backend>().unwrap(), Backend::Procfs);
        assert_eq!(" PS ".parse::<Backend>().unwrap(), Backend::Ps);
        assert!("sysctl".parse::<Backend>().is_err());
        assert_eq!(Backend::Ps.to_string(), "ps");
    }
}
