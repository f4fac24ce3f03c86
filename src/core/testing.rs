//! In-memory process table for deterministic unit tests.

use anyhow::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::start_time::ElapsedTime;
use super::table::{command_name_matches, ProcessTable};

#[derive(Debug, Clone)]
pub(crate) struct FakeProcess {
    pid: i32,
    comm: String,
    args: Option<Vec<String>>,
    elapsed: Option<ElapsedTime>,
    /// Hidden from name lookups until this many lookups have happened.
    appears_after: u32,
    /// Hidden from name lookups again from this lookup on.
    exits_after: Option<u32>,
    /// Reported dead once this many liveness checks have happened.
    dies_after: Option<u32>,
}

impl FakeProcess {
    pub fn new(pid: i32, args: &[&str]) -> Self {
        let comm = args
            .first()
            .and_then(|arg0| std::path::Path::new(arg0).file_name())
            .map(|base| base.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            pid,
            comm,
            args: Some(args.iter().map(|arg| arg.to_string()).collect()),
            elapsed: Some(ElapsedTime::from_secs(1)),
            appears_after: 0,
            exits_after: None,
            dies_after: None,
        }
    }

    pub fn comm(mut self, comm: &str) -> Self {
        self.comm = comm.to_string();
        self
    }

    pub fn elapsed(mut self, etime: &str) -> Self {
        self.elapsed = Some(etime.parse().unwrap());
        self
    }

    pub fn unknown_start(mut self) -> Self {
        self.elapsed = None;
        self
    }

    pub fn unreadable_args(mut self) -> Self {
        self.args = None;
        self
    }

    pub fn appears_after(mut self, lookups: u32) -> Self {
        self.appears_after = lookups;
        self
    }

    pub fn exits_after(mut self, lookups: u32) -> Self {
        self.exits_after = Some(lookups);
        self
    }

    pub fn dies_after(mut self, checks: u32) -> Self {
        self.dies_after = Some(checks);
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeTable {
    processes: Mutex<Vec<FakeProcess>>,
    lookups: AtomicU32,
    liveness_checks: AtomicU32,
}

impl FakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, process: FakeProcess) -> Self {
        self.processes.lock().unwrap().push(process);
        self
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn liveness_checks(&self) -> u32 {
        self.liveness_checks.load(Ordering::SeqCst)
    }

    fn find(&self, pid: i32) -> Option<FakeProcess> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .find(|process| process.pid == pid)
            .cloned()
    }
}

impl ProcessTable for FakeTable {
    fn pids_named(&self, name: &str) -> Result<Vec<i32>> {
        let seen = self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut pids: Vec<i32> = self
            .processes
            .lock()
            .unwrap()
            .iter()
            .filter(|process| process.appears_after <= seen)
            .filter(|process| process.exits_after.map(|n| seen < n).unwrap_or(true))
            .filter(|process| {
                let argv0 = process.args.as_ref().and_then(|args| args.first());
                command_name_matches(name, &process.comm, argv0.map(String::as_str))
            })
            .map(|process| process.pid)
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn arguments(&self, pid: i32) -> Option<Vec<String>> {
        self.find(pid)?.args
    }

    fn elapsed(&self, pid: i32) -> Option<ElapsedTime> {
        self.find(pid)?.elapsed
    }

    fn is_alive(&self, pid: i32) -> bool {
        let checks = self.liveness_checks.fetch_add(1, Ordering::SeqCst) + 1;
        match self.find(pid) {
            Some(process) => process.dies_after.map(|n| checks <= n).unwrap_or(true),
            None => false,
        }
    }
}
