//! Bounded polling for process start and death.
//!
//! Both loops run on the caller's thread, sleeping a fixed poll interval
//! between iterations. The iteration count is `timeout / poll_interval`
//! rounded down; a [`CancelToken`] is checked at every iteration boundary and
//! ends the loop as if the timeout had run out.

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::WatchConfig;
use super::matcher::{MatchCriteria, ProcessMatcher};
use super::start_time::start_time_at;
use super::table::ProcessTable;

/// Result of waiting for a process to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "pids", rename_all = "snake_case")]
pub enum WatchOutcome {
    /// Every matched process has a known start time inside the watch window.
    Converged,
    /// Matching processes were already running before the watch began.
    StalePids(BTreeSet<i32>),
    /// Nothing matching started before the timeout.
    TimedOut,
}

impl WatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchOutcome::Converged => "converged",
            WatchOutcome::StalePids(_) => "stale",
            WatchOutcome::TimedOut => "timed out",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            WatchOutcome::Converged => 0,
            WatchOutcome::StalePids(_) => 1,
            WatchOutcome::TimedOut => 2,
        }
    }
}

/// Cooperative cancellation for a running watch. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How old a matched process may be before a start watch calls it stale:
/// the timeout rounded up to whole minutes.
pub fn staleness_window(timeout: Duration) -> chrono::Duration {
    const MINUTE_NANOS: u128 = 60_000_000_000;
    // chrono spans are bounded by i64 milliseconds
    const MAX_MINUTES: i64 = i64::MAX / 60_000;

    let minutes = timeout.as_nanos().div_ceil(MINUTE_NANOS);
    let minutes = i64::try_from(minutes).unwrap_or(MAX_MINUTES).min(MAX_MINUTES);
    chrono::Duration::minutes(minutes)
}

/// One validation pass over the pids matched in an iteration.
enum Validation {
    Fresh,
    Stale(BTreeSet<i32>),
    /// Start time not readable yet; the process may be mid-spawn.
    Pending(BTreeSet<i32>),
}

pub struct ProcessWatcher<T> {
    matcher: ProcessMatcher<T>,
    poll_interval: Duration,
}

impl<T: ProcessTable> ProcessWatcher<T> {
    pub fn new(table: T) -> Self {
        Self::from_config(table, &WatchConfig::default())
    }

    pub fn from_config(table: T, config: &WatchConfig) -> Self {
        Self {
            matcher: ProcessMatcher::new(table),
            poll_interval: Duration::ZERO,
        }
        .with_poll_interval(config.poll_interval)
    }

    /// Zero intervals are bumped to one millisecond.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn matcher(&self) -> &ProcessMatcher<T> {
        &self.matcher
    }

    fn iterations(&self, timeout: Duration) -> u64 {
        let iterations = timeout.as_nanos() / self.poll_interval.as_nanos().max(1);
        u64::try_from(iterations).unwrap_or(u64::MAX)
    }

    /// Wait for processes matching `criteria` to be running with a start time
    /// inside the watch window.
    ///
    /// Matches are re-resolved every iteration. Processes older than
    /// [`staleness_window`] keep the watch from converging; if any are still
    /// present when time runs out the outcome is [`WatchOutcome::StalePids`].
    pub fn watch_for_start(
        &self,
        criteria: &MatchCriteria,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<WatchOutcome> {
        let iterations = self.iterations(timeout);
        let window = staleness_window(timeout);
        let mut stale = BTreeSet::new();

        debug!(
            name = %criteria.name,
            args = ?criteria.required_args,
            ?timeout,
            iterations,
            "watching for process start"
        );

        for iteration in 0..iterations {
            if cancel.is_cancelled() {
                debug!(iteration, "start watch cancelled");
                break;
            }

            stale.clear();
            let pids = self.matcher.find_matches(criteria)?;

            if pids.is_empty() {
                debug!(iteration, "no matching process yet");
            } else {
                match self.validate(&pids, window, Local::now()) {
                    Validation::Fresh => {
                        info!(name = %criteria.name, ?pids, iteration, "process started");
                        return Ok(WatchOutcome::Converged);
                    }
                    Validation::Stale(pids) => {
                        debug!(iteration, ?pids, "matched processes predate the watch");
                        stale = pids;
                    }
                    Validation::Pending(pids) => {
                        debug!(iteration, ?pids, "start time not readable yet");
                    }
                }
            }

            thread::sleep(self.poll_interval);
        }

        if stale.is_empty() {
            info!(name = %criteria.name, ?timeout, "process did not start");
            Ok(WatchOutcome::TimedOut)
        } else {
            warn!(name = %criteria.name, pids = ?stale, "only stale processes matched");
            Ok(WatchOutcome::StalePids(stale))
        }
    }

    fn validate(
        &self,
        pids: &BTreeSet<i32>,
        window: chrono::Duration,
        now: DateTime<Local>,
    ) -> Validation {
        let mut stale = BTreeSet::new();
        let mut pending = BTreeSet::new();

        for &pid in pids {
            match start_time_at(self.matcher.table(), pid, now) {
                Some(started) if now - started > window => {
                    stale.insert(pid);
                }
                Some(_) => {}
                None => {
                    pending.insert(pid);
                }
            }
        }

        // Stale pids stay flagged even when a sibling is still mid-spawn
        if !stale.is_empty() {
            Validation::Stale(stale)
        } else if !pending.is_empty() {
            Validation::Pending(pending)
        } else {
            Validation::Fresh
        }
    }

    /// Wait for every pid not in `ignore` to exit. Returns true if they all
    /// did before the timeout.
    pub fn watch_for_death<I>(
        &self,
        pids: I,
        ignore: &BTreeSet<i32>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> bool
    where
        I: IntoIterator<Item = i32>,
    {
        let table = self.matcher.table();
        let mut tracked: BTreeSet<i32> = pids
            .into_iter()
            .filter(|pid| !ignore.contains(pid))
            .collect();

        if tracked.is_empty() {
            return true;
        }

        let iterations = self.iterations(timeout);
        debug!(pids = ?tracked, ?timeout, iterations, "watching for process death");

        for iteration in 0..iterations {
            if cancel.is_cancelled() {
                debug!(iteration, "death watch cancelled");
                break;
            }

            tracked.retain(|&pid| table.is_alive(pid));
            if tracked.is_empty() {
                info!(iteration, "all watched processes exited");
                return true;
            }

            thread::sleep(self.poll_interval);
        }

        tracked.retain(|&pid| table.is_alive(pid));
        if tracked.is_empty() {
            true
        } else {
            info!(remaining = ?tracked, "processes still alive at timeout");
            false
        }
    }

    /// Resolve `criteria` once, then [`watch_for_death`](Self::watch_for_death).
    ///
    /// A process that respawns under a new pid during the wait is not noticed.
    pub fn watch_for_death_by_name(
        &self,
        criteria: &MatchCriteria,
        ignore: &BTreeSet<i32>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<bool> {
        let pids = self.matcher.find_matches(criteria)?;
        Ok(self.watch_for_death(pids, ignore, timeout, cancel))
    }
}
