use anyhow::Result;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::matcher::{MatchCriteria, ProcessMatcher};
use super::table::ProcessTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

impl SignalKind {
    pub fn from_force(force: bool) -> Self {
        if force {
            SignalKind::Kill
        } else {
            SignalKind::Terminate
        }
    }

    pub fn signal(&self) -> Signal {
        match self {
            SignalKind::Terminate => Signal::SIGTERM,
            SignalKind::Kill => Signal::SIGKILL,
        }
    }
}

/// Send `kind` to every pid and return how many deliveries succeeded.
///
/// A pid that is gone or not ours is skipped; the batch always runs to the end.
pub fn send_signal<I>(pids: I, kind: SignalKind) -> usize
where
    I: IntoIterator<Item = i32>,
{
    let signal = kind.signal();
    let mut signaled = 0;

    for pid in pids {
        // 0 and negative values address process groups
        if pid <= 0 {
            debug!(pid, "refusing to signal non-positive pid");
            continue;
        }

        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => signaled += 1,
            Err(e) => debug!(pid, %signal, error = %e, "signal not delivered"),
        }
    }

    signaled
}

/// Signal every process matching `criteria`.
pub fn kill_matching<T: ProcessTable>(
    matcher: &ProcessMatcher<T>,
    criteria: &MatchCriteria,
    kind: SignalKind,
) -> Result<usize> {
    let pids = matcher.find_matches(criteria)?;
    let signaled = send_signal(pids.iter().copied(), kind);
    info!(
        name = %criteria.name,
        matched = pids.len(),
        signaled,
        signal = %kind.signal(),
        "signaled matching processes"
    );
    Ok(signaled)
}
