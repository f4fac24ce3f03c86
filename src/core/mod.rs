pub mod config;
pub mod duration;
pub mod health;
pub mod matcher;
pub mod pidfile;
pub mod signal;
pub mod start_time;
pub mod table;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use config::WatchConfig;
pub use duration::parse_duration;
pub use health::is_process_alive;
pub use matcher::{interpreters_for, MatchCriteria, MatchMode, ProcessMatcher};
pub use pidfile::{read_pid, PidStore};
pub use signal::{kill_matching, send_signal, SignalKind};
pub use start_time::{start_time, start_time_at, ElapsedTime};
pub use table::{Backend, ProcFs, ProcessDescriptor, ProcessTable, PsTable, SystemTable};
pub use watcher::{staleness_window, CancelToken, ProcessWatcher, WatchOutcome};
