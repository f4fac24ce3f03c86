// Core library modules
pub mod core;

// Re-export commonly used types and functions
pub use crate::core::{
    kill_matching, parse_duration, send_signal, start_time,
    CancelToken, ElapsedTime, MatchCriteria, MatchMode, PidStore,
    ProcessDescriptor, ProcessMatcher, ProcessTable, ProcessWatcher,
    SignalKind, SystemTable, WatchConfig, WatchOutcome,
};
