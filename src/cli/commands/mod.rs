pub mod kill;
pub mod pidfile;
pub mod pids;
pub mod start_time;
pub mod wait_death;
pub mod wait_start;

use procwatch::core::{MatchCriteria, MatchMode};

use crate::MatchArgs;

fn criteria(matching: &MatchArgs, mode: MatchMode) -> MatchCriteria {
    MatchCriteria::new(matching.name.as_str())
        .args(matching.args.iter().cloned())
        .mode(mode)
}
