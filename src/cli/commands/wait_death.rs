use anyhow::{Context, Result};
use procwatch::core::{parse_duration, CancelToken, MatchMode, ProcessWatcher, WatchConfig};
use std::collections::BTreeSet;

use crate::output::{format_duration, format_name, print_error, print_info, print_success};
use crate::MatchArgs;

/// Wait for processes to exit; exits 1 if any outlive the timeout
pub fn execute(
    config: &WatchConfig,
    pids: &[i32],
    matching: Option<MatchArgs>,
    loose: bool,
    ignore: &[i32],
    timeout: &str,
) -> Result<()> {
    let timeout =
        parse_duration(timeout).with_context(|| format!("Invalid timeout: {}", timeout))?;
    let ignore: BTreeSet<i32> = ignore.iter().copied().collect();
    let watcher = ProcessWatcher::from_config(config.table(), config);
    let cancel = CancelToken::new();

    let (all_dead, target) = match matching {
        Some(matching) => {
            let criteria = super::criteria(&matching, MatchMode::from_loose(loose));
            print_info(&format!(
                "Waiting up to {} for {} to exit...",
                format_duration(timeout),
                format_name(&matching.name)
            ));
            let all_dead = watcher.watch_for_death_by_name(&criteria, &ignore, timeout, &cancel)?;
            (all_dead, format_name(&matching.name).to_string())
        }
        None => {
            let target = format!(
                "PID {}",
                pids.iter()
                    .map(|pid| pid.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            print_info(&format!(
                "Waiting up to {} for {} to exit...",
                format_duration(timeout),
                target
            ));
            let all_dead = watcher.watch_for_death(pids.iter().copied(), &ignore, timeout, &cancel);
            (all_dead, target)
        }
    };

    if all_dead {
        print_success(&format!("{} exited", target));
        Ok(())
    } else {
        print_error(&format!(
            "{} still running after {}",
            target,
            format_duration(timeout)
        ));
        std::process::exit(1);
    }
}
