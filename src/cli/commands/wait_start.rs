use anyhow::{Context, Result};
use procwatch::core::{
    parse_duration, staleness_window, CancelToken, MatchMode, ProcessWatcher, WatchConfig,
    WatchOutcome,
};

use crate::output::{
    format_duration, format_name, format_outcome, format_pids, print_error, print_info,
    print_success, print_warning,
};
use crate::MatchArgs;

/// Wait for a matching process to start; the exit code reports the outcome
pub fn execute(
    config: &WatchConfig,
    matching: &MatchArgs,
    loose: bool,
    timeout: &str,
    json: bool,
) -> Result<()> {
    let timeout =
        parse_duration(timeout).with_context(|| format!("Invalid timeout: {}", timeout))?;
    let criteria = super::criteria(matching, MatchMode::from_loose(loose));
    let watcher = ProcessWatcher::from_config(config.table(), config);

    if !json {
        print_info(&format!(
            "Waiting up to {} for {} to start...",
            format_duration(timeout),
            format_name(&matching.name)
        ));
    }

    let outcome = watcher.watch_for_start(&criteria, timeout, &CancelToken::new())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            WatchOutcome::Converged => print_success(&format!(
                "{} {}",
                format_name(&matching.name),
                format_outcome(&outcome)
            )),
            WatchOutcome::StalePids(pids) => print_warning(&format!(
                "{} matched only processes older than {} minute(s): {}",
                format_name(&matching.name),
                staleness_window(timeout).num_minutes(),
                format_pids(pids, 10)
            )),
            WatchOutcome::TimedOut => print_error(&format!(
                "{} {} after {}",
                format_name(&matching.name),
                format_outcome(&outcome),
                format_duration(timeout)
            )),
        }
    }

    std::process::exit(outcome.exit_code());
}
