use colored::*;
use procwatch::core::WatchOutcome;
use std::collections::BTreeSet;
use std::time::Duration;

/// Print a success message with a green checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print a warning message with a yellow warning symbol
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an error message with a red X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message with a blue info symbol
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Format a duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        if duration.subsec_millis() > 0 && secs < 10 {
            format!("{:.1}s", duration.as_secs_f64())
        } else {
            format!("{}s", secs)
        }
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs == 0 {
            format!("{}m", mins)
        } else {
            format!("{}m {}s", mins, secs)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, mins)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours == 0 {
            format!("{}d", days)
        } else {
            format!("{}d {}h", days, hours)
        }
    }
}

/// Format a watch outcome with color
pub fn format_outcome(outcome: &WatchOutcome) -> ColoredString {
    match outcome {
        WatchOutcome::Converged => "started".green().bold(),
        WatchOutcome::StalePids(_) => "stale".yellow().bold(),
        WatchOutcome::TimedOut => "timed out".red().bold(),
    }
}

/// Format a PID with cyan color
pub fn format_pid(pid: i32) -> ColoredString {
    pid.to_string().cyan()
}

/// Format a process or application name with cyan color
pub fn format_name(name: &str) -> ColoredString {
    name.cyan().bold()
}

/// Format a set of pids, eliding past `max_display`
pub fn format_pids(pids: &BTreeSet<i32>, max_display: usize) -> String {
    if pids.is_empty() {
        return "(none)".dimmed().to_string();
    }

    let shown: Vec<String> = pids
        .iter()
        .take(max_display)
        .map(|pid| format_pid(*pid).to_string())
        .collect();

    if pids.len() <= max_display {
        shown.join(", ")
    } else {
        format!("{}, +{} more", shown.join(", "), pids.len() - max_display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(3660)), "1h 1m");
        assert_eq!(format_duration(Duration::from_secs(86400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_format_pids() {
        colored::control::set_override(false);

        assert!(format_pids(&BTreeSet::new(), 3).contains("none"));
        assert_eq!(format_pids(&BTreeSet::from([7]), 3), "7");
        assert_eq!(format_pids(&BTreeSet::from([9, 3]), 3), "3, 9");
        assert!(format_pids(&BTreeSet::from([1, 2, 3, 4]), 2).contains("+2 more"));
    }
}
