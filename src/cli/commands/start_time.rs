use anyhow::{bail, Result};
use chrono::Local;
use procwatch::core::{ProcessTable, WatchConfig};

use crate::output::{format_duration, format_pid};

/// Show when `pid` started and how long it has been running
pub fn execute(config: &WatchConfig, pid: i32, json: bool) -> Result<()> {
    let table = config.table();

    let Some(elapsed) = table.elapsed(pid) else {
        bail!("No start time for PID {} (process gone or unreadable)", pid);
    };
    let Some(started) = elapsed.started_before(Local::now()) else {
        bail!("Start time of PID {} is out of range ({})", pid, elapsed);
    };

    if json {
        let info = serde_json::json!({
            "pid": pid,
            "started_at": started.to_rfc3339(),
            "elapsed": elapsed.to_string(),
            "elapsed_secs": elapsed.as_secs(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!(
        "PID {} started {} ({} ago)",
        format_pid(pid),
        started.format("%Y-%m-%d %H:%M:%S"),
        format_duration(elapsed.as_duration())
    );

    Ok(())
}
