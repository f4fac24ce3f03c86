use anyhow::Result;
use colored::*;
use procwatch::core::{read_pid, PidStore, ProcessTable, SignalKind, WatchConfig};

use crate::output::{format_name, format_pid, print_info, print_success, print_warning};

/// Record a pid for `app` (defaults to the caller)
pub fn write(app: &str, pid: Option<i32>) -> Result<()> {
    let pid = pid.unwrap_or_else(|| nix::unistd::getppid().as_raw());
    let store = PidStore::from_env();
    let path = store.write(app, Some(pid))?;

    print_success(&format!(
        "Recorded PID {} for {} in {}",
        format_pid(pid),
        format_name(app),
        path.display()
    ));
    Ok(())
}

/// List pidfiles matching `pattern` and the liveness of each pid
pub fn list(config: &WatchConfig, pattern: &str) -> Result<()> {
    let store = PidStore::from_env();
    let paths = store.resolve(pattern)?;
    let table = config.table();

    if paths.is_empty() {
        print_info(&format!("No pidfiles matching '{}' in {}", pattern, store.dir().display()));
        return Ok(());
    }

    for path in paths {
        let app = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        match read_pid(&path) {
            Some(pid) if table.is_alive(pid) => println!(
                "{} {} (PID: {})",
                "●".green(),
                format_name(&app),
                format_pid(pid)
            ),
            Some(pid) => println!(
                "{} {} (PID: {}, {})",
                "✗".red(),
                format_name(&app),
                format_pid(pid),
                "not running".red()
            ),
            None => println!("{} {} ({})", "?".yellow(), format_name(&app), "unreadable".yellow()),
        }
    }

    Ok(())
}

/// Signal the processes recorded under `pattern`
pub fn kill(pattern: &str, force: bool, remove: bool) -> Result<()> {
    let store = PidStore::from_env();
    let kind = SignalKind::from_force(force);
    let signaled = store.kill(pattern, kind, remove)?;

    if signaled == 0 {
        print_warning(&format!("No process recorded under '{}' was signaled", pattern));
    } else {
        print_success(&format!("Sent {} to {} process(es)", kind.signal(), signaled));
    }
    if remove {
        print_info(&format!("Removed pidfiles matching '{}'", pattern));
    }

    Ok(())
}

/// Remove pidfiles matching `pattern`
pub fn remove(pattern: &str) -> Result<()> {
    let removed = PidStore::from_env().remove(pattern)?;
    print_success(&format!("Removed {} pidfile(s)", removed));
    Ok(())
}
