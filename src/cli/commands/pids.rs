use anyhow::Result;
use colored::*;
use procwatch::core::{MatchMode, ProcessDescriptor, ProcessMatcher, ProcessTable, WatchConfig};

use crate::output::{format_name, format_pid};
use crate::MatchArgs;

/// Print the pids of matching processes, one per line
pub fn execute(config: &WatchConfig, matching: &MatchArgs, loose: bool, json: bool) -> Result<()> {
    let matcher = ProcessMatcher::new(config.table());
    let criteria = super::criteria(matching, MatchMode::from_loose(loose));
    let pids = matcher.find_matches(&criteria)?;

    if json {
        // Processes that exited since matching are left out
        let descriptors: Vec<ProcessDescriptor> = pids
            .iter()
            .filter_map(|pid| matcher.table().describe(*pid))
            .collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    if pids.is_empty() {
        eprintln!(
            "{} no process matching {}",
            "✗".red().bold(),
            format_name(&matching.name)
        );
        std::process::exit(1);
    }

    for pid in &pids {
        println!("{}", format_pid(*pid));
    }

    Ok(())
}
