use anyhow::Result;
use procwatch::core::{kill_matching, MatchMode, ProcessMatcher, SignalKind, WatchConfig};

use crate::output::{format_name, print_success, print_warning};
use crate::MatchArgs;

/// Signal every process matching the name and arguments
pub fn execute(config: &WatchConfig, matching: &MatchArgs, exact: bool, force: bool) -> Result<()> {
    let matcher = ProcessMatcher::new(config.table());
    let criteria = super::criteria(matching, MatchMode::from_loose(!exact));
    let kind = SignalKind::from_force(force);

    let signaled = kill_matching(&matcher, &criteria, kind)?;

    if signaled == 0 {
        print_warning(&format!(
            "No process matching {} was signaled",
            format_name(&matching.name)
        ));
        std::process::exit(1);
    }

    print_success(&format!(
        "Sent {} to {} process{} matching {}",
        kind.signal(),
        signaled,
        if signaled == 1 { "" } else { "es" },
        format_name(&matching.name)
    ));

    Ok(())
}
