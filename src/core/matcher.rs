//! Mapping a process name plus argument filter onto a set of pids.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, trace};

use super::table::ProcessTable;

/// How required arguments are compared against a candidate's argv.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Each required argument must equal some argv token.
    #[default]
    Exact,
    /// Each required argument must be a substring of some argv token.
    Loose,
}

impl MatchMode {
    pub fn from_loose(loose: bool) -> Self {
        if loose {
            MatchMode::Loose
        } else {
            MatchMode::Exact
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCriteria {
    pub name: String,
    pub required_args: Vec<String>,
    pub mode: MatchMode,
}

impl MatchCriteria {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_args: Vec::new(),
            mode: MatchMode::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.required_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// True if every required argument is satisfied by some token of `argv`.
    pub fn accepts(&self, argv: &[String]) -> bool {
        self.required_args.iter().all(|required| match self.mode {
            MatchMode::Exact => argv.iter().any(|token| token == required),
            MatchMode::Loose => argv.iter().any(|token| token.contains(required.as_str())),
        })
    }

    /// The same search expressed against an interpreter running the script
    /// `self.name`: the script becomes the first required argument.
    fn via_interpreter(&self, interpreter: &str) -> Self {
        let mut required_args = Vec::with_capacity(self.required_args.len() + 1);
        required_args.push(self.name.clone());
        required_args.extend(self.required_args.iter().cloned());
        Self {
            name: interpreter.to_string(),
            required_args,
            mode: self.mode,
        }
    }
}

/// Interpreters tried, in order, for scripts that don't show up under their
/// own name.
const INTERPRETER_FALLBACKS: &[(&str, &[&str])] = &[
    ("py", &["python", "python3"]),
    ("sh", &["bash", "sh"]),
    ("pl", &["perl"]),
    ("rb", &["ruby"]),
];

/// Interpreter names to try for `name`, empty when it has no known script extension.
pub fn interpreters_for(name: &str) -> &'static [&'static str] {
    let Some(extension) = Path::new(name).extension().and_then(|ext| ext.to_str()) else {
        return &[];
    };
    INTERPRETER_FALLBACKS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, interpreters)| *interpreters)
        .unwrap_or(&[])
}

pub struct ProcessMatcher<T> {
    table: T,
}

impl<T: ProcessTable> ProcessMatcher<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Pids of running processes matching `criteria`. No match is an empty set.
    pub fn find_matches(&self, criteria: &MatchCriteria) -> Result<BTreeSet<i32>> {
        let candidates = self.table.pids_named(&criteria.name)?;
        if !candidates.is_empty() {
            return Ok(self.filter(candidates, criteria));
        }

        // Scripts launched as `<interpreter> <script>`. Interpreter names carry
        // no script extension, so this never goes more than one level deep.
        let mut matches = BTreeSet::new();
        for interpreter in interpreters_for(&criteria.name) {
            let fallback = criteria.via_interpreter(interpreter);
            let candidates = self.table.pids_named(interpreter)?;
            trace!(
                script = %criteria.name,
                interpreter,
                candidates = candidates.len(),
                "trying interpreter fallback"
            );
            matches.extend(self.filter(candidates, &fallback));
        }
        Ok(matches)
    }

    pub fn find_matches_by(
        &self,
        name: &str,
        required_args: &[String],
        mode: MatchMode,
    ) -> Result<BTreeSet<i32>> {
        self.find_matches(&MatchCriteria::new(name).args(required_args.iter().cloned()).mode(mode))
    }

    fn filter(&self, candidates: Vec<i32>, criteria: &MatchCriteria) -> BTreeSet<i32> {
        if criteria.required_args.is_empty() {
            return candidates.into_iter().collect();
        }

        candidates
            .into_iter()
            .filter(|&pid| match self.table.arguments(pid) {
                Some(argv) => criteria.accepts(&argv),
                None => {
                    debug!(pid, name = %criteria.name, "dropping candidate with unreadable arguments");
                    false
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{FakeProcess, FakeTable};

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn test_exact_requires_whole_tokens() {
        let criteria = MatchCriteria::new("python").args(["job.py", "--port"]);
        assert!(criteria.accepts(&argv(&["python", "job.py", "--port", "80"])));
        assert!(!criteria.accepts(&argv(&["python", "/srv/job.py", "--port"])));
        assert!(!criteria.accepts(&argv(&["python", "Job.py", "--port"])));
    }

    #[test]
    fn test_loose_requires_every_argument_as_substring() {
        let criteria = MatchCriteria::new("python")
            .args(["job.py", "port=80"])
            .mode(MatchMode::Loose);
        assert!(criteria.accepts(&argv(&["python", "/srv/job.py", "--port=8080"])));
        // The first argument alone is not enough
        assert!(!criteria.accepts(&argv(&["python", "/srv/job.py", "--port=9090"])));
        assert!(!criteria.accepts(&argv(&["python", "/srv/JOB.py", "--port=80"])));
    }

    #[test]
    fn test_no_required_args_accepts_anything() {
        assert!(MatchCriteria::new("x").accepts(&[]));
    }

    #[test]
    fn test_name_only_returns_all_instances() {
        let table = FakeTable::new()
            .with(FakeProcess::new(10, &["nginx", "-g", "daemon off;"]))
            .with(FakeProcess::new(11, &["/usr/sbin/nginx"]))
            .with(FakeProcess::new(12, &["redis-server"]));
        let matcher = ProcessMatcher::new(&table);

        let pids = matcher.find_matches(&MatchCriteria::new("nginx")).unwrap();
        assert_eq!(pids, BTreeSet::from([10, 11]));
    }

    #[test]
    fn test_required_args_filter_candidates() {
        let table = FakeTable::new()
            .with(FakeProcess::new(10, &["java", "-jar", "a.jar"]))
            .with(FakeProcess::new(11, &["java", "-jar", "b.jar"]))
            .with(FakeProcess::new(12, &["java", "-jar", "/opt/b.jar"]));
        let matcher = ProcessMatcher::new(&table);

        let exact = matcher
            .find_matches_by("java", &argv(&["b.jar"]), MatchMode::Exact)
            .unwrap();
        assert_eq!(exact, BTreeSet::from([11]));

        let loose = matcher
            .find_matches_by("java", &argv(&["b.jar"]), MatchMode::Loose)
            .unwrap();
        assert_eq!(loose, BTreeSet::from([11, 12]));
    }

    #[test]
    fn test_unknown_name_without_extension_is_empty() {
        let table = FakeTable::new().with(FakeProcess::new(10, &["sleep", "30"]));
        let matcher = ProcessMatcher::new(&table);

        let pids = matcher.find_matches(&MatchCriteria::new("nothing-here")).unwrap();
        assert!(pids.is_empty());
        assert_eq!(table.lookups(), 1);
    }

    #[test]
    fn test_python_script_falls_back_to_interpreter() {
        let table = FakeTable::new()
            .with(FakeProcess::new(20, &["python", "job.py", "--once"]))
            .with(FakeProcess::new(21, &["python", "other.py"]))
            .with(FakeProcess::new(22, &["/usr/bin/python3", "job.py"]));
        let matcher = ProcessMatcher::new(&table);

        let pids = matcher.find_matches(&MatchCriteria::new("job.py")).unwrap();
        assert_eq!(pids, BTreeSet::from([20, 22]));

        let pids = matcher
            .find_matches(&MatchCriteria::new("job.py").arg("--once"))
            .unwrap();
        assert_eq!(pids, BTreeSet::from([20]));
    }

    #[test]
    fn test_shell_script_unions_bash_and_sh() {
        let table = FakeTable::new()
            .with(FakeProcess::new(30, &["bash", "deploy.sh"]))
            .with(FakeProcess::new(31, &["sh", "deploy.sh"]))
            .with(FakeProcess::new(32, &["sh", "backup.sh"]));
        let matcher = ProcessMatcher::new(&table);

        let pids = matcher.find_matches(&MatchCriteria::new("deploy.sh")).unwrap();
        assert_eq!(pids, BTreeSet::from([30, 31]));
    }

    #[test]
    fn test_direct_match_skips_fallback() {
        let table = FakeTable::new()
            .with(FakeProcess::new(40, &["./job.py"]))
            .with(FakeProcess::new(41, &["python", "job.py"]));
        let matcher = ProcessMatcher::new(&table);

        let pids = matcher.find_matches(&MatchCriteria::new("job.py")).unwrap();
        assert_eq!(pids, BTreeSet::from([40]));
        assert_eq!(table.lookups(), 1);
    }

    #[test]
    fn test_unreadable_arguments_are_dropped() {
        let table = FakeTable::new()
            .with(FakeProcess::new(50, &["worker", "--queue=a"]).unreadable_args().comm("worker"))
            .with(FakeProcess::new(51, &["worker", "--queue=a"]));
        let matcher = ProcessMatcher::new(&table);

        let pids = matcher
            .find_matches(&MatchCriteria::new("worker").arg("--queue=a"))
            .unwrap();
        assert_eq!(pids, BTreeSet::from([51]));

        // Without an argument filter the argv is never read
        let pids = matcher.find_matches(&MatchCriteria::new("worker")).unwrap();
        assert_eq!(pids, BTreeSet::from([50, 51]));
    }

    #[test]
    fn test_interpreters_for() {
        assert_eq!(interpreters_for("job.py"), &["python", "python3"]);
        assert_eq!(interpreters_for("/srv/run.sh"), &["bash", "sh"]);
        assert!(interpreters_for("nginx").is_empty());
        assert!(interpreters_for("archive.tar").is_empty());
    }
}
