use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use procwatch::core::{parse_duration, Backend, WatchConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

const LONG_ABOUT: &str = "\
procwatch - Find, signal and watch processes by name and arguments

Answers \"is my process running yet / still running / has it died\" for
deployment scripts, without a supervisor daemon. Every watch is bounded by
an explicit timeout.

MATCHING:
  A process matches NAME when its command name (or the basename of argv[0])
  equals NAME. Each --arg must equal one of its arguments, or with --loose
  be a substring of one. Scripts (job.py, run.sh, ...) that don't show up
  under their own name are looked up through their interpreter.

COMMANDS:
  pids        List pids of matching processes
  kill        Signal matching processes
  start-time  Show when a process started
  wait-start  Wait for a freshly started matching process
  wait-death  Wait for processes to exit
  pidfile     Write, list, signal or remove pidfiles
  completion  Generate shell completions

ENVIRONMENT:
  PROCWATCH_POLL_INTERVAL  Poll interval for watches (default 100ms)
  PROCWATCH_BACKEND        Process table backend: procfs or ps
  PROCWATCH_PIDDIR         Pidfile directory (default $HOME/pids)
  RUST_LOG                 Log filter, e.g. procwatch=debug
";

#[derive(Parser)]
#[command(name = "procwatch")]
#[command(version, author)]
#[command(about = "Find, signal and watch processes by name and arguments")]
#[command(long_about = LONG_ABOUT)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Log matching and polling decisions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Process table backend (procfs or ps)
    #[arg(long, global = true)]
    backend: Option<String>,
    /// Poll interval for watches (e.g. "100ms", "1s")
    #[arg(long, global = true)]
    interval: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

/// Name and argument filter shared by the matching commands
#[derive(clap::Args, Debug, Clone)]
pub struct MatchArgs {
    /// Process name (command name or argv[0] basename)
    pub name: String,
    /// Argument the process must have (repeatable)
    #[arg(long = "arg", short = 'a', value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List pids of processes matching a name and arguments
    Pids {
        #[command(flatten)]
        matching: MatchArgs,
        /// Match arguments as substrings instead of whole tokens
        #[arg(long)]
        loose: bool,
        /// Output as JSON (pid and argument vector)
        #[arg(long)]
        json: bool,
    },
    /// Signal processes matching a name and arguments
    Kill {
        #[command(flatten)]
        matching: MatchArgs,
        /// Require whole-token argument matches (default is substring)
        #[arg(long)]
        exact: bool,
        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
    },
    /// Show when a process started
    StartTime {
        /// Process id
        pid: i32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Wait for a matching process to start
    ///
    /// Exits 0 when every matching process started within the watch window,
    /// 1 when only processes that were already running matched (stale),
    /// 2 when nothing matching started before the timeout.
    WaitStart {
        #[command(flatten)]
        matching: MatchArgs,
        /// Match arguments as substrings instead of whole tokens
        #[arg(long)]
        loose: bool,
        /// How long to wait (e.g. "30s", "2m")
        #[arg(long, default_value = "30s")]
        timeout: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Wait for processes to exit, by pid or by name
    ///
    /// Exits 0 when all watched processes exited, 1 otherwise.
    WaitDeath {
        /// Process id to watch (repeatable)
        #[arg(long = "pid", value_name = "PID")]
        pids: Vec<i32>,
        /// Resolve the processes to watch by name instead
        #[arg(long, required_unless_present = "pids", conflicts_with = "pids")]
        name: Option<String>,
        /// Argument the process must have (repeatable, with --name)
        #[arg(long = "arg", short = 'a', value_name = "ARG", requires = "name", allow_hyphen_values = true)]
        args: Vec<String>,
        /// Match arguments as substrings instead of whole tokens
        #[arg(long, requires = "name")]
        loose: bool,
        /// Process id that may stay alive (repeatable)
        #[arg(long = "ignore", value_name = "PID")]
        ignore: Vec<i32>,
        /// How long to wait (e.g. "30s", "2m")
        #[arg(long, default_value = "30s")]
        timeout: String,
    },
    /// Manage pidfiles
    Pidfile {
        #[command(subcommand)]
        command: PidfileCommands,
    },
    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum PidfileCommands {
    /// Record a pid for an application
    Write {
        /// Application name
        app: String,
        /// Pid to record (defaults to the parent process - the caller)
        #[arg(long)]
        pid: Option<i32>,
    },
    /// List pidfiles and whether their process is alive
    List {
        /// Application name glob
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Signal the processes recorded in pidfiles
    Kill {
        /// Application name glob (quote it)
        pattern: String,
        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
        /// Remove the pidfiles afterwards
        #[arg(long)]
        remove: bool,
    },
    /// Remove pidfiles
    Remove {
        /// Application name glob (quote it)
        pattern: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("procwatch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("procwatch=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Environment settings with command-line overrides applied
fn resolve_config(backend: Option<&str>, interval: Option<&str>) -> Result<WatchConfig> {
    let mut config = WatchConfig::from_env()?;

    if let Some(backend) = backend {
        config.backend = backend.parse::<Backend>()?;
    }

    if let Some(interval) = interval {
        let interval = parse_duration(interval)
            .with_context(|| format!("Invalid poll interval: {}", interval))?;
        config = config.with_poll_interval(interval)?;
    }

    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(cli.backend.as_deref(), cli.interval.as_deref())?;

    match cli.command {
        Commands::Pids {
            matching,
            loose,
            json,
        } => commands::pids::execute(&config, &matching, loose, json),
        Commands::Kill {
            matching,
            exact,
            force,
        } => commands::kill::execute(&config, &matching, exact, force),
        Commands::StartTime { pid, json } => commands::start_time::execute(&config, pid, json),
        Commands::WaitStart {
            matching,
            loose,
            timeout,
            json,
        } => commands::wait_start::execute(&config, &matching, loose, &timeout, json),
        Commands::WaitDeath {
            pids,
            name,
            args,
            loose,
            ignore,
            timeout,
        } => commands::wait_death::execute(
            &config,
            &pids,
            name.map(|name| MatchArgs { name, args }),
            loose,
            &ignore,
            &timeout,
        ),
        Commands::Pidfile { command } => match command {
            PidfileCommands::Write { app, pid } => commands::pidfile::write(&app, pid),
            PidfileCommands::List { pattern } => commands::pidfile::list(&config, &pattern),
            PidfileCommands::Kill {
                pattern,
                force,
                remove,
            } => commands::pidfile::kill(&pattern, force, remove),
            PidfileCommands::Remove { pattern } => commands::pidfile::remove(&pattern),
        },
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}
