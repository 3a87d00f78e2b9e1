//! Command-line interface definitions using clap.

use crate::dist::CoordinatorConfig;
use crate::logging::LogFormat;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Run test items in parallel across a pool of worker processes.
#[derive(Parser, Debug)]
#[command(name = "parun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress per-item output; only the summary and errors are printed.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    /// Log format: pretty, compact or json.
    #[arg(long, global = true, value_parser = clap::value_parser!(LogFormat))]
    pub log_format: Option<LogFormat>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run work items on a pool of workers.
    Run(RunArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Number of worker processes (default: one per CPU).
    #[arg(short = 'n', long, env = "PARUN_WORKERS")]
    pub workers: Option<usize>,

    /// Work item id (repeatable).
    #[arg(short, long = "item", value_name = "ID")]
    pub item: Vec<String>,

    /// Read item ids from a file, one per line ("-" for stdin).
    #[arg(long, value_name = "FILE")]
    pub items: Option<PathBuf>,

    /// Collect item ids from the output of a shell command.
    #[arg(long, value_name = "CMD")]
    pub collect: Option<String>,

    /// Write every report as JSON lines to this file.
    #[arg(long, env = "PARUN_REPORT_FILE", value_name = "PATH")]
    pub report_file: Option<PathBuf>,

    /// Seconds to wait for a worker to exit after it reported before it is
    /// terminated.
    #[arg(long, default_value_t = 5.0, value_name = "SECS")]
    pub shutdown_timeout: f64,

    /// Print captured output of failing items.
    #[arg(long)]
    pub show_output: bool,

    /// Run as a worker for the given pool slot.
    #[arg(long, hide = true, value_name = "INDEX")]
    pub internal_worker: Option<usize>,

    /// Command run for each item; `{}` is replaced by the item id, otherwise
    /// the id is appended.
    #[arg(last = true, required_unless_present = "internal_worker", value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Coordinator settings from the command line.
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, String> {
        let mut config = CoordinatorConfig::default();
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err("--workers must be at least 1".to_string());
            }
            config.pool_size = workers;
        }
        config.shutdown_timeout = Duration::try_from_secs_f64(self.shutdown_timeout)
            .map_err(|_| format!("invalid --shutdown-timeout: {}", self.shutdown_timeout))?;
        Ok(config)
    }
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "parun",
            &mut std::io::stdout(),
        );
    }
}
