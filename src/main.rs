//! parun - parallel test runner

mod cli;
mod dist;
mod error;
mod hook;
mod logging;
mod source;
mod theme;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use std::io::{self, Write};
use tracing::info;

use cli::{Cli, Commands, RunArgs};
use dist::{Coordinator, SelfExec};
use hook::{ConsoleHook, HookSet, JsonLinesHook};
use logging::LogConfig;
use source::{Chain, CommandSource, FileSource, ListSource, WorkItemSource};
use theme::Themed;

/// Every item passed and every item was accounted for.
const EXIT_OK: i32 = 0;
/// Some items failed or never reported.
const EXIT_FAILURES: i32 = 1;
/// The run itself could not complete.
const EXIT_FATAL: i32 = 2;

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        theme::disable_colors();
    }

    let result = match &cli.command {
        Commands::Run(args) => {
            // Worker mode never returns
            if let Some(index) = args.internal_worker {
                dist::run_worker_main(index, &args.command);
            }
            init_logging(&cli);
            cmd_run(&cli, args)
        }
        Commands::Completions(args) => {
            args.generate();
            Ok(EXIT_OK)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!(
                "{}: {}",
                "error"
                    .if_supports_color(Stderr, |text| text.red())
                    .if_supports_color(Stderr, |text| text.bold()),
                e
            );
            // Print the error chain if there are causes
            for cause in e.chain().skip(1) {
                eprintln!(
                    "  {}: {}",
                    "caused by".if_supports_color(Stderr, |text| text.yellow()),
                    cause
                );
            }
            std::process::exit(EXIT_FATAL);
        }
    }
}

/// Set up tracing from the CLI flags; environment variables fill in what
/// the flags leave unset.
fn init_logging(cli: &Cli) {
    let mut config = LogConfig::for_verbosity(cli.verbose, cli.quiet)
        .with_ansi(!cli.no_color)
        .with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if let Some(path) = &cli.log_file {
        config = config.with_file(path.clone());
    }
    logging::init(config);
}

/// Gather items from `--item`, `--items` and `--collect`, in that order.
fn collect_items(args: &RunArgs) -> Result<Vec<String>> {
    let mut sources = Chain::new();
    sources.push(Box::new(ListSource(args.item.clone())));
    if let Some(path) = &args.items {
        sources.push(Box::new(FileSource::new(path)));
    }
    if let Some(script) = &args.collect {
        sources.push(Box::new(CommandSource::new(script)));
    }
    Ok(sources.items()?)
}

/// Run all items and print the summary. Returns the process exit code.
fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<i32> {
    let config = args.coordinator_config().map_err(anyhow::Error::msg)?;
    let items = collect_items(args).context("Failed to collect work items")?;
    info!(items = items.len(), workers = config.pool_size, "Starting run");

    let mut hooks = HookSet::new();
    if !cli.quiet {
        hooks.push(Box::new(ConsoleHook::new(io::stdout(), args.show_output)));
    }
    if let Some(path) = &args.report_file {
        hooks.push(Box::new(JsonLinesHook::create(path)?));
    }

    let mut coordinator = Coordinator::new(config, SelfExec::new(args.command.clone()));
    let stats = coordinator.run(items, &mut hooks, io::stderr())?;

    let mut out = io::stdout().lock();
    stats.render(&mut out)?;
    out.flush()?;

    if stats.is_success() {
        Ok(EXIT_OK)
    } else {
        if stats.items_failed > 0 {
            eprintln!("{} {} item(s) failed", "FAILED".failed(), stats.items_failed);
        }
        Ok(EXIT_FAILURES)
    }
}
