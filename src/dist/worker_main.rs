//! Worker subprocess main entry point.
//!
//! This module runs when `parun run --internal-worker <INDEX>` is invoked.
//! It pulls items off the shared queue on stdin, runs the item command for
//! each, and reports on stdout until it dequeues its sentinel.

use super::ipc::{LineWriter, PipeFd};
use super::protocol::{Message, Outcome, Phase, TestReport};
use super::queue::{QueueReader, WorkFrame};
use crate::error::{ParunError, Result};
use std::process::{Command, Stdio};
use std::time::Instant;

/// Placeholder replaced by the item id in the item command.
pub const ITEM_PLACEHOLDER: &str = "{}";

/// Build the command for one item.
///
/// Every `{}` in the arguments is replaced by `item`; when no argument
/// contains the placeholder the item is appended as the last argument.
fn build_command(template: &[String], item: &str) -> Result<Command> {
    let (program, args) = template
        .split_first()
        .ok_or_else(|| ParunError::Config("item command is empty".to_string()))?;

    let has_placeholder = template.iter().any(|a| a.contains(ITEM_PLACEHOLDER));
    let mut cmd = Command::new(program.replace(ITEM_PLACEHOLDER, item));
    cmd.args(args.iter().map(|a| a.replace(ITEM_PLACEHOLDER, item)));
    if !has_placeholder {
        cmd.arg(item);
    }
    Ok(cmd)
}

/// Join captured stdout and stderr; `None` when both are empty.
fn captured_output(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    let text = text.trim_end();
    (!text.is_empty()).then(|| text.to_string())
}

/// Run one item and describe the result.
fn run_item(index: usize, template: &[String], item: &str) -> TestReport {
    let start = Instant::now();
    let result = build_command(template, item).and_then(|mut cmd| {
        cmd.env("PARUN_WORKER", index.to_string())
            .env("PARUN_ITEM", item)
            .stdin(Stdio::null());
        cmd.output().map_err(ParunError::from)
    });
    let duration = start.elapsed().as_secs_f64();

    let (phase, outcome, output) = match result {
        Ok(out) => {
            let outcome = if out.status.success() {
                Outcome::Passed
            } else {
                Outcome::Failed
            };
            (Phase::Call, outcome, captured_output(&out.stdout, &out.stderr))
        }
        // The command never ran: the item failed before its call phase
        Err(e) => (Phase::Setup, Outcome::Failed, Some(e.to_string())),
    };

    TestReport {
        item: item.to_string(),
        worker_index: index,
        phase,
        outcome,
        duration,
        output,
    }
}

/// Worker main loop.
///
/// Returns after the `exit` message has been written.
fn worker_loop(
    index: usize,
    template: &[String],
    queue: &mut QueueReader,
    writer: &mut LineWriter,
) -> Result<()> {
    let start = Instant::now();
    let mut processed = 0;
    let mut all_passed = true;

    loop {
        match queue.recv()? {
            Some(WorkFrame::Item(item)) => {
                let report = run_item(index, template, &item);
                processed += 1;
                all_passed &= !report.is_failure();
                writer.write_line(&Message::test_status(report).to_line())?;
            }
            Some(WorkFrame::Sentinel) => break,
            None => {
                let text = format!("worker {}: work queue closed before end of work", index);
                writer.write_line(&Message::error_message(text).to_line())?;
                break;
            }
        }
    }

    let exit = Message::Exit {
        worker_index: index,
        items_processed: processed,
        exit_status: if all_passed { 0 } else { 1 },
        duration: start.elapsed().as_secs_f64(),
    };
    writer.write_line(&exit.to_line())?;
    Ok(())
}

/// Run the worker subprocess main function.
///
/// This function never returns: it exits 0 after reporting `exit`, or 1
/// after reporting an `exception`.
pub fn run_worker_main(index: usize, command: &[String]) -> ! {
    // Ignore SIGPIPE - we handle pipe errors via io::Error
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    let mut queue = QueueReader::stdin();
    // Safety: file descriptor 1 is always valid for stdout
    let mut writer = LineWriter::new(unsafe { PipeFd::from_raw(1) });

    match worker_loop(index, command, &mut queue, &mut writer) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let payload = format!("worker {}: {}", index, e);
            if writer
                .write_line(&Message::exception(payload.as_str()).to_line())
                .is_err()
            {
                eprintln!("Worker error: {}", payload);
            }
            std::process::exit(1);
        }
    }
}
