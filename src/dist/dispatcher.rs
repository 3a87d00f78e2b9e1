//! Message dispatch for worker result channels.
//!
//! Every line that arrives on a result channel goes through
//! [`Dispatcher::dispatch`]. Unknown or malformed messages and failures
//! inside a handler are reported as internal errors and the run goes on;
//! only an `exception` message stops it.

use super::pool::WorkerHandle;
use super::protocol::{Message, TestReport};
use super::stats::RunStatistics;
use crate::error::{ParunError, Result};
use crate::hook::ReportHook;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Routes worker messages to the statistics, the report hook and the
/// user-facing error stream.
pub struct Dispatcher<'a, W: Write> {
    hook: &'a mut dyn ReportHook,
    errors: W,
    shutdown_timeout: Duration,
}

impl<'a, W: Write> Dispatcher<'a, W> {
    pub fn new(hook: &'a mut dyn ReportHook, errors: W, shutdown_timeout: Duration) -> Self {
        Self {
            hook,
            errors,
            shutdown_timeout,
        }
    }

    /// Handle one line received from `handle`'s channel.
    ///
    /// Returns `Err` only for a worker exception.
    pub fn dispatch(
        &mut self,
        handle: &mut WorkerHandle,
        line: &str,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        match self.handle_line(handle, line, stats) {
            Ok(()) => Ok(()),
            Err(e) if e.is_worker_exception() => Err(e),
            Err(e) => {
                self.internal_error(handle.index, &e);
                Ok(())
            }
        }
    }

    fn handle_line(
        &mut self,
        handle: &mut WorkerHandle,
        line: &str,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        let message = Message::from_line(line).map_err(|e| ParunError::Protocol {
            index: handle.index,
            reason: e.to_string(),
        })?;
        debug!(worker_id = handle.index, kind = message.kind(), "Worker message");

        match message {
            Message::TestStatus { report } => self.on_test_status(handle, report, stats),
            Message::Exit {
                worker_index,
                items_processed,
                exit_status,
                duration,
            } => {
                if !handle.is_live() {
                    return Err(ParunError::Protocol {
                        index: handle.index,
                        reason: "exit received from a worker that already exited".into(),
                    });
                }
                if worker_index != handle.index {
                    warn!(
                        worker_id = handle.index,
                        reported = worker_index,
                        "Worker reported a different index in its exit message"
                    );
                }
                // The summary names the slot; a mismatch was warned above
                stats.record_exit(handle.index, items_processed, duration);
                debug!(
                    worker_id = handle.index,
                    items = items_processed,
                    exit_status,
                    "Worker exited"
                );
                handle.retire(self.shutdown_timeout);
                Ok(())
            }
            Message::ErrorMessage { text } => {
                writeln!(self.errors, "{}", text)?;
                Ok(())
            }
            Message::Exception { payload } => Err(ParunError::WorkerException {
                index: handle.index,
                payload,
            }),
        }
    }

    fn on_test_status(
        &mut self,
        handle: &WorkerHandle,
        report: TestReport,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        // Completions never exceed dispatches; an extra one is still reported
        let counted = report.counts_as_completed()
            && stats.items_completed < stats.items_dispatched;
        if counted {
            stats.items_completed += 1;
            if report.is_failure() {
                stats.items_failed += 1;
            }
        } else if report.counts_as_completed() {
            let err = ParunError::Protocol {
                index: handle.index,
                reason: format!(
                    "completion for {} exceeds the {} item(s) dispatched",
                    report.item, stats.items_dispatched
                ),
            };
            self.internal_error(handle.index, &err);
        }

        self.hook.log_report(&report)?;

        if counted && report.is_failure() {
            writeln!(self.errors, "FAILED {} (worker {})", report.item, handle.index)?;
        }
        Ok(())
    }

    fn internal_error(&mut self, index: usize, err: &ParunError) {
        error!(tag = "INTERNAL_ERROR", worker_id = index, error = %err, "Failed to handle worker message");
        // The error stream is best-effort; the log line above already has it
        let _ = writeln!(self.errors, "INTERNAL_ERROR> worker {}: {}", index, err);
    }
}
