//! Reporting hooks that receive every test report.

use crate::dist::{Outcome, TestReport};
use crate::error::{ParunError, Result};
use crate::theme::Themed;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Sink for per-item reports.
///
/// The coordinator calls [`log_report`](Self::log_report) once per
/// `test_status` message with the report exactly as the worker sent it.
pub trait ReportHook {
    fn log_report(&mut self, report: &TestReport) -> Result<()>;

    /// Called once after the last report of a successful run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Prints one line per finished item.
pub struct ConsoleHook<W: Write> {
    out: W,
    /// Print captured output below failures.
    show_output: bool,
}

impl<W: Write> ConsoleHook<W> {
    pub fn new(out: W, show_output: bool) -> Self {
        Self { out, show_output }
    }
}

impl<W: Write> ReportHook for ConsoleHook<W> {
    fn log_report(&mut self, report: &TestReport) -> Result<()> {
        if !report.counts_as_completed() {
            return Ok(());
        }
        let label = match report.outcome {
            Outcome::Passed => "PASSED".passed(),
            Outcome::Failed => "FAILED".failed(),
            Outcome::Skipped => "SKIPPED".warning(),
        };
        let detail = format!("[w{}] {:.2}s", report.worker_index, report.duration);
        writeln!(self.out, "{} {} {}", label, report.item, detail.muted())?;

        if self.show_output
            && report.is_failure()
            && let Some(output) = report.output.as_deref().filter(|o| !o.is_empty())
        {
            for line in output.lines() {
                writeln!(self.out, "    {}", line)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Appends every report as one JSON object per line.
pub struct JsonLinesHook {
    writer: BufWriter<File>,
}

impl JsonLinesHook {
    /// Create (or truncate) the report file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            ParunError::Hook(format!("Cannot create report file {}: {}", path.display(), e))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ReportHook for JsonLinesHook {
    fn log_report(&mut self, report: &TestReport) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Fans reports out to several hooks.
///
/// Every hook sees every report even if an earlier one fails; the first
/// error is returned.
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Box<dyn ReportHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Box<dyn ReportHook>) {
        self.hooks.push(hook);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }
}

impl ReportHook for HookSet {
    fn log_report(&mut self, report: &TestReport) -> Result<()> {
        let mut first_err = None;
        for hook in &mut self.hooks {
            if let Err(e) = hook.log_report(report) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn finish(&mut self) -> Result<()> {
        let mut first_err = None;
        for hook in &mut self.hooks {
            if let Err(e) = hook.finish() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Records reports in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingHook {
    pub reports: Vec<TestReport>,
    pub fail_on: Option<String>,
    pub finished: bool,
}

#[cfg(test)]
impl ReportHook for RecordingHook {
    fn log_report(&mut self, report: &TestReport) -> Result<()> {
        if self.fail_on.as_deref() == Some(report.item.as_str()) {
            return Err(ParunError::Hook(format!("refused {}", report.item)));
        }
        self.reports.push(report.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
