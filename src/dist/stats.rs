//! Aggregate statistics for one run.

use std::io::{self, Write};

/// Counters for a run, owned by the coordinator and updated by the
/// dispatcher as messages arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    /// Items pushed onto the work queue.
    pub items_dispatched: usize,
    /// Items with a terminal report.
    pub items_completed: usize,
    /// Terminal reports that failed.
    pub items_failed: usize,
    /// Workers whose channel closed without an `exit` message.
    pub workers_lost: usize,
    /// One line per exited worker, in the order their `exit` arrived.
    pub per_worker_summaries: Vec<String>,
}

impl RunStatistics {
    pub fn new(items_dispatched: usize) -> Self {
        Self {
            items_dispatched,
            ..Default::default()
        }
    }

    /// Record the summary line for an exited worker.
    ///
    /// `worker_index` is the pool slot the exit arrived on, not the index
    /// the worker put in its `exit` message.
    pub fn record_exit(&mut self, worker_index: usize, items_processed: usize, duration: f64) {
        self.per_worker_summaries.push(format!(
            "worker {} processed {} item(s) in {:.2} seconds",
            worker_index, items_processed, duration
        ));
    }

    /// Items dispatched but never reported as completed.
    pub fn unaccounted(&self) -> usize {
        self.items_dispatched.saturating_sub(self.items_completed)
    }

    /// Items that completed without failing.
    pub fn items_passed(&self) -> usize {
        self.items_completed - self.items_failed
    }

    /// True when every dispatched item completed and none failed.
    pub fn is_success(&self) -> bool {
        self.items_failed == 0 && self.unaccounted() == 0
    }

    /// Warning line for the accounting discrepancy, if any.
    pub fn unaccounted_warning(&self) -> Option<String> {
        match self.unaccounted() {
            0 => None,
            n => Some(format!("{} item(s) unaccounted for", n)),
        }
    }

    /// Write the end-of-run report: summaries, totals and any warning.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for line in &self.per_worker_summaries {
            writeln!(out, "{}", line)?;
        }
        writeln!(
            out,
            "{} passed, {} failed, {} of {} item(s) completed",
            self.items_passed(),
            self.items_failed,
            self.items_completed,
            self.items_dispatched
        )?;
        if let Some(warning) = self.unaccounted_warning() {
            writeln!(out, "WARNING: {}", warning)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line_format() {
        let mut stats = RunStatistics::new(0);
        stats.record_exit(1, 0, 0.01);
        assert_eq!(
            stats.per_worker_summaries,
            vec!["worker 1 processed 0 item(s) in 0.01 seconds"]
        );
    }

    #[test]
    fn test_unaccounted_items() {
        let mut stats = RunStatistics::new(4);
        stats.items_completed = 3;
        assert_eq!(stats.unaccounted(), 1);
        assert_eq!(
            stats.unaccounted_warning().as_deref(),
            Some("1 item(s) unaccounted for")
        );
        assert!(!stats.is_success());

        stats.items_completed = 4;
        assert!(stats.unaccounted_warning().is_none());
        assert!(stats.is_success());
    }

    #[test]
    fn test_render() {
        let mut stats = RunStatistics::new(5);
        stats.items_completed = 4;
        stats.items_failed = 1;
        stats.record_exit(0, 2, 1.5);
        stats.record_exit(1, 2, 1.25);

        let mut out = Vec::new();
        stats.render(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "worker 0 processed 2 item(s) in 1.50 seconds",
                "worker 1 processed 2 item(s) in 1.25 seconds",
                "3 passed, 1 failed, 4 of 5 item(s) completed",
                "WARNING: 1 item(s) unaccounted for",
            ]
        );
    }
}
