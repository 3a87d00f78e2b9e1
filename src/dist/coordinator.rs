//! The coordinator: spawns the pool, feeds the queue and drains results
//! until every worker has exited.

use super::dispatcher::Dispatcher;
use super::distributor::Feeder;
use super::multiplexer::{Event, next_batch};
use super::pool::WorkerPool;
use super::queue::{check_item, work_queue};
use super::spawn::Launch;
use super::stats::RunStatistics;
use crate::error::{ParunError, Result};
use crate::hook::ReportHook;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Configuration for one coordinated run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of worker processes to spawn.
    pub pool_size: usize,
    /// How long to wait for a worker to exit after its `exit` message (or
    /// after its channel closed) before it is terminated.
    pub shutdown_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// One worker per available CPU, at least one.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Distributing,
    Draining,
    Reporting,
    Done,
    Failed,
}

/// Runs a set of work items on a pool of worker processes.
pub struct Coordinator<L: Launch> {
    config: CoordinatorConfig,
    launcher: L,
    state: RunState,
}

impl<L: Launch> Coordinator<L> {
    pub fn new(config: CoordinatorConfig, launcher: L) -> Self {
        Self {
            config,
            launcher,
            state: RunState::NotStarted,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run `items` to completion.
    ///
    /// Every report goes to `hook`; failure notices, worker diagnostics and
    /// internal errors go to `errors`. Returns the statistics once every
    /// worker has exited, or the first fatal error (a worker exception or
    /// a failure to enqueue work), after terminating the remaining workers.
    #[instrument(skip_all, fields(items = items.len(), workers = self.config.pool_size))]
    pub fn run<W: Write>(
        &mut self,
        items: Vec<String>,
        hook: &mut dyn ReportHook,
        errors: W,
    ) -> Result<RunStatistics> {
        if self.state != RunState::NotStarted {
            return Err(ParunError::Config(
                "a coordinator can only run once".to_string(),
            ));
        }
        let result = self.execute(items, hook, errors);
        if result.is_err() {
            self.state = RunState::Failed;
        }
        result
    }

    fn execute<W: Write>(
        &mut self,
        items: Vec<String>,
        hook: &mut dyn ReportHook,
        errors: W,
    ) -> Result<RunStatistics> {
        let pool_size = self.config.pool_size;
        if pool_size == 0 {
            return Err(ParunError::Config(
                "pool size must be at least 1".to_string(),
            ));
        }
        for item in &items {
            check_item(item)?;
        }

        let (writer, reader) = work_queue()?;
        let mut pool = WorkerPool::spawn(&self.launcher, pool_size, &reader)?;
        // Workers hold their own copies; ours would keep the queue open
        drop(reader);

        let mut stats = RunStatistics::new(items.len());
        self.state = RunState::Distributing;
        info!(items = items.len(), workers = pool_size, "Distributing work");
        let mut feeder = match Feeder::start(items, pool_size, writer) {
            Ok(feeder) => feeder,
            Err(e) => {
                pool.abort_live();
                return Err(e);
            }
        };

        self.state = RunState::Draining;
        {
            let mut dispatcher = Dispatcher::new(&mut *hook, errors, self.config.shutdown_timeout);
            if let Err(e) = self.drain(&mut pool, &mut dispatcher, &mut feeder, &mut stats) {
                warn!(error = %e, "Aborting run");
                pool.abort_live();
                feeder.detach();
                return Err(e);
            }
        }

        self.state = RunState::Reporting;
        let frames = feeder.join()?;
        debug!(frames, "Feeder finished");
        hook.finish()?;

        if let Some(warning) = stats.unaccounted_warning() {
            warn!(
                dispatched = stats.items_dispatched,
                completed = stats.items_completed,
                "{}",
                warning
            );
        }
        info!(
            completed = stats.items_completed,
            failed = stats.items_failed,
            "Run finished"
        );
        self.state = RunState::Done;
        Ok(stats)
    }

    /// Process result batches until no handle is live.
    fn drain<W: Write>(
        &self,
        pool: &mut WorkerPool,
        dispatcher: &mut Dispatcher<'_, W>,
        feeder: &mut Feeder,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        while pool.live_count() > 0 {
            let batch = next_batch(pool.live_channels())?;
            for (slot, event) in batch {
                let Some(handle) = pool.get_mut(slot) else {
                    continue;
                };
                match event {
                    Event::Line(line) => dispatcher.dispatch(handle, &line, stats)?,
                    Event::Closed if handle.is_live() => {
                        let reason = handle.retire(self.config.shutdown_timeout);
                        let reason = reason.map_or_else(|| "unknown".to_string(), |r| r.description());
                        warn!(worker_id = slot, reason = %reason, "Worker exited without reporting");
                        stats.workers_lost += 1;
                    }
                    Event::Closed => {}
                }
            }
            feeder.check()?;
        }
        Ok(())
    }
}
