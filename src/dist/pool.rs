//! Worker handles and the arena that owns them.
//!
//! A [`WorkerHandle`] is a plain record: slot index, process, result
//! channel and a live flag. The [`WorkerPool`] keeps them in a `Vec` indexed
//! by slot, which is also the key the multiplexer uses to map a ready file
//! descriptor back to its worker.

use super::ipc::LineReader;
use super::proc::Proc;
use super::queue::QueueReader;
use super::signals::TerminationReason;
use super::spawn::{Launch, spawn_worker};
use crate::error::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One pool slot.
#[derive(Debug)]
pub struct WorkerHandle {
    /// Pool slot, `0..pool_size`.
    pub index: usize,
    proc: Option<Proc>,
    channel: Option<LineReader>,
    live: bool,
}

impl WorkerHandle {
    pub fn new(index: usize, proc: Proc, channel: LineReader) -> Self {
        Self {
            index,
            proc: Some(proc),
            channel: Some(channel),
            live: true,
        }
    }

    /// A live handle with no process or channel behind it.
    #[cfg(test)]
    pub(crate) fn detached(index: usize) -> Self {
        Self {
            index,
            proc: None,
            channel: None,
            live: true,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    #[cfg(test)]
    pub fn pid(&self) -> Option<i32> {
        self.proc.as_ref().map(|p| p.pid().as_raw())
    }

    /// The result channel, while the handle is live.
    pub fn channel_mut(&mut self) -> Option<&mut LineReader> {
        if self.live {
            self.channel.as_mut()
        } else {
            None
        }
    }

    /// Mark the handle not live, join the process (terminating it if it
    /// outlives `timeout`) and close the result channel.
    ///
    /// Returns how the process ended, if it had one.
    pub fn retire(&mut self, timeout: Duration) -> Option<TerminationReason> {
        self.live = false;
        self.channel = None;
        let mut proc = self.proc.take()?;
        match proc.finish(timeout) {
            Ok(reason) => {
                debug!(worker_id = self.index, reason = %reason, "Worker joined");
                Some(reason)
            }
            Err(e) => {
                warn!(worker_id = self.index, error = %e, "Failed to join worker");
                None
            }
        }
    }

    /// Terminate the process now (SIGTERM, then SIGKILL) and retire.
    pub fn abort(&mut self) {
        self.live = false;
        self.channel = None;
        if let Some(mut proc) = self.proc.take()
            && let Err(e) = proc.stop()
        {
            warn!(worker_id = self.index, error = %e, "Failed to terminate worker");
        }
    }
}

/// All handles of one run, indexed by slot.
#[derive(Debug, Default)]
pub struct WorkerPool {
    handles: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `size` workers, each reading from `queue`.
    ///
    /// If any spawn fails, the workers already started are terminated when
    /// the partial pool is dropped.
    pub fn spawn(launcher: &dyn Launch, size: usize, queue: &QueueReader) -> Result<Self> {
        info!(workers = size, "Starting worker pool");
        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let (proc, channel) = spawn_worker(launcher, index, queue)?;
            debug!(worker_id = index, pid = proc.pid().as_raw(), "Worker spawned");
            handles.push(WorkerHandle::new(index, proc, channel));
        }
        Ok(Self { handles })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WorkerHandle> {
        self.handles.get_mut(index)
    }

    /// Number of handles still live.
    pub fn live_count(&self) -> usize {
        self.handles.iter().filter(|h| h.live).count()
    }

    /// `(slot, channel)` for every live handle with an open channel.
    pub fn live_channels(&mut self) -> Vec<(usize, &mut LineReader)> {
        self.handles
            .iter_mut()
            .filter_map(|h| {
                let index = h.index;
                h.channel_mut().map(|c| (index, c))
            })
            .collect()
    }

    /// Terminate every still-live worker.
    pub fn abort_live(&mut self) {
        for handle in self.handles.iter_mut().filter(|h| h.live) {
            debug!(worker_id = handle.index, "Requesting worker termination");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::queue::work_queue;
    use std::process::Command;

    fn sh(script: &'static str) -> impl Fn(usize) -> Command {
        move |index| {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script).arg(index.to_string());
            cmd
        }
    }

    #[test]
    fn test_spawn_and_retire() {
        let (_writer, reader) = work_queue().unwrap();
        let mut pool = WorkerPool::spawn(&sh("echo ready $0"), 2, &reader).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.live_count(), 2);

        for (index, channel) in pool.live_channels() {
            assert_eq!(
                channel.read_line().unwrap(),
                Some(format!("ready {}", index))
            );
        }

        let handle = pool.get_mut(0).unwrap();
        let reason = handle.retire(Duration::from_secs(5)).unwrap();
        assert!(reason.is_success());
        assert!(!handle.is_live());
        assert!(handle.channel_mut().is_none());
        assert!(handle.pid().is_none());

        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.live_channels().len(), 1);
    }

    #[test]
    fn test_abort_live_terminates_workers() {
        let (_writer, reader) = work_queue().unwrap();
        let mut pool = WorkerPool::spawn(&sh("exec sleep 60"), 3, &reader).unwrap();
        assert_eq!(pool.live_count(), 3);

        let start = std::time::Instant::now();
        pool.abort_live();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn test_retire_detached_handle() {
        let mut handle = WorkerHandle::detached(4);
        assert!(handle.is_live());
        assert!(handle.retire(Duration::ZERO).is_none());
        assert!(!handle.is_live());
    }
}
