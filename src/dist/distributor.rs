//! Work distribution onto the shared queue.

use super::queue::{QueueWriter, WorkFrame};
use super::spawn::spawn_feeder_thread;
use crate::error::{ParunError, Result};
use std::thread::JoinHandle;
use tracing::{debug, trace};

/// Push every item in source order, then one sentinel per pool slot, then
/// close the write side.
///
/// Blocks while the queue is full. Returns the number of frames written.
pub fn distribute(items: &[String], pool_size: usize, mut channel: QueueWriter) -> Result<usize> {
    for item in items {
        channel.push(&WorkFrame::Item(item.clone()))?;
        trace!(item = %item, "Enqueued work item");
    }
    for _ in 0..pool_size {
        channel.push(&WorkFrame::Sentinel)?;
    }
    let frames = channel.close();
    debug!(items = items.len(), sentinels = pool_size, "Distribution complete");
    Ok(frames)
}

/// Distribution running on its own thread.
///
/// Keeps a full queue from stalling the coordinator's event loop: the
/// feeder blocks on backpressure while the coordinator keeps draining
/// results, which is what lets workers make room in the queue.
pub struct Feeder {
    handle: Option<JoinHandle<Result<usize>>>,
}

impl Feeder {
    /// Start distributing `items` to `pool_size` workers.
    pub fn start(items: Vec<String>, pool_size: usize, channel: QueueWriter) -> Result<Self> {
        let handle = spawn_feeder_thread(move || distribute(&items, pool_size, channel))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Surface a distribution failure if the feeder has already stopped.
    ///
    /// Returns `Ok(())` while the feeder is running or after it succeeded.
    pub fn check(&mut self) -> Result<()> {
        let finished = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if finished {
            self.join()?;
        }
        Ok(())
    }

    /// Wait for distribution to finish.
    pub fn join(&mut self) -> Result<usize> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(ParunError::Distribution("feeder thread panicked".into()))),
            None => Ok(0),
        }
    }

    /// Leave the feeder running without waiting for it.
    ///
    /// Used when the run aborts: once every worker is gone the queue has no
    /// readers and the feeder's next write fails on its own.
    pub fn detach(mut self) {
        self.handle.take();
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::dist::queue::work_queue;
    use proptest::prelude::*;

    proptest! {
        /// k items and N workers always produce the k items in order followed
        /// by exactly N sentinels.
        #[test]
        fn distribution_is_exhaustive(
            ids in proptest::collection::vec("[a-z0-9_:/.]{1,40}", 0..24),
            pool_size in 1usize..8,
        ) {
            let (writer, mut reader) = work_queue().unwrap();
            let written = distribute(&ids, pool_size, writer).unwrap();
            prop_assert_eq!(written, ids.len() + pool_size);

            let frames: Vec<WorkFrame> = std::iter::from_fn(|| reader.recv().unwrap()).collect();
            prop_assert_eq!(frames.len(), ids.len() + pool_size);
            for (frame, id) in frames.iter().zip(&ids) {
                prop_assert_eq!(frame, &WorkFrame::Item(id.clone()));
            }
            prop_assert!(frames[ids.len()..].iter().all(|f| *f == WorkFrame::Sentinel));
        }
    }
}
