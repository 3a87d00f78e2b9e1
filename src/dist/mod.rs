//! Work distribution across a pool of worker subprocesses.
//!
//! The coordinator spawns a fixed number of workers that all read from one
//! shared work queue, feeds every item followed by one sentinel per worker,
//! and then drains the workers' result channels until each has exited.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │         Coordinator          │
//!                  │  feeder thread ──► queue     │
//!                  │  poll(2) ◄── result channels │
//!                  └──────┬───────────────▲───────┘
//!              work queue │ (one pipe,    │ JSON lines
//!           512-byte frames, many readers)│ (one pipe per worker)
//!               ┌─────────┼─────────┐     │
//!         ┌─────▼─────┐ ┌─▼───────┐ ┌▼────┴─────┐
//!         │ Worker 0  │ │ Worker 1│ │ Worker N  │
//!         │ stdin=Q   │ │ stdin=Q │ │ stdin=Q   │
//!         └───────────┘ └─────────┘ └───────────┘
//! ```
//!
//! # Features
//!
//! - **Atomic dequeue**: frames are `PIPE_BUF`-sized, so concurrent readers
//!   never split or share a frame
//! - **Backpressure**: the feeder blocks on a full queue without stalling
//!   result handling
//! - **Crash detection**: a worker that dies without reporting is retired
//!   when its channel closes
//! - **Fail fast**: a worker exception terminates the rest of the pool

mod coordinator;
mod dispatcher;
mod distributor;
mod ipc;
mod multiplexer;
mod pool;
mod proc;
mod protocol;
mod queue;
mod signals;
mod spawn;
mod stats;
pub mod worker_main;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use protocol::{Outcome, TestReport};
pub use spawn::SelfExec;
pub use worker_main::run_worker_main;

// Re-export for tests and potential external use
#[allow(unused_imports)]
pub use coordinator::{RunState, default_pool_size};
#[allow(unused_imports)]
pub use protocol::{Message, Phase};
#[allow(unused_imports)]
pub use spawn::Launch;
#[allow(unused_imports)]
pub use stats::RunStatistics;
