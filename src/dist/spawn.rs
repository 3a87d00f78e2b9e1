//! Worker subprocess spawning.
//!
//! Uses `posix_spawn` via `std::process::Command`. Every worker gets a
//! duplicate of the shared work queue as stdin and a fresh pipe as stdout
//! (its result channel); stderr is inherited so worker diagnostics reach
//! the terminal directly.

use super::ipc::LineReader;
use super::proc::Proc;
use super::queue::QueueReader;
use crate::error::{ParunError, Result};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;

/// Builds the command that starts the worker for one pool slot.
///
/// The spawner overrides stdin, stdout and stderr; implementations only
/// choose the program, arguments and environment.
pub trait Launch {
    fn command(&self, index: usize) -> Result<Command>;
}

impl<F> Launch for F
where
    F: Fn(usize) -> Command,
{
    fn command(&self, index: usize) -> Result<Command> {
        Ok(self(index))
    }
}

/// Launches workers by re-executing the current binary in worker mode.
#[derive(Debug, Clone)]
pub struct SelfExec {
    /// Command each worker runs per item (`{}` is replaced by the item).
    pub item_command: Vec<String>,
}

impl SelfExec {
    pub fn new(item_command: Vec<String>) -> Self {
        Self { item_command }
    }
}

impl Launch for SelfExec {
    fn command(&self, index: usize) -> Result<Command> {
        let exe_path = std::env::current_exe()
            .map_err(|e| ParunError::Worker(format!("Failed to get current executable: {}", e)))?;

        let mut cmd = Command::new(exe_path);
        cmd.arg("run");
        cmd.arg("--internal-worker");
        cmd.arg(index.to_string());
        cmd.arg("--");
        cmd.args(&self.item_command);
        Ok(cmd)
    }
}

/// Spawn the worker for pool slot `index`.
///
/// Returns the process handle and the read end of its result channel.
pub fn spawn_worker(
    launcher: &dyn Launch,
    index: usize,
    queue: &QueueReader,
) -> Result<(Proc, LineReader)> {
    let mut cmd = launcher.command(index)?;

    cmd.stdin(queue.to_stdio()?);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let child = cmd
        .spawn()
        .map_err(|e| ParunError::Worker(format!("Failed to spawn worker {}: {}", index, e)))?;

    Proc::from_child(child)
}

/// Spawn the feeder thread that runs the distributor.
pub fn spawn_feeder_thread<F, T>(f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name("parun-feeder".to_string())
        .spawn(f)
        .map_err(|e| ParunError::Worker(format!("Failed to spawn feeder thread: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::queue::{WorkFrame, work_queue};
    use std::time::Duration;

    #[test]
    fn test_self_exec_command_line() {
        let launcher = SelfExec::new(vec!["pytest".into(), "{}".into()]);
        let cmd = launcher.command(3).unwrap();
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["run", "--internal-worker", "3", "--", "pytest", "{}"]
        );
    }

    #[test]
    fn test_spawned_worker_reads_queue_from_stdin() {
        let (mut writer, reader) = work_queue().unwrap();
        // Read one frame from stdin and echo its first byte (the tag)
        let launcher = |index: usize| {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg("dd bs=512 count=1 2>/dev/null | head -c 1; echo \" $0\"")
                .arg(index.to_string());
            cmd
        };

        let (mut proc, mut results) = spawn_worker(&launcher, 7, &reader).unwrap();
        drop(reader);
        writer.push(&WorkFrame::Sentinel).unwrap();
        drop(writer);

        assert_eq!(results.read_line().unwrap().as_deref(), Some("S 7"));
        assert!(proc.finish(Duration::from_secs(5)).unwrap().is_success());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let (_writer, reader) = work_queue().unwrap();
        let launcher = |_: usize| Command::new("/nonexistent/parun-worker");
        let err = spawn_worker(&launcher, 0, &reader).unwrap_err();
        assert!(err.to_string().contains("Failed to spawn worker 0"));
    }

    #[test]
    fn test_feeder_thread_returns_value() {
        let handle = spawn_feeder_thread(|| 42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }
}
