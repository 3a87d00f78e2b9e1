//! Process handle for worker subprocesses.
//!
//! Wraps a child process by pid. The child's stdin (the shared work queue)
//! and stdout (its result channel) are owned elsewhere; this type only
//! waits for, signals and reaps the process.

use super::ipc::{LineReader, PipeFd};
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{ParunError, Result};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::os::unix::io::OwnedFd;
use std::time::{Duration, Instant};

/// How often `finish` re-checks a process it is waiting on.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(100);

/// Handle to a worker subprocess.
#[derive(Debug)]
pub struct Proc {
    /// Process ID
    pid: Pid,
    /// Set once the process has been reaped
    reason: Option<TerminationReason>,
}

impl Proc {
    /// Create a handle for an already spawned process.
    pub fn new(pid: Pid) -> Self {
        Self { pid, reason: None }
    }

    /// Create from a spawned `std::process::Child`.
    ///
    /// Takes ownership of the child's stdout and returns it as a line reader.
    pub fn from_child(mut child: std::process::Child) -> Result<(Self, LineReader)> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ParunError::Worker("Child stdout not captured".into()))?;
        let reader = LineReader::new(PipeFd::new(OwnedFd::from(stdout)));

        // `Child` neither waits nor kills on drop; reaping goes through waitpid
        drop(child);

        Ok((Self::new(pid), reader))
    }

    /// Get the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// How the process ended, once reaped.
    #[cfg(test)]
    pub fn termination(&self) -> Option<&TerminationReason> {
        self.reason.as_ref()
    }

    /// Check if the process is still running (non-blocking).
    #[cfg(test)]
    pub fn is_running(&mut self) -> bool {
        !matches!(self.try_wait(), Ok(Some(_)) | Err(_))
    }

    /// Wait for the process to exit (blocking).
    pub fn wait(&mut self) -> Result<TerminationReason> {
        if let Some(reason) = &self.reason {
            return Ok(reason.clone());
        }
        let status = waitpid(self.pid, None)
            .map_err(|e| ParunError::Worker(format!("waitpid failed: {}", e)))?;
        Ok(self.record(status))
    }

    /// Try to wait for the process (non-blocking).
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<TerminationReason>> {
        if let Some(reason) = &self.reason {
            return Ok(Some(reason.clone()));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => Ok(Some(self.record(status))),
            Err(e) => Err(ParunError::Worker(format!("waitpid failed: {}", e))),
        }
    }

    fn record(&mut self, status: WaitStatus) -> TerminationReason {
        let reason = analyze_wait_status(status);
        self.reason = Some(reason.clone());
        reason
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        if self.reason.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)
            .map_err(|e| ParunError::Worker(format!("Failed to send SIGTERM: {}", e)))
    }

    /// Send SIGKILL to the process and wait for it to exit.
    pub fn kill(&mut self) -> Result<TerminationReason> {
        if let Some(reason) = &self.reason {
            return Ok(reason.clone());
        }
        signal::kill(self.pid, Signal::SIGKILL)
            .map_err(|e| ParunError::Worker(format!("Failed to send SIGKILL: {}", e)))?;
        self.wait()
    }

    /// Join the process: wait up to `timeout` for it to exit on its own,
    /// then SIGTERM, then SIGKILL.
    pub fn finish(&mut self, timeout: Duration) -> Result<TerminationReason> {
        let start = Instant::now();
        loop {
            if let Some(reason) = self.try_wait()? {
                return Ok(reason);
            }
            if start.elapsed() >= timeout {
                break;
            }
            std::thread::sleep(REAP_POLL_INTERVAL);
        }

        self.stop()
    }

    /// Request termination now: SIGTERM, a short grace period, then SIGKILL.
    pub fn stop(&mut self) -> Result<TerminationReason> {
        let _ = self.terminate();

        let start = Instant::now();
        while start.elapsed() < TERM_GRACE {
            if let Ok(Some(reason)) = self.try_wait() {
                return Ok(reason);
            }
            std::thread::sleep(REAP_POLL_INTERVAL);
        }

        tracing::debug!(pid = self.pid.as_raw(), "Worker ignored SIGTERM, killing");
        self.kill()
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.reason.is_none() {
            // Try graceful termination
            let _ = self.terminate();
            std::thread::sleep(REAP_POLL_INTERVAL);

            if let Ok(Some(_)) = self.try_wait() {
                return;
            }

            // Force kill
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}
