//! Termination analysis for worker subprocesses.
//!
//! Used when a worker's result channel closes without an `exit` message, to
//! say something more useful than "worker vanished".

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled { signal: Signal, core_dumped: bool },
    /// Process is still running.
    StillAlive,
    /// Unknown termination reason.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a successful exit.
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Shell-style status code (`128 + signal` for signals).
    #[cfg(test)]
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled { signal, .. } => Some(128 + *signal as i32),
            Self::StillAlive | Self::Unknown => None,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Signaled {
                signal,
                core_dumped: true,
            } => format!("killed by signal {:?} (core dumped)", signal),
            Self::Signaled { signal, .. } => format!("killed by signal {:?}", signal),
            Self::StillAlive => "still running".to_string(),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, core_dumped) => TerminationReason::Signaled {
            signal,
            core_dumped,
        },
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}
