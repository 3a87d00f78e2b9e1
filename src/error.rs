//! Error types for parun.

use thiserror::Error;

/// Main error type for parun.
#[derive(Error, Debug)]
pub enum ParunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Work item is {len} bytes long; the work queue carries at most {max} bytes per item")]
    ItemTooLong { len: usize, max: usize },

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Failed to enqueue work: {0}")]
    Distribution(String),

    #[error("Worker {index} raised an exception: {payload}")]
    WorkerException { index: usize, payload: String },

    #[error("Malformed message from worker {index}: {reason}")]
    Protocol { index: usize, reason: String },

    #[error("Item source failed: {0}")]
    Source(String),

    #[error("Report hook failed: {0}")]
    Hook(String),
}

impl ParunError {
    /// True for errors that a worker raised deliberately (`exception` messages).
    pub fn is_worker_exception(&self) -> bool {
        matches!(self, Self::WorkerException { .. })
    }
}

impl From<nix::errno::Errno> for ParunError {
    fn from(errno: nix::errno::Errno) -> Self {
        // Convert nix::errno::Errno to std::io::Error via raw OS error code
        Self::Io(std::io::Error::from_raw_os_error(errno as i32))
    }
}

/// Result type alias for parun operations.
pub type Result<T> = std::result::Result<T, ParunError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_item_too_long_error_message() {
        let err = ParunError::ItemTooLong { len: 900, max: 509 };
        let msg = err.to_string();
        assert!(msg.contains("900"));
        assert!(msg.contains("509"));
    }

    #[test]
    fn test_worker_exception_message() {
        let err = ParunError::WorkerException {
            index: 2,
            payload: "Traceback: boom".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Worker 2"));
        assert!(msg.contains("boom"));
        assert!(err.is_worker_exception());
    }

    #[test]
    fn test_protocol_error_is_not_exception() {
        let err = ParunError::Protocol {
            index: 0,
            reason: "expected value".to_string(),
        };
        assert!(!err.is_worker_exception());
        assert!(err.to_string().contains("Malformed message from worker 0"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ParunError = io_err.into();
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_errno_conversion() {
        let err: ParunError = nix::errno::Errno::EPIPE.into();
        match err {
            ParunError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("Expected Io variant, got {:?}", other),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: ParunError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_err() -> Result<()> {
            Err(ParunError::Config("pool size must be at least 1".into()))
        }
        let err = returns_err().unwrap_err();
        assert!(err.to_string().contains("pool size"));
    }
}
