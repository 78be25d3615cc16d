use thiserror::Error;

use crate::common::error_codes::{self, ErrorCategory};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Failed to bind socket: {0}")]
    SocketBind(String),
    #[error("Another daemon instance is already running")]
    AlreadyRunning,
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),
    #[error("Failed to setup signal handler: {0}")]
    SignalSetup(String),
    #[error("Failed to start thread: {0}")]
    Thread(String),
}

impl DaemonError {
    pub fn code(&self) -> i32 {
        error_codes::DAEMON_ERROR
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DaemonError::AlreadyRunning => ErrorCategory::Busy,
            _ => ErrorCategory::External,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            DaemonError::SocketBind(_) => {
                "Check that the socket directory is writable, or point TERMGATE_SOCKET elsewhere."
                    .to_string()
            }
            DaemonError::AlreadyRunning => {
                "A daemon is already running. Use 'termgate daemon status' to inspect it.".to_string()
            }
            DaemonError::LockFailed(_) => {
                "Lock file issue. Remove the stale '<socket>.lock' file if no daemon is running."
                    .to_string()
            }
            DaemonError::SignalSetup(_) => {
                "Signal handler setup failed. Check system signal configuration.".to_string()
            }
            DaemonError::Thread(_) => {
                "Thread creation failed. Check system thread limits (ulimit -u).".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DaemonError::LockFailed(_))
    }
}
