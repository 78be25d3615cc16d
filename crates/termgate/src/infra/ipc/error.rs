use thiserror::Error;

use crate::common::error_codes::{self, ErrorCategory};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to daemon: {0}")]
    ConnectionFailed(#[from] std::io::Error),

    #[error("Failed to serialize request: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("RPC error ({code}): {message}")]
    RpcError {
        code: i32,
        message: String,
        category: Option<ErrorCategory>,
        retryable: bool,
        suggestion: Option<String>,
    },

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Invalid response from daemon")]
    InvalidResponse,

    /// The daemon accepted the invocation but went away before reporting an exit status.
    #[error("Daemon closed the session {session} without reporting an exit status")]
    SessionLost { session: String },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::RpcError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            ClientError::RpcError { category, .. } => *category,
            _ => None,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ClientError::RpcError { suggestion, .. } => suggestion.as_deref(),
            ClientError::DaemonNotRunning => {
                Some("Start the daemon with: termgate daemon start, or check <socket>.log")
            }
            ClientError::SessionLost { .. } => {
                Some("The daemon stopped while the session was open. Check <socket>.log")
            }
            _ => None,
        }
    }

    /// sysexits-style exit code for a client launch that never got a session status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::DaemonNotRunning | ClientError::SessionLost { .. } => {
                error_codes::exit::UNAVAILABLE
            }
            ClientError::ConnectionFailed(_) => error_codes::exit::IOERR,
            ClientError::RpcError { category, .. } => match category {
                Some(ErrorCategory::InvalidInput) => error_codes::exit::USAGE,
                Some(ErrorCategory::NotFound | ErrorCategory::Busy) => {
                    error_codes::exit::UNAVAILABLE
                }
                Some(ErrorCategory::External) => error_codes::exit::IOERR,
                Some(ErrorCategory::Internal) | None => error_codes::exit::SOFTWARE,
            },
            ClientError::SerializationFailed(_)
            | ClientError::InvalidResponse
            | ClientError::UnexpectedResponse { .. } => error_codes::exit::SOFTWARE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i32) -> ClientError {
        ClientError::RpcError {
            code,
            message: "boom".into(),
            category: Some(error_codes::category_for_code(code)),
            retryable: error_codes::is_retryable(code),
            suggestion: None,
        }
    }

    #[test]
    fn display_messages() {
        assert_eq!(ClientError::DaemonNotRunning.to_string(), "Daemon not running");
        assert_eq!(
            ClientError::InvalidResponse.to_string(),
            "Invalid response from daemon"
        );
        assert_eq!(rpc(-32601).to_string(), "RPC error (-32601): boom");
    }

    #[test]
    fn exit_codes_follow_sysexits() {
        assert_eq!(ClientError::DaemonNotRunning.exit_code(), 69);
        assert_eq!(
            ClientError::ConnectionFailed(std::io::Error::other("x")).exit_code(),
            74
        );
        assert_eq!(rpc(error_codes::INVALID_PARAMS).exit_code(), 64);
        assert_eq!(rpc(error_codes::SESSION_NOT_FOUND).exit_code(), 69);
        assert_eq!(ClientError::InvalidResponse.exit_code(), 70);
    }

    #[test]
    fn shutting_down_is_retryable() {
        assert!(rpc(error_codes::SHUTTING_DOWN).is_retryable());
        assert!(!rpc(error_codes::GENERIC_ERROR).is_retryable());
        assert!(!ClientError::DaemonNotRunning.is_retryable());
    }

    #[test]
    fn daemon_not_running_has_suggestion() {
        assert!(
            ClientError::DaemonNotRunning
                .suggestion()
                .is_some_and(|s| s.contains("termgate daemon start"))
        );
    }
}
