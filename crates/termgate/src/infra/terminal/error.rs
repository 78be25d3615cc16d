use std::io;

use thiserror::Error;

use crate::usecases::ports::{SpawnErrorKind, SpawnFailure};

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {reason}")]
    Open { reason: String },
    #[error("Failed to spawn process: {reason}")]
    Spawn {
        reason: String,
        kind: SpawnErrorKind,
    },
    #[error("Failed to start PTY worker: {0}")]
    Worker(#[source] io::Error),
}

impl PtyError {
    /// Classifies a `spawn_command` error. `portable-pty` reports some lookup
    /// failures as plain messages rather than `io::Error`s.
    pub fn from_spawn(err: &anyhow::Error) -> Self {
        let kind = match err.downcast_ref::<io::Error>().map(io::Error::kind) {
            Some(io::ErrorKind::NotFound) => SpawnErrorKind::NotFound,
            Some(io::ErrorKind::PermissionDenied) => SpawnErrorKind::PermissionDenied,
            Some(_) => SpawnErrorKind::Other,
            None => classify_message(&err.to_string()),
        };
        PtyError::Spawn {
            reason: err.to_string(),
            kind,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            PtyError::Open { .. } => {
                "PTY allocation failed. Check system resource limits (ulimit -n).".to_string()
            }
            PtyError::Spawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => {
                    "Command not found. Check that it exists and is in PATH.".to_string()
                }
                SpawnErrorKind::PermissionDenied => {
                    "Permission denied. Check file permissions.".to_string()
                }
                SpawnErrorKind::NoProgram => {
                    "Pass a command with -e or set SHELL in the invoking environment.".to_string()
                }
                SpawnErrorKind::InvalidCwd => {
                    "The working directory no longer exists.".to_string()
                }
                SpawnErrorKind::Other => {
                    "Process spawn failed. Check command syntax and permissions.".to_string()
                }
            },
            PtyError::Worker(_) => {
                "Thread creation failed. Check system thread limits (ulimit -u).".to_string()
            }
        }
    }

    pub fn into_spawn_failure(self) -> SpawnFailure {
        match self {
            PtyError::Spawn { reason, kind } => SpawnFailure::new(kind, reason),
            other => SpawnFailure::new(SpawnErrorKind::Other, other.to_string()),
        }
    }
}

fn classify_message(message: &str) -> SpawnErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("doesn't exist") {
        SpawnErrorKind::NotFound
    } else if lower.contains("permission denied") || lower.contains("not executable") {
        SpawnErrorKind::PermissionDenied
    } else {
        SpawnErrorKind::Other
    }
}
