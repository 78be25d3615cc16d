use thiserror::Error;

use crate::domain::ExitStatus;

/// Shell convention: the command could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Shell convention: the command was found but could not be executed.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    NotFound,
    PermissionDenied,
    /// The launch resolved to no program at all (no `--command`, no `SHELL`).
    NoProgram,
    InvalidCwd,
    Other,
}

impl SpawnErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SpawnErrorKind::NotFound => "not_found",
            SpawnErrorKind::PermissionDenied => "permission_denied",
            SpawnErrorKind::NoProgram => "no_program",
            SpawnErrorKind::InvalidCwd => "invalid_cwd",
            SpawnErrorKind::Other => "other",
        }
    }

    /// Exit status reported to the invoking client. Never zero.
    pub fn exit_status(self) -> ExitStatus {
        match self {
            SpawnErrorKind::NotFound | SpawnErrorKind::NoProgram => {
                ExitStatus::new(EXIT_NOT_FOUND)
            }
            SpawnErrorKind::PermissionDenied | SpawnErrorKind::InvalidCwd => {
                ExitStatus::new(EXIT_CANNOT_EXECUTE)
            }
            SpawnErrorKind::Other => ExitStatus::new(1),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to spawn process ({}): {reason}", kind.as_str())]
pub struct SpawnFailure {
    pub kind: SpawnErrorKind,
    pub reason: String,
}

impl SpawnFailure {
    pub fn new(kind: SpawnErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn no_program() -> Self {
        Self::new(
            SpawnErrorKind::NoProgram,
            "no command given and SHELL is not set in the invoking environment",
        )
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.kind.exit_status()
    }
}
