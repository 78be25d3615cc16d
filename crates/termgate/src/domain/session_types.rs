//! Session identity, phases and exit statuses.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Short random id, same shape as the ones shown by `termgate sessions`.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(uuid[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque handle for a top-level window and the terminal surface it hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Status reported back to an invoking client; becomes that client's process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitStatus(i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);
    /// 128 + SIGHUP, used when a session is ended by the daemon rather than by its child.
    pub const HANGUP: ExitStatus = ExitStatus(129);

    pub fn new(code: i32) -> Self {
        Self(code)
    }

    /// Converts a child's wait result. Signal deaths follow the shell's `128 + n` convention.
    pub fn from_child(code: u32, signal: Option<i32>) -> Self {
        match signal {
            Some(signo) => Self(128 + signo),
            None => Self(i32::try_from(code).unwrap_or(i32::MAX)),
        }
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Pending,
    Running,
    TornDown,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Pending => "pending",
            SessionPhase::Running => "running",
            SessionPhase::TornDown => "torn_down",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub window: WindowId,
    pub phase: SessionPhase,
    pub pid: Option<u32>,
    pub command: String,
    pub cwd: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
