//! Daemon configuration, read from `TERMGATE_*` environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

pub const MAX_CONNECTIONS_ENV: &str = "TERMGATE_MAX_CONNECTIONS";
pub const LINGER_ENV: &str = "TERMGATE_LINGER_MS";
pub const SHUTDOWN_GRACE_ENV: &str = "TERMGATE_SHUTDOWN_GRACE_MS";
pub const MAX_REQUEST_ENV: &str = "TERMGATE_MAX_REQUEST";
pub const COLS_ENV: &str = "TERMGATE_COLS";
pub const ROWS_ENV: &str = "TERMGATE_ROWS";

const DEFAULT_MAX_CONNECTIONS: usize = 64;
const DEFAULT_LINGER_MS: u64 = 0;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;
const DEFAULT_MAX_REQUEST_BYTES: usize = 1_048_576;
const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    max_connections: usize,
    linger: Duration,
    shutdown_grace: Duration,
    max_request_bytes: usize,
    cols: u16,
    rows: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DaemonConfig {
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// How long the daemon stays up after its last session ends.
    pub fn linger(&self) -> Duration {
        self.linger
    }

    /// How long children get to exit after a shutdown request before forced teardown.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn from_env() -> Self {
        Self {
            max_connections: parse_env(MAX_CONNECTIONS_ENV, DEFAULT_MAX_CONNECTIONS),
            linger: Duration::from_millis(parse_env(LINGER_ENV, DEFAULT_LINGER_MS)),
            shutdown_grace: Duration::from_millis(parse_env(
                SHUTDOWN_GRACE_ENV,
                DEFAULT_SHUTDOWN_GRACE_MS,
            )),
            max_request_bytes: parse_env(MAX_REQUEST_ENV, DEFAULT_MAX_REQUEST_BYTES),
            cols: non_zero(parse_env(COLS_ENV, DEFAULT_COLS), DEFAULT_COLS),
            rows: non_zero(parse_env(ROWS_ENV, DEFAULT_ROWS), DEFAULT_ROWS),
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    let Ok(value) = env::var(key) else {
        return default;
    };
    if value.trim().is_empty() {
        return default;
    }
    match value.trim().parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            default
        }
    }
}

fn non_zero(value: u16, default: u16) -> u16 {
    if value == 0 { default } else { value }
}
