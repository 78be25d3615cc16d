#![deny(clippy::all)]

pub mod client;
pub mod error;
pub mod socket;
pub mod transport;

pub use client::{DaemonClient, DaemonClientConfig, StreamResponse, ensure_daemon};
pub use error::ClientError;
pub use socket::{SOCKET_ENV, log_path_for, sidecar_path, socket_path};
pub use transport::{DAEMON_FOREGROUND_ENV, is_daemon_running, start_daemon_background};

pub type Result<T> = std::result::Result<T, ClientError>;
