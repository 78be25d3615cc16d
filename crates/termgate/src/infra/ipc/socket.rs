//! IPC socket path helpers.

use std::path::{Path, PathBuf};

use tracing::debug;

pub const SOCKET_ENV: &str = "TERMGATE_SOCKET";
const SOCKET_NAME: &str = "termgate.sock";

pub fn socket_path() -> PathBuf {
    if let Ok(custom_path) = std::env::var(SOCKET_ENV) {
        let path = PathBuf::from(custom_path);
        debug!(socket = %path.display(), "Using custom socket path");
        return path;
    }

    let path = std::env::var("XDG_RUNTIME_DIR")
        .map(|dir| PathBuf::from(dir).join(SOCKET_NAME))
        .unwrap_or_else(|_| PathBuf::from("/tmp").join(SOCKET_NAME));
    debug!(socket = %path.display(), "Resolved socket path");
    path
}

/// `<socket>.<suffix>`, e.g. the lock and log files that live next to the socket.
pub fn sidecar_path(socket: &Path, suffix: &str) -> PathBuf {
    let mut path = socket.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// Where an auto-started daemon's stderr goes.
pub fn log_path_for(socket: &Path) -> PathBuf {
    sidecar_path(socket, "log")
}
