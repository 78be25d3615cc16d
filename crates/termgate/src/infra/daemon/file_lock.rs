use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::common::DaemonError;
use crate::infra::ipc::sidecar_path;

/// Exclusive `flock` on `<socket>.lock`, holding the daemon's pid. Released on drop.
pub struct LockFile {
    _file: File,
}

impl LockFile {
    pub fn acquire(lock_path: &Path) -> Result<Self, DaemonError> {
        let mut lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| DaemonError::LockFailed(format!("open {}: {e}", lock_path.display())))?;

        // SAFETY: the fd comes from a `File` that stays open for the lifetime of
        // `LockFile`. LOCK_EX | LOCK_NB requests an exclusive, non-blocking lock.
        let result = unsafe { libc::flock(lock_file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => {
                    Err(DaemonError::AlreadyRunning)
                }
                _ => Err(DaemonError::LockFailed(format!("flock: {err}"))),
            };
        }

        lock_file
            .set_len(0)
            .map_err(|e| DaemonError::LockFailed(format!("truncate: {e}")))?;
        writeln!(lock_file, "{}", std::process::id())
            .map_err(|e| DaemonError::LockFailed(format!("write pid: {e}")))?;

        Ok(Self { _file: lock_file })
    }
}

pub fn lock_path_for(socket_path: &Path) -> PathBuf {
    sidecar_path(socket_path, "lock")
}

/// Pid recorded by a running daemon, if the lock file is readable.
pub fn read_lock_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()
        .and_then(|contents| contents.trim().parse().ok())
}

pub fn remove_lock_file(lock_path: &Path) {
    if lock_path.exists() {
        let _ = std::fs::remove_file(lock_path);
    }
}
