#![deny(clippy::all)]

mod config;
mod file_lock;
mod signal_handler;

pub use config::{DaemonConfig, MAX_CONNECTIONS_ENV};
pub use file_lock::{LockFile, lock_path_for, read_lock_pid, remove_lock_file};
pub use signal_handler::SignalHandler;
