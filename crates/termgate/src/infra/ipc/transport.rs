//! Newline-delimited JSON over the daemon's Unix socket, and daemon autostart.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::common::mutex_lock_or_recover;
use crate::infra::ipc::error::ClientError;
use crate::infra::ipc::socket::{SOCKET_ENV, log_path_for};

/// Set in the environment of an auto-started daemon so it never autostarts another.
pub const DAEMON_FOREGROUND_ENV: &str = "TERMGATE_DAEMON_FOREGROUND";

const MAX_STARTUP_POLLS: u32 = 50;
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ClientConnection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl ClientConnection {
    pub fn connect(socket: &Path) -> Result<Self, ClientError> {
        if !socket.exists() {
            debug!(socket = %socket.display(), "Daemon socket missing");
            return Err(ClientError::DaemonNotRunning);
        }
        debug!(socket = %socket.display(), "Connecting to daemon socket");
        let stream = UnixStream::connect(socket)?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: UnixStream) -> Result<Self, ClientError> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: stream,
        })
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.writer.set_write_timeout(timeout)?;
        Ok(())
    }

    pub fn send_message(&mut self, message: &str) -> Result<(), ClientError> {
        writeln!(self.writer, "{message}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Next non-empty line, or `None` once the daemon closed the connection.
    pub fn read_message(&mut self) -> Result<Option<String>, ClientError> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes = self.reader.read_line(&mut line)?;
            if bytes == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    pub fn shutdown(&mut self) -> Result<(), ClientError> {
        self.writer.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

pub fn is_daemon_running(socket: &Path) -> bool {
    if !socket.exists() {
        return false;
    }
    UnixStream::connect(socket).is_ok()
}

fn env_flag(key: &str) -> bool {
    std::env::var(key).ok().is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn spawn_daemon_reaper(child: Child) {
    let child = std::sync::Arc::new(std::sync::Mutex::new(child));
    let child_for_thread = std::sync::Arc::clone(&child);
    let spawned = std::thread::Builder::new()
        .name("daemon-reaper".to_string())
        .spawn(move || {
            let _ = mutex_lock_or_recover(&child_for_thread).wait();
        });
    if let Err(err) = spawned {
        warn!(error = %err, "Failed to spawn daemon reaper thread");
        let _ = mutex_lock_or_recover(&child).wait();
    }
}

fn terminate_daemon_child(mut child: Child) {
    if let Ok(Some(_status)) = child.try_wait() {
        return;
    }
    if let Err(err) = child.kill() {
        warn!(error = %err, "Failed to terminate daemon process");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "Failed to reap daemon process");
    }
}

fn log_recent_failure(log_path: &Path) {
    if let Ok(log_content) = std::fs::read_to_string(log_path) {
        let mut last_lines: Vec<&str> = log_content.lines().rev().take(5).collect();
        last_lines.reverse();
        if !last_lines.is_empty() {
            error!(
                "Daemon failed to start. Recent log output:\n{}",
                last_lines.join("\n")
            );
        }
    }
}

#[cfg(test)]
const DAEMON_START_TEST_CMD_ENV: &str = "TERMGATE_DAEMON_START_TEST_CMD";

fn daemon_command(socket: &Path) -> Result<Command, ClientError> {
    #[cfg(test)]
    if let Ok(cmd) = std::env::var(DAEMON_START_TEST_CMD_ENV) {
        return Ok(Command::new(cmd));
    }

    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    cmd.args(["daemon", "start", "--foreground"]);
    cmd.env(DAEMON_FOREGROUND_ENV, "1");
    cmd.env(SOCKET_ENV, socket);
    Ok(cmd)
}

/// Launches `termgate daemon start` detached from this client and waits for
/// its socket to accept connections. The daemon's stderr goes to `<socket>.log`.
pub fn start_daemon_background(socket: &Path) -> Result<(), ClientError> {
    if env_flag(DAEMON_FOREGROUND_ENV) {
        return Err(ClientError::DaemonNotRunning);
    }

    let log_path = log_path_for(socket);
    let stderr = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => Stdio::from(f),
        Err(e) => {
            warn!(
                error = %e,
                path = %log_path.display(),
                "Could not open daemon log file"
            );
            Stdio::null()
        }
    };

    let mut child = daemon_command(socket)?
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr)
        .spawn()?;
    debug!(pid = child.id(), "Daemon process launched");

    let mut delay = INITIAL_POLL_INTERVAL;
    for i in 0..MAX_STARTUP_POLLS {
        if let Ok(Some(status)) = child.try_wait() {
            // A concurrent launch may have won the race for the socket.
            if is_daemon_running(socket) {
                debug!(?status, "Daemon process exited; another daemon is serving");
                return Ok(());
            }
            debug!(?status, "Daemon process exited during startup");
            log_recent_failure(&log_path);
            return Err(ClientError::DaemonNotRunning);
        }
        std::thread::sleep(delay);
        if is_daemon_running(socket) {
            spawn_daemon_reaper(child);
            return Ok(());
        }

        delay = (delay * 2).min(MAX_POLL_INTERVAL);

        if i == MAX_STARTUP_POLLS - 1 {
            log_recent_failure(&log_path);
        }
    }

    terminate_daemon_child(child);
    Err(ClientError::DaemonNotRunning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_env::{EnvGuard, env_lock};
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    #[test]
    fn connect_to_missing_socket_reports_not_running() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("none.sock");
        assert!(matches!(
            ClientConnection::connect(&socket),
            Err(ClientError::DaemonNotRunning)
        ));
        assert!(!is_daemon_running(&socket));
    }

    #[test]
    fn messages_are_newline_delimited() {
        let (client, server) = UnixStream::pair().unwrap();
        let mut client = ClientConnection::from_stream(client).unwrap();
        let mut server = ClientConnection::from_stream(server).unwrap();

        client.send_message(r#"{"a":1}"#).unwrap();
        assert_eq!(server.read_message().unwrap().as_deref(), Some(r#"{"a":1}"#));

        server.send_message("").unwrap();
        server.send_message("second").unwrap();
        assert_eq!(client.read_message().unwrap().as_deref(), Some("second"));

        server.shutdown().unwrap();
        assert_eq!(client.read_message().unwrap(), None);
    }

    #[test]
    fn listening_socket_counts_as_running() {
        let dir = TempDir::new_in("/tmp").unwrap();
        let socket = dir.path().join("d.sock");
        let _listener = UnixListener::bind(&socket).unwrap();
        assert!(is_daemon_running(&socket));
    }

    #[test]
    fn start_reports_early_daemon_exit() {
        let _lock = env_lock();
        let dir = TempDir::new_in("/tmp").unwrap();
        let socket = dir.path().join("daemon.sock");
        let _fg = EnvGuard::remove(DAEMON_FOREGROUND_ENV);
        let _cmd = EnvGuard::set(DAEMON_START_TEST_CMD_ENV, "true");

        let result = start_daemon_background(&socket);
        assert!(matches!(result, Err(ClientError::DaemonNotRunning)));
        assert!(log_path_for(&socket).exists());
    }

    #[test]
    fn start_succeeds_when_another_daemon_already_serves() {
        let _lock = env_lock();
        let dir = TempDir::new_in("/tmp").unwrap();
        let socket = dir.path().join("daemon.sock");
        let _winner = UnixListener::bind(&socket).unwrap();
        let _fg = EnvGuard::remove(DAEMON_FOREGROUND_ENV);
        let _cmd = EnvGuard::set(DAEMON_START_TEST_CMD_ENV, "false");

        let result = start_daemon_background(&socket);
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn start_refuses_inside_a_daemon() {
        let _lock = env_lock();
        let dir = TempDir::new_in("/tmp").unwrap();
        let socket = dir.path().join("daemon.sock");
        let _fg = EnvGuard::set(DAEMON_FOREGROUND_ENV, "1");

        assert!(matches!(
            start_daemon_background(&socket),
            Err(ClientError::DaemonNotRunning)
        ));
        assert!(!log_path_for(&socket).exists());
    }
}
