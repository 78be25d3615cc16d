//! Headless terminal host: every window is one PTY pair whose output is drained.
//!
//! Spawning and waiting happen on a worker thread per window. The worker only
//! talks back to the event loop through the session's one-shot notifiers.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tracing::{debug, warn};

use crate::common::mutex_lock_or_recover;
use crate::domain::{Environment, ExitStatus, LaunchCommand, WindowId};
use crate::infra::terminal::error::PtyError;
use crate::usecases::ports::{SpawnCompletion, SpawnErrorKind, SpawnFailure, TerminalHost};

pub const DEFAULT_TERM: &str = "xterm-256color";

/// State shared between the host (event loop) and the window's worker thread.
#[derive(Default)]
struct Surface {
    pid: Option<u32>,
    killer: Option<Box<dyn ChildKiller + Send + Sync>>,
    master: Option<Box<dyn MasterPty + Send>>,
    exited: bool,
    destroyed: bool,
}

impl Surface {
    /// Sends SIGHUP to a live child, as closing a terminal would.
    fn hang_up(&mut self) {
        if self.exited {
            return;
        }
        if let Some(killer) = self.killer.as_mut() {
            if let Err(err) = killer.kill() {
                warn!(pid = ?self.pid, error = %err, "Failed to signal child");
            }
        }
    }
}

pub struct PtyTerminalHost {
    size: PtySize,
    next_window: u64,
    windows: HashMap<WindowId, Arc<Mutex<Surface>>>,
}

impl PtyTerminalHost {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            size: PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            },
            next_window: 0,
            windows: HashMap::new(),
        }
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

impl TerminalHost for PtyTerminalHost {
    fn create_window(&mut self) -> WindowId {
        self.next_window += 1;
        let window = WindowId(self.next_window);
        self.windows.insert(window, Arc::default());
        window
    }

    fn spawn_child(
        &mut self,
        window: WindowId,
        command: LaunchCommand,
        env: &Environment,
        cwd: &Path,
        completion: SpawnCompletion,
    ) {
        let Some(surface) = self.windows.get(&window).cloned() else {
            completion.failed(SpawnFailure::new(
                SpawnErrorKind::Other,
                format!("window {window} no longer exists"),
            ));
            return;
        };
        if command.is_empty() {
            completion.failed(SpawnFailure::no_program());
            return;
        }
        if !cwd.is_dir() {
            completion.failed(SpawnFailure::new(
                SpawnErrorKind::InvalidCwd,
                format!("working directory {} is not a directory", cwd.display()),
            ));
            return;
        }

        let builder = build_command(&command, env, cwd);
        let size = self.size;
        let worker = std::thread::Builder::new()
            .name(format!("pty-{window}"))
            .spawn(move || run_child(window, size, builder, surface, completion));
        if let Err(err) = worker {
            // The completion was dropped with the closure and reports the failure itself.
            let err = PtyError::Worker(err);
            warn!(window = %window, error = %err, "Failed to start PTY worker");
        }
    }

    fn sub_session_count(&self, window: WindowId) -> usize {
        usize::from(self.windows.contains_key(&window))
    }

    fn terminate_child(&mut self, window: WindowId) {
        if let Some(surface) = self.windows.get(&window) {
            mutex_lock_or_recover(surface).hang_up();
        }
    }

    fn destroy_window(&mut self, window: WindowId) {
        let Some(surface) = self.windows.remove(&window) else {
            return;
        };
        let mut surface = mutex_lock_or_recover(&surface);
        surface.destroyed = true;
        surface.hang_up();
        surface.master = None;
        debug!(window = %window, "Window destroyed");
    }
}

fn build_command(command: &LaunchCommand, env: &Environment, cwd: &Path) -> CommandBuilder {
    let mut builder = CommandBuilder::new(command.program().unwrap_or_default());
    builder.args(command.args());
    builder.env_clear();
    for (key, value) in env {
        builder.env(key, value);
    }
    if !env.contains_key("TERM") {
        builder.env("TERM", DEFAULT_TERM);
    }
    builder.cwd(cwd);
    builder
}

type Spawned = (Box<dyn MasterPty + Send>, Box<dyn Child + Send + Sync>);

fn open_and_spawn(size: PtySize, builder: CommandBuilder) -> Result<Spawned, PtyError> {
    let pair = native_pty_system()
        .openpty(size)
        .map_err(|e| PtyError::Open {
            reason: e.to_string(),
        })?;
    let child = pair
        .slave
        .spawn_command(builder)
        .map_err(|e| PtyError::from_spawn(&e))?;
    Ok((pair.master, child))
}

fn run_child(
    window: WindowId,
    size: PtySize,
    builder: CommandBuilder,
    surface: Arc<Mutex<Surface>>,
    completion: SpawnCompletion,
) {
    let span = tracing::debug_span!("pty_child", window = %window, session = %completion.session());
    let _guard = span.enter();

    let (master, mut child) = match open_and_spawn(size, builder) {
        Ok(spawned) => spawned,
        Err(err) => {
            debug!(error = %err, "Spawn failed");
            completion.failed(err.into_spawn_failure());
            return;
        }
    };
    let Some(pid) = child.process_id() else {
        let _ = child.kill();
        completion.failed(SpawnFailure::new(
            SpawnErrorKind::Other,
            "child started without a process id",
        ));
        return;
    };

    match master.try_clone_reader() {
        Ok(reader) => drain_output(window, reader),
        Err(err) => warn!(error = %err, "Failed to clone PTY reader"),
    }

    {
        let mut state = mutex_lock_or_recover(&surface);
        state.pid = Some(pid);
        state.killer = Some(child.clone_killer());
        state.master = Some(master);
        if state.destroyed {
            state.hang_up();
            state.master = None;
        }
    }

    let notice = completion.succeeded(pid);
    let status = match child.wait() {
        Ok(status) => exit_status_of(&status),
        Err(err) => {
            warn!(pid, error = %err, "Failed to wait for child");
            ExitStatus::new(1)
        }
    };
    mutex_lock_or_recover(&surface).exited = true;
    debug!(pid, exit_status = status.code(), "Child exited");
    notice.exited(status);
}

const DRAIN_BUFFER_SIZE: usize = 8192;

/// Reads and discards PTY output so a chatty child never blocks on a full buffer.
fn drain_output(window: WindowId, mut reader: Box<dyn Read + Send>) {
    let builder = std::thread::Builder::new().name(format!("pty-drain-{window}"));
    let result = builder.spawn(move || {
        let mut buf = [0u8; DRAIN_BUFFER_SIZE];
        let mut total: u64 = 0;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        tracing::trace!(window = %window, bytes = total, "PTY output closed");
    });
    if let Err(err) = result {
        warn!(window = %window, error = %err, "Failed to start PTY drain thread");
    }
}

fn exit_status_of(status: &portable_pty::ExitStatus) -> ExitStatus {
    ExitStatus::from_child(status.exit_code(), status.signal().and_then(signal_number))
}

/// Highest signal number probed when mapping a name back to its number.
const MAX_SIGNAL: i32 = 64;

/// `portable-pty` reports signal deaths by their `strsignal` text, or as
/// `Signal N` when the platform has no text for it.
fn signal_number(name: &str) -> Option<i32> {
    let name = name.trim();
    if let Some(number) = name.strip_prefix("Signal ") {
        return number.trim().parse().ok().filter(|n| (1..=MAX_SIGNAL).contains(n));
    }
    (1..=MAX_SIGNAL).find(|&signo| signal_text(signo).is_some_and(|text| text == name))
}

fn signal_text(signo: i32) -> Option<String> {
    // SAFETY: strsignal returns either null or a NUL-terminated string that stays
    // valid until the next call on this thread; it is copied out before returning.
    unsafe {
        let text = libc::strsignal(signo);
        if text.is_null() {
            return None;
        }
        Some(std::ffi::CStr::from_ptr(text).to_string_lossy().into_owned())
    }
}
