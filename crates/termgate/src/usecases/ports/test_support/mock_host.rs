//! In-memory terminal host for use case tests.
//!
//! Spawns are held open until the test resolves them, so the test decides the
//! order in which completions and exits reach the event loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::domain::{Environment, ExitStatus, LaunchCommand, WindowId};
use crate::usecases::ports::{
    ChildExitNotice, SpawnCompletion, SpawnErrorKind, SpawnFailure, TerminalHost,
};

/// Ordered log of side effects shared between mocks.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub window: WindowId,
    pub command: LaunchCommand,
    pub env: Environment,
    pub cwd: PathBuf,
}

#[derive(Default)]
pub struct MockTerminalHost {
    next_window: u64,
    open: Vec<WindowId>,
    spawns: Vec<SpawnRecord>,
    pending: HashMap<WindowId, SpawnCompletion>,
    running: HashMap<WindowId, ChildExitNotice>,
    sub_sessions: HashMap<WindowId, usize>,
    terminated: Vec<WindowId>,
    destroyed: Vec<WindowId>,
    journal: Journal,
}

impl MockTerminalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn spawns(&self) -> &[SpawnRecord] {
        &self.spawns
    }

    pub fn terminated(&self) -> &[WindowId] {
        &self.terminated
    }

    pub fn destroyed(&self) -> &[WindowId] {
        &self.destroyed
    }

    pub fn open_windows(&self) -> &[WindowId] {
        &self.open
    }

    /// Pretends the window hosts `count` sub-sessions.
    pub fn set_sub_sessions(&mut self, window: WindowId, count: usize) {
        self.sub_sessions.insert(window, count);
    }

    pub fn complete_spawn(&mut self, window: WindowId, pid: u32) {
        let completion = self.pending.remove(&window).unwrap();
        let notice = completion.succeeded(pid);
        self.running.insert(window, notice);
    }

    pub fn fail_spawn(&mut self, window: WindowId, kind: SpawnErrorKind) {
        let completion = self.pending.remove(&window).unwrap();
        completion.failed(SpawnFailure::new(kind, "mock failure"));
    }

    pub fn exit_child(&mut self, window: WindowId, status: ExitStatus) {
        let notice = self.running.remove(&window).unwrap();
        notice.exited(status);
    }
}

impl TerminalHost for MockTerminalHost {
    fn create_window(&mut self) -> WindowId {
        self.next_window += 1;
        let window = WindowId(self.next_window);
        self.open.push(window);
        self.journal.record(format!("create:{window}"));
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
        let empty = command.is_empty();
        self.spawns.push(SpawnRecord {
            window,
            command,
            env: env.clone(),
            cwd: cwd.to_path_buf(),
        });
        if empty {
            completion.failed(SpawnFailure::no_program());
        } else {
            self.pending.insert(window, completion);
        }
    }

    fn sub_session_count(&self, window: WindowId) -> usize {
        if !self.open.contains(&window) {
            return 0;
        }
        self.sub_sessions.get(&window).copied().unwrap_or(1)
    }

    fn terminate_child(&mut self, window: WindowId) {
        self.terminated.push(window);
        self.journal.record(format!("terminate:{window}"));
    }

    fn destroy_window(&mut self, window: WindowId) {
        self.open.retain(|w| *w != window);
        self.destroyed.push(window);
        self.journal.record(format!("destroy:{window}"));
    }
}
