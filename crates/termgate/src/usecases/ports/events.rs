//! Events drained by the daemon's single event loop, and the one-shot
//! notifiers that worker threads use to post them.

use crossbeam_channel::{Receiver, Sender};

use crate::domain::{ExitStatus, InvocationRequest, SessionId, SessionInfo};
use crate::usecases::ports::confirm::ConfirmPrompt;
use crate::usecases::ports::errors::{SpawnErrorKind, SpawnFailure};
use crate::usecases::ports::exit_sink::ExitStatusSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The window's child was asked to terminate; teardown follows its exit.
    Proceeding,
    Cancelled,
    NotFound,
}

impl CloseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseOutcome::Proceeding => "proceeding",
            CloseOutcome::Cancelled => "cancelled",
            CloseOutcome::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub hold_count: usize,
    pub session_count: usize,
    pub shutting_down: bool,
}

pub enum Query {
    Sessions(Sender<Vec<SessionInfo>>),
    Status(Sender<StatusSnapshot>),
}

pub enum LoopEvent {
    Invocation {
        request: InvocationRequest,
        sink: Box<dyn ExitStatusSink>,
    },
    SpawnCompleted {
        session: SessionId,
        outcome: Result<u32, SpawnFailure>,
    },
    ChildExited {
        session: SessionId,
        status: ExitStatus,
    },
    CloseRequested {
        session: SessionId,
        prompt: Box<dyn ConfirmPrompt>,
        reply: Sender<CloseOutcome>,
    },
    Query(Query),
    Shutdown,
}

impl LoopEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LoopEvent::Invocation { .. } => "invocation",
            LoopEvent::SpawnCompleted { .. } => "spawn_completed",
            LoopEvent::ChildExited { .. } => "child_exited",
            LoopEvent::CloseRequested { .. } => "close_requested",
            LoopEvent::Query(_) => "query",
            LoopEvent::Shutdown => "shutdown",
        }
    }
}

/// Posting half of the event loop queue. Cheap to clone; safe to use from any thread.
#[derive(Clone)]
pub struct LoopSender {
    tx: Sender<LoopEvent>,
}

impl LoopSender {
    /// Returns `false` once the loop has gone away.
    pub fn post(&self, event: LoopEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub fn loop_channel() -> (LoopSender, Receiver<LoopEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (LoopSender { tx }, rx)
}

/// One-shot report of a spawn attempt.
///
/// Resolving consumes the completion, so it fires at most once. It only enqueues
/// an event, so the loop never observes it before `spawn_child` has returned.
/// Dropping it unresolved reports a failure, so a spawn can never be left hanging.
pub struct SpawnCompletion {
    session: SessionId,
    sender: Option<LoopSender>,
}

impl SpawnCompletion {
    pub fn new(session: SessionId, sender: LoopSender) -> Self {
        Self {
            session,
            sender: Some(sender),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Reports a started child and hands back the notifier for its exit.
    pub fn succeeded(mut self, pid: u32) -> ChildExitNotice {
        let sender = self.sender.take();
        if let Some(sender) = &sender {
            sender.post(LoopEvent::SpawnCompleted {
                session: self.session.clone(),
                outcome: Ok(pid),
            });
        }
        ChildExitNotice {
            session: self.session.clone(),
            sender,
        }
    }

    pub fn failed(mut self, failure: SpawnFailure) {
        self.resolve_failure(failure);
    }

    fn resolve_failure(&mut self, failure: SpawnFailure) {
        if let Some(sender) = self.sender.take() {
            sender.post(LoopEvent::SpawnCompleted {
                session: self.session.clone(),
                outcome: Err(failure),
            });
        }
    }
}

impl Drop for SpawnCompletion {
    fn drop(&mut self) {
        self.resolve_failure(SpawnFailure::new(
            SpawnErrorKind::Other,
            "spawn abandoned before completion",
        ));
    }
}

/// One-shot report of a running child's exit.
///
/// Dropping it unresolved reports a hangup, so the session still tears down.
pub struct ChildExitNotice {
    session: SessionId,
    sender: Option<LoopSender>,
}

impl ChildExitNotice {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn exited(mut self, status: ExitStatus) {
        self.resolve(status);
    }

    fn resolve(&mut self, status: ExitStatus) {
        if let Some(sender) = self.sender.take() {
            sender.post(LoopEvent::ChildExited {
                session: self.session.clone(),
                status,
            });
        }
    }
}

impl Drop for ChildExitNotice {
    fn drop(&mut self) {
        self.resolve(ExitStatus::HANGUP);
    }
}
