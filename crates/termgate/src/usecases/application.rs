//! The single-instance controller: owns every session and the hold count.
//!
//! All methods run on the event loop thread. Worker threads never touch the
//! application directly; they post [`LoopEvent`]s that end up in [`Application::handle`].

use std::collections::HashMap;

use crate::domain::{ExitStatus, InvocationRequest, SessionId, SessionInfo, SessionPhase};
use crate::usecases::close_guard::{CloseDecision, CloseGuard};
use crate::usecases::hold::HoldCount;
use crate::usecases::invocation_gate::InvocationGate;
use crate::usecases::ports::{
    CloseOutcome, ConfirmPrompt, ExitStatusSink, LoopEvent, LoopSender, Query, SpawnCompletion,
    SpawnFailure, StatusSnapshot, TerminalHost,
};
use crate::usecases::session::{Session, Teardown, Transition};
use crate::usecases::spawner::ProcessSpawner;

pub struct Application<H: TerminalHost> {
    host: H,
    holds: HoldCount,
    sessions: HashMap<SessionId, Session>,
    events: LoopSender,
    shutting_down: bool,
}

impl<H: TerminalHost> Application<H> {
    pub fn new(host: H, events: LoopSender) -> Self {
        Self {
            host,
            holds: HoldCount::new(),
            sessions: HashMap::new(),
            events,
            shutting_down: false,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn hold_count(&self) -> usize {
        self.holds.count()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// True once every hold taken so far has been released.
    pub fn is_idle(&self) -> bool {
        self.holds.is_released() && self.sessions.is_empty()
    }

    /// Accepts one invocation. The hold is taken before the window exists, so
    /// the process cannot exit half-way through setting the session up.
    #[tracing::instrument(skip(self, request, sink), fields(command = ?request.command))]
    pub fn activate(
        &mut self,
        request: InvocationRequest,
        sink: Box<dyn ExitStatusSink>,
    ) -> SessionId {
        let hold = self.holds.acquire();
        let window = self.host.create_window();
        let id = self.fresh_session_id();

        let completion = SpawnCompletion::new(id.clone(), self.events.clone());
        let command = ProcessSpawner::spawn(&mut self.host, window, &request, completion);

        let gate = InvocationGate::new(request, sink);
        let mut session = Session::new(id.clone(), window, command.display(), gate, hold);
        if self.shutting_down {
            session.mark_close_pending();
        }
        self.sessions.insert(id.clone(), session);

        tracing::info!(
            session = %id,
            window = %window,
            holds = self.holds.count(),
            "Invocation accepted"
        );
        id
    }

    pub fn handle(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Invocation { request, sink } => {
                self.activate(request, sink);
            }
            LoopEvent::SpawnCompleted { session, outcome } => {
                self.on_spawn_completed(&session, outcome);
            }
            LoopEvent::ChildExited { session, status } => {
                self.on_child_exited(&session, status);
            }
            LoopEvent::CloseRequested {
                session,
                mut prompt,
                reply,
            } => {
                let outcome = self.request_close(&session, prompt.as_mut());
                let _ = reply.send(outcome);
            }
            LoopEvent::Query(Query::Sessions(reply)) => {
                let _ = reply.send(self.sessions());
            }
            LoopEvent::Query(Query::Status(reply)) => {
                let _ = reply.send(self.status());
            }
            LoopEvent::Shutdown => self.begin_shutdown(),
        }
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.values().map(Session::info).collect();
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        infos
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            hold_count: self.holds.count(),
            session_count: self.sessions.len(),
            shutting_down: self.shutting_down,
        }
    }

    /// User-initiated close of a session's window. A proceeding close only asks
    /// the child to end; teardown follows through the child-exit path.
    #[tracing::instrument(skip(self, prompt), fields(session = %id))]
    pub fn request_close(
        &mut self,
        id: &SessionId,
        prompt: &mut dyn ConfirmPrompt,
    ) -> CloseOutcome {
        let Some(session) = self.sessions.get_mut(id) else {
            return CloseOutcome::NotFound;
        };
        let window = session.window();
        if CloseGuard::confirm_close(&self.host, window, prompt) == CloseDecision::Cancel {
            tracing::info!("Close cancelled");
            return CloseOutcome::Cancelled;
        }
        match session.phase() {
            SessionPhase::Running => self.host.terminate_child(window),
            SessionPhase::Pending => session.mark_close_pending(),
            SessionPhase::TornDown => return CloseOutcome::NotFound,
        }
        tracing::info!("Close proceeding");
        CloseOutcome::Proceeding
    }

    /// Asks every child to end. Pending sessions are ended once their spawn resolves.
    pub fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        tracing::info!(sessions = self.sessions.len(), "Shutting down sessions");
        for session in self.sessions.values_mut() {
            match session.phase() {
                SessionPhase::Running => self.host.terminate_child(session.window()),
                SessionPhase::Pending => session.mark_close_pending(),
                SessionPhase::TornDown => {}
            }
        }
    }

    /// Tears down whatever is still open without waiting for children.
    pub fn force_teardown_all(&mut self, status: ExitStatus) {
        let ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        for id in ids {
            let transition = match self.sessions.get_mut(&id) {
                Some(session) => session.force_teardown(status),
                None => continue,
            };
            if let Transition::TearDown(teardown) = transition {
                tracing::warn!(session = %id, "Forcing teardown");
                self.finish(&id, teardown);
            }
        }
    }

    fn on_spawn_completed(&mut self, id: &SessionId, outcome: Result<u32, SpawnFailure>) {
        let Some(session) = self.sessions.get_mut(id) else {
            tracing::debug!(session = %id, "Spawn report for unknown session ignored");
            return;
        };
        if let Err(failure) = &outcome {
            tracing::warn!(session = %id, error = %failure, "Spawn failed");
        }
        match session.on_spawn_completed(outcome) {
            Transition::Ignored => {
                tracing::debug!(session = %id, "Spawn report ignored");
            }
            Transition::Started { pid } => {
                tracing::info!(session = %id, pid, "Child started");
                if session.close_pending() {
                    self.host.terminate_child(session.window());
                }
            }
            Transition::TearDown(teardown) => self.finish(id, teardown),
        }
    }

    fn on_child_exited(&mut self, id: &SessionId, status: ExitStatus) {
        let Some(session) = self.sessions.get_mut(id) else {
            tracing::debug!(session = %id, "Exit report for unknown session ignored");
            return;
        };
        match session.on_child_exited(status) {
            Transition::TearDown(teardown) => self.finish(id, teardown),
            Transition::Ignored | Transition::Started { .. } => {
                tracing::debug!(session = %id, "Exit report ignored");
            }
        }
    }

    fn finish(&mut self, id: &SessionId, teardown: Teardown) {
        let status = teardown.status();
        teardown.run(&mut self.holds, &mut self.host);
        self.sessions.remove(id);
        tracing::info!(
            session = %id,
            exit_status = status.code(),
            holds = self.holds.count(),
            "Session torn down"
        );
    }

    fn fresh_session_id(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}
