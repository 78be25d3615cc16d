//! A spawned child paired with its window, and the teardown state machine.
//!
//! ```text
//! Pending --spawn ok (pid > 0)--> Running --child exit--> TornDown
//!    |                                                       ^
//!    +-------------------spawn failure----------------------+
//! ```
//!
//! `TornDown` absorbs every later signal. The gate and the hold are moved out
//! of the session on the first transition into it, so the teardown action
//! cannot run twice.

use chrono::{DateTime, Utc};

use crate::domain::{ExitStatus, SessionId, SessionInfo, SessionPhase, WindowId};
use crate::usecases::hold::{Hold, HoldCount};
use crate::usecases::invocation_gate::InvocationGate;
use crate::usecases::ports::{SpawnErrorKind, SpawnFailure, TerminalHost};

/// What the caller must do after feeding an event to a session.
#[must_use]
pub enum Transition {
    /// The event arrived in a phase where it has no effect.
    Ignored,
    Started { pid: u32 },
    TearDown(Teardown),
}

impl Transition {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Transition::Ignored)
    }
}

/// Everything a session owned, taken out of it for the one teardown.
#[must_use]
pub struct Teardown {
    gate: InvocationGate,
    hold: Hold,
    window: WindowId,
    status: ExitStatus,
}

impl Teardown {
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Writes the sink, releases the hold, destroys the window. In that order.
    pub fn run<H: TerminalHost>(self, holds: &mut HoldCount, host: &mut H) {
        let Teardown {
            gate,
            hold,
            window,
            status,
        } = self;
        gate.resolve(status);
        holds.release(hold);
        host.destroy_window(window);
    }
}

struct Owned {
    gate: InvocationGate,
    hold: Hold,
}

pub struct Session {
    id: SessionId,
    window: WindowId,
    phase: SessionPhase,
    pid: Option<u32>,
    command: String,
    cwd: String,
    started_at: DateTime<Utc>,
    close_pending: bool,
    owned: Option<Owned>,
}

impl Session {
    pub fn new(
        id: SessionId,
        window: WindowId,
        command: String,
        mut gate: InvocationGate,
        hold: Hold,
    ) -> Self {
        gate.acknowledge(&id);
        let cwd = gate.request().cwd.display().to_string();
        Self {
            id,
            window,
            phase: SessionPhase::Pending,
            pid: None,
            command,
            cwd,
            started_at: Utc::now(),
            close_pending: false,
            owned: Some(Owned { gate, hold }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_torn_down(&self) -> bool {
        self.phase == SessionPhase::TornDown
    }

    pub fn close_pending(&self) -> bool {
        self.close_pending
    }

    /// Remembers a close that arrived before the child existed.
    pub fn mark_close_pending(&mut self) {
        self.close_pending = true;
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            window: self.window,
            phase: self.phase,
            pid: self.pid,
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            started_at: self.started_at,
        }
    }

    pub fn on_spawn_completed(&mut self, outcome: Result<u32, SpawnFailure>) -> Transition {
        if self.phase != SessionPhase::Pending {
            return Transition::Ignored;
        }
        match outcome {
            Ok(pid) if pid > 0 => {
                self.phase = SessionPhase::Running;
                self.pid = Some(pid);
                Transition::Started { pid }
            }
            Ok(_) => self.tear_down(
                SpawnFailure::new(SpawnErrorKind::Other, "host reported pid 0").exit_status(),
            ),
            Err(failure) => self.tear_down(failure.exit_status()),
        }
    }

    /// A child exit is final whatever the phase: a late spawn report is then ignored.
    pub fn on_child_exited(&mut self, status: ExitStatus) -> Transition {
        self.tear_down(status)
    }

    /// Ends the session without waiting for its child, e.g. at daemon shutdown.
    pub fn force_teardown(&mut self, status: ExitStatus) -> Transition {
        self.tear_down(status)
    }

    fn tear_down(&mut self, status: ExitStatus) -> Transition {
        let Some(Owned { gate, hold }) = self.owned.take() else {
            return Transition::Ignored;
        };
        self.phase = SessionPhase::TornDown;
        Transition::TearDown(Teardown {
            gate,
            hold,
            window: self.window,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Environment, InvocationRequest};
    use crate::usecases::ports::test_support::{
        Journal, MockTerminalHost, RecordingSink, SinkProbe,
    };

    fn session(holds: &mut HoldCount, host: &mut MockTerminalHost) -> (Session, SinkProbe) {
        let (sink, probe) = RecordingSink::new();
        let gate = InvocationGate::new(
            InvocationRequest::new(Some("true".into()), Environment::new(), "/tmp"),
            sink.boxed(),
        );
        let hold = holds.acquire();
        let window = host.create_window();
        let session = Session::new(SessionId::new("s1"), window, "true".into(), gate, hold);
        (session, probe)
    }

    fn expect_teardown(transition: Transition) -> Teardown {
        match transition {
            Transition::TearDown(teardown) => teardown,
            Transition::Ignored => panic!("expected teardown, got ignored"),
            Transition::Started { pid } => panic!("expected teardown, got start {pid}"),
        }
    }

    #[test]
    fn new_session_is_pending_and_acknowledged() {
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::new();
        let (session, probe) = session(&mut holds, &mut host);

        assert_eq!(session.phase(), SessionPhase::Pending);
        assert_eq!(session.pid(), None);
        assert_eq!(probe.acknowledged(), Some(SessionId::new("s1")));
        assert_eq!(session.info().cwd, "/tmp");
    }

    #[test]
    fn spawn_success_then_exit_tears_down_with_child_status() {
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::new();
        let (mut session, probe) = session(&mut holds, &mut host);

        assert!(matches!(
            session.on_spawn_completed(Ok(99)),
            Transition::Started { pid: 99 }
        ));
        assert_eq!(session.phase(), SessionPhase::Running);
        assert_eq!(session.pid(), Some(99));

        let teardown = expect_teardown(session.on_child_exited(ExitStatus::new(2)));
        assert_eq!(teardown.status().code(), 2);
        teardown.run(&mut holds, &mut host);

        assert!(session.is_torn_down());
        assert_eq!(probe.status(), Some(ExitStatus::new(2)));
        assert!(holds.is_released());
        assert_eq!(host.destroyed(), [session.window()]);
    }

    #[test]
    fn spawn_failure_tears_down_with_failure_code() {
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::new();
        let (mut session, probe) = session(&mut holds, &mut host);

        let failure = SpawnFailure::new(SpawnErrorKind::NotFound, "missing");
        expect_teardown(session.on_spawn_completed(Err(failure))).run(&mut holds, &mut host);

        assert_eq!(probe.status().map(ExitStatus::code), Some(127));
        assert_eq!(session.pid(), None);
    }

    #[test]
    fn zero_pid_counts_as_failure() {
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::new();
        let (mut session, _probe) = session(&mut holds, &mut host);

        let teardown = expect_teardown(session.on_spawn_completed(Ok(0)));
        assert!(!teardown.status().is_success());
        teardown.run(&mut holds, &mut host);
    }

    #[test]
    fn teardown_runs_at_most_once_across_both_paths() {
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::new();
        let (mut session, probe) = session(&mut holds, &mut host);

        let failure = SpawnFailure::new(SpawnErrorKind::Other, "boom");
        expect_teardown(session.on_spawn_completed(Err(failure))).run(&mut holds, &mut host);

        assert!(session.on_child_exited(ExitStatus::SUCCESS).is_ignored());
        assert!(session.on_spawn_completed(Ok(5)).is_ignored());
        assert!(session.force_teardown(ExitStatus::HANGUP).is_ignored());

        assert_eq!(probe.delivered().len(), 1);
        assert_eq!(host.destroyed().len(), 1);
        assert_eq!(holds.count(), 0);
    }

    #[test]
    fn exit_before_spawn_report_wins() {
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::new();
        let (mut session, probe) = session(&mut holds, &mut host);

        expect_teardown(session.on_child_exited(ExitStatus::new(1))).run(&mut holds, &mut host);
        assert!(session.on_spawn_completed(Ok(10)).is_ignored());
        assert_eq!(probe.status(), Some(ExitStatus::new(1)));
    }

    #[test]
    fn teardown_order_is_sink_then_window() {
        let journal = Journal::default();
        let mut holds = HoldCount::new();
        let mut host = MockTerminalHost::with_journal(journal.clone());
        let (sink, probe) = RecordingSink::new();
        let gate = InvocationGate::new(
            InvocationRequest::new(None, Environment::new(), "/"),
            sink.with_journal(journal.clone()).boxed(),
        );
        let hold = holds.acquire();
        let window = host.create_window();
        let mut session = Session::new(SessionId::new("s"), window, String::new(), gate, hold);

        expect_teardown(session.force_teardown(ExitStatus::HANGUP)).run(&mut holds, &mut host);

        assert_eq!(journal.entries(), ["create:w1", "sink:129", "destroy:w1"]);
        assert_eq!(probe.status(), Some(ExitStatus::HANGUP));
    }
}
