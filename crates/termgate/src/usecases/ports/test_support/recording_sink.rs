//! Exit-status sink that records what the core wrote to it.

use std::sync::{Arc, Mutex};

use crate::domain::{ExitStatus, SessionId};
use crate::usecases::ports::ExitStatusSink;
use crate::usecases::ports::test_support::Journal;

#[derive(Default)]
struct SinkState {
    acknowledged: Option<SessionId>,
    delivered: Vec<ExitStatus>,
}

pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
    journal: Option<Journal>,
}

#[derive(Clone)]
pub struct SinkProbe {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> (Self, SinkProbe) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        (
            Self {
                state: Arc::clone(&state),
                journal: None,
            },
            SinkProbe { state },
        )
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn boxed(self) -> Box<dyn ExitStatusSink> {
        Box::new(self)
    }
}

impl ExitStatusSink for RecordingSink {
    fn acknowledge(&mut self, session: &SessionId) {
        self.state.lock().unwrap().acknowledged = Some(session.clone());
    }

    fn deliver(self: Box<Self>, status: ExitStatus) {
        if let Some(journal) = &self.journal {
            journal.record(format!("sink:{status}"));
        }
        self.state.lock().unwrap().delivered.push(status);
    }
}

impl SinkProbe {
    pub fn acknowledged(&self) -> Option<SessionId> {
        self.state.lock().unwrap().acknowledged.clone()
    }

    pub fn delivered(&self) -> Vec<ExitStatus> {
        self.state.lock().unwrap().delivered.clone()
    }

    /// The single status written, or `None` if the sink is still open.
    pub fn status(&self) -> Option<ExitStatus> {
        let delivered = self.delivered();
        assert!(delivered.len() <= 1, "sink written {} times", delivered.len());
        delivered.first().copied()
    }
}
