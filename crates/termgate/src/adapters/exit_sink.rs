//! Exit-status sink backed by the client's socket connection.
//!
//! The event loop never writes to sockets. The sink forwards to the thread that
//! owns the connection, which turns each message into one JSON-RPC answer.

use crossbeam_channel::{Receiver, Sender};

use crate::domain::{ExitStatus, SessionId};
use crate::usecases::ports::ExitStatusSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    Accepted(SessionId),
    Exited(ExitStatus),
}

pub struct ChannelExitSink {
    tx: Sender<SinkMessage>,
}

impl ChannelExitSink {
    pub fn new() -> (Self, Receiver<SinkMessage>) {
        let (tx, rx) = crossbeam_channel::bounded(2);
        (Self { tx }, rx)
    }
}

impl ExitStatusSink for ChannelExitSink {
    fn acknowledge(&mut self, session: &SessionId) {
        if self.tx.send(SinkMessage::Accepted(session.clone())).is_err() {
            tracing::debug!(session = %session, "Client gone before acceptance");
        }
    }

    fn deliver(self: Box<Self>, status: ExitStatus) {
        if self.tx.send(SinkMessage::Exited(status)).is_err() {
            tracing::debug!(exit_status = status.code(), "Client gone before exit status");
        }
    }
}
