use crate::domain::{ExitStatus, SessionId};

/// Write-once channel back to the client that asked for a session.
///
/// `deliver` takes the sink by value, so a sink can be written at most once.
pub trait ExitStatusSink: Send {
    /// Tells the client its invocation was accepted. May be called before `deliver`.
    fn acknowledge(&mut self, _session: &SessionId) {}

    fn deliver(self: Box<Self>, status: ExitStatus);
}
