//! One client request and the write-once channel back to it.

use crate::domain::{ExitStatus, InvocationRequest, SessionId};
use crate::usecases::ports::ExitStatusSink;

pub struct InvocationGate {
    request: InvocationRequest,
    sink: Box<dyn ExitStatusSink>,
}

impl InvocationGate {
    pub fn new(request: InvocationRequest, sink: Box<dyn ExitStatusSink>) -> Self {
        Self { request, sink }
    }

    pub fn request(&self) -> &InvocationRequest {
        &self.request
    }

    pub fn acknowledge(&mut self, session: &SessionId) {
        self.sink.acknowledge(session);
    }

    /// Writes the sink and frees the request. Consumes the gate.
    pub fn resolve(self, status: ExitStatus) {
        self.sink.deliver(status);
    }
}
