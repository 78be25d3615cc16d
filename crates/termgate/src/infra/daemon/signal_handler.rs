//! Daemon signal handling.

use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

use crate::common::DaemonError;
use crate::usecases::ports::{LoopEvent, LoopSender};

/// Turns the first SIGINT/SIGTERM into a `Shutdown` event on the loop.
pub struct SignalHandler {
    _handle: JoinHandle<()>,
}

impl SignalHandler {
    pub fn setup(events: LoopSender) -> Result<Self, DaemonError> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|e| DaemonError::SignalSetup(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                for sig in signals.forever() {
                    info!(signal = sig, "Received signal, initiating graceful shutdown");
                    if !events.post(LoopEvent::Shutdown) {
                        break;
                    }
                }
            })
            .map_err(|e| DaemonError::SignalSetup(format!("failed to spawn signal handler: {e}")))?;

        Ok(Self { _handle: handle })
    }
}
