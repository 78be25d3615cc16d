//! The daemon's single event loop.
//!
//! Runs on the main thread and is the only code that touches the [`Application`].
//! It returns once the daemon may exit: every session it ever held has been
//! torn down and the linger period passed, or a shutdown finished.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::domain::ExitStatus;
use crate::usecases::Application;
use crate::usecases::ports::{LoopEvent, TerminalHost};

const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub linger: Duration,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The last hold was released and no invocation arrived within the linger period.
    Idle,
    Shutdown,
    /// Every sender is gone. Only possible if the application itself was dropped.
    Disconnected,
}

pub fn run<H: TerminalHost>(
    app: &mut Application<H>,
    events: &Receiver<LoopEvent>,
    settings: LoopSettings,
) -> LoopExit {
    let mut idle_since: Option<Instant> = None;
    let mut shutdown_started: Option<Instant> = None;
    let mut forced = false;

    loop {
        let wait = if app.is_idle() {
            settings.linger.min(TICK)
        } else {
            TICK
        };
        match events.recv_timeout(wait) {
            Ok(event) => dispatch(app, event, &mut shutdown_started),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return LoopExit::Disconnected,
        }

        if let Some(started) = shutdown_started {
            if app.session_count() == 0 {
                info!("All sessions closed, shutdown complete");
                return LoopExit::Shutdown;
            }
            if !forced && started.elapsed() >= settings.shutdown_grace {
                warn!(
                    sessions = app.session_count(),
                    grace_ms = settings.shutdown_grace.as_millis(),
                    "Shutdown grace period elapsed"
                );
                app.force_teardown_all(ExitStatus::HANGUP);
                forced = true;
            }
            continue;
        }

        if app.is_idle() {
            let since = *idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= settings.linger && events.is_empty() {
                info!("No sessions left, daemon exiting");
                return LoopExit::Idle;
            }
        } else {
            idle_since = None;
        }
    }
}

fn dispatch<H: TerminalHost>(
    app: &mut Application<H>,
    event: LoopEvent,
    shutdown_started: &mut Option<Instant>,
) {
    debug!(event = event.name(), "Loop event");
    match event {
        // Dropping the invocation drops its sink; the client is told to retry.
        LoopEvent::Invocation { .. } if app.is_shutting_down() => {
            info!("Invocation refused during shutdown");
        }
        LoopEvent::Shutdown => {
            shutdown_started.get_or_insert_with(Instant::now);
            app.begin_shutdown();
        }
        other => app.handle(other),
    }
}
