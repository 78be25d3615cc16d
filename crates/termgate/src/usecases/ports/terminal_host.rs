use std::path::Path;

use crate::domain::{Environment, LaunchCommand, WindowId};
use crate::usecases::ports::events::SpawnCompletion;

/// Window and terminal-surface collaborator.
///
/// Every call is made from the event loop thread. Anything slow (process
/// creation, waiting on a child) must happen elsewhere and report back through
/// the completion.
pub trait TerminalHost {
    /// Creates a top-level window with one terminal surface. Cannot fail at this layer.
    fn create_window(&mut self) -> WindowId;

    /// Starts `command` inside the window's surface. The outcome arrives later,
    /// exactly once, through `completion`.
    fn spawn_child(
        &mut self,
        window: WindowId,
        command: LaunchCommand,
        env: &Environment,
        cwd: &Path,
        completion: SpawnCompletion,
    );

    /// Open sub-sessions hosted by the window at this moment.
    fn sub_session_count(&self, window: WindowId) -> usize;

    /// Asks the window's child to end, as a closing terminal would (SIGHUP).
    fn terminate_child(&mut self, window: WindowId);

    fn destroy_window(&mut self, window: WindowId);
}
