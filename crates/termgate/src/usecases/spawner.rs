//! Turns an invocation into a spawn request on the terminal host.

use crate::domain::{InvocationRequest, LaunchCommand, WindowId};
use crate::usecases::ports::{SpawnCompletion, TerminalHost};

pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Issues the spawn and returns the command the host was given.
    ///
    /// The outcome is reported later through `completion`; an unresolvable
    /// command is passed through empty and the host reports it as a failure.
    #[tracing::instrument(
        skip(host, request, completion),
        fields(session = %completion.session(), window = %window, cwd = ?request.cwd)
    )]
    pub fn spawn<H: TerminalHost>(
        host: &mut H,
        window: WindowId,
        request: &InvocationRequest,
        completion: SpawnCompletion,
    ) -> LaunchCommand {
        let command = request.launch_command();
        if command.is_empty() {
            tracing::warn!("No command given and SHELL unset in client environment");
        } else {
            tracing::debug!(command = %command.display(), "Spawning child");
        }
        host.spawn_child(
            window,
            command.clone(),
            &request.env,
            &request.cwd,
            completion,
        );
        command
    }
}
