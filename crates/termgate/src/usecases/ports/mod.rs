pub mod confirm;
pub mod errors;
pub mod events;
pub mod exit_sink;
pub mod terminal_host;
#[cfg(test)]
pub(crate) mod test_support;

pub use confirm::{ConfirmAnswer, ConfirmPrompt, PresetAnswer};
pub use errors::{EXIT_CANNOT_EXECUTE, EXIT_NOT_FOUND, SpawnErrorKind, SpawnFailure};
pub use events::{
    ChildExitNotice, CloseOutcome, LoopEvent, LoopSender, Query, SpawnCompletion, StatusSnapshot,
    loop_channel,
};
pub use exit_sink::ExitStatusSink;
pub use terminal_host::TerminalHost;
