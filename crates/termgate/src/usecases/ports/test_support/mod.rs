mod mock_host;
mod recording_sink;

pub use mock_host::{Journal, MockTerminalHost, SpawnRecord};
pub use recording_sink::{RecordingSink, SinkProbe};
