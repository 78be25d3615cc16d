pub mod exit_sink;
pub mod presenter;
pub mod rpc;

pub use exit_sink::{ChannelExitSink, SinkMessage};
pub use presenter::{ClientErrorView, OutputFormat, Presenter, create_presenter};
