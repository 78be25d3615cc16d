//! Domain layer: value types shared by every other layer.

pub mod invocation;
pub mod session_types;

pub use invocation::{COMMAND_SHELL, Environment, InvocationRequest, LaunchCommand};
pub use session_types::*;
