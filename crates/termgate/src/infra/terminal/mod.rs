pub mod error;
mod pty;

pub use error::PtyError;
pub use pty::{DEFAULT_TERM, PtyTerminalHost};
