//! The invocation and session lifecycle core.

mod application;
mod close_guard;
mod hold;
mod invocation_gate;
mod session;
mod spawner;

pub use application::Application;
pub use close_guard::{CloseDecision, CloseGuard};
pub use hold::{Hold, HoldCount};
pub use invocation_gate::InvocationGate;
pub use session::{Session, Teardown, Transition};
pub use spawner::ProcessSpawner;
pub mod ports;
