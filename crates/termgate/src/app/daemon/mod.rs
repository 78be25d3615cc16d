//! Daemon wiring: socket server, connection transport and the event loop.

pub mod event_loop;
pub mod server;
pub mod transport;

pub use server::start_daemon;
