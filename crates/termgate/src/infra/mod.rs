pub mod daemon;
pub mod ipc;
pub mod terminal;
