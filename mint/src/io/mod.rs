//! I/O helpers for mint commands.

pub mod config;
pub mod executor;
pub mod init;
pub mod process;
pub mod queue_store;
pub mod session_log;
