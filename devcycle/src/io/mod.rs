//! I/O helpers for dev-cycle commands.

pub mod config;
pub mod invoker;
pub mod process;
pub mod transcript_log;
