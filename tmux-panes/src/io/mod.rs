//! I/O adapters: configuration, child processes, and the tmux multiplexer.

pub mod config;
pub mod executor;
pub mod multiplexer;
pub mod process;
pub mod tmux;
