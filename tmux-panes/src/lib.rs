//! Tmux pane-layout controller for agent sessions.
//!
//! Each worker session started by the host gets its own agent pane next to
//! the main pane, as long as the window is wide enough; the oldest session is
//! evicted when it is not. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (capacity, decisions, event
//!   normalization, suppression). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (tmux, child processes, config).
//!   Behind the [`io::multiplexer::Multiplexer`] trait so tests can fake it.
//!
//! Orchestration modules ([`manager`], [`watch`], `signals`) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod manager;
#[cfg(unix)]
pub mod signals;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod watch;
