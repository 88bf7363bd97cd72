//! Multiplexer abstraction.
//!
//! The [`Multiplexer`] trait decouples the executor and pane manager from the
//! concrete tmux CLI. Tests use an in-memory fake that simulates panes without
//! spawning processes.

use std::time::Duration;

use anyhow::Result;

use crate::core::types::{Layout, WindowState};

/// Orientation of a new pane relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// Side by side (`split-window -h`).
    Horizontal,
    /// Stacked (`split-window -v`).
    Vertical,
}

/// Parameters for creating a pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRequest {
    pub target_pane_id: String,
    pub direction: SplitDirection,
    /// Environment exported into the new pane.
    pub env: Vec<(String, String)>,
    /// Command run inside the new pane.
    pub command: Vec<String>,
}

/// What a pane destruction found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    /// The pane no longer existed.
    AlreadyGone,
}

/// Operations the controller needs from a terminal multiplexer.
pub trait Multiplexer: Send + Sync {
    /// Observe the window containing `source_pane_id`.
    ///
    /// The returned state has `main_pane = None` if the source pane is not in
    /// the listing; errors mean nothing could be observed at all.
    fn query_window_state(&self, source_pane_id: &str) -> Result<WindowState>;

    /// Create a pane and return its identifier.
    fn split_pane(&self, request: &SplitRequest) -> Result<String>;

    /// Re-tile the window containing `target_pane_id`.
    fn apply_layout(&self, target_pane_id: &str, layout: Layout, main_pane_size: u8) -> Result<()>;

    fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<()>;

    fn kill_pane(&self, pane_id: &str) -> Result<KillOutcome>;

    /// Best-effort destruction for process-exit paths: bounded by `timeout`,
    /// no verification.
    fn kill_pane_blocking(&self, pane_id: &str, timeout: Duration) -> Result<()>;
}
