//! Shared deterministic types for the pane controller core.
//!
//! Observations (`PaneInfo`, `WindowState`) are immutable snapshots recreated on
//! every query. Mappings (`SessionMapping`, `TrackedSession`) only ever come from
//! confirmed executor results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One pane as observed in the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneInfo {
    /// Stable handle assigned by tmux (e.g. `%3`).
    pub pane_id: String,
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
    pub title: String,
    pub is_active: bool,
}

/// One observation of the window that contains the reference pane.
///
/// `main_pane` is `None` when the reference pane could not be resolved. It is
/// never part of `agent_panes`, which keeps tmux's listing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub window_width: u32,
    pub window_height: u32,
    pub main_pane: Option<PaneInfo>,
    pub agent_panes: Vec<PaneInfo>,
}

impl WindowState {
    /// True if `pane_id` is one of the observed agent panes.
    pub fn has_agent_pane(&self, pane_id: &str) -> bool {
        self.agent_panes.iter().any(|pane| pane.pane_id == pane_id)
    }

    pub fn agent_pane(&self, pane_id: &str) -> Option<&PaneInfo> {
        self.agent_panes.iter().find(|pane| pane.pane_id == pane_id)
    }
}

/// Width floors used by the capacity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityConfig {
    pub main_pane_min_width: u32,
    pub agent_pane_min_width: u32,
}

/// Tiling modes applied to the whole window after a spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    MainVertical,
    MainHorizontal,
    Tiled,
    EvenHorizontal,
    EvenVertical,
}

impl Layout {
    /// Name understood by `tmux select-layout`.
    pub fn as_tmux_str(self) -> &'static str {
        match self {
            Layout::MainVertical => "main-vertical",
            Layout::MainHorizontal => "main-horizontal",
            Layout::Tiled => "tiled",
            Layout::EvenHorizontal => "even-horizontal",
            Layout::EvenVertical => "even-vertical",
        }
    }

    /// Window option that sizes the main pane, for layouts that have one.
    pub fn main_pane_option(self) -> Option<&'static str> {
        match self {
            Layout::MainVertical => Some("main-pane-width"),
            Layout::MainHorizontal => Some("main-pane-height"),
            Layout::Tiled | Layout::EvenHorizontal | Layout::EvenVertical => None,
        }
    }
}

/// The controller's belief about one active worker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMapping {
    pub session_id: String,
    pub pane_id: String,
    pub created_at: DateTime<Utc>,
}

/// Cache entry held by the pane manager, keyed by session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSession {
    pub session_id: String,
    pub pane_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl TrackedSession {
    pub fn mapping(&self) -> SessionMapping {
        SessionMapping {
            session_id: self.session_id.clone(),
            pane_id: self.pane_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// A layout mutation request produced by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneAction {
    /// Create a new agent pane for `session_id`.
    Spawn { title: String, session_id: String },
    /// Destroy an existing pane.
    Close { pane_id: String, session_id: String },
    /// Retire `old_session_id`'s pane and spawn one for `new_session_id`.
    Replace {
        pane_id: String,
        old_session_id: String,
        new_session_id: String,
        title: String,
    },
}

impl PaneAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PaneAction::Spawn { .. } => "spawn",
            PaneAction::Close { .. } => "close",
            PaneAction::Replace { .. } => "replace",
        }
    }

    /// Session whose mapping this action retires, if any.
    pub fn retired_session(&self) -> Option<&str> {
        match self {
            PaneAction::Spawn { .. } => None,
            PaneAction::Close { session_id, .. } => Some(session_id),
            PaneAction::Replace { old_session_id, .. } => Some(old_session_id),
        }
    }
}

/// Normalized "session created" payload from the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}
