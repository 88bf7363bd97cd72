//! Test-only helpers: an in-memory multiplexer and a deterministic clock.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::core::types::{Layout, PaneInfo, WindowState};
use crate::io::multiplexer::{KillOutcome, Multiplexer, SplitDirection, SplitRequest};

/// Pane id of the reference (main) pane in every [`FakeMux`].
pub const MAIN_PANE: &str = "%0";

/// A call made against a [`FakeMux`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    Query(String),
    Split {
        target: String,
        direction: SplitDirection,
    },
    Layout {
        target: String,
        layout: Layout,
    },
    Title {
        pane_id: String,
        title: String,
    },
    Kill(String),
    KillBlocking(String),
}

/// A simulated pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakePane {
    pub pane_id: String,
    pub title: String,
    pub env: Vec<(String, String)>,
    pub command: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    window_width: u32,
    window_height: u32,
    panes: Vec<FakePane>,
    next_id: u32,
    calls: Vec<MuxCall>,
    fail_query: bool,
    fail_split: bool,
    fail_layout: bool,
    drop_spawned: bool,
    fail_kill: HashSet<String>,
}

impl FakeState {
    fn window_state(&self, source_pane_id: &str) -> WindowState {
        let count = self.panes.len().max(1) as u32;
        let mut main_pane = None;
        let mut agent_panes = Vec::new();
        for (idx, pane) in self.panes.iter().enumerate() {
            let info = PaneInfo {
                pane_id: pane.pane_id.clone(),
                width: self.window_width / count,
                height: self.window_height,
                left: idx as u32 * (self.window_width / count),
                top: 0,
                title: pane.title.clone(),
                is_active: pane.pane_id == MAIN_PANE,
            };
            if pane.pane_id == source_pane_id {
                main_pane = Some(info);
            } else {
                agent_panes.push(info);
            }
        }
        WindowState {
            window_width: self.window_width,
            window_height: self.window_height,
            main_pane,
            agent_panes,
        }
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("%{}", self.next_id)
    }

    fn remove(&mut self, pane_id: &str) -> bool {
        let before = self.panes.len();
        self.panes.retain(|pane| pane.pane_id != pane_id);
        before != self.panes.len()
    }
}

/// In-memory multiplexer: one window holding [`MAIN_PANE`] plus whatever
/// panes get split off or added by a test.
#[derive(Debug)]
pub struct FakeMux {
    state: Mutex<FakeState>,
}

impl FakeMux {
    pub fn new(window_width: u32, window_height: u32) -> Self {
        let state = FakeState {
            window_width,
            window_height,
            panes: vec![FakePane {
                pane_id: MAIN_PANE.to_string(),
                title: "main".to_string(),
                env: Vec::new(),
                command: Vec::new(),
            }],
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Current observation, without recording a call.
    pub fn snapshot(&self) -> WindowState {
        self.state.lock().window_state(MAIN_PANE)
    }

    /// Add a pane created outside the controller.
    pub fn add_pane(&self, title: &str) -> String {
        let mut state = self.state.lock();
        let pane_id = state.allocate_id();
        state.panes.push(FakePane {
            pane_id: pane_id.clone(),
            title: title.to_string(),
            env: Vec::new(),
            command: Vec::new(),
        });
        pane_id
    }

    /// Close a pane out-of-band, as a human would.
    pub fn remove_pane(&self, pane_id: &str) {
        self.state.lock().remove(pane_id);
    }

    pub fn pane(&self, pane_id: &str) -> Option<FakePane> {
        self.state
            .lock()
            .panes
            .iter()
            .find(|pane| pane.pane_id == pane_id)
            .cloned()
    }

    pub fn pane_title(&self, pane_id: &str) -> Option<String> {
        self.pane(pane_id).map(|pane| pane.title)
    }

    /// Ids of every pane other than [`MAIN_PANE`], in window order.
    pub fn agent_pane_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .panes
            .iter()
            .filter(|pane| pane.pane_id != MAIN_PANE)
            .map(|pane| pane.pane_id.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.state.lock().calls.clone()
    }

    /// Pane ids targeted by any kill call, in order.
    pub fn kill_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MuxCall::Kill(id) | MuxCall::KillBlocking(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn split_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MuxCall::Split { .. }))
            .count()
    }

    pub fn set_window_width(&self, width: u32) {
        self.state.lock().window_width = width;
    }

    pub fn set_fail_query(&self, fail: bool) {
        self.state.lock().fail_query = fail;
    }

    pub fn set_fail_split(&self, fail: bool) {
        self.state.lock().fail_split = fail;
    }

    pub fn set_fail_layout(&self, fail: bool) {
        self.state.lock().fail_layout = fail;
    }

    /// Report split panes by id but never let them show up in observations.
    pub fn set_drop_spawned(&self, drop: bool) {
        self.state.lock().drop_spawned = drop;
    }

    pub fn fail_kill(&self, pane_id: &str) {
        self.state.lock().fail_kill.insert(pane_id.to_string());
    }
}

impl Multiplexer for FakeMux {
    fn query_window_state(&self, source_pane_id: &str) -> Result<WindowState> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::Query(source_pane_id.to_string()));
        if state.fail_query {
            return Err(anyhow!("no server running"));
        }
        Ok(state.window_state(source_pane_id))
    }

    fn split_pane(&self, request: &SplitRequest) -> Result<String> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::Split {
            target: request.target_pane_id.clone(),
            direction: request.direction,
        });
        if state.fail_split {
            return Err(anyhow!("create pane failed: no space for new pane"));
        }
        if !state
            .panes
            .iter()
            .any(|pane| pane.pane_id == request.target_pane_id)
        {
            return Err(anyhow!("can't find pane: {}", request.target_pane_id));
        }
        let pane_id = state.allocate_id();
        if !state.drop_spawned {
            state.panes.push(FakePane {
                pane_id: pane_id.clone(),
                title: String::new(),
                env: request.env.clone(),
                command: request.command.clone(),
            });
        }
        Ok(pane_id)
    }

    fn apply_layout(&self, target_pane_id: &str, layout: Layout, _main_pane_size: u8) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::Layout {
            target: target_pane_id.to_string(),
            layout,
        });
        if state.fail_layout {
            return Err(anyhow!("invalid layout"));
        }
        Ok(())
    }

    fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::Title {
            pane_id: pane_id.to_string(),
            title: title.to_string(),
        });
        match state.panes.iter_mut().find(|pane| pane.pane_id == pane_id) {
            Some(pane) => {
                pane.title = title.to_string();
                Ok(())
            }
            None => Err(anyhow!("can't find pane: {pane_id}")),
        }
    }

    fn kill_pane(&self, pane_id: &str) -> Result<KillOutcome> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::Kill(pane_id.to_string()));
        if state.fail_kill.contains(pane_id) {
            return Err(anyhow!("server exited unexpectedly"));
        }
        if state.remove(pane_id) {
            Ok(KillOutcome::Killed)
        } else {
            Ok(KillOutcome::AlreadyGone)
        }
    }

    fn kill_pane_blocking(&self, pane_id: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::KillBlocking(pane_id.to_string()));
        if state.fail_kill.contains(pane_id) {
            return Err(anyhow!("timed out"));
        }
        state.remove(pane_id);
        Ok(())
    }
}

/// Clock that starts at `start_secs` and advances one second per reading.
pub fn ticking_clock(start_secs: i64) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    let next = Arc::new(AtomicI64::new(start_secs));
    move || {
        let secs = next.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }
}
