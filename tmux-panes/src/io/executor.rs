//! Action executor: applies decided pane actions and verifies them.
//!
//! A spawn only counts once a follow-up observation shows the new pane. Each
//! action in a batch is attempted and reported on its own; nothing is retried.

use tracing::{debug, info, instrument, warn};

use crate::core::orphans::agent_pane_title;
use crate::core::types::{PaneAction, WindowState};
use crate::io::config::PanesConfig;
use crate::io::multiplexer::{KillOutcome, Multiplexer, SplitDirection, SplitRequest};

/// Environment variable pointing an agent pane back at the owning process.
pub const SERVER_URL_ENV: &str = "TMUX_PANES_SERVER_URL";
/// Environment variable naming the session an agent pane hosts.
pub const SESSION_ID_ENV: &str = "TMUX_PANES_SESSION_ID";

/// Inputs shared by every action in a batch.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteContext<'a> {
    pub config: &'a PanesConfig,
    /// Endpoint of the owning process, exported into spawned panes.
    pub server_url: &'a str,
    /// Observation the actions were decided from.
    pub window_state: &'a WindowState,
}

/// Outcome of a single action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    /// Verified new pane, for spawn and replace.
    pub pane_id: Option<String>,
    /// The pane being retired is confirmed gone (close, or the first half of
    /// a replace). Can be true while `success` is false.
    pub retired: bool,
    pub error: Option<String>,
}

impl ActionResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn closed() -> Self {
        Self {
            success: true,
            retired: true,
            ..Self::default()
        }
    }

    fn spawned(pane_id: String) -> Self {
        Self {
            success: true,
            pane_id: Some(pane_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: PaneAction,
    pub result: ActionResult,
}

/// Aggregate outcome of [`execute_actions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteActionsResult {
    /// Logical AND of every action's success.
    pub success: bool,
    pub spawned_pane_id: Option<String>,
    pub results: Vec<ActionOutcome>,
}

impl ExecuteActionsResult {
    /// Sessions whose pane was confirmed retired by this batch.
    pub fn retired_sessions(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|outcome| outcome.result.retired)
            .filter_map(|outcome| outcome.action.retired_session())
            .collect()
    }
}

/// Run `actions` in order. A failed action does not stop the batch.
#[instrument(skip_all, fields(actions = actions.len()))]
pub fn execute_actions<M: Multiplexer + ?Sized>(
    mux: &M,
    actions: &[PaneAction],
    ctx: &ExecuteContext<'_>,
) -> ExecuteActionsResult {
    let mut success = true;
    let mut spawned_pane_id = None;
    let mut results = Vec::with_capacity(actions.len());

    for action in actions {
        let result = execute_action(mux, action, ctx);
        success &= result.success;
        if let Some(pane_id) = &result.pane_id {
            spawned_pane_id = Some(pane_id.clone());
        }
        results.push(ActionOutcome {
            action: action.clone(),
            result,
        });
    }

    debug!(success, spawned = ?spawned_pane_id, "batch finished");
    ExecuteActionsResult {
        success,
        spawned_pane_id,
        results,
    }
}

/// Run one action and report whether it verifiably took effect.
#[instrument(skip_all, fields(kind = action.kind()))]
pub fn execute_action<M: Multiplexer + ?Sized>(
    mux: &M,
    action: &PaneAction,
    ctx: &ExecuteContext<'_>,
) -> ActionResult {
    match action {
        PaneAction::Spawn { title, session_id } => spawn_pane(mux, session_id, title, None, ctx),
        PaneAction::Close {
            pane_id,
            session_id,
        } => {
            debug!(%pane_id, %session_id, "closing pane");
            close_pane(mux, pane_id)
        }
        PaneAction::Replace {
            pane_id,
            old_session_id,
            new_session_id,
            title,
        } => {
            info!(%pane_id, %old_session_id, %new_session_id, "replacing pane");
            let closed = close_pane(mux, pane_id);
            if !closed.success {
                return closed;
            }
            let spawned = spawn_pane(mux, new_session_id, title, Some(pane_id), ctx);
            ActionResult {
                retired: true,
                error: spawned
                    .error
                    .map(|err| format!("old pane closed, spawn failed: {err}")),
                ..spawned
            }
        }
    }
}

fn close_pane<M: Multiplexer + ?Sized>(mux: &M, pane_id: &str) -> ActionResult {
    match mux.kill_pane(pane_id) {
        Ok(KillOutcome::Killed) => ActionResult::closed(),
        Ok(KillOutcome::AlreadyGone) => {
            debug!(pane_id, "pane already gone, treating close as done");
            ActionResult::closed()
        }
        Err(err) => {
            warn!(pane_id, err = %format!("{err:#}"), "close failed");
            ActionResult::failed(format!("{err:#}"))
        }
    }
}

/// Split a new agent pane, re-tile, title it, then confirm it is observed.
///
/// `retiring` is a pane closed just before this spawn; it is not used as a
/// split target even though the decision's observation still lists it.
fn spawn_pane<M: Multiplexer + ?Sized>(
    mux: &M,
    session_id: &str,
    title: &str,
    retiring: Option<&str>,
    ctx: &ExecuteContext<'_>,
) -> ActionResult {
    let Some(main) = ctx.window_state.main_pane.as_ref() else {
        return ActionResult::failed("source pane lost");
    };
    let last_agent = ctx
        .window_state
        .agent_panes
        .iter()
        .filter(|pane| Some(pane.pane_id.as_str()) != retiring)
        .last();
    let (target_pane_id, direction) = match last_agent {
        Some(pane) => (pane.pane_id.clone(), SplitDirection::Vertical),
        None => (main.pane_id.clone(), SplitDirection::Horizontal),
    };

    let request = SplitRequest {
        target_pane_id,
        direction,
        env: vec![
            (SERVER_URL_ENV.to_string(), ctx.server_url.to_string()),
            (SESSION_ID_ENV.to_string(), session_id.to_string()),
        ],
        command: render_pane_command(&ctx.config.pane_command, ctx.server_url, session_id),
    };
    let pane_id = match mux.split_pane(&request) {
        Ok(pane_id) => pane_id,
        Err(err) => {
            warn!(session_id, err = %format!("{err:#}"), "split failed");
            return ActionResult::failed(format!("{err:#}"));
        }
    };

    if let Err(err) = mux.apply_layout(&main.pane_id, ctx.config.layout, ctx.config.main_pane_size)
    {
        warn!(%pane_id, err = %format!("{err:#}"), "apply layout failed");
    }
    if let Err(err) = mux.set_pane_title(&pane_id, &agent_pane_title(title)) {
        warn!(%pane_id, err = %format!("{err:#}"), "set pane title failed");
    }

    match mux.query_window_state(&main.pane_id) {
        Ok(state) if state.has_agent_pane(&pane_id) => {
            info!(session_id, %pane_id, "spawned pane verified");
            ActionResult::spawned(pane_id)
        }
        Ok(_) => {
            warn!(session_id, %pane_id, "spawned pane not observed");
            ActionResult::failed(format!("spawned pane {pane_id} not observed"))
        }
        Err(err) => {
            warn!(session_id, %pane_id, err = %format!("{err:#}"), "verification query failed");
            ActionResult::failed(format!("verify pane {pane_id}: {err:#}"))
        }
    }
}

/// Substitute `{server_url}` and `{session_id}` in the pane command template.
pub fn render_pane_command(template: &[String], server_url: &str, session_id: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace("{server_url}", server_url)
                .replace("{session_id}", session_id)
        })
        .collect()
}
