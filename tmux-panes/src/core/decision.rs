//! Pure decision engine for admitting and retiring worker sessions.
//!
//! Every decision is derived from a fresh [`WindowState`]; the session mappings
//! only contribute metadata (which pane belongs to whom, creation time). Nothing
//! here touches the multiplexer.

use crate::core::capacity::capacity;
use crate::core::types::{CapacityConfig, PaneAction, SessionMapping, WindowState};

pub const REASON_SOURCE_PANE_LOST: &str = "source pane lost";
pub const REASON_NO_CAPACITY: &str = "no capacity and no evictable session";

/// Outcome of [`decide_spawn_actions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnDecision {
    pub can_spawn: bool,
    pub reason: String,
    pub actions: Vec<PaneAction>,
}

impl SpawnDecision {
    fn refuse(reason: &str) -> Self {
        Self {
            can_spawn: false,
            reason: reason.to_string(),
            actions: Vec::new(),
        }
    }
}

/// Decide how to admit `session_id` into the window.
///
/// Occupancy is counted from the observed agent panes, not from `mappings`, so
/// panes closed by hand or left behind by another process are accounted for.
/// Callers must not pass a session that is already tracked or pending.
pub fn decide_spawn_actions(
    state: &WindowState,
    session_id: &str,
    title: &str,
    cfg: &CapacityConfig,
    mappings: &[SessionMapping],
) -> SpawnDecision {
    if state.main_pane.is_none() {
        return SpawnDecision::refuse(REASON_SOURCE_PANE_LOST);
    }

    let max = capacity(state.window_width, cfg);
    if max == 0 {
        return SpawnDecision::refuse(REASON_NO_CAPACITY);
    }
    let occupied = state.agent_panes.len();

    if occupied < max as usize {
        return SpawnDecision {
            can_spawn: true,
            reason: format!("capacity available ({occupied}/{max})"),
            actions: vec![PaneAction::Spawn {
                title: title.to_string(),
                session_id: session_id.to_string(),
            }],
        };
    }

    let Some(victim) = eviction_candidate(state, mappings) else {
        return SpawnDecision::refuse(REASON_NO_CAPACITY);
    };

    SpawnDecision {
        can_spawn: true,
        reason: format!(
            "at capacity ({occupied}/{max}), evicting {}",
            victim.session_id
        ),
        actions: vec![PaneAction::Replace {
            pane_id: victim.pane_id.clone(),
            old_session_id: victim.session_id.clone(),
            new_session_id: session_id.to_string(),
            title: title.to_string(),
        }],
    }
}

/// Oldest mapped session whose pane is still observed live.
///
/// Ties on creation time are broken by session id so the choice is stable.
pub fn eviction_candidate<'a>(
    state: &WindowState,
    mappings: &'a [SessionMapping],
) -> Option<&'a SessionMapping> {
    mappings
        .iter()
        .filter(|mapping| state.has_agent_pane(&mapping.pane_id))
        .min_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        })
}

/// Decide how to retire `session_id`.
///
/// Returns `None` when the session is unmapped or its pane is already gone,
/// so no destructive command is ever aimed at a pane that does not exist.
pub fn decide_close_action(
    state: &WindowState,
    session_id: &str,
    mappings: &[SessionMapping],
) -> Option<PaneAction> {
    let mapping = mappings.iter().find(|m| m.session_id == session_id)?;
    if !state.has_agent_pane(&mapping.pane_id) {
        return None;
    }
    Some(PaneAction::Close {
        pane_id: mapping.pane_id.clone(),
        session_id: mapping.session_id.clone(),
    })
}

/// Split mappings into sessions whose pane is observed and sessions whose pane
/// is proven absent.
///
/// Returns empty lists when the main pane is unresolved: an observation
/// without its reference pane is not trusted to prove anything is gone.
pub fn partition_live(
    state: &WindowState,
    mappings: &[SessionMapping],
) -> (Vec<String>, Vec<String>) {
    if state.main_pane.is_none() {
        return (Vec::new(), Vec::new());
    }
    let mut live = Vec::new();
    let mut gone = Vec::new();
    for mapping in mappings {
        if state.has_agent_pane(&mapping.pane_id) {
            live.push(mapping.session_id.clone());
        } else {
            gone.push(mapping.session_id.clone());
        }
    }
    live.sort();
    gone.sort();
    (live, gone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PaneInfo;
    use chrono::{DateTime, TimeZone, Utc};

    const CFG: CapacityConfig = CapacityConfig {
        main_pane_min_width: 120,
        agent_pane_min_width: 40,
    };

    fn pane(id: &str) -> PaneInfo {
        PaneInfo {
            pane_id: id.to_string(),
            width: 40,
            height: 50,
            left: 0,
            top: 0,
            title: String::new(),
            is_active: false,
        }
    }

    fn window(width: u32, agents: &[&str]) -> WindowState {
        WindowState {
            window_width: width,
            window_height: 50,
            main_pane: Some(pane("%0")),
            agent_panes: agents.iter().map(|id| pane(id)).collect(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    fn mapping(session: &str, pane_id: &str, secs: i64) -> SessionMapping {
        SessionMapping {
            session_id: session.to_string(),
            pane_id: pane_id.to_string(),
            created_at: at(secs),
        }
    }

    #[test]
    fn refuses_when_source_pane_lost() {
        let mut state = window(400, &[]);
        state.main_pane = None;

        let decision = decide_spawn_actions(&state, "s1", "agent", &CFG, &[]);
        assert!(!decision.can_spawn);
        assert_eq!(decision.reason, REASON_SOURCE_PANE_LOST);
        assert!(decision.actions.is_empty());
    }

    #[test]
    fn spawns_when_below_capacity() {
        let state = window(200, &["%1"]);
        let decision = decide_spawn_actions(&state, "s2", "agent", &CFG, &[]);
        assert!(decision.can_spawn);
        assert_eq!(
            decision.actions,
            vec![PaneAction::Spawn {
                title: "agent".to_string(),
                session_id: "s2".to_string(),
            }]
        );
    }

    #[test]
    fn narrow_window_refuses_with_no_agents() {
        let state = window(159, &[]);
        let decision = decide_spawn_actions(&state, "s1", "agent", &CFG, &[]);
        assert!(!decision.can_spawn);
        assert_eq!(decision.reason, REASON_NO_CAPACITY);
    }

    #[test]
    fn evicts_oldest_live_session_at_capacity() {
        let state = window(240, &["%1", "%2", "%3"]);
        let mappings = vec![
            mapping("s2", "%2", 2),
            mapping("s3", "%3", 3),
            mapping("s1", "%1", 1),
        ];

        let decision = decide_spawn_actions(&state, "s4", "fourth", &CFG, &mappings);
        assert!(decision.can_spawn);
        assert!(decision.reason.contains("evicting s1"));
        assert_eq!(
            decision.actions,
            vec![PaneAction::Replace {
                pane_id: "%1".to_string(),
                old_session_id: "s1".to_string(),
                new_session_id: "s4".to_string(),
                title: "fourth".to_string(),
            }]
        );
    }

    #[test]
    fn eviction_skips_sessions_whose_pane_is_gone() {
        let state = window(200, &["%2", "%9"]);
        let mappings = vec![mapping("old", "%1", 1), mapping("newer", "%2", 5)];

        let victim = eviction_candidate(&state, &mappings).expect("candidate");
        assert_eq!(victim.session_id, "newer");
    }

    #[test]
    fn eviction_tie_breaks_on_session_id() {
        let state = window(200, &["%1", "%2"]);
        let mappings = vec![mapping("b", "%1", 7), mapping("a", "%2", 7)];

        let victim = eviction_candidate(&state, &mappings).expect("candidate");
        assert_eq!(victim.session_id, "a");
    }

    #[test]
    fn narrow_window_refuses_even_with_evictable_session() {
        let state = window(150, &["%1"]);
        let mappings = vec![mapping("s1", "%1", 1)];

        let decision = decide_spawn_actions(&state, "s2", "agent", &CFG, &mappings);
        assert!(!decision.can_spawn);
        assert_eq!(decision.reason, REASON_NO_CAPACITY);
        assert!(decision.actions.is_empty());
    }

    #[test]
    fn refuses_when_all_panes_are_foreign() {
        let state = window(200, &["%7", "%8"]);
        let decision = decide_spawn_actions(&state, "s1", "agent", &CFG, &[]);
        assert!(!decision.can_spawn);
        assert_eq!(decision.reason, REASON_NO_CAPACITY);
    }

    #[test]
    fn close_targets_mapped_live_pane() {
        let state = window(200, &["%1"]);
        let mappings = vec![mapping("s1", "%1", 1)];
        assert_eq!(
            decide_close_action(&state, "s1", &mappings),
            Some(PaneAction::Close {
                pane_id: "%1".to_string(),
                session_id: "s1".to_string(),
            })
        );
    }

    #[test]
    fn close_is_none_for_vanished_pane_or_unknown_session() {
        let state = window(200, &[]);
        let mappings = vec![mapping("s1", "%1", 1)];
        assert_eq!(decide_close_action(&state, "s1", &mappings), None);
        assert_eq!(decide_close_action(&state, "nope", &mappings), None);
    }

    #[test]
    fn partition_live_requires_main_pane() {
        let mut state = window(200, &["%1"]);
        let mappings = vec![mapping("s1", "%1", 1), mapping("s2", "%2", 2)];

        let (live, gone) = partition_live(&state, &mappings);
        assert_eq!(live, vec!["s1".to_string()]);
        assert_eq!(gone, vec!["s2".to_string()]);

        state.main_pane = None;
        let (live, gone) = partition_live(&state, &mappings);
        assert!(live.is_empty());
        assert!(gone.is_empty());
    }
}
