//! Agent pane titles and orphan detection.

use std::collections::HashSet;

use crate::core::types::{PaneInfo, WindowState};

/// Prefix stamped on every pane title this controller creates.
pub const AGENT_TITLE_PREFIX: &str = "tmux-panes-agent-";

/// Title given to the pane hosting a session.
pub fn agent_pane_title(session_title: &str) -> String {
    format!("{AGENT_TITLE_PREFIX}{session_title}")
}

pub fn is_agent_title(title: &str) -> bool {
    title.starts_with(AGENT_TITLE_PREFIX)
}

/// Agent panes carrying our title prefix that no tracked session owns.
pub fn orphaned_panes<'a>(
    state: &'a WindowState,
    tracked_pane_ids: &HashSet<String>,
) -> Vec<&'a PaneInfo> {
    state
        .agent_panes
        .iter()
        .filter(|pane| is_agent_title(&pane.title) && !tracked_pane_ids.contains(&pane.pane_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pane(id: &str, title: &str) -> PaneInfo {
        PaneInfo {
            pane_id: id.to_string(),
            width: 40,
            height: 20,
            left: 120,
            top: 0,
            title: title.to_string(),
            is_active: false,
        }
    }

    #[test]
    fn only_prefixed_untracked_panes_are_orphans() {
        let state = WindowState {
            window_width: 200,
            window_height: 50,
            main_pane: Some(pane("%0", &agent_pane_title("looks-like-agent"))),
            agent_panes: vec![
                pane("%1", &agent_pane_title("explore")),
                pane("%2", "vim"),
                pane("%3", &agent_pane_title("tracked")),
            ],
        };
        let tracked: HashSet<String> = ["%3".to_string()].into_iter().collect();

        let orphans: Vec<&str> = orphaned_panes(&state, &tracked)
            .into_iter()
            .map(|pane| pane.pane_id.as_str())
            .collect();
        assert_eq!(orphans, vec!["%1"]);
    }
}
