//! Capacity model: how many agent panes fit beside the main pane.

use crate::core::types::CapacityConfig;

/// Maximum number of agent panes that fit next to the main pane at its
/// minimum width.
///
/// Rounds down: a pane that would only partially fit is never counted, for
/// every tiling mode.
pub fn capacity(window_width: u32, cfg: &CapacityConfig) -> u32 {
    if cfg.agent_pane_min_width == 0 {
        return 0;
    }
    let usable = window_width.saturating_sub(cfg.main_pane_min_width);
    if usable < cfg.agent_pane_min_width {
        return 0;
    }
    usable / cfg.agent_pane_min_width
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: CapacityConfig = CapacityConfig {
        main_pane_min_width: 120,
        agent_pane_min_width: 40,
    };

    #[test]
    fn zero_below_combined_floor() {
        assert_eq!(capacity(159, &CFG), 0);
        assert_eq!(capacity(100, &CFG), 0);
        assert_eq!(capacity(0, &CFG), 0);
    }

    #[test]
    fn one_at_combined_floor() {
        assert_eq!(capacity(160, &CFG), 1);
    }

    #[test]
    fn floors_partial_panes() {
        assert_eq!(capacity(200, &CFG), 2);
        assert_eq!(capacity(239, &CFG), 2);
        assert_eq!(capacity(240, &CFG), 3);
    }

    #[test]
    fn zero_agent_width_never_divides() {
        let cfg = CapacityConfig {
            main_pane_min_width: 10,
            agent_pane_min_width: 0,
        };
        assert_eq!(capacity(500, &cfg), 0);
    }
}
