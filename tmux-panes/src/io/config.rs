//! Controller configuration stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::suppression::ExcludeRules;
use crate::core::types::{CapacityConfig, Layout};

/// Pane controller configuration (TOML).
///
/// Every field is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PanesConfig {
    /// Tiling mode applied to the window after each spawn.
    pub layout: Layout,

    /// Main pane share of the window, in percent (main-* layouts only).
    pub main_pane_size: u8,

    /// Columns the main pane must keep.
    pub main_pane_min_width: u32,

    /// Columns each agent pane must get.
    pub agent_pane_min_width: u32,

    /// Glob patterns; sessions whose title matches never get a pane.
    pub exclude: Vec<String>,

    /// Command run inside each agent pane. `{server_url}` and `{session_id}`
    /// are substituted.
    pub pane_command: Vec<String>,

    /// Timeout for each tmux invocation.
    pub command_timeout_secs: u64,

    /// Per-pane bound on the process-exit cleanup path.
    pub emergency_timeout_ms: u64,

    /// Write diagnostics here instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for PanesConfig {
    fn default() -> Self {
        Self {
            layout: Layout::MainVertical,
            main_pane_size: 60,
            main_pane_min_width: 120,
            agent_pane_min_width: 40,
            exclude: Vec::new(),
            pane_command: ["opencode", "attach", "{server_url}", "--session", "{session_id}"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            command_timeout_secs: 5,
            emergency_timeout_ms: 2000,
            log_file: None,
        }
    }
}

impl PanesConfig {
    pub fn validate(&self) -> Result<()> {
        if !(20..=80).contains(&self.main_pane_size) {
            return Err(anyhow!("main_pane_size must be between 20 and 80"));
        }
        if self.main_pane_min_width < 40 {
            return Err(anyhow!("main_pane_min_width must be >= 40"));
        }
        if self.agent_pane_min_width < 20 {
            return Err(anyhow!("agent_pane_min_width must be >= 20"));
        }
        if self.pane_command.is_empty() || self.pane_command[0].trim().is_empty() {
            return Err(anyhow!("pane_command must be a non-empty array"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.emergency_timeout_ms == 0 {
            return Err(anyhow!("emergency_timeout_ms must be > 0"));
        }
        self.exclude_rules()?;
        Ok(())
    }

    pub fn capacity(&self) -> CapacityConfig {
        CapacityConfig {
            main_pane_min_width: self.main_pane_min_width,
            agent_pane_min_width: self.agent_pane_min_width,
        }
    }

    pub fn exclude_rules(&self) -> Result<ExcludeRules> {
        ExcludeRules::new(&self.exclude)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn emergency_timeout(&self) -> Duration {
        Duration::from_millis(self.emergency_timeout_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PanesConfig::default()`.
pub fn load_config(path: &Path) -> Result<PanesConfig> {
    if !path.exists() {
        let cfg = PanesConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<PanesConfig> {
    let cfg: PanesConfig = toml::from_str(contents).context("parse config toml")?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn render_config(cfg: &PanesConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PanesConfig::default());
        assert_eq!(cfg.layout, Layout::MainVertical);
        assert_eq!(cfg.main_pane_size, 60);
        assert_eq!(cfg.main_pane_min_width, 120);
        assert_eq!(cfg.agent_pane_min_width, 40);
        assert!(cfg.exclude.is_empty());
    }

    #[test]
    fn render_then_parse_round_trips() {
        let cfg = PanesConfig {
            layout: Layout::Tiled,
            exclude: vec!["explore-*".to_string()],
            log_file: Some(PathBuf::from("/tmp/panes.log")),
            ..PanesConfig::default()
        };
        let rendered = render_config(&cfg).expect("render");
        assert_eq!(parse_config(&rendered).expect("parse"), cfg);
    }

    #[test]
    fn reads_partial_file_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "layout = \"even-horizontal\"\nmain_pane_min_width = 150\nagent_pane_min_width = 60\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.layout, Layout::EvenHorizontal);
        assert_eq!(cfg.main_pane_min_width, 150);
        assert_eq!(cfg.agent_pane_min_width, 60);
        assert_eq!(cfg.main_pane_size, 60);
    }

    #[test]
    fn accepts_every_layout() {
        for name in [
            "main-vertical",
            "main-horizontal",
            "tiled",
            "even-horizontal",
            "even-vertical",
        ] {
            let cfg = parse_config(&format!("layout = \"{name}\"")).expect("parse");
            assert_eq!(cfg.layout.as_tmux_str(), name);
        }
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse_config("layout = \"spiral\"").is_err());
        assert!(parse_config("main_pane_size = 19").is_err());
        assert!(parse_config("main_pane_size = 81").is_err());
        assert!(parse_config("main_pane_min_width = 39").is_err());
        assert!(parse_config("agent_pane_min_width = 19").is_err());
        assert!(parse_config("pane_command = []").is_err());
        assert!(parse_config("command_timeout_secs = 0").is_err());
        assert!(parse_config("main_pane_size = 50").is_ok());
    }
}
