//! tmux adapter.
//!
//! Thin, explicit wrapper around `tmux` subprocess calls. Every call runs
//! through [`run_command_with_timeout`] so a wedged server can never hang the
//! controller.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};

use crate::core::types::{Layout, PaneInfo, WindowState};
use crate::io::multiplexer::{KillOutcome, Multiplexer, SplitDirection, SplitRequest};
use crate::io::process::{CommandOutput, run_command_with_timeout};

const OUTPUT_LIMIT_BYTES: usize = 256 * 1024;

/// `list-panes` format. Title goes last since it may contain tabs.
const PANE_FORMAT: &str = "#{pane_id}\t#{pane_width}\t#{pane_height}\t#{pane_left}\t#{pane_top}\t#{pane_active}\t#{window_width}\t#{window_height}\t#{pane_title}";
const PANE_FIELDS: usize = 9;

static TMUX_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// True if this process runs inside a tmux client.
pub fn is_inside_tmux() -> bool {
    env::var_os("TMUX").is_some_and(|value| !value.is_empty())
}

/// Pane the current process occupies, from `TMUX_PANE`.
pub fn current_pane_id() -> Option<String> {
    env::var("TMUX_PANE").ok().filter(|value| !value.is_empty())
}

/// Resolve the tmux executable once per process.
///
/// The exit-signal path relies on this being resolved up front, since looking
/// up `PATH` while the process is being torn down is not something to depend on.
pub fn cached_tmux_path() -> Option<&'static Path> {
    TMUX_PATH
        .get_or_init(|| match which::which("tmux") {
            Ok(path) => {
                debug!(path = %path.display(), "resolved tmux executable");
                Some(path)
            }
            Err(err) => {
                warn!(err = %err, "tmux executable not found");
                None
            }
        })
        .as_deref()
}

/// Wrapper for executing tmux commands against the current server.
#[derive(Debug, Clone)]
pub struct Tmux {
    program: PathBuf,
    timeout: Duration,
}

impl Tmux {
    /// Use the cached `tmux` from `PATH`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let program = cached_tmux_path().ok_or_else(|| anyhow!("tmux executable not found"))?;
        Ok(Self::with_program(program, timeout))
    }

    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run_with_timeout<S: AsRef<str>>(&self, args: &[S], timeout: Duration) -> Result<CommandOutput> {
        let args: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
        let name = args.first().copied().unwrap_or("");
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        run_command_with_timeout(cmd, timeout, OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run tmux {name}"))
    }

    fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        self.run_with_timeout(args, self.timeout)
    }

    fn run_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let output = self.run(args)?;
        let name: &str = args.first().map(|arg| arg.as_ref()).unwrap_or("");
        if output.timed_out {
            bail!("tmux {name} timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            return Err(anyhow!(
                "tmux {name} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy()
            ));
        }
        Ok(output.stdout_lossy())
    }
}

impl Multiplexer for Tmux {
    #[instrument(skip_all, fields(source_pane_id = %source_pane_id))]
    fn query_window_state(&self, source_pane_id: &str) -> Result<WindowState> {
        let out = self.run_checked(&["list-panes", "-t", source_pane_id, "-F", PANE_FORMAT])?;
        let state = parse_window_state(&out, source_pane_id)?;
        debug!(
            window_width = state.window_width,
            agent_panes = state.agent_panes.len(),
            main_resolved = state.main_pane.is_some(),
            "queried window state"
        );
        Ok(state)
    }

    #[instrument(skip_all, fields(target = %request.target_pane_id))]
    fn split_pane(&self, request: &SplitRequest) -> Result<String> {
        let direction = match request.direction {
            SplitDirection::Horizontal => "-h",
            SplitDirection::Vertical => "-v",
        };
        let mut args: Vec<String> = vec![
            "split-window".to_string(),
            "-d".to_string(),
            direction.to_string(),
            "-t".to_string(),
            request.target_pane_id.clone(),
            "-P".to_string(),
            "-F".to_string(),
            "#{pane_id}".to_string(),
        ];
        for (key, value) in &request.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.extend(request.command.iter().cloned());

        let out = self.run_checked(&args)?;
        let pane_id = out.trim();
        if !pane_id.starts_with('%') {
            bail!("tmux split-window printed unexpected pane id {pane_id:?}");
        }
        debug!(pane_id, "split pane");
        Ok(pane_id.to_string())
    }

    fn apply_layout(&self, target_pane_id: &str, layout: Layout, main_pane_size: u8) -> Result<()> {
        if let Some(option) = layout.main_pane_option() {
            let size = format!("{main_pane_size}%");
            self.run_checked(&["set-window-option", "-t", target_pane_id, option, size.as_str()])?;
        }
        self.run_checked(&["select-layout", "-t", target_pane_id, layout.as_tmux_str()])?;
        Ok(())
    }

    fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<()> {
        self.run_checked(&["select-pane", "-t", pane_id, "-T", title])?;
        Ok(())
    }

    #[instrument(skip_all, fields(pane_id = %pane_id))]
    fn kill_pane(&self, pane_id: &str) -> Result<KillOutcome> {
        let output = self.run(&["kill-pane", "-t", pane_id])?;
        if output.success() {
            return Ok(KillOutcome::Killed);
        }
        let stderr = output.stderr_lossy();
        if !output.timed_out && is_missing_pane_error(&stderr) {
            debug!(pane_id, "pane already gone");
            return Ok(KillOutcome::AlreadyGone);
        }
        Err(anyhow!("tmux kill-pane {pane_id} failed: {stderr}"))
    }

    fn kill_pane_blocking(&self, pane_id: &str, timeout: Duration) -> Result<()> {
        let output = self.run_with_timeout(&["kill-pane", "-t", pane_id], timeout)?;
        if output.success() || is_missing_pane_error(&output.stderr_lossy()) {
            return Ok(());
        }
        if output.timed_out {
            bail!("tmux kill-pane {pane_id} timed out after {timeout:?}");
        }
        Err(anyhow!(
            "tmux kill-pane {pane_id} failed: {}",
            output.stderr_lossy()
        ))
    }
}

fn is_missing_pane_error(stderr: &str) -> bool {
    stderr.contains("can't find pane") || stderr.contains("no such pane")
}

/// Parse `list-panes` output produced with [`PANE_FORMAT`].
pub fn parse_window_state(output: &str, source_pane_id: &str) -> Result<WindowState> {
    let mut window = None;
    let mut main_pane = None;
    let mut agent_panes = Vec::new();

    for (idx, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (pane, width, height) =
            parse_pane_line(line).with_context(|| format!("parse list-panes line {}", idx + 1))?;
        window.get_or_insert((width, height));
        if pane.pane_id == source_pane_id {
            main_pane = Some(pane);
        } else {
            agent_panes.push(pane);
        }
    }

    let (window_width, window_height) =
        window.ok_or_else(|| anyhow!("tmux list-panes returned no panes"))?;
    Ok(WindowState {
        window_width,
        window_height,
        main_pane,
        agent_panes,
    })
}

fn parse_pane_line(line: &str) -> Result<(PaneInfo, u32, u32)> {
    let fields: Vec<&str> = line.splitn(PANE_FIELDS, '\t').collect();
    if fields.len() != PANE_FIELDS {
        bail!("expected {PANE_FIELDS} fields, got {}", fields.len());
    }
    let number = |idx: usize, name: &str| -> Result<u32> {
        fields[idx]
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid {name} {:?}", fields[idx]))
    };
    let pane = PaneInfo {
        pane_id: fields[0].to_string(),
        width: number(1, "pane_width")?,
        height: number(2, "pane_height")?,
        left: number(3, "pane_left")?,
        top: number(4, "pane_top")?,
        is_active: fields[5].trim() == "1",
        title: fields[8].to_string(),
    };
    Ok((pane, number(6, "window_width")?, number(7, "window_height")?))
}
