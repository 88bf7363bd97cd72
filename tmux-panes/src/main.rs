//! Tmux pane-layout controller.
//!
//! Reads host lifecycle events as JSON lines on stdin and keeps one agent pane
//! per worker session beside the main pane.

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tmux_panes::core::capacity::capacity;
use tmux_panes::exit_codes;
use tmux_panes::io::config::{PanesConfig, load_config, render_config};
use tmux_panes::io::multiplexer::Multiplexer;
use tmux_panes::io::tmux::{Tmux, current_pane_id, is_inside_tmux};
use tmux_panes::logging;
use tmux_panes::manager::{ManagerOptions, PaneManager};
use tmux_panes::watch::run_watch;
use tracing::{info, warn};

const DEFAULT_PORT: &str = "4096";

#[derive(Parser)]
#[command(
    name = "tmux-panes",
    version,
    about = "Give each agent session its own tmux pane"
)]
struct Cli {
    /// Path to the TOML config file. Defaults apply if it does not exist.
    #[arg(long, global = true, default_value = "tmux-panes.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume lifecycle events from stdin until EOF, managing agent panes.
    Watch {
        /// Endpoint exported into agent panes.
        /// Defaults to http://localhost:$OPENCODE_PORT (4096).
        #[arg(long)]
        server_url: Option<String>,
    },
    /// Close agent panes left behind by a previous instance.
    Sweep,
    /// Print the observed window state as JSON.
    State,
    /// Print how many agent panes fit.
    Capacity {
        /// Window width in columns; the current window is observed if omitted.
        #[arg(long)]
        width: Option<u32>,
    },
    /// Print the effective configuration.
    Config,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    logging::init(cfg.log_file.as_deref())?;

    match cli.command {
        Command::Watch { server_url } => cmd_watch(cfg, server_url),
        Command::Sweep => cmd_sweep(cfg),
        Command::State => cmd_state(&cfg),
        Command::Capacity { width } => cmd_capacity(&cfg, width),
        Command::Config => {
            print!("{}", render_config(&cfg)?);
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_watch(cfg: PanesConfig, server_url: Option<String>) -> Result<i32> {
    let rules = cfg.exclude_rules()?;
    let server_url = server_url.unwrap_or_else(default_server_url);
    let timeout = cfg.command_timeout();
    let (mux, inside) = match Tmux::new(timeout) {
        Ok(mux) => (mux, is_inside_tmux()),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "running without tmux");
            (Tmux::with_program("tmux", timeout), false)
        }
    };
    let manager = Arc::new(PaneManager::new(
        mux,
        ManagerOptions {
            config: cfg,
            server_url,
            source_pane_id: current_pane_id(),
            inside_multiplexer: inside,
        },
    ));
    if !manager.is_enabled() {
        info!("not inside tmux, events will be drained without acting");
    }

    let swept = manager.cleanup_orphaned_panes();
    if swept > 0 {
        info!(swept, "closed orphaned panes");
    }

    #[cfg(unix)]
    let _signals = tmux_panes::signals::SignalGuard::install(Arc::clone(&manager))
        .context("install signal handlers")?;

    let summary = run_watch(manager.as_ref(), &rules, io::stdin().lock())?;
    info!(?summary, "event stream closed");
    manager.cleanup();
    Ok(exit_codes::OK)
}

fn cmd_sweep(cfg: PanesConfig) -> Result<i32> {
    let Some((mux, source)) = attach(&cfg)? else {
        return Ok(exit_codes::NOT_IN_TMUX);
    };
    let manager = PaneManager::new(
        mux,
        ManagerOptions {
            config: cfg,
            server_url: default_server_url(),
            source_pane_id: Some(source),
            inside_multiplexer: true,
        },
    );
    println!("{}", manager.cleanup_orphaned_panes());
    Ok(exit_codes::OK)
}

fn cmd_state(cfg: &PanesConfig) -> Result<i32> {
    let Some((mux, source)) = attach(cfg)? else {
        return Ok(exit_codes::NOT_IN_TMUX);
    };
    let state = mux.query_window_state(&source)?;
    let payload = serde_json::to_string_pretty(&state).context("serialize window state")?;
    println!("{payload}");
    Ok(exit_codes::OK)
}

fn cmd_capacity(cfg: &PanesConfig, width: Option<u32>) -> Result<i32> {
    let width = match width {
        Some(width) => width,
        None => {
            let Some((mux, source)) = attach(cfg)? else {
                return Ok(exit_codes::NOT_IN_TMUX);
            };
            mux.query_window_state(&source)?.window_width
        }
    };
    println!("{}", capacity(width, &cfg.capacity()));
    Ok(exit_codes::OK)
}

/// Resolve tmux and the current pane, or `None` outside tmux.
fn attach(cfg: &PanesConfig) -> Result<Option<(Tmux, String)>> {
    let source = match current_pane_id() {
        Some(pane_id) if is_inside_tmux() => pane_id,
        _ => {
            eprintln!("not inside tmux");
            return Ok(None);
        }
    };
    Ok(Some((Tmux::new(cfg.command_timeout())?, source)))
}

fn default_server_url() -> String {
    let port = env::var("OPENCODE_PORT")
        .ok()
        .filter(|port| !port.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    format!("http://localhost:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_watch_with_server_url() {
        let cli = Cli::parse_from(["tmux-panes", "watch", "--server-url", "http://h:1"]);
        assert!(matches!(
            cli.command,
            Command::Watch { server_url: Some(ref url) } if url == "http://h:1"
        ));
        assert_eq!(cli.config, PathBuf::from("tmux-panes.toml"));
    }

    #[test]
    fn parse_global_config_after_subcommand() {
        let cli = Cli::parse_from(["tmux-panes", "sweep", "--config", "/tmp/p.toml"]);
        assert!(matches!(cli.command, Command::Sweep));
        assert_eq!(cli.config, PathBuf::from("/tmp/p.toml"));
    }

    #[test]
    fn parse_capacity_width() {
        let cli = Cli::parse_from(["tmux-panes", "capacity", "--width", "200"]);
        assert!(matches!(cli.command, Command::Capacity { width: Some(200) }));
    }
}
