//! Event-stream driver for `tmux-panes watch`.

use std::io::BufRead;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::events::{LifecycleEvent, parse_event};
use crate::core::suppression::ExcludeRules;
use crate::io::multiplexer::Multiplexer;
use crate::manager::{Admission, PaneManager, Retirement};

/// Counters for one run of [`run_watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Lines that parsed into a lifecycle event.
    pub events: usize,
    pub malformed: usize,
    pub suppressed: usize,
    pub spawned: usize,
    /// Admissions that did not produce a pane (refusals, failures, duplicates).
    pub not_spawned: usize,
    pub retired: usize,
}

/// Feed JSON-lines host events from `reader` to `manager` until EOF.
///
/// Malformed lines and unknown event types are skipped; only a read error on
/// the stream itself ends the loop early.
#[instrument(skip_all)]
pub fn run_watch<M: Multiplexer, R: BufRead>(
    manager: &PaneManager<M>,
    rules: &ExcludeRules,
    reader: R,
) -> Result<WatchSummary> {
    let mut summary = WatchSummary::default();
    for line in reader.lines() {
        let line = line.context("read event stream")?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match parse_event(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, "skipping malformed event");
                summary.malformed += 1;
                continue;
            }
        };
        summary.events += 1;
        dispatch(manager, rules, event, &mut summary);
    }
    Ok(summary)
}

fn dispatch<M: Multiplexer>(
    manager: &PaneManager<M>,
    rules: &ExcludeRules,
    event: LifecycleEvent,
    summary: &mut WatchSummary,
) {
    match event {
        LifecycleEvent::Created(session) => {
            if rules.should_suppress(&session) {
                debug!(session_id = %session.id, "session suppressed");
                summary.suppressed += 1;
                return;
            }
            match manager.on_session_created(&session) {
                Admission::Spawned { .. } => summary.spawned += 1,
                _ => summary.not_spawned += 1,
            }
        }
        LifecycleEvent::Deleted(session_id) | LifecycleEvent::Idle(session_id) => {
            match manager.on_session_deleted(&session_id) {
                Retirement::NotTracked => {}
                _ => summary.retired += 1,
            }
        }
    }
}
