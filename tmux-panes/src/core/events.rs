//! Normalization of host lifecycle events into typed calls.
//!
//! The host emits loosely shaped JSON events. Only three shapes matter here;
//! everything else is ignored before it reaches the pane manager.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::types::SessionInfo;

/// A lifecycle notification the pane manager acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A child (worker) session started.
    Created(SessionInfo),
    /// A session was deleted.
    Deleted(String),
    /// A session finished its unit of work. Handled like [`LifecycleEvent::Deleted`].
    Idle(String),
}

impl LifecycleEvent {
    pub fn session_id(&self) -> &str {
        match self {
            LifecycleEvent::Created(info) => &info.id,
            LifecycleEvent::Deleted(id) | LifecycleEvent::Idle(id) => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: RawProperties,
}

#[derive(Debug, Default, Deserialize)]
struct RawProperties {
    info: Option<RawInfo>,
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    id: Option<String>,
    #[serde(rename = "parentID")]
    parent_id: Option<String>,
    title: Option<String>,
    metadata: Option<Map<String, Value>>,
}

/// Parse one JSON event line.
///
/// Returns `Ok(None)` for events that are well-formed but irrelevant: unknown
/// types, sessions without a parent id, missing session ids.
pub fn parse_event(line: &str) -> serde_json::Result<Option<LifecycleEvent>> {
    let raw: RawEvent = serde_json::from_str(line)?;
    Ok(normalize(raw))
}

fn normalize(raw: RawEvent) -> Option<LifecycleEvent> {
    let RawProperties { info, session_id } = raw.properties;
    match raw.kind.as_str() {
        "session.created" => {
            let info = info?;
            let id = non_empty(info.id)?;
            let parent_id = non_empty(info.parent_id)?;
            Some(LifecycleEvent::Created(SessionInfo {
                id,
                parent_id: Some(parent_id),
                title: info.title,
                metadata: info.metadata,
            }))
        }
        "session.deleted" => {
            let id = info.and_then(|info| non_empty(info.id)).or(non_empty(session_id))?;
            Some(LifecycleEvent::Deleted(id))
        }
        "session.idle" => {
            let id = non_empty(session_id).or_else(|| info.and_then(|info| non_empty(info.id)))?;
            Some(LifecycleEvent::Idle(id))
        }
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
