//! Pane manager: admission, retirement and cleanup of agent panes.
//!
//! Every flow re-observes the window before deciding anything. The session
//! cache only records confirmed outcomes and is never a planning input beyond
//! ownership and creation time.
//!
//! Locking: `cache` guards tracked and pending sessions together and is only
//! ever held for short, non-blocking sections. `layout` serializes whole
//! query-decide-execute cycles. The emergency path never takes `layout`.

use std::collections::{HashMap, HashSet};
use std::thread;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::core::decision::{decide_close_action, decide_spawn_actions, partition_live};
use crate::core::orphans::orphaned_panes;
use crate::core::types::{PaneAction, SessionInfo, SessionMapping, TrackedSession, WindowState};
use crate::io::config::PanesConfig;
use crate::io::executor::{ExecuteContext, execute_action, execute_actions};
use crate::io::multiplexer::{KillOutcome, Multiplexer};

/// Title used for sessions that arrive without one.
pub const DEFAULT_SESSION_TITLE: &str = "Subagent";

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Everything the manager needs besides the multiplexer.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub config: PanesConfig,
    /// Endpoint of the owning process, exported into agent panes.
    pub server_url: String,
    /// Pane hosting the controlling process.
    pub source_pane_id: Option<String>,
    pub inside_multiplexer: bool,
}

/// Result of [`PaneManager::on_session_created`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not running inside tmux, or the reference pane is unknown.
    Disabled,
    /// The session has no parent and is not a worker.
    NotChild,
    /// The session is already tracked or being admitted.
    AlreadyTracked,
    /// The window could not be observed; nothing changed.
    QueryFailed(String),
    /// The decision engine declined; carries its reason.
    Refused(String),
    Spawned {
        pane_id: String,
        /// Sessions whose pane was closed to make room.
        evicted: Vec<String>,
    },
    Failed {
        error: String,
        evicted: Vec<String>,
    },
}

/// Result of [`PaneManager::on_session_deleted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retirement {
    NotTracked,
    Closed { pane_id: String },
    /// The pane had already disappeared; only the cache entry was dropped.
    AlreadyGone,
    /// The window could not be observed; the cache entry was dropped anyway.
    QueryFailed(String),
    /// The close command failed; the cache entry was dropped anyway.
    CloseFailed(String),
}

#[derive(Debug, Default)]
struct SessionCache {
    tracked: HashMap<String, TrackedSession>,
    pending: HashSet<String>,
}

/// Clears a session's pending mark on every exit path.
struct PendingGuard<'a> {
    cache: &'a Mutex<SessionCache>,
    session_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.cache.lock().pending.remove(&self.session_id);
    }
}

pub struct PaneManager<M: Multiplexer> {
    mux: M,
    config: PanesConfig,
    server_url: String,
    source_pane_id: Option<String>,
    inside_multiplexer: bool,
    cache: Mutex<SessionCache>,
    layout: Mutex<()>,
    clock: Clock,
}

impl<M: Multiplexer> PaneManager<M> {
    pub fn new(mux: M, options: ManagerOptions) -> Self {
        Self {
            mux,
            config: options.config,
            server_url: options.server_url,
            source_pane_id: options.source_pane_id,
            inside_multiplexer: options.inside_multiplexer,
            cache: Mutex::new(SessionCache::default()),
            layout: Mutex::new(()),
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock used for creation and last-seen timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.inside_multiplexer && self.source_pane_id.is_some()
    }

    pub fn multiplexer(&self) -> &M {
        &self.mux
    }

    pub fn config(&self) -> &PanesConfig {
        &self.config
    }

    /// Tracked sessions, oldest first.
    pub fn tracked_sessions(&self) -> Vec<TrackedSession> {
        let mut sessions: Vec<TrackedSession> =
            self.cache.lock().tracked.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    pub fn is_tracked(&self, session_id: &str) -> bool {
        self.cache.lock().tracked.contains_key(session_id)
    }

    pub fn is_pending(&self, session_id: &str) -> bool {
        self.cache.lock().pending.contains(session_id)
    }

    /// Admit a newly created worker session into the window.
    #[instrument(skip_all, fields(session_id = %session.id))]
    pub fn on_session_created(&self, session: &SessionInfo) -> Admission {
        if !self.is_enabled() {
            return Admission::Disabled;
        }
        if session.parent_id.as_deref().is_none_or(str::is_empty) {
            return Admission::NotChild;
        }
        let Some(_pending) = self.mark_pending(&session.id) else {
            debug!("session already tracked or pending");
            return Admission::AlreadyTracked;
        };

        let _layout = self.layout.lock();
        let state = match self.query() {
            Ok(state) => state,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "window query failed, skipping admission");
                return Admission::QueryFailed(format!("{err:#}"));
            }
        };
        self.reconcile(&state);

        let title = session
            .title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE);
        let decision = decide_spawn_actions(
            &state,
            &session.id,
            title,
            &self.config.capacity(),
            &self.mappings(),
        );
        if !decision.can_spawn {
            info!(reason = %decision.reason, "admission refused");
            return Admission::Refused(decision.reason);
        }
        debug!(reason = %decision.reason, "admission decided");

        let ctx = ExecuteContext {
            config: &self.config,
            server_url: &self.server_url,
            window_state: &state,
        };
        let result = execute_actions(&self.mux, &decision.actions, &ctx);
        let evicted: Vec<String> = result
            .retired_sessions()
            .into_iter()
            .map(str::to_string)
            .collect();

        let now = (self.clock)();
        let mut cache = self.cache.lock();
        for session_id in &evicted {
            cache.tracked.remove(session_id);
        }
        match result.spawned_pane_id {
            Some(pane_id) => {
                cache.tracked.insert(
                    session.id.clone(),
                    TrackedSession {
                        session_id: session.id.clone(),
                        pane_id: pane_id.clone(),
                        description: title.to_string(),
                        created_at: now,
                        last_seen_at: now,
                    },
                );
                info!(%pane_id, evicted = evicted.len(), "session admitted");
                Admission::Spawned { pane_id, evicted }
            }
            None => {
                let error = result
                    .results
                    .iter()
                    .find_map(|outcome| outcome.result.error.clone())
                    .unwrap_or_else(|| "no pane spawned".to_string());
                warn!(%error, "admission failed");
                Admission::Failed { error, evicted }
            }
        }
    }

    /// Retire a deleted or idle session.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub fn on_session_deleted(&self, session_id: &str) -> Retirement {
        if !self.is_tracked(session_id) {
            return Retirement::NotTracked;
        }

        let _layout = self.layout.lock();
        let state = match self.query() {
            Ok(state) => state,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "window query failed, dropping session");
                self.untrack(session_id);
                return Retirement::QueryFailed(format!("{err:#}"));
            }
        };

        let Some(action) = decide_close_action(&state, session_id, &self.mappings()) else {
            debug!("pane already gone");
            self.untrack(session_id);
            return Retirement::AlreadyGone;
        };
        let ctx = ExecuteContext {
            config: &self.config,
            server_url: &self.server_url,
            window_state: &state,
        };
        let result = execute_action(&self.mux, &action, &ctx);
        self.untrack(session_id);

        match (result.success, action) {
            (true, PaneAction::Close { pane_id, .. }) => {
                info!(%pane_id, "session pane closed");
                Retirement::Closed { pane_id }
            }
            _ => Retirement::CloseFailed(
                result
                    .error
                    .unwrap_or_else(|| "close did not take effect".to_string()),
            ),
        }
    }

    /// Close every tracked pane concurrently, then clear the cache.
    ///
    /// Returns the number of panes confirmed closed.
    #[instrument(skip_all)]
    pub fn cleanup(&self) -> usize {
        let _layout = self.layout.lock();
        let sessions = self.tracked_sessions();
        let closed = thread::scope(|scope| {
            let handles: Vec<_> = sessions
                .iter()
                .map(|session| scope.spawn(move || self.close_tracked(session)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .filter(|closed| *closed)
                .count()
        });
        self.cache.lock().tracked.clear();
        info!(closed, total = sessions.len(), "cleanup finished");
        closed
    }

    /// Best-effort cleanup for process-exit paths.
    ///
    /// Bounded per pane by `emergency_timeout_ms`; never blocks on an
    /// in-flight admission and never verifies.
    pub fn cleanup_sync(&self) -> usize {
        let timeout = self.config.emergency_timeout();
        let Some(mut cache) = self.cache.try_lock_for(timeout) else {
            warn!("session cache busy, skipping emergency cleanup");
            return 0;
        };
        let sessions: Vec<TrackedSession> = cache.tracked.drain().map(|(_, s)| s).collect();
        drop(cache);

        let mut closed = 0;
        for session in &sessions {
            match self.mux.kill_pane_blocking(&session.pane_id, timeout) {
                Ok(()) => closed += 1,
                Err(err) => warn!(
                    session_id = %session.session_id,
                    pane_id = %session.pane_id,
                    err = %format!("{err:#}"),
                    "emergency close failed"
                ),
            }
        }
        closed
    }

    /// Close agent panes left behind by a previous instance.
    ///
    /// Returns the number of panes closed.
    #[instrument(skip_all)]
    pub fn cleanup_orphaned_panes(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let _layout = self.layout.lock();
        let state = match self.query() {
            Ok(state) => state,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "window query failed, skipping orphan sweep");
                return 0;
            }
        };
        let tracked: HashSet<String> = self
            .cache
            .lock()
            .tracked
            .values()
            .map(|session| session.pane_id.clone())
            .collect();

        let mut closed = 0;
        for pane in orphaned_panes(&state, &tracked) {
            match self.mux.kill_pane(&pane.pane_id) {
                Ok(_) => {
                    info!(pane_id = %pane.pane_id, title = %pane.title, "closed orphaned pane");
                    closed += 1;
                }
                Err(err) => warn!(
                    pane_id = %pane.pane_id,
                    err = %format!("{err:#}"),
                    "close orphaned pane failed"
                ),
            }
        }
        closed
    }

    /// Observe the window around the reference pane.
    pub fn query(&self) -> Result<WindowState> {
        let source = self
            .source_pane_id
            .as_deref()
            .ok_or_else(|| anyhow!("reference pane unknown"))?;
        self.mux.query_window_state(source)
    }

    /// Bring the cache in line with an observation.
    fn reconcile(&self, state: &WindowState) {
        let (live, gone) = partition_live(state, &self.mappings());
        if live.is_empty() && gone.is_empty() {
            return;
        }
        let now = (self.clock)();
        let mut cache = self.cache.lock();
        for session_id in &live {
            if let Some(session) = cache.tracked.get_mut(session_id) {
                session.last_seen_at = now;
            }
        }
        for session_id in &gone {
            if let Some(session) = cache.tracked.remove(session_id) {
                info!(%session_id, pane_id = %session.pane_id, "pane vanished, untracking");
            }
        }
    }

    fn mark_pending(&self, session_id: &str) -> Option<PendingGuard<'_>> {
        let mut cache = self.cache.lock();
        if cache.tracked.contains_key(session_id) || !cache.pending.insert(session_id.to_string())
        {
            return None;
        }
        Some(PendingGuard {
            cache: &self.cache,
            session_id: session_id.to_string(),
        })
    }

    fn mappings(&self) -> Vec<SessionMapping> {
        self.cache
            .lock()
            .tracked
            .values()
            .map(TrackedSession::mapping)
            .collect()
    }

    fn untrack(&self, session_id: &str) {
        self.cache.lock().tracked.remove(session_id);
    }

    fn close_tracked(&self, session: &TrackedSession) -> bool {
        match self.mux.kill_pane(&session.pane_id) {
            Ok(KillOutcome::Killed) => true,
            Ok(KillOutcome::AlreadyGone) => {
                debug!(pane_id = %session.pane_id, "pane already gone");
                true
            }
            Err(err) => {
                warn!(
                    session_id = %session.session_id,
                    pane_id = %session.pane_id,
                    err = %format!("{err:#}"),
                    "close failed during cleanup"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeMux, MAIN_PANE, MuxCall, ticking_clock};

    fn manager(width: u32) -> PaneManager<FakeMux> {
        let options = ManagerOptions {
            config: PanesConfig::default(),
            server_url: "http://localhost:4096".to_string(),
            source_pane_id: Some(MAIN_PANE.to_string()),
            inside_multiplexer: true,
        };
        PaneManager::new(FakeMux::new(width, 50), options).with_clock(ticking_clock(1))
    }

    fn child(id: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            parent_id: Some("root".to_string()),
            title: Some(format!("{id} task")),
            metadata: None,
        }
    }

    fn spawned_pane(admission: Admission) -> String {
        match admission {
            Admission::Spawned { pane_id, .. } => pane_id,
            other => panic!("expected spawn, got {other:?}"),
        }
    }

    #[test]
    fn disabled_outside_multiplexer() {
        let options = ManagerOptions {
            config: PanesConfig::default(),
            server_url: String::new(),
            source_pane_id: Some(MAIN_PANE.to_string()),
            inside_multiplexer: false,
        };
        let manager = PaneManager::new(FakeMux::new(200, 50), options);
        assert_eq!(manager.on_session_created(&child("s1")), Admission::Disabled);
        assert!(manager.multiplexer().calls().is_empty());
        assert_eq!(manager.cleanup_orphaned_panes(), 0);
    }

    #[test]
    fn root_sessions_are_not_admitted() {
        let manager = manager(200);
        let root = SessionInfo {
            parent_id: None,
            ..child("root")
        };
        assert_eq!(manager.on_session_created(&root), Admission::NotChild);
        assert!(manager.multiplexer().calls().is_empty());
    }

    #[test]
    fn missing_title_uses_default() {
        let manager = manager(200);
        let untitled = SessionInfo {
            title: None,
            ..child("s1")
        };
        spawned_pane(manager.on_session_created(&untitled));
        assert_eq!(manager.tracked_sessions()[0].description, DEFAULT_SESSION_TITLE);
    }

    #[test]
    fn second_admission_of_same_session_is_ignored() {
        let manager = manager(200);
        spawned_pane(manager.on_session_created(&child("s1")));
        assert_eq!(
            manager.on_session_created(&child("s1")),
            Admission::AlreadyTracked
        );
        assert_eq!(manager.multiplexer().split_count(), 1);
        assert!(!manager.is_pending("s1"));
    }

    #[test]
    fn query_failure_leaves_cache_untouched() {
        let manager = manager(200);
        manager.multiplexer().set_fail_query(true);

        let admission = manager.on_session_created(&child("s1"));
        assert!(matches!(admission, Admission::QueryFailed(_)));
        assert!(manager.tracked_sessions().is_empty());
        assert!(!manager.is_pending("s1"));
    }

    #[test]
    fn failed_spawn_is_not_tracked_and_releases_pending() {
        let manager = manager(200);
        manager.multiplexer().set_fail_split(true);

        let admission = manager.on_session_created(&child("s1"));
        assert!(matches!(admission, Admission::Failed { .. }));
        assert!(!manager.is_tracked("s1"));
        assert!(!manager.is_pending("s1"));
    }

    #[test]
    fn replace_with_failed_spawn_drops_old_session_only() {
        let manager = manager(160);
        spawned_pane(manager.on_session_created(&child("s1")));
        manager.multiplexer().set_fail_split(true);

        let admission = manager.on_session_created(&child("s2"));
        match admission {
            Admission::Failed { evicted, error } => {
                assert_eq!(evicted, vec!["s1".to_string()]);
                assert!(error.contains("old pane closed"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(manager.tracked_sessions().is_empty());
    }

    #[test]
    fn delete_of_query_failure_still_untracks() {
        let manager = manager(200);
        spawned_pane(manager.on_session_created(&child("s1")));
        manager.multiplexer().set_fail_query(true);

        let retirement = manager.on_session_deleted("s1");
        assert!(matches!(retirement, Retirement::QueryFailed(_)));
        assert!(!manager.is_tracked("s1"));
    }

    #[test]
    fn delete_with_failed_close_still_untracks() {
        let manager = manager(200);
        let pane_id = spawned_pane(manager.on_session_created(&child("s1")));
        manager.multiplexer().fail_kill(&pane_id);

        let retirement = manager.on_session_deleted("s1");
        assert!(matches!(retirement, Retirement::CloseFailed(_)));
        assert!(!manager.is_tracked("s1"));
    }

    #[test]
    fn delete_closes_tracked_pane() {
        let manager = manager(200);
        let pane_id = spawned_pane(manager.on_session_created(&child("s1")));

        assert_eq!(
            manager.on_session_deleted("s1"),
            Retirement::Closed {
                pane_id: pane_id.clone()
            }
        );
        assert!(manager.multiplexer().pane(&pane_id).is_none());
        assert!(manager.tracked_sessions().is_empty());
    }

    #[test]
    fn admission_prunes_sessions_whose_pane_vanished() {
        let manager = manager(240);
        let first = spawned_pane(manager.on_session_created(&child("s1")));
        spawned_pane(manager.on_session_created(&child("s2")));
        manager.multiplexer().remove_pane(&first);

        spawned_pane(manager.on_session_created(&child("s3")));
        let ids: Vec<String> = manager
            .tracked_sessions()
            .into_iter()
            .map(|session| session.session_id)
            .collect();
        assert_eq!(ids, vec!["s2".to_string(), "s3".to_string()]);
    }

    #[test]
    fn cleanup_closes_everything_and_clears_cache() {
        let manager = manager(240);
        let a = spawned_pane(manager.on_session_created(&child("s1")));
        let b = spawned_pane(manager.on_session_created(&child("s2")));
        manager.multiplexer().fail_kill(&a);

        assert_eq!(manager.cleanup(), 1);
        assert!(manager.tracked_sessions().is_empty());
        let kills = manager.multiplexer().kill_calls();
        assert!(kills.contains(&a));
        assert!(kills.contains(&b));
    }

    #[test]
    fn emergency_cleanup_uses_blocking_kill() {
        let manager = manager(200);
        let pane_id = spawned_pane(manager.on_session_created(&child("s1")));

        assert_eq!(manager.cleanup_sync(), 1);
        assert!(manager.tracked_sessions().is_empty());
        assert!(
            manager
                .multiplexer()
                .calls()
                .contains(&MuxCall::KillBlocking(pane_id))
        );
    }

    #[test]
    fn emergency_cleanup_skips_when_cache_is_held() {
        let mut options = ManagerOptions {
            config: PanesConfig::default(),
            server_url: String::new(),
            source_pane_id: Some(MAIN_PANE.to_string()),
            inside_multiplexer: true,
        };
        options.config.emergency_timeout_ms = 10;
        let manager = PaneManager::new(FakeMux::new(200, 50), options);
        spawned_pane(manager.on_session_created(&child("s1")));

        let held = manager.cache.lock();
        assert_eq!(manager.cleanup_sync(), 0);
        drop(held);
        assert!(manager.is_tracked("s1"));
    }
}
