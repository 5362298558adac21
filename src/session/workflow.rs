//! Session workflow tracking for discovery-before-query gating.
//!
//! Records which discovery and query tools each session has called and how
//! many times the session has been warned for querying without discovery.
//! A successful discovery call clears the warning counter. The rule
//! enforcement layer drives the recording and reads the state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::{default_discovery_tools, default_query_tools};

/// Tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkflowTrackerConfig {
    /// Tools whose invocation marks a session as "has discovered".
    pub discovery_tools: HashSet<String>,
    /// Tools gated by discovery.
    pub query_tools: HashSet<String>,
    /// How long a session may stay idle before eviction.
    pub session_timeout: Duration,
}

impl Default for WorkflowTrackerConfig {
    fn default() -> Self {
        Self {
            discovery_tools: default_discovery_tools(),
            query_tools: default_query_tools(),
            session_timeout: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct WorkflowSession {
    discovery_tools: HashSet<String>,
    query_tools: HashSet<String>,
    warning_count: u32,
    last_access: Option<Instant>,
}

struct SweeperHandle {
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Per-session workflow state behind a single-writer-multiple-reader lock.
pub struct SessionWorkflowTracker {
    sessions: Arc<RwLock<HashMap<String, WorkflowSession>>>,
    discovery_tools: HashSet<String>,
    query_tools: HashSet<String>,
    session_timeout: Duration,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl SessionWorkflowTracker {
    /// Create a tracker with the given configuration.
    pub fn new(config: WorkflowTrackerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            discovery_tools: config.discovery_tools,
            query_tools: config.query_tools,
            session_timeout: config.session_timeout,
            sweeper: Mutex::new(None),
        }
    }

    /// Whether `tool_name` is one of the configured discovery tools.
    pub fn is_discovery_tool(&self, tool_name: &str) -> bool {
        self.discovery_tools.contains(tool_name)
    }

    /// Whether `tool_name` is one of the configured query tools.
    pub fn is_query_tool(&self, tool_name: &str) -> bool {
        self.query_tools.contains(tool_name)
    }

    /// Record a successful tool call for the session. Discovery tools clear
    /// the warning counter; every call bumps the session's last access.
    pub fn record_tool_call(&self, session: &str, tool_name: &str) {
        let mut sessions = self.sessions.write();
        let state = sessions.entry(session.to_string()).or_default();
        if self.discovery_tools.contains(tool_name) {
            state.discovery_tools.insert(tool_name.to_string());
            state.warning_count = 0;
        } else if self.query_tools.contains(tool_name) {
            state.query_tools.insert(tool_name.to_string());
        }
        state.last_access = Some(Instant::now());
    }

    /// Whether the session has called any discovery tool.
    pub fn has_performed_discovery(&self, session: &str) -> bool {
        let sessions = self.sessions.read();
        sessions
            .get(session)
            .is_some_and(|state| !state.discovery_tools.is_empty())
    }

    /// Bump the session's warning counter and return the new value.
    pub fn increment_warning_count(&self, session: &str) -> u32 {
        let mut sessions = self.sessions.write();
        let state = sessions.entry(session.to_string()).or_default();
        state.warning_count += 1;
        state.last_access = Some(Instant::now());
        state.warning_count
    }

    /// The session's current warning count.
    pub fn warning_count(&self, session: &str) -> u32 {
        let sessions = self.sessions.read();
        sessions.get(session).map_or(0, |state| state.warning_count)
    }

    /// Number of sessions accessed within the session timeout.
    pub fn session_count(&self) -> usize {
        let sessions = self.sessions.read();
        sessions
            .values()
            .filter(|state| {
                state
                    .last_access
                    .is_some_and(|at| at.elapsed() <= self.session_timeout)
            })
            .count()
    }

    /// Start the background sweeper, replacing any previous one.
    pub fn start_cleanup(&self, interval: Duration) {
        self.stop();
        let shutdown = CancellationToken::new();
        let sessions = Arc::clone(&self.sessions);
        let session_timeout = self.session_timeout;
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => sweep(&sessions, session_timeout),
                }
            }
        });
        *self.sweeper.lock() = Some(SweeperHandle { shutdown, task });
    }

    /// Stop the background sweeper. A single owner drives the lifecycle.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.shutdown.cancel();
            handle.task.abort();
        }
    }
}

fn sweep(sessions: &RwLock<HashMap<String, WorkflowSession>>, session_timeout: Duration) {
    let mut sessions = sessions.write();
    sessions.retain(|_, state| {
        state
            .last_access
            .is_some_and(|at| at.elapsed() <= session_timeout)
    });
}

impl Drop for SessionWorkflowTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for SessionWorkflowTracker {
    fn default() -> Self {
        Self::new(WorkflowTrackerConfig::default())
    }
}

impl std::fmt::Debug for SessionWorkflowTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWorkflowTracker")
            .field("sessions", &self.sessions.read().len())
            .field("discovery_tools", &self.discovery_tools.len())
            .field("query_tools", &self.query_tools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_resets_warning_count() {
        let tracker = SessionWorkflowTracker::default();
        assert!(!tracker.has_performed_discovery("s1"));

        assert_eq!(tracker.increment_warning_count("s1"), 1);
        assert_eq!(tracker.increment_warning_count("s1"), 2);

        tracker.record_tool_call("s1", "datahub_search");
        assert!(tracker.has_performed_discovery("s1"));
        assert_eq!(tracker.warning_count("s1"), 0);
    }

    #[test]
    fn query_tools_do_not_mark_discovery() {
        let tracker = SessionWorkflowTracker::default();
        tracker.record_tool_call("s1", "trino_query");
        assert!(!tracker.has_performed_discovery("s1"));
    }

    #[test]
    fn warning_counts_are_per_session() {
        let tracker = SessionWorkflowTracker::default();
        tracker.increment_warning_count("s1");
        tracker.increment_warning_count("s1");
        assert_eq!(tracker.warning_count("s1"), 2);
        assert_eq!(tracker.warning_count("s2"), 0);
    }

    #[test]
    fn tool_classification_uses_defaults() {
        let tracker = SessionWorkflowTracker::default();
        assert!(tracker.is_discovery_tool("datahub_get_schema"));
        assert!(tracker.is_query_tool("trino_execute"));
        assert!(!tracker.is_query_tool("datahub_search"));
        assert!(!tracker.is_discovery_tool("weather_forecast"));
    }

    #[test]
    fn custom_tool_sets() {
        let tracker = SessionWorkflowTracker::new(WorkflowTrackerConfig {
            discovery_tools: ["catalog_browse".to_string()].into(),
            query_tools: ["sql_run".to_string()].into(),
            session_timeout: Duration::from_secs(60),
        });
        tracker.record_tool_call("s1", "catalog_browse");
        assert!(tracker.has_performed_discovery("s1"));
        assert!(tracker.is_query_tool("sql_run"));
        assert!(!tracker.is_discovery_tool("datahub_search"));
    }

    #[test]
    fn unknown_tools_still_bump_last_access() {
        let tracker = SessionWorkflowTracker::default();
        tracker.record_tool_call("s1", "weather_forecast");
        assert_eq!(tracker.session_count(), 1);
        assert!(!tracker.has_performed_discovery("s1"));
    }

    #[tokio::test]
    async fn sweeper_evicts_idle_sessions() {
        let tracker = Arc::new(SessionWorkflowTracker::new(WorkflowTrackerConfig {
            session_timeout: Duration::from_millis(40),
            ..WorkflowTrackerConfig::default()
        }));
        tracker.record_tool_call("s1", "datahub_search");
        tracker.start_cleanup(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracker.stop();

        assert!(!tracker.has_performed_discovery("s1"));
        assert_eq!(tracker.session_count(), 0);
    }
}
