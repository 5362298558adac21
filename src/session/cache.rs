//! Session-keyed enrichment dedup cache.
//!
//! Tracks, per session, which tables have already had their semantic context
//! sent and how many tokens that context cost. The enrichment layer consults
//! it to abbreviate repeats; process-wide counters expose how many tokens
//! were sent in full versus saved by dedup.
//!
//! Entries expire `entry_ttl` after they were sent; whole sessions are
//! evicted once idle for `session_timeout`. Expiry is enforced on read and
//! physically reclaimed by the background sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Cache tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentCacheConfig {
    /// How long a sent entry suppresses repeat enrichment.
    #[serde(with = "duration_secs")]
    pub entry_ttl: Duration,
    /// How long a session may stay idle before eviction.
    #[serde(with = "duration_secs")]
    pub session_timeout: Duration,
}

impl Default for EnrichmentCacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(30 * 60),
            session_timeout: Duration::from_secs(60 * 60),
        }
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Persistent form of a cache entry, encoded as
/// `{"sent_at": <RFC-3339>, "token_count": <integer>}`. Older snapshots
/// without a token count load as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// When the entry was sent.
    pub sent_at: DateTime<Utc>,
    /// Token cost of the full enrichment payload.
    #[serde(default)]
    pub token_count: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    sent_at: Instant,
    sent_at_wall: DateTime<Utc>,
    token_count: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    entries: HashMap<String, CacheEntry>,
    last_access: Option<Instant>,
}

struct SweeperHandle {
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Session × table-key dedup cache with TTL-per-entry, idle-session
/// eviction, and process-wide token counters.
///
/// Readers (`was_sent_recently`, `token_count`) take a read lock; all
/// mutation takes the write lock. Sessions are never observable in a
/// partially constructed state.
pub struct SessionEnrichmentCache {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
    entry_ttl: Duration,
    session_timeout: Duration,
    tokens_full: AtomicU64,
    tokens_deduped: AtomicU64,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl SessionEnrichmentCache {
    /// Create a cache with the given configuration.
    pub fn new(config: EnrichmentCacheConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            entry_ttl: config.entry_ttl,
            session_timeout: config.session_timeout,
            tokens_full: AtomicU64::new(0),
            tokens_deduped: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    /// Record that the full enrichment for `table_key` was sent to
    /// `session`, costing `tokens`. Upserts; repeat calls refresh the TTL.
    pub fn mark_sent(&self, session: &str, table_key: &str, tokens: u64) {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let state = sessions.entry(session.to_string()).or_default();
        state.entries.insert(
            table_key.to_string(),
            CacheEntry {
                sent_at: now,
                sent_at_wall: Utc::now(),
                token_count: tokens,
            },
        );
        state.last_access = Some(now);
    }

    /// Whether the full enrichment for `table_key` was sent to `session`
    /// within the entry TTL.
    pub fn was_sent_recently(&self, session: &str, table_key: &str) -> bool {
        let sessions = self.sessions.read();
        sessions
            .get(session)
            .and_then(|state| state.entries.get(table_key))
            .is_some_and(|entry| entry.sent_at.elapsed() <= self.entry_ttl)
    }

    /// Token cost recorded for a live entry; 0 when missing or expired.
    pub fn token_count(&self, session: &str, table_key: &str) -> u64 {
        let sessions = self.sessions.read();
        sessions
            .get(session)
            .and_then(|state| state.entries.get(table_key))
            .filter(|entry| entry.sent_at.elapsed() <= self.entry_ttl)
            .map_or(0, |entry| entry.token_count)
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

    /// Add to the process-wide count of tokens sent in full.
    pub fn add_tokens_full(&self, tokens: u64) {
        self.tokens_full.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Add to the process-wide count of tokens saved by dedup.
    pub fn add_tokens_deduped(&self, tokens: u64) {
        self.tokens_deduped.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Total tokens sent in full.
    pub fn tokens_full(&self) -> u64 {
        self.tokens_full.load(Ordering::Relaxed)
    }

    /// Total tokens saved by dedup.
    pub fn tokens_deduped(&self) -> u64 {
        self.tokens_deduped.load(Ordering::Relaxed)
    }

    /// Snapshot every session's entries for persistence.
    pub fn export_sessions(&self) -> HashMap<String, HashMap<String, PersistedEntry>> {
        let sessions = self.sessions.read();
        sessions
            .iter()
            .map(|(session, state)| {
                let entries = state
                    .entries
                    .iter()
                    .map(|(key, entry)| {
                        (
                            key.clone(),
                            PersistedEntry {
                                sent_at: entry.sent_at_wall,
                                token_count: entry.token_count,
                            },
                        )
                    })
                    .collect();
                (session.clone(), entries)
            })
            .collect()
    }

    /// Merge persisted entries into `session`. Existing entries for other
    /// keys are kept; colliding keys take the loaded value.
    pub fn load_session(&self, session: &str, entries: HashMap<String, PersistedEntry>) {
        let now = Instant::now();
        let now_wall = Utc::now();
        let mut sessions = self.sessions.write();
        let state = sessions.entry(session.to_string()).or_default();
        for (key, persisted) in entries {
            let age = now_wall
                .signed_duration_since(persisted.sent_at)
                .to_std()
                .unwrap_or_default();
            // Ages beyond what Instant can represent are already past any TTL.
            let sent_at = now
                .checked_sub(age)
                .or_else(|| now.checked_sub(self.entry_ttl + Duration::from_secs(1)))
                .unwrap_or(now);
            state.entries.insert(
                key,
                CacheEntry {
                    sent_at,
                    sent_at_wall: persisted.sent_at,
                    token_count: persisted.token_count,
                },
            );
        }
        state.last_access = Some(now);
    }

    /// Start the background sweeper, replacing any previous one.
    pub fn start_cleanup(&self, interval: Duration) {
        self.stop();
        let shutdown = CancellationToken::new();
        let sessions = Arc::clone(&self.sessions);
        let entry_ttl = self.entry_ttl;
        let session_timeout = self.session_timeout;
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => sweep(&sessions, entry_ttl, session_timeout),
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

/// Evict idle sessions, then expired entries of live sessions. A live
/// session survives even when emptied.
fn sweep(
    sessions: &RwLock<HashMap<String, SessionState>>,
    entry_ttl: Duration,
    session_timeout: Duration,
) {
    let mut sessions = sessions.write();
    sessions.retain(|_, state| {
        let alive = state
            .last_access
            .is_some_and(|at| at.elapsed() <= session_timeout);
        if alive {
            state
                .entries
                .retain(|_, entry| entry.sent_at.elapsed() <= entry_ttl);
        }
        alive
    });
}

impl Drop for SessionEnrichmentCache {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SessionEnrichmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEnrichmentCache")
            .field("sessions", &self.sessions.read().len())
            .field("tokens_full", &self.tokens_full())
            .field("tokens_deduped", &self.tokens_deduped())
            .finish()
    }
}
