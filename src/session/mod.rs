//! Process-wide per-session state: the enrichment dedup cache and the
//! workflow tracker.
//!
//! Both stores are keyed by the transport session identity, use
//! single-writer-multiple-reader locking, and evict idle sessions with a
//! background sweeper started via `start_cleanup` and shut down via `stop`.

pub mod cache;
pub mod workflow;

pub use cache::{EnrichmentCacheConfig, PersistedEntry, SessionEnrichmentCache};
pub use workflow::{SessionWorkflowTracker, WorkflowTrackerConfig};
