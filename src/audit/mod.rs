//! Audit events, sinks, and the asynchronous dispatcher.
//!
//! Every `tools/call` produces one [`AuditEvent`], including calls denied by
//! the auth layer. Events are handed to an [`AuditDispatcher`], which pushes
//! them through a bounded channel to a drain worker so the response never
//! blocks on the sink; when the channel is full the event is dropped and
//! counted. Sink failures are logged and swallowed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::context::PlatformContext;
use crate::error::Result;

/// Source tag stamped on every event emitted by this stack.
pub const AUDIT_SOURCE: &str = "mcp";

/// Default bound on in-flight audit emissions.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 256;

/// One audited tool call.
///
/// The event survives a JSON round-trip with all fields preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Platform request id.
    pub request_id: String,
    /// Session the call belongs to.
    pub session_id: String,
    /// Caller identity; empty when unauthenticated.
    pub user_id: String,
    /// Caller email; empty when unauthenticated.
    pub user_email: String,
    /// Persona assigned by the authorizer.
    pub persona: String,
    /// Tool that was called.
    pub tool_name: String,
    /// Toolkit kind ("trino", "datahub", "s3"); empty when unresolved.
    pub toolkit_kind: String,
    /// Toolkit instance name.
    pub toolkit_name: String,
    /// Upstream connection.
    pub connection: String,
    /// Tool arguments with sensitive keys redacted.
    pub arguments: Value,
    /// SHA-256 hex of the original (unredacted) arguments.
    pub argument_hash: String,
    /// Serialized length of the arguments.
    pub request_chars: usize,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message for failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
    /// Sum of text lengths across result content blocks.
    pub response_chars: usize,
    /// Number of result content blocks.
    pub content_blocks: usize,
    /// Transport the request arrived on.
    pub transport: String,
    /// Always [`AUDIT_SOURCE`].
    pub source: String,
    /// Whether the enrichment layer appended context.
    pub enrichment_applied: bool,
    /// Enrichment mode recorded by the enrichment layer.
    pub enrichment_mode: String,
    /// Whether the authorizer allowed the call.
    pub authorized: bool,
}

impl AuditEvent {
    /// Create an event from a platform context snapshot; call measurements
    /// are filled in by the caller.
    pub fn from_context(ctx: &PlatformContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id: ctx.request_id.clone(),
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
            user_email: ctx.user_email.clone(),
            persona: ctx.persona.clone(),
            tool_name: ctx.tool_name.clone(),
            toolkit_kind: ctx.toolkit_kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
            toolkit_name: ctx.toolkit_name.clone(),
            connection: ctx.connection.clone(),
            arguments: Value::Null,
            argument_hash: String::new(),
            request_chars: 0,
            success: false,
            error: None,
            duration_ms: 0,
            response_chars: 0,
            content_blocks: 0,
            transport: ctx.transport.clone(),
            source: AUDIT_SOURCE.to_string(),
            enrichment_applied: ctx.enrichment_applied,
            enrichment_mode: ctx.enrichment_mode.clone(),
            authorized: ctx.authorized,
        }
    }
}

/// SHA-256 hex digest of a JSON value's canonical string form.
pub fn hash_arguments(arguments: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(arguments.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Recursively replace values under sensitive keys with `"[REDACTED]"`.
pub fn redact_arguments(arguments: &Value) -> Value {
    const SENSITIVE: &[&str] = &["password", "secret", "token", "key", "credential"];
    match arguments {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, value) in map {
                let lower = key.to_lowercase();
                if SENSITIVE.iter().any(|s| lower.contains(s)) {
                    redacted.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    redacted.insert(key.clone(), redact_arguments(value));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_arguments).collect()),
        other => other.clone(),
    }
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one event.
    async fn log(&self, event: AuditEvent) -> Result<()>;
}

/// Sink that emits events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, event: AuditEvent) -> Result<()> {
        tracing::info!(
            target: "audit",
            request_id = %event.request_id,
            session_id = %event.session_id,
            user_id = %event.user_id,
            tool = %event.tool_name,
            toolkit = %event.toolkit_kind,
            success = event.success,
            authorized = event.authorized,
            duration_ms = event.duration_ms,
            response_chars = event.response_chars,
            enrichment_applied = event.enrichment_applied,
            "tool call"
        );
        Ok(())
    }
}

/// Bounded in-memory sink for hosts and tests.
#[derive(Debug)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    max_events: usize,
}

impl MemoryAuditSink {
    /// Create a sink retaining at most `max_events` (oldest dropped first).
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            max_events,
        }
    }

    /// Snapshot of the retained events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the sink holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, event: AuditEvent) -> Result<()> {
        let mut events = self.events.lock();
        events.push(event);
        if events.len() > self.max_events {
            let excess = events.len() - self.max_events;
            events.drain(0..excess);
        }
        Ok(())
    }
}

/// Fire-and-forget event emitter with a bounded in-flight queue.
pub struct AuditDispatcher {
    tx: Mutex<Option<mpsc::Sender<AuditEvent>>>,
    dropped: AtomicU64,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AuditDispatcher {
    /// Spawn the drain worker for `sink` with the given queue capacity.
    pub fn new(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = sink.log(event).await {
                    tracing::warn!(error = %err, "audit sink rejected event");
                }
            }
        });
        Self {
            tx: Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Spawn a dispatcher with the default capacity.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self::new(sink, DEFAULT_DISPATCH_CAPACITY)
    }

    /// Enqueue an event without blocking; dropped (and counted) when the
    /// queue is full or the dispatcher was closed.
    pub fn emit(&self, event: AuditEvent) {
        let Some(tx) = self.tx.lock().clone() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("audit queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of events dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for queued events to drain into the sink.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().take();
        drop(tx);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("open", &self.tx.lock().is_some())
            .field("dropped", &self.dropped())
            .finish()
    }
}
