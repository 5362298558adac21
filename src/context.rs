//! Per-request platform context and its ambient carrier.
//!
//! [`PlatformContext`] is the single record threaded through the middleware
//! chain: the auth layer creates it, later layers read it, and exactly one
//! layer writes each field group (see the field docs). [`RequestExtra`] is
//! the request-scoped carrier that holds the context alongside the
//! cancellation token; it is cloned into every layer and into the tool
//! handler, so cancelling the token reaches everything downstream.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::toolkit::ToolkitKind;

/// Session identifier used when the transport supplies none, e.g. plain
/// line-oriented stdio. Keeping a stable literal means a single-tenant stdio
/// session still benefits from dedup and workflow tracking.
pub const STDIO_SESSION: &str = "stdio";

/// Shared handle to the per-request platform context.
pub type SharedPlatformContext = Arc<RwLock<PlatformContext>>;

/// Per-request platform state.
///
/// Writer discipline (verified by tests, enforced by convention):
/// identity, toolkit, and authorization fields are written only by the
/// auth layer; `enrichment_applied` / `enrichment_mode` only by the
/// enrichment layer. Everything else only reads.
#[derive(Debug, Clone)]
pub struct PlatformContext {
    /// Random printable identifier assigned once at creation.
    pub request_id: String,
    /// Transport session identity, falling back to [`STDIO_SESSION`].
    pub session_id: String,
    /// Transport kind the request arrived on ("stdio", "http", ...).
    pub transport: String,
    /// Name of the tool being called.
    pub tool_name: String,
    /// Toolkit the tool resolves to, if any.
    pub toolkit_kind: Option<ToolkitKind>,
    /// Toolkit instance name.
    pub toolkit_name: String,
    /// Upstream connection the toolkit is bound to.
    pub connection: String,
    /// Authenticated user id; empty when unauthenticated.
    pub user_id: String,
    /// Authenticated user email; empty when unauthenticated.
    pub user_email: String,
    /// Roles granted to the user.
    pub roles: Vec<String>,
    /// Persona assigned by the authorizer.
    pub persona: String,
    /// Whether the authorizer allowed the call.
    pub authorized: bool,
    /// Whether the enrichment layer appended any context blocks.
    pub enrichment_applied: bool,
    /// Enrichment mode recorded by the enrichment layer ("full" or the
    /// dedup mode that abbreviated the payload).
    pub enrichment_mode: String,
}

impl PlatformContext {
    /// Create a context for a new request.
    pub fn new(
        request_id: impl Into<String>,
        session_id: impl Into<String>,
        transport: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            session_id: session_id.into(),
            transport: transport.into(),
            tool_name: String::new(),
            toolkit_kind: None,
            toolkit_name: String::new(),
            connection: String::new(),
            user_id: String::new(),
            user_email: String::new(),
            roles: Vec::new(),
            persona: String::new(),
            authorized: false,
            enrichment_applied: false,
            enrichment_mode: String::new(),
        }
    }
}

/// Request-scoped carrier passed to every layer and the tool handler.
///
/// There is exactly one platform-context slot per request. A layer that
/// finds the slot empty creates a context rather than failing; in a
/// correctly composed stack the auth layer fills it first.
#[derive(Clone)]
pub struct RequestExtra {
    /// Cancellation token for the request.
    pub cancellation_token: CancellationToken,
    /// Transport-level request id (JSON-RPC id or equivalent).
    pub request_id: String,
    /// Session identity supplied by the transport, if any.
    pub session_id: Option<String>,
    /// Transport kind the request arrived on.
    pub transport: String,
    platform: Arc<OnceLock<SharedPlatformContext>>,
}

impl RequestExtra {
    /// Create a new carrier for a request.
    pub fn new(request_id: impl Into<String>, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            request_id: request_id.into(),
            session_id: None,
            transport: STDIO_SESSION.to_string(),
            platform: Arc::new(OnceLock::new()),
        }
    }

    /// Set the transport-supplied session identity.
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Set the transport kind.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// The session key used for dedup and workflow tracking: the transport
    /// session identity, or [`STDIO_SESSION`] when none was supplied.
    pub fn effective_session_id(&self) -> String {
        match &self.session_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => STDIO_SESSION.to_string(),
        }
    }

    /// Attach a platform context to the carrier, returning the shared
    /// handle. If a context is already attached the existing one wins; the
    /// slot is written once per request.
    pub fn attach_platform(&self, context: PlatformContext) -> SharedPlatformContext {
        self.platform
            .get_or_init(|| Arc::new(RwLock::new(context)))
            .clone()
    }

    /// The attached platform context, if any layer has created one.
    pub fn platform(&self) -> Option<SharedPlatformContext> {
        self.platform.get().cloned()
    }

    /// The attached platform context, creating a fresh one when absent.
    pub fn platform_or_init(&self) -> SharedPlatformContext {
        self.platform
            .get_or_init(|| {
                Arc::new(RwLock::new(PlatformContext::new(
                    Uuid::new_v4().to_string(),
                    self.effective_session_id(),
                    self.transport.clone(),
                )))
            })
            .clone()
    }

    /// Check whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Wait for cancellation.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await;
    }
}

impl std::fmt::Debug for RequestExtra {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExtra")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("transport", &self.transport)
            .field("platform_attached", &self.platform.get().is_some())
            .finish()
    }
}
