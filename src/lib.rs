//! Platform middleware stack for MCP tool servers.
//!
//! This crate sits between an MCP transport and the tool implementations and
//! enforces the platform-wide concerns of a data-platform server:
//!
//! - **Auth**: who the caller is and whether they may use the tool
//!   ([`middleware::AuthLayer`], fail-closed);
//! - **Enrichment**: appending cross-service semantic metadata to tool
//!   results ([`middleware::EnrichmentLayer`]), deduplicated per session
//!   through the [`session::SessionEnrichmentCache`];
//! - **Workflow rules**: nudging clients to discover table metadata before
//!   querying, with escalation ([`middleware::RuleEnforcementLayer`] and the
//!   [`session::SessionWorkflowTracker`]);
//! - **Audit**: one asynchronous [`audit::AuditEvent`] per call
//!   ([`middleware::AuditLayer`]);
//! - **Description overrides**: platform-curated tool descriptions on
//!   `tools/list` ([`middleware::DescriptionOverrideLayer`]).
//!
//! [`middleware::PlatformStack`] is the composition root; it nests the
//! layers in the one order that satisfies the contract between them. The
//! transports, concrete authenticators and authorizers, providers, tools,
//! and audit sink storage are the host's business and plug in through the
//! traits in [`auth`], [`toolkit`], [`providers`], and [`audit`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use mcp_platform::audit::{AuditDispatcher, TracingAuditSink};
//! use mcp_platform::middleware::{PlatformStack, ToolCallHandler};
//! use mcp_platform::session::{SessionEnrichmentCache, SessionWorkflowTracker};
//! use mcp_platform::types::{CallToolRequest, CallToolResult};
//! use mcp_platform::{RequestExtra, Result, RuleEnforcementConfig};
//!
//! struct EchoTool;
//!
//! #[async_trait]
//! impl ToolCallHandler for EchoTool {
//!     async fn call_tool(
//!         &self,
//!         request: CallToolRequest,
//!         _extra: RequestExtra,
//!     ) -> Result<CallToolResult> {
//!         Ok(CallToolResult::text(format!("called {}", request.name)))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = Arc::new(SessionEnrichmentCache::new(Default::default()));
//! let tracker = Arc::new(SessionWorkflowTracker::default());
//! let audit = Arc::new(AuditDispatcher::with_sink(Arc::new(TracingAuditSink)));
//!
//! let stack = PlatformStack::new()
//!     .with_session_cache(cache)
//!     .with_workflow_tracker(tracker)
//!     .with_rules(RuleEnforcementConfig::default())
//!     .with_audit(audit);
//!
//! let handler = stack.wrap_tool_handler(Arc::new(EchoTool));
//! # let _ = handler;
//! # }
//! ```

#![warn(missing_docs)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod providers;
pub mod session;
pub mod toolkit;
pub mod types;

#[cfg(feature = "logging")]
pub mod logging;

pub use config::{
    DedupMode, EnrichmentConfig, RuleEnforcementConfig, ToolDescriptionOverrides,
    WorkflowRulesConfig,
};
pub use context::{PlatformContext, RequestExtra, SharedPlatformContext, STDIO_SESSION};
pub use error::{Error, Result};
pub use middleware::PlatformStack;
pub use toolkit::{StaticToolkitResolver, Toolkit, ToolkitKind, ToolkitResolver};
