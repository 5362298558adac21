//! The middleware layers and their composition.
//!
//! Each layer is a value wrapping the next handler; there is no base-class
//! hierarchy and no post-hoc reordering. [`PlatformStack`] is the
//! composition root: it nests the `tools/call` layers in the one order that
//! satisfies the contract between them, and wraps `tools/list` with the
//! description override layer.
//!
//! # Ordering contract
//!
//! ```text
//! transport -> Auth/Authz -> Audit -> Rules -> Enrichment -> tool handler
//! ```
//!
//! Auth is outermost because it creates the platform context every later
//! layer reads. Enrichment is innermost so that on the unwind Audit sees the
//! enriched response sizes and the enrichment-applied flag, and Rules
//! prepends its hints after enrichment appended its blocks. Audit sits
//! between Auth and Rules so it observes both the authorization outcome and
//! the final result shape.

pub mod audit;
pub mod auth;
pub mod enrichment;
pub mod overrides;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{AllowAllAuthorizer, Authenticator, Authorizer, NoopAuthenticator};
use crate::config::{EnrichmentConfig, RuleEnforcementConfig, ToolDescriptionOverrides};
use crate::context::RequestExtra;
use crate::error::Result;
use crate::providers::{MetadataProvider, QueryProvider, StorageProvider};
use crate::session::{SessionEnrichmentCache, SessionWorkflowTracker};
use crate::toolkit::{StaticToolkitResolver, ToolkitResolver};
use crate::types::{CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult};

pub use audit::AuditLayer;
pub use auth::AuthLayer;
pub use enrichment::EnrichmentLayer;
pub use overrides::DescriptionOverrideLayer;
pub use rules::{RuleEngine, RuleEnforcementLayer, StaticRuleEngine};

/// Handler for the `tools/call` verb.
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    /// Execute a tool call.
    async fn call_tool(
        &self,
        request: CallToolRequest,
        extra: RequestExtra,
    ) -> Result<CallToolResult>;
}

/// Handler for the `tools/list` verb.
#[async_trait]
pub trait ListToolsHandler: Send + Sync {
    /// List the available tools.
    async fn list_tools(
        &self,
        request: ListToolsRequest,
        extra: RequestExtra,
    ) -> Result<ListToolsResult>;
}

/// Composition root for the platform layers.
///
/// Collects the collaborators, then [`wrap_tool_handler`](Self::wrap_tool_handler)
/// and [`wrap_list_handler`](Self::wrap_list_handler) produce the nested
/// chains the server registers with its transport.
pub struct PlatformStack {
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
    resolver: Arc<dyn ToolkitResolver>,
    enrichment_config: EnrichmentConfig,
    metadata: Option<Arc<dyn MetadataProvider>>,
    query: Option<Arc<dyn QueryProvider>>,
    storage: Option<Arc<dyn StorageProvider>>,
    cache: Option<Arc<SessionEnrichmentCache>>,
    tracker: Option<Arc<SessionWorkflowTracker>>,
    rules_config: Option<RuleEnforcementConfig>,
    rule_engine: Option<Arc<dyn RuleEngine>>,
    audit: Option<Arc<crate::audit::AuditDispatcher>>,
    overrides: ToolDescriptionOverrides,
}

impl PlatformStack {
    /// Create a stack with noop auth, prefix toolkit resolution, default
    /// overrides, and no enrichment, rules, or audit wiring.
    pub fn new() -> Self {
        Self {
            authenticator: Arc::new(NoopAuthenticator::new()),
            authorizer: Arc::new(AllowAllAuthorizer),
            resolver: Arc::new(StaticToolkitResolver::with_defaults()),
            enrichment_config: EnrichmentConfig::default(),
            metadata: None,
            query: None,
            storage: None,
            cache: None,
            tracker: None,
            rules_config: None,
            rule_engine: None,
            audit: None,
            overrides: ToolDescriptionOverrides::defaults(),
        }
    }

    /// Set the authenticator.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Set the authorizer.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Set the toolkit resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ToolkitResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the enrichment configuration.
    pub fn with_enrichment_config(mut self, config: EnrichmentConfig) -> Self {
        self.enrichment_config = config;
        self
    }

    /// Attach the metadata provider.
    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    /// Attach the query provider.
    pub fn with_query_provider(mut self, provider: Arc<dyn QueryProvider>) -> Self {
        self.query = Some(provider);
        self
    }

    /// Attach the storage provider.
    pub fn with_storage_provider(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(provider);
        self
    }

    /// Attach the session enrichment cache used for dedup.
    pub fn with_session_cache(mut self, cache: Arc<SessionEnrichmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the session workflow tracker.
    pub fn with_workflow_tracker(mut self, tracker: Arc<SessionWorkflowTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Enable the rule enforcement layer.
    pub fn with_rules(mut self, config: RuleEnforcementConfig) -> Self {
        self.rules_config = Some(config);
        self
    }

    /// Set the static rule engine used when no tracker is attached.
    pub fn with_rule_engine(mut self, engine: Arc<dyn RuleEngine>) -> Self {
        self.rule_engine = Some(engine);
        self
    }

    /// Attach the audit dispatcher.
    pub fn with_audit(mut self, dispatcher: Arc<crate::audit::AuditDispatcher>) -> Self {
        self.audit = Some(dispatcher);
        self
    }

    /// Set the tool description overrides for `tools/list`.
    pub fn with_description_overrides(mut self, overrides: ToolDescriptionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Nest the `tools/call` layers around `inner` in the canonical order.
    pub fn wrap_tool_handler(&self, inner: Arc<dyn ToolCallHandler>) -> Arc<dyn ToolCallHandler> {
        let mut handler = inner;

        handler = Arc::new(EnrichmentLayer::new(
            self.enrichment_config.clone(),
            self.metadata.clone(),
            self.query.clone(),
            self.storage.clone(),
            self.cache.clone(),
            self.tracker.clone(),
            handler,
        ));

        if let Some(config) = &self.rules_config {
            handler = Arc::new(RuleEnforcementLayer::new(
                config.clone(),
                self.tracker.clone(),
                self.rule_engine.clone(),
                handler,
            ));
        }

        if let Some(dispatcher) = &self.audit {
            handler = Arc::new(AuditLayer::new(dispatcher.clone(), handler));
        }

        Arc::new(AuthLayer::new(
            self.authenticator.clone(),
            self.authorizer.clone(),
            self.resolver.clone(),
            self.audit.clone(),
            handler,
        ))
    }

    /// Wrap a `tools/list` handler with the description override layer.
    pub fn wrap_list_handler(&self, inner: Arc<dyn ListToolsHandler>) -> Arc<dyn ListToolsHandler> {
        Arc::new(DescriptionOverrideLayer::new(
            self.overrides.clone(),
            inner,
        ))
    }
}

impl Default for PlatformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlatformStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformStack")
            .field("enrichment", &self.enrichment_config)
            .field("rules", &self.rules_config.is_some())
            .field("audit", &self.audit.is_some())
            .field("cache", &self.cache.is_some())
            .field("tracker", &self.tracker.is_some())
            .finish()
    }
}
