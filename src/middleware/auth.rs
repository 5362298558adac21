//! Auth/Authz layer for `tools/call`.
//!
//! The outermost layer. It creates the platform context every later layer
//! reads, establishes the caller's identity, resolves the tool's toolkit
//! binding, and asks the authorizer whether the call may proceed. Denials
//! fail closed: the inner chain (and therefore the tool handler) is never
//! invoked, the client receives an ordinary tool-result error, and the call
//! is still audited through the shared dispatcher.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::AuditDispatcher;
use crate::auth::{Authenticator, Authorizer};
use crate::context::{PlatformContext, RequestExtra};
use crate::error::Result;
use crate::toolkit::ToolkitResolver;
use crate::types::{CallToolRequest, CallToolResult};

use super::audit::{build_call_event, measure_request};
use super::ToolCallHandler;

/// The auth/authz layer.
pub struct AuthLayer {
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
    resolver: Arc<dyn ToolkitResolver>,
    audit: Option<Arc<AuditDispatcher>>,
    next: Arc<dyn ToolCallHandler>,
}

impl AuthLayer {
    /// Wrap `next` with authentication and authorization. The dispatcher,
    /// when present, records calls this layer rejects before they reach the
    /// audit layer.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        authorizer: Arc<dyn Authorizer>,
        resolver: Arc<dyn ToolkitResolver>,
        audit: Option<Arc<AuditDispatcher>>,
        next: Arc<dyn ToolCallHandler>,
    ) -> Self {
        Self {
            authenticator,
            authorizer,
            resolver,
            audit,
            next,
        }
    }

    fn reject(
        &self,
        context: PlatformContext,
        extra: &RequestExtra,
        request: &CallToolRequest,
        message: String,
        started: Instant,
    ) -> CallToolResult {
        let shared = extra.attach_platform(context);
        let result = CallToolResult::error(message);
        if let Some(dispatcher) = &self.audit {
            let event = {
                let ctx = shared.read();
                build_call_event(
                    &ctx,
                    measure_request(&request.arguments),
                    &Ok(result.clone()),
                    started.elapsed().as_millis() as u64,
                )
            };
            dispatcher.emit(event);
        }
        result
    }
}

#[async_trait]
impl ToolCallHandler for AuthLayer {
    async fn call_tool(
        &self,
        request: CallToolRequest,
        extra: RequestExtra,
    ) -> Result<CallToolResult> {
        let started = Instant::now();
        let mut context = PlatformContext::new(
            Uuid::new_v4().to_string(),
            extra.effective_session_id(),
            extra.transport.clone(),
        );
        context.tool_name = request.name.clone();

        if let Some(toolkit) = self.resolver.toolkit_for_tool(&request.name) {
            context.toolkit_kind = Some(toolkit.kind);
            context.toolkit_name = toolkit.name;
            context.connection = toolkit.connection;
        }

        match self.authenticator.authenticate(&extra).await {
            Ok(Some(user)) => {
                context.user_id = user.user_id;
                context.user_email = user.email;
                context.roles = user.roles;
            }
            Ok(None) => {
                // No identity presented; unauthenticated tools may proceed.
                tracing::debug!(tool = %request.name, "no user identity, continuing unauthenticated");
            }
            Err(err) => {
                tracing::warn!(tool = %request.name, error = %err, "authentication failed");
                let message = format!("authentication failed: {err}");
                return Ok(self.reject(context, &extra, &request, message, started));
            }
        }

        let decision = self
            .authorizer
            .authorize(&extra, &context.user_id, &context.roles, &request.name)
            .await;
        if !decision.allowed {
            tracing::warn!(
                tool = %request.name,
                user = %context.user_id,
                reason = %decision.reason,
                "authorization denied"
            );
            let message = format!("not authorized: {}", decision.reason);
            return Ok(self.reject(context, &extra, &request, message, started));
        }

        context.persona = decision.persona;
        context.authorized = true;
        extra.attach_platform(context);

        self.next.call_tool(request, extra).await
    }
}

impl std::fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLayer")
            .field("audit", &self.audit.is_some())
            .finish()
    }
}
