//! Rule enforcement layer for `tools/call`.
//!
//! Collects workflow hints and prepends them to successful results; it never
//! blocks a call. With a workflow tracker attached it warns sessions that
//! query before discovering, escalating once the warning count passes the
//! configured threshold. Without a tracker it falls back to a static
//! one-line tip driven by a [`RuleEngine`]. Successful calls are recorded
//! into the tracker, which is what eventually clears the warnings.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RuleEnforcementConfig;
use crate::context::RequestExtra;
use crate::error::Result;
use crate::session::SessionWorkflowTracker;
use crate::types::{CallToolRequest, CallToolResult, Content};

use super::ToolCallHandler;

/// Static rule source used when no workflow tracker is attached.
pub trait RuleEngine: Send + Sync {
    /// Whether query tools should carry a discovery tip.
    fn should_require_datahub_check(&self) -> bool;
}

/// Fixed-answer rule engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRuleEngine {
    /// The answer `should_require_datahub_check` returns.
    pub require_datahub_check: bool,
}

impl RuleEngine for StaticRuleEngine {
    fn should_require_datahub_check(&self) -> bool {
        self.require_datahub_check
    }
}

const STATIC_TIP: &str = "Tip: check DataHub for table documentation before querying.";

/// The rule enforcement layer.
pub struct RuleEnforcementLayer {
    config: RuleEnforcementConfig,
    tracker: Option<Arc<SessionWorkflowTracker>>,
    engine: Option<Arc<dyn RuleEngine>>,
    next: Arc<dyn ToolCallHandler>,
}

impl RuleEnforcementLayer {
    /// Wrap `next` with rule enforcement.
    pub fn new(
        config: RuleEnforcementConfig,
        tracker: Option<Arc<SessionWorkflowTracker>>,
        engine: Option<Arc<dyn RuleEngine>>,
        next: Arc<dyn ToolCallHandler>,
    ) -> Self {
        Self {
            config,
            tracker,
            engine,
            next,
        }
    }

    fn hint_for(&self, tool_name: &str, session: &str) -> Option<String> {
        if let Some(tracker) = &self.tracker {
            if self.config.workflow.require_discovery_before_query
                && tracker.is_query_tool(tool_name)
                && !tracker.has_performed_discovery(session)
            {
                let count = tracker.increment_warning_count(session);
                let hint = if count > self.config.workflow.escalation_after_warnings {
                    self.config
                        .workflow
                        .escalation_message
                        .replace("{count}", &count.to_string())
                } else {
                    self.config.workflow.warning_message.clone()
                };
                tracing::debug!(
                    tool = %tool_name,
                    session = %session,
                    warnings = count,
                    "query before discovery"
                );
                return Some(hint);
            }
            return None;
        }

        let engine = self.engine.as_ref()?;
        if engine.should_require_datahub_check() && self.config.query_tools.contains(tool_name) {
            return Some(STATIC_TIP.to_string());
        }
        None
    }
}

#[async_trait]
impl ToolCallHandler for RuleEnforcementLayer {
    async fn call_tool(
        &self,
        request: CallToolRequest,
        extra: RequestExtra,
    ) -> Result<CallToolResult> {
        let tool_name = request.name.clone();
        let session = extra.effective_session_id();

        let mut result = self.next.call_tool(request, extra).await?;
        if result.is_error {
            return Ok(result);
        }

        if let Some(hint) = self.hint_for(&tool_name, &session) {
            result
                .content
                .insert(0, Content::text(format!("{hint}\n\n---")));
        }
        if let Some(tracker) = &self.tracker {
            tracker.record_tool_call(&session, &tool_name);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for RuleEnforcementLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEnforcementLayer")
            .field("tracker", &self.tracker.is_some())
            .field("engine", &self.engine.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tokio_util::sync::CancellationToken;

    struct FixedHandler {
        result: std::result::Result<CallToolResult, ()>,
    }

    #[async_trait]
    impl ToolCallHandler for FixedHandler {
        async fn call_tool(
            &self,
            _request: CallToolRequest,
            _extra: RequestExtra,
        ) -> Result<CallToolResult> {
            self.result
                .clone()
                .map_err(|()| Error::handler("boom"))
        }
    }

    fn extra(session: &str) -> RequestExtra {
        RequestExtra::new("req-1", CancellationToken::new())
            .with_session_id(Some(session.to_string()))
    }

    fn session_layer(
        tracker: Arc<SessionWorkflowTracker>,
        escalation_after: u32,
    ) -> RuleEnforcementLayer {
        let mut config = RuleEnforcementConfig::default();
        config.workflow.escalation_after_warnings = escalation_after;
        RuleEnforcementLayer::new(
            config,
            Some(tracker),
            None,
            Arc::new(FixedHandler {
                result: Ok(CallToolResult::text("rows")),
            }),
        )
    }

    #[tokio::test]
    async fn warns_then_escalates() {
        let tracker = Arc::new(SessionWorkflowTracker::default());
        let layer = session_layer(tracker, 2);

        for expected_warning in 1..=2 {
            let result = layer
                .call_tool(
                    CallToolRequest::new("trino_query", serde_json::json!({})),
                    extra("s1"),
                )
                .await
                .unwrap();
            let first = result.first_text().unwrap();
            assert!(
                first.contains("discovery"),
                "warning {expected_warning}: {first}"
            );
            assert!(!first.contains("queries issued"), "not yet escalated: {first}");
        }

        let result = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        let first = result.first_text().unwrap();
        assert!(first.contains('3'), "escalation carries the count: {first}");
        assert!(first.ends_with("---"));
    }

    #[tokio::test]
    async fn discovery_clears_warnings() {
        let tracker = Arc::new(SessionWorkflowTracker::default());
        let layer = session_layer(tracker.clone(), 2);

        let _ = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        assert_eq!(tracker.warning_count("s1"), 1);

        let result = layer
            .call_tool(
                CallToolRequest::new("datahub_search", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        // Discovery results get no hint.
        assert_eq!(result.first_text(), Some("rows"));
        assert!(tracker.has_performed_discovery("s1"));
        assert_eq!(tracker.warning_count("s1"), 0);

        let result = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        assert_eq!(result.first_text(), Some("rows"));
    }

    #[tokio::test]
    async fn error_results_left_untouched() {
        let tracker = Arc::new(SessionWorkflowTracker::default());
        let layer = RuleEnforcementLayer::new(
            RuleEnforcementConfig::default(),
            Some(tracker.clone()),
            None,
            Arc::new(FixedHandler {
                result: Ok(CallToolResult::error("syntax error")),
            }),
        );
        let result = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("syntax error"));
        // Failed calls are not recorded.
        assert_eq!(tracker.warning_count("s1"), 0);
        assert_eq!(tracker.session_count(), 0);
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let layer = RuleEnforcementLayer::new(
            RuleEnforcementConfig::default(),
            Some(Arc::new(SessionWorkflowTracker::default())),
            None,
            Arc::new(FixedHandler { result: Err(()) }),
        );
        let outcome = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("s1"),
            )
            .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn static_fallback_tips_query_tools() {
        let layer = RuleEnforcementLayer::new(
            RuleEnforcementConfig::default(),
            None,
            Some(Arc::new(StaticRuleEngine {
                require_datahub_check: true,
            })),
            Arc::new(FixedHandler {
                result: Ok(CallToolResult::text("rows")),
            }),
        );
        let result = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        assert!(result.first_text().unwrap().starts_with("Tip:"));

        let result = layer
            .call_tool(
                CallToolRequest::new("datahub_search", serde_json::json!({})),
                extra("s1"),
            )
            .await
            .unwrap();
        assert_eq!(result.first_text(), Some("rows"));
    }

    #[tokio::test]
    async fn warnings_are_per_session() {
        let tracker = Arc::new(SessionWorkflowTracker::default());
        let layer = session_layer(tracker.clone(), 5);
        let _ = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("a"),
            )
            .await
            .unwrap();
        let _ = layer
            .call_tool(
                CallToolRequest::new("trino_query", serde_json::json!({})),
                extra("b"),
            )
            .await
            .unwrap();
        assert_eq!(tracker.warning_count("a"), 1);
        assert_eq!(tracker.warning_count("b"), 1);
    }
}
