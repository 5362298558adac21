//! End-to-end tests for the composed middleware stack.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use mcp_platform::audit::{AuditDispatcher, MemoryAuditSink};
use mcp_platform::auth::{AuthDecision, Authorizer};
use mcp_platform::config::RuleEnforcementConfig;
use mcp_platform::error::{Error, Result};
use mcp_platform::middleware::{ListToolsHandler, PlatformStack, ToolCallHandler};
use mcp_platform::providers::{
    ColumnContext, Deprecation, MetadataProvider, QueryProvider, SearchFilter, TableAvailability,
    TableContext, TableIdentifier, TableSearchResult,
};
use mcp_platform::session::{EnrichmentCacheConfig, SessionEnrichmentCache, SessionWorkflowTracker};
use mcp_platform::types::{
    CallToolRequest, CallToolResult, Content, ListToolsRequest, ListToolsResult, ToolInfo,
};
use mcp_platform::RequestExtra;

struct EchoTool {
    response: String,
    invocations: AtomicUsize,
}

impl EchoTool {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            invocations: AtomicUsize::new(0),
        })
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolCallHandler for EchoTool {
    async fn call_tool(
        &self,
        _request: CallToolRequest,
        _extra: RequestExtra,
    ) -> Result<CallToolResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(CallToolResult::text(self.response.clone()))
    }
}

struct OrdersMetadata;

#[async_trait]
impl MetadataProvider for OrdersMetadata {
    async fn table_context(&self, _table: &TableIdentifier) -> Result<TableContext> {
        Ok(TableContext {
            description: Some("Customer order data".to_string()),
            owners: vec!["data-team".to_string()],
            tags: vec!["pii".to_string(), "production".to_string()],
            deprecation: Some(Deprecation {
                deprecated: true,
                note: None,
            }),
            ..Default::default()
        })
    }

    async fn columns_context(
        &self,
        _table: &TableIdentifier,
    ) -> Result<BTreeMap<String, ColumnContext>> {
        Ok(BTreeMap::new())
    }

    async fn search_tables(&self, _filter: &SearchFilter) -> Result<Vec<TableSearchResult>> {
        Ok(Vec::new())
    }
}

struct StaticQuery;

#[async_trait]
impl QueryProvider for StaticQuery {
    async fn table_availability(&self, _urn: &str) -> Result<TableAvailability> {
        Ok(TableAvailability {
            available: true,
            query_table: "catalog.schema.orders".to_string(),
            connection: "trino".to_string(),
            estimated_rows: None,
        })
    }

    async fn resolve_table(&self, _urn: &str) -> Result<TableIdentifier> {
        TableIdentifier::parse("catalog.schema.orders")
            .ok_or_else(|| Error::internal("unreachable"))
    }

    async fn query_examples(&self, _urn: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn execution_context(&self, _urn: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn table_schema(&self, _urn: &str) -> Result<Value> {
        Ok(Value::Null)
    }
}

struct PolicyDeny;

#[async_trait]
impl Authorizer for PolicyDeny {
    async fn authorize(
        &self,
        _extra: &RequestExtra,
        _user_id: &str,
        _roles: &[String],
        _tool_name: &str,
    ) -> AuthDecision {
        AuthDecision::deny("policy")
    }
}

struct Fixture {
    handler: Arc<dyn ToolCallHandler>,
    tool: Arc<EchoTool>,
    sink: Arc<MemoryAuditSink>,
    dispatcher: Arc<AuditDispatcher>,
    cache: Arc<SessionEnrichmentCache>,
    tracker: Arc<SessionWorkflowTracker>,
}

fn fixture(configure: impl FnOnce(PlatformStack) -> PlatformStack, response: &str) -> Fixture {
    let sink = Arc::new(MemoryAuditSink::default());
    let dispatcher = Arc::new(AuditDispatcher::with_sink(sink.clone()));
    let cache = Arc::new(SessionEnrichmentCache::new(EnrichmentCacheConfig::default()));
    let tracker = Arc::new(SessionWorkflowTracker::default());
    let tool = EchoTool::new(response);

    let stack = configure(
        PlatformStack::new()
            .with_metadata_provider(Arc::new(OrdersMetadata))
            .with_query_provider(Arc::new(StaticQuery))
            .with_session_cache(cache.clone())
            .with_workflow_tracker(tracker.clone())
            .with_rules(RuleEnforcementConfig::default())
            .with_audit(dispatcher.clone()),
    );

    Fixture {
        handler: stack.wrap_tool_handler(tool.clone()),
        tool,
        sink,
        dispatcher,
        cache,
        tracker,
    }
}

fn extra(session: &str) -> RequestExtra {
    RequestExtra::new("wire-1", CancellationToken::new())
        .with_session_id(Some(session.to_string()))
}

async fn call(fixture: &Fixture, session: &str, tool: &str, args: Value) -> CallToolResult {
    fixture
        .handler
        .call_tool(CallToolRequest::new(tool, args), extra(session))
        .await
        .unwrap()
}

fn json_blocks(result: &CallToolResult) -> Vec<Value> {
    result
        .content
        .iter()
        .filter_map(Content::as_text)
        .filter_map(|text| serde_json::from_str(text).ok())
        .collect()
}

fn find_block<'a>(blocks: &'a [Value], key: &str) -> Option<&'a Value> {
    blocks.iter().find_map(|block| block.get(key))
}

#[tokio::test]
async fn authz_deny_fails_closed_and_is_audited() {
    let fixture = fixture(|stack| stack.with_authorizer(Arc::new(PolicyDeny)), "rows");

    let result = call(
        &fixture,
        "sess-a",
        "trino_query",
        json!({"sql": "SELECT * FROM secrets"}),
    )
    .await;

    assert!(result.is_error);
    assert!(result.first_text().unwrap().contains("not authorized"));
    assert_eq!(fixture.tool.invocations(), 0, "tool must not run on deny");

    fixture.dispatcher.shutdown().await;
    let events = fixture.sink.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert!(!events[0].authorized);
}

#[tokio::test]
async fn trino_enrichment_adds_semantic_context() {
    let fixture = fixture(|stack| stack, "DESCRIBE output");

    let result = call(
        &fixture,
        "sess-a",
        "trino_describe_table",
        json!({"catalog": "catalog", "schema": "schema", "table": "orders"}),
    )
    .await;

    assert!(result.content.len() >= 2);
    let blocks = json_blocks(&result);
    let semantic = find_block(&blocks, "semantic_context").expect("semantic context block");
    assert_eq!(semantic["description"], "Customer order data");
    assert_eq!(semantic["deprecation"]["deprecated"], true);
}

#[tokio::test]
async fn dedup_reference_mode_across_two_calls() {
    let fixture = fixture(|stack| stack, "DESCRIBE output");
    let args = json!({"catalog": "catalog", "schema": "schema", "table": "orders"});

    let first = call(&fixture, "sess-a", "trino_describe_table", args.clone()).await;
    let blocks = json_blocks(&first);
    assert!(find_block(&blocks, "semantic_context").is_some());
    assert!(find_block(&blocks, "metadata_reference").is_none());

    let second = call(&fixture, "sess-a", "trino_describe_table", args).await;
    let blocks = json_blocks(&second);
    assert!(find_block(&blocks, "semantic_context").is_none());
    let reference = find_block(&blocks, "metadata_reference").expect("reference block");
    assert!(reference["tables"]
        .as_array()
        .unwrap()
        .contains(&json!("catalog.schema.orders")));

    assert!(fixture.cache.tokens_full() > 0);
    assert!(fixture.cache.tokens_deduped() > 0);
}

#[tokio::test]
async fn sessions_are_isolated_for_dedup() {
    let fixture = fixture(|stack| stack, "DESCRIBE output");
    let args = json!({"table": "catalog.schema.orders"});

    for session in ["sess-a", "sess-b"] {
        let result = call(&fixture, session, "trino_describe_table", args.clone()).await;
        let blocks = json_blocks(&result);
        assert!(
            find_block(&blocks, "semantic_context").is_some(),
            "session {session} must get full enrichment"
        );
    }
    assert_eq!(fixture.cache.session_count(), 2);
}

#[tokio::test]
async fn rule_warnings_escalate_after_threshold() {
    let fixture = fixture(
        |stack| {
            let mut config = RuleEnforcementConfig::default();
            config.workflow.escalation_after_warnings = 2;
            stack.with_rules(config)
        },
        "rows",
    );

    for _ in 0..2 {
        let result = call(&fixture, "sess-a", "trino_query", json!({"sql": "SELECT 1"})).await;
        let first = result.first_text().unwrap();
        assert!(first.contains("discovery"), "standard warning: {first}");
        assert!(!first.contains("queries issued"), "not escalated yet: {first}");
    }

    let result = call(&fixture, "sess-a", "trino_query", json!({"sql": "SELECT 1"})).await;
    let first = result.first_text().unwrap();
    assert!(first.contains('3'), "escalation carries count: {first}");
    assert_eq!(fixture.tracker.warning_count("sess-a"), 3);
}

#[tokio::test]
async fn discovery_silences_warnings() {
    let fixture = fixture(|stack| stack, "rows");

    let _ = call(&fixture, "sess-a", "trino_query", json!({"sql": "SELECT 1"})).await;
    assert_eq!(fixture.tracker.warning_count("sess-a"), 1);

    let _ = call(&fixture, "sess-a", "datahub_search", json!({"query": "orders"})).await;
    assert_eq!(fixture.tracker.warning_count("sess-a"), 0);

    let result = call(&fixture, "sess-a", "trino_query", json!({"sql": "SELECT 1"})).await;
    assert_eq!(result.first_text(), Some("rows"));
}

#[tokio::test]
async fn audit_measures_response_shape() {
    let fixture = fixture(|stack| stack, "hello world response");

    let result = call(&fixture, "sess-a", "echo_tool", json!({"message": "hi"})).await;
    assert!(!result.is_error);

    fixture.dispatcher.shutdown().await;
    let events = fixture.sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert!(event.success);
    assert!(event.authorized);
    assert_eq!(event.response_chars, 20);
    assert_eq!(event.content_blocks, 1);
    assert!(event.request_chars > 0);
    assert_eq!(event.tool_name, "echo_tool");
    assert_eq!(event.session_id, "sess-a");
    assert_eq!(event.source, "mcp");
    assert_eq!(event.user_id, "anonymous");
}

#[tokio::test]
async fn audit_sees_enrichment_flags() {
    let fixture = fixture(|stack| stack, "DESCRIBE output");

    let _ = call(
        &fixture,
        "sess-a",
        "trino_describe_table",
        json!({"table": "catalog.schema.orders"}),
    )
    .await;

    fixture.dispatcher.shutdown().await;
    let events = fixture.sink.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].enrichment_applied);
    assert_eq!(events[0].enrichment_mode, "full");
    assert_eq!(events[0].toolkit_kind, "trino");
    assert!(events[0].response_chars > "DESCRIBE output".len());
}

#[tokio::test]
async fn hints_precede_original_content_and_enrichment() {
    let fixture = fixture(|stack| stack, "rows");

    let result = call(
        &fixture,
        "sess-a",
        "trino_query",
        json!({"table": "catalog.schema.orders"}),
    )
    .await;

    // Rules prepend after enrichment appends: hint first, original next,
    // enrichment blocks after.
    let first = result.content[0].as_text().unwrap();
    assert!(first.contains("discovery") && first.ends_with("---"));
    assert_eq!(result.content[1].as_text(), Some("rows"));
    let blocks = json_blocks(&result);
    assert!(find_block(&blocks, "semantic_context").is_some());
    assert!(find_block(&blocks, "discovery_note").is_some());
}

#[tokio::test]
async fn stdio_fallback_still_dedups() {
    let fixture = fixture(|stack| stack, "DESCRIBE output");
    let args = json!({"table": "catalog.schema.orders"});

    for expectation in ["semantic_context", "metadata_reference"] {
        let result = fixture
            .handler
            .call_tool(
                CallToolRequest::new("trino_describe_table", args.clone()),
                RequestExtra::new("wire-1", CancellationToken::new()),
            )
            .await
            .unwrap();
        let blocks = json_blocks(&result);
        assert!(
            find_block(&blocks, expectation).is_some(),
            "expected {expectation}"
        );
    }
    assert!(fixture.cache.was_sent_recently("stdio", "catalog.schema.orders"));
}

#[tokio::test]
async fn cancelled_requests_still_audit() {
    let fixture = fixture(|stack| stack, "rows");

    let token = CancellationToken::new();
    token.cancel();
    let extra = RequestExtra::new("wire-1", token).with_session_id(Some("sess-a".to_string()));
    let result = fixture
        .handler
        .call_tool(
            CallToolRequest::new("trino_describe_table", json!({"table": "catalog.schema.orders"})),
            extra,
        )
        .await
        .unwrap();
    assert!(!result.is_error);

    fixture.dispatcher.shutdown().await;
    assert_eq!(fixture.sink.len(), 1);
}

#[tokio::test]
async fn datahub_urns_gain_query_context() {
    let sink = Arc::new(MemoryAuditSink::default());
    let dispatcher = Arc::new(AuditDispatcher::with_sink(sink));
    let tool = Arc::new(UrnTool);
    let stack = PlatformStack::new()
        .with_query_provider(Arc::new(StaticQuery))
        .with_audit(dispatcher);
    let handler = stack.wrap_tool_handler(tool);

    let result = handler
        .call_tool(
            CallToolRequest::new("datahub_get_dataset", json!({"urn": "urn:li:dataset:orders"})),
            extra("sess-a"),
        )
        .await
        .unwrap();
    let blocks = json_blocks(&result);
    let query_context = find_block(&blocks, "query_context").expect("query context block");
    assert_eq!(query_context["urn"], "urn:li:dataset:orders");
    assert_eq!(query_context["available"], true);
}

struct UrnTool;

#[async_trait]
impl ToolCallHandler for UrnTool {
    async fn call_tool(
        &self,
        _request: CallToolRequest,
        _extra: RequestExtra,
    ) -> Result<CallToolResult> {
        Ok(CallToolResult::text(
            json!({"urn": "urn:li:dataset:orders", "name": "orders"}).to_string(),
        ))
    }
}

struct StaticToolList;

#[async_trait]
impl ListToolsHandler for StaticToolList {
    async fn list_tools(
        &self,
        _request: ListToolsRequest,
        _extra: RequestExtra,
    ) -> Result<ListToolsResult> {
        Ok(ListToolsResult {
            tools: vec![
                ToolInfo::new(
                    "trino_query",
                    Some("Run SQL".to_string()),
                    json!({"type": "object"}),
                ),
                ToolInfo::new(
                    "datahub_search",
                    Some("Search the catalog".to_string()),
                    json!({"type": "object"}),
                ),
            ],
            next_cursor: None,
        })
    }
}

#[tokio::test]
async fn list_descriptions_are_overridden() {
    let stack = PlatformStack::new();
    let handler = stack.wrap_list_handler(Arc::new(StaticToolList));

    let result = handler
        .list_tools(ListToolsRequest::default(), extra("sess-a"))
        .await
        .unwrap();
    assert!(result.tools[0]
        .description
        .as_deref()
        .unwrap()
        .contains("discovery"));
    assert_eq!(
        result.tools[1].description.as_deref(),
        Some("Search the catalog")
    );
}

#[tokio::test]
async fn concurrent_calls_share_caches_without_interference() {
    let fixture = fixture(|stack| stack, "DESCRIBE output");
    let handler = fixture.handler.clone();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            let session = format!("sess-{}", i % 4);
            handler
                .call_tool(
                    CallToolRequest::new(
                        "trino_describe_table",
                        json!({"table": "catalog.schema.orders"}),
                    ),
                    extra(&session),
                )
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        let result = task.await.unwrap();
        assert!(!result.is_error);
    }
    assert_eq!(fixture.cache.session_count(), 4);
}
