//! Enrichment layer for `tools/call`.
//!
//! After the tool handler returns, this layer appends cross-service context
//! blocks to the result, dispatched on the toolkit kind recorded in the
//! platform context:
//!
//! - **trino**: semantic context for the table named in the arguments, from
//!   the metadata provider;
//! - **datahub**: query-engine (and optionally blob-storage) availability
//!   for every URN found in the result and arguments;
//! - **s3**: semantic context for cataloged datasets matching the
//!   `{bucket}/{prefix}` location.
//!
//! Each appended block is a text block whose body is a JSON object keyed
//! `semantic_context`, `query_context`, `storage_context`, or
//! `metadata_reference`. With a session cache attached, repeats of a table
//! already sent in the session are abbreviated per the configured
//! [`DedupMode`]. Enrichment is strictly best-effort: provider failures,
//! malformed arguments, and cancellation all leave the original result
//! intact.

mod datahub;
mod s3;
mod trino;

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{DedupMode, EnrichmentConfig};
use crate::context::RequestExtra;
use crate::error::Result;
use crate::providers::{
    ColumnContext, DatasetAvailability, MetadataProvider, QueryProvider, SearchFilter,
    StorageProvider, TableAvailability, TableContext, TableIdentifier,
};
use crate::session::{SessionEnrichmentCache, SessionWorkflowTracker};
use crate::toolkit::ToolkitKind;
use crate::types::{CallToolRequest, CallToolResult, Content};

use super::ToolCallHandler;

const DISCOVERY_NOTE: &str = "No catalog discovery has been performed in this session. Call the \
                              datahub discovery tools to look up table documentation, ownership, \
                              and deprecation before relying on these results.";

#[derive(Debug, Serialize)]
struct SemanticContext {
    table: String,
    #[serde(flatten)]
    context: TableContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    column_context: Option<BTreeMap<String, ColumnContext>>,
}

#[derive(Debug, Serialize)]
struct SemanticBlock {
    semantic_context: SemanticContext,
}

#[derive(Debug, Serialize)]
struct QueryContext<'a> {
    urn: &'a str,
    #[serde(flatten)]
    availability: TableAvailability,
}

#[derive(Debug, Serialize)]
struct QueryBlock<'a> {
    query_context: QueryContext<'a>,
}

#[derive(Debug, Serialize)]
struct StorageContext<'a> {
    urn: &'a str,
    #[serde(flatten)]
    availability: DatasetAvailability,
}

#[derive(Debug, Serialize)]
struct StorageBlock<'a> {
    storage_context: StorageContext<'a>,
}

/// Blocks and bookkeeping accumulated while enriching one call.
#[derive(Debug, Default)]
struct EnrichmentOutcome {
    blocks: Vec<Content>,
    reference_tables: Vec<String>,
    seen_tables: HashSet<String>,
    deduped: bool,
}

/// Rough token estimate for a rendered payload.
fn estimate_tokens(chars: usize) -> u64 {
    (chars.div_ceil(4)).max(1) as u64
}

fn render_block<T: Serialize>(payload: &T) -> Option<String> {
    match serde_json::to_string(payload) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(error = %err, "failed to render enrichment block");
            None
        }
    }
}

/// Run a provider call, bailing out when the request is cancelled.
async fn with_cancellation<T>(
    extra: &RequestExtra,
    call: impl Future<Output = Result<T>>,
) -> Option<Result<T>> {
    tokio::select! {
        biased;
        () = extra.cancelled() => {
            tracing::debug!("enrichment cancelled");
            None
        }
        outcome = call => Some(outcome),
    }
}

/// The enrichment layer.
pub struct EnrichmentLayer {
    config: EnrichmentConfig,
    metadata: Option<Arc<dyn MetadataProvider>>,
    query: Option<Arc<dyn QueryProvider>>,
    storage: Option<Arc<dyn StorageProvider>>,
    cache: Option<Arc<SessionEnrichmentCache>>,
    tracker: Option<Arc<SessionWorkflowTracker>>,
    next: Arc<dyn ToolCallHandler>,
}

impl EnrichmentLayer {
    /// Wrap `next` with result enrichment.
    pub fn new(
        config: EnrichmentConfig,
        metadata: Option<Arc<dyn MetadataProvider>>,
        query: Option<Arc<dyn QueryProvider>>,
        storage: Option<Arc<dyn StorageProvider>>,
        cache: Option<Arc<SessionEnrichmentCache>>,
        tracker: Option<Arc<SessionWorkflowTracker>>,
        next: Arc<dyn ToolCallHandler>,
    ) -> Self {
        Self {
            config,
            metadata,
            query,
            storage,
            cache,
            tracker,
            next,
        }
    }

    /// Append a table's semantic context, abbreviated when the session has
    /// seen the table recently.
    async fn emit_table_context(
        &self,
        ident: &TableIdentifier,
        session: &str,
        extra: &RequestExtra,
        outcome: &mut EnrichmentOutcome,
    ) {
        let Some(metadata) = &self.metadata else { return };
        let key = ident.key();
        if !outcome.seen_tables.insert(key.clone()) {
            return;
        }

        let sent_recently = self
            .cache
            .as_ref()
            .is_some_and(|cache| cache.was_sent_recently(session, &key));
        if sent_recently {
            outcome.deduped = true;
            if let Some(cache) = &self.cache {
                cache.add_tokens_deduped(cache.token_count(session, &key));
            }
            match self.config.dedup_mode {
                DedupMode::Reference => outcome.reference_tables.push(key),
                DedupMode::Summary => {
                    let Some(context) = with_cancellation(extra, metadata.table_context(ident)).await
                    else {
                        return;
                    };
                    match context {
                        Ok(context) => {
                            let payload = SemanticBlock {
                                semantic_context: SemanticContext {
                                    table: key,
                                    context,
                                    column_context: None,
                                },
                            };
                            if let Some(text) = render_block(&payload) {
                                outcome.blocks.push(Content::text(text));
                            }
                        }
                        Err(err) => {
                            tracing::debug!(table = %ident, error = %err, "summary enrichment skipped");
                        }
                    }
                }
                DedupMode::None => {}
            }
            return;
        }

        let Some(context) = with_cancellation(extra, metadata.table_context(ident)).await else {
            return;
        };
        let context = match context {
            Ok(context) => context,
            Err(err) => {
                tracing::debug!(table = %ident, error = %err, "table context unavailable, skipping enrichment");
                return;
            }
        };
        let columns = match with_cancellation(extra, metadata.columns_context(ident)).await {
            Some(Ok(columns)) => columns,
            Some(Err(err)) => {
                tracing::debug!(table = %ident, error = %err, "column context unavailable");
                BTreeMap::new()
            }
            None => return,
        };

        let payload = SemanticBlock {
            semantic_context: SemanticContext {
                table: key.clone(),
                context,
                column_context: (!columns.is_empty()).then_some(columns),
            },
        };
        let Some(text) = render_block(&payload) else { return };
        let tokens = estimate_tokens(text.len());
        outcome.blocks.push(Content::text(text));
        if let Some(cache) = &self.cache {
            cache.mark_sent(session, &key, tokens);
            cache.add_tokens_full(tokens);
        }
    }

    async fn enrich_trino(
        &self,
        args: &Value,
        session: &str,
        extra: &RequestExtra,
        outcome: &mut EnrichmentOutcome,
    ) {
        let Some(ident) = trino::table_from_args(args) else {
            return;
        };
        self.emit_table_context(&ident, session, extra, outcome).await;
    }

    async fn enrich_datahub(
        &self,
        args: &Value,
        content: &[Content],
        extra: &RequestExtra,
        outcome: &mut EnrichmentOutcome,
    ) {
        let Some(query) = &self.query else { return };
        for urn in datahub::collect_urns(args, content) {
            if extra.is_cancelled() {
                break;
            }
            let Some(availability) = with_cancellation(extra, query.table_availability(&urn)).await
            else {
                break;
            };
            let availability = match availability {
                Ok(availability) => availability,
                Err(err) => {
                    tracing::debug!(urn = %urn, error = %err, "availability lookup failed, skipping urn");
                    continue;
                }
            };
            let payload = QueryBlock {
                query_context: QueryContext {
                    urn: &urn,
                    availability,
                },
            };
            if let Some(text) = render_block(&payload) {
                outcome.blocks.push(Content::text(text));
            }

            if !self.config.enrich_datahub_storage_results {
                continue;
            }
            let Some(storage) = &self.storage else { continue };
            match with_cancellation(extra, storage.dataset_availability(&urn)).await {
                Some(Ok(availability)) => {
                    let payload = StorageBlock {
                        storage_context: StorageContext {
                            urn: &urn,
                            availability,
                        },
                    };
                    if let Some(text) = render_block(&payload) {
                        outcome.blocks.push(Content::text(text));
                    }
                }
                Some(Err(err)) => {
                    tracing::debug!(urn = %urn, error = %err, "storage availability lookup failed");
                }
                None => break,
            }
        }
    }

    async fn enrich_s3(
        &self,
        args: &Value,
        session: &str,
        extra: &RequestExtra,
        outcome: &mut EnrichmentOutcome,
    ) {
        let Some(query) = s3::location_query(args) else {
            return;
        };
        let Some(metadata) = &self.metadata else { return };
        let filter = SearchFilter { query, limit: 5 };
        let hits = match with_cancellation(extra, metadata.search_tables(&filter)).await {
            Some(Ok(hits)) => hits,
            Some(Err(err)) => {
                tracing::debug!(query = %filter.query, error = %err, "dataset search failed");
                return;
            }
            None => return,
        };
        for hit in hits {
            if extra.is_cancelled() {
                break;
            }
            let Some(ident) = TableIdentifier::parse(&hit.name) else {
                tracing::debug!(name = %hit.name, "search hit is not a table reference");
                continue;
            };
            self.emit_table_context(&ident, session, extra, outcome).await;
        }
    }
}

#[async_trait]
impl ToolCallHandler for EnrichmentLayer {
    async fn call_tool(
        &self,
        request: CallToolRequest,
        extra: RequestExtra,
    ) -> Result<CallToolResult> {
        let tool_name = request.name.clone();
        let arguments = request.arguments.clone();
        let session = extra.effective_session_id();

        let mut result = self.next.call_tool(request, extra.clone()).await?;
        if result.is_error {
            return Ok(result);
        }

        let shared = extra.platform_or_init();
        let kind = shared.read().toolkit_kind;

        let mut outcome = EnrichmentOutcome::default();
        let attempted = match kind {
            Some(ToolkitKind::Trino) if self.config.enrich_trino_results => {
                self.enrich_trino(&arguments, &session, &extra, &mut outcome)
                    .await;
                true
            }
            Some(ToolkitKind::Datahub) if self.config.enrich_datahub_results => {
                self.enrich_datahub(&arguments, &result.content, &extra, &mut outcome)
                    .await;
                true
            }
            Some(ToolkitKind::S3) if self.config.enrich_s3_results => {
                self.enrich_s3(&arguments, &session, &extra, &mut outcome)
                    .await;
                true
            }
            _ => false,
        };

        if !outcome.reference_tables.is_empty() {
            let tables = std::mem::take(&mut outcome.reference_tables);
            let payload = json!({"metadata_reference": {"tables": tables}});
            if let Some(text) = render_block(&payload) {
                outcome.blocks.push(Content::text(text));
            }
        }

        if !outcome.blocks.is_empty() {
            result.content.append(&mut outcome.blocks);
            let mut ctx = shared.write();
            ctx.enrichment_applied = true;
            ctx.enrichment_mode = if outcome.deduped {
                self.config.dedup_mode.as_str().to_string()
            } else {
                "full".to_string()
            };
        }

        if attempted {
            if let Some(tracker) = &self.tracker {
                if !tracker.is_discovery_tool(&tool_name)
                    && !tracker.has_performed_discovery(&session)
                {
                    let payload = json!({"discovery_note": DISCOVERY_NOTE});
                    if let Some(text) = render_block(&payload) {
                        result.content.push(Content::text(text));
                    }
                }
            }
        }

        Ok(result)
    }
}

impl std::fmt::Debug for EnrichmentLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentLayer")
            .field("config", &self.config)
            .field("metadata", &self.metadata.is_some())
            .field("query", &self.query.is_some())
            .field("storage", &self.storage.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
