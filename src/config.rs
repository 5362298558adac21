//! Host-supplied configuration for the middleware layers.
//!
//! All values are immutable after construction; the host process builds them
//! (from its own config files, flags, or environment) and hands them to the
//! stack builder. Every struct has serde derives so hosts can deserialize
//! them directly from their config format.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// How repeat enrichments for a table already sent in the session are
/// abbreviated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Emit a compact `metadata_reference` block listing the tables.
    #[default]
    Reference,
    /// Emit the semantic context without per-column detail.
    Summary,
    /// Emit nothing.
    None,
}

impl DedupMode {
    /// The lowercase wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Summary => "summary",
            Self::None => "none",
        }
    }
}

/// Enrichment layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Enrich Trino tool results with table semantic context.
    pub enrich_trino_results: bool,
    /// Enrich DataHub tool results with query-engine availability.
    pub enrich_datahub_results: bool,
    /// Enrich S3 tool results with matching dataset context.
    pub enrich_s3_results: bool,
    /// Also attach blob-storage availability to DataHub results.
    pub enrich_datahub_storage_results: bool,
    /// Dedup behavior for repeat table enrichments within a session.
    pub dedup_mode: DedupMode,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enrich_trino_results: true,
            enrich_datahub_results: true,
            enrich_s3_results: true,
            enrich_datahub_storage_results: false,
            dedup_mode: DedupMode::Reference,
        }
    }
}

/// Session-aware workflow gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowRulesConfig {
    /// Warn when a query tool runs before any discovery tool in the session.
    pub require_discovery_before_query: bool,
    /// Standard warning prepended to query results.
    pub warning_message: String,
    /// Number of warnings after which the escalation message is used.
    pub escalation_after_warnings: u32,
    /// Escalation message; `{count}` is replaced with the warning count.
    pub escalation_message: String,
}

impl Default for WorkflowRulesConfig {
    fn default() -> Self {
        Self {
            require_discovery_before_query: true,
            warning_message: "No discovery has been performed in this session. Call the \
                              datahub discovery tools first to look up table schemas, \
                              ownership, and deprecation before writing SQL."
                .to_string(),
            escalation_after_warnings: 3,
            escalation_message: "{count} queries issued without any discovery. Stop and call \
                                 the datahub discovery tools to understand the tables you are \
                                 querying before running more SQL."
                .to_string(),
        }
    }
}

/// Rule enforcement layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEnforcementConfig {
    /// Session-aware workflow gating.
    pub workflow: WorkflowRulesConfig,
    /// Tools treated as query tools by the static fallback path (the
    /// session-aware path asks the workflow tracker instead).
    pub query_tools: HashSet<String>,
}

impl Default for RuleEnforcementConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowRulesConfig::default(),
            query_tools: default_query_tools(),
        }
    }
}

/// The query tools gated by discovery: the SQL entry points.
pub fn default_query_tools() -> HashSet<String> {
    ["trino_query", "trino_execute"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// The discovery tools that mark a session as "has discovered".
pub fn default_discovery_tools() -> HashSet<String> {
    [
        "datahub_search",
        "datahub_get_dataset",
        "datahub_get_schema",
        "datahub_get_lineage",
        "datahub_get_queries",
        "datahub_get_ownership",
        "datahub_get_tags",
        "datahub_get_glossary_terms",
        "datahub_get_domains",
        "datahub_get_deprecation",
        "datahub_list_datasets",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Replacement descriptions applied to `tools/list` responses.
///
/// Built-in defaults steer clients toward discovery-before-SQL; user-supplied
/// overrides win on key collision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolDescriptionOverrides {
    overrides: HashMap<String, String>,
}

impl ToolDescriptionOverrides {
    /// An empty override set (a no-op layer).
    pub fn empty() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// The built-in defaults.
    pub fn defaults() -> Self {
        const SQL_GUIDANCE: &str = "Execute SQL against Trino. Before writing SQL, call the \
                                    datahub discovery tools to find table schemas, ownership, \
                                    and deprecation status, then reference fully qualified \
                                    catalog.schema.table names.";
        Self::empty()
            .with_override("trino_query", SQL_GUIDANCE)
            .with_override("trino_execute", SQL_GUIDANCE)
    }

    /// Add or replace a single override.
    pub fn with_override(mut self, tool_name: impl Into<String>, text: impl Into<String>) -> Self {
        self.overrides.insert(tool_name.into(), text.into());
        self
    }

    /// Overlay user-supplied overrides; user entries win on collision.
    pub fn merged_with(mut self, user: HashMap<String, String>) -> Self {
        self.overrides.extend(user);
        self
    }

    /// The override text for a tool, if any.
    pub fn get(&self, tool_name: &str) -> Option<&str> {
        self.overrides.get(tool_name).map(String::as_str)
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl Default for ToolDescriptionOverrides {
    fn default() -> Self {
        Self::defaults()
    }
}
