//! Metadata catalog provider interface.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TableIdentifier;
use crate::error::Result;

/// Deprecation status of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deprecation {
    /// Whether the table is deprecated.
    pub deprecated: bool,
    /// Optional note explaining the deprecation or pointing at the
    /// replacement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Cross-service semantic context for a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableContext {
    /// Catalog URN of the backing dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    /// Table description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning teams or users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    /// Governance tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Business domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Data quality score, 0.0 to 1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Deprecation status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    /// Glossary terms attached to the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glossary_terms: Vec<String>,
    /// Free-form catalog properties.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_properties: HashMap<String, String>,
    /// Last modification time recorded by the catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Semantic context for a single column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnContext {
    /// Column description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Governance tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Glossary terms attached to the column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glossary_terms: Vec<String>,
}

/// A dataset search hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSearchResult {
    /// Fully qualified `catalog.schema.table` name.
    pub name: String,
    /// Catalog URN.
    pub urn: String,
    /// Dataset description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Dataset search parameters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Free-text query.
    pub query: String,
    /// Maximum number of hits to return.
    pub limit: usize,
}

/// Read access to the metadata catalog.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Semantic context for a table.
    async fn table_context(&self, table: &TableIdentifier) -> Result<TableContext>;

    /// Per-column semantic context for a table.
    async fn columns_context(
        &self,
        table: &TableIdentifier,
    ) -> Result<BTreeMap<String, ColumnContext>>;

    /// Search the catalog for datasets.
    async fn search_tables(&self, filter: &SearchFilter) -> Result<Vec<TableSearchResult>>;
}
