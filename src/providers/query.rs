//! Query engine catalog provider interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TableIdentifier;
use crate::error::Result;

/// Whether a cataloged dataset can be queried through the engine, and how.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableAvailability {
    /// Whether the dataset is reachable from the query engine.
    pub available: bool,
    /// Fully qualified table to query.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query_table: String,
    /// Engine connection the table is served by.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connection: String,
    /// Approximate row count, when the engine knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<u64>,
}

/// Read access to the query engine's view of the catalog.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Whether the dataset behind `urn` is queryable.
    async fn table_availability(&self, urn: &str) -> Result<TableAvailability>;

    /// Resolve a catalog URN to the engine's table identifier.
    async fn resolve_table(&self, urn: &str) -> Result<TableIdentifier>;

    /// Example queries recorded against the dataset.
    async fn query_examples(&self, urn: &str) -> Result<Vec<String>>;

    /// Engine execution context for the dataset (session properties,
    /// catalogs in scope).
    async fn execution_context(&self, urn: &str) -> Result<Value>;

    /// The engine-side schema of the dataset.
    async fn table_schema(&self, urn: &str) -> Result<Value>;
}
