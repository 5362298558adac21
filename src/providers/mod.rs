//! Upstream provider interfaces and their shared data model.
//!
//! The enrichment layer talks to three kinds of upstreams through the traits
//! in the submodules: a metadata catalog ([`metadata::MetadataProvider`]),
//! a query engine's catalog surface ([`query::QueryProvider`]), and a blob
//! storage index ([`storage::StorageProvider`]). Concrete implementations
//! live in the host process.

pub mod metadata;
pub mod query;
pub mod storage;

pub use metadata::{
    ColumnContext, Deprecation, MetadataProvider, SearchFilter, TableContext, TableSearchResult,
};
pub use query::{QueryProvider, TableAvailability};
pub use storage::{DatasetAvailability, StorageProvider};

use serde::{Deserialize, Serialize};

/// A fully qualified table reference: `catalog.schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    /// Catalog the table lives in.
    pub catalog: String,
    /// Schema within the catalog.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl TableIdentifier {
    /// Build an identifier from its parts. Returns `None` when any part is
    /// empty after trimming.
    pub fn from_parts(catalog: &str, schema: &str, table: &str) -> Option<Self> {
        let catalog = catalog.trim();
        let schema = schema.trim();
        let table = table.trim();
        if catalog.is_empty() || schema.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Parse a combined `catalog.schema.table` string. Returns `None` for
    /// anything that is not exactly three non-empty dot-separated parts;
    /// never panics, whatever the input.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input.trim().split('.');
        let catalog = parts.next()?;
        let schema = parts.next()?;
        let table = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Self::from_parts(catalog, schema, table)
    }

    /// Canonical dedup key: the lowercase `catalog.schema.table` form.
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, self.table).to_lowercase()
    }
}

impl std::fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}
