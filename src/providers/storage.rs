//! Blob storage provider interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether a cataloged dataset has a materialization in blob storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetAvailability {
    /// Whether the dataset's files are present in storage.
    pub available: bool,
    /// Storage location (`s3://bucket/prefix`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// File format ("parquet", "orc", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Read access to the blob storage index.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Whether the dataset behind `urn` is materialized in storage.
    async fn dataset_availability(&self, urn: &str) -> Result<DatasetAvailability>;
}
