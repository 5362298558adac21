//! Description override layer for `tools/list`.
//!
//! Replaces tool descriptions in list responses so clients see
//! platform-curated guidance (the defaults steer SQL tools toward
//! discovery-first usage). Only `tools/list` is intercepted; tools without
//! an override and wrapped-handler errors pass through untouched.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ToolDescriptionOverrides;
use crate::context::RequestExtra;
use crate::error::Result;
use crate::types::{ListToolsRequest, ListToolsResult};

use super::ListToolsHandler;

/// The description override layer.
pub struct DescriptionOverrideLayer {
    overrides: ToolDescriptionOverrides,
    next: Arc<dyn ListToolsHandler>,
}

impl DescriptionOverrideLayer {
    /// Wrap `next` with the given overrides.
    pub fn new(overrides: ToolDescriptionOverrides, next: Arc<dyn ListToolsHandler>) -> Self {
        Self { overrides, next }
    }
}

#[async_trait]
impl ListToolsHandler for DescriptionOverrideLayer {
    async fn list_tools(
        &self,
        request: ListToolsRequest,
        extra: RequestExtra,
    ) -> Result<ListToolsResult> {
        let mut result = self.next.list_tools(request, extra).await?;
        if self.overrides.is_empty() {
            return Ok(result);
        }
        for tool in &mut result.tools {
            if let Some(text) = self.overrides.get(&tool.name) {
                tool.description = Some(text.to_string());
            }
        }
        Ok(result)
    }
}

impl std::fmt::Debug for DescriptionOverrideLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptionOverrideLayer").finish()
    }
}
