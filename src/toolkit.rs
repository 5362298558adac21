//! Tool-name to toolkit resolution.
//!
//! Every tool the server exposes belongs to a toolkit (an SQL engine, a
//! metadata catalog, a blob store). The auth layer resolves the binding once
//! per request and records it on the platform context; the enrichment layer
//! dispatches on the kind.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of upstream a toolkit fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolkitKind {
    /// Trino SQL engine tools.
    Trino,
    /// DataHub metadata catalog tools.
    Datahub,
    /// S3-compatible blob storage tools.
    S3,
}

impl ToolkitKind {
    /// The lowercase wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trino => "trino",
            Self::Datahub => "datahub",
            Self::S3 => "s3",
        }
    }
}

impl fmt::Display for ToolkitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved toolkit binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolkit {
    /// Kind of upstream.
    pub kind: ToolkitKind,
    /// Toolkit instance name.
    pub name: String,
    /// Upstream connection identifier.
    pub connection: String,
}

impl Toolkit {
    /// Create a toolkit binding.
    pub fn new(kind: ToolkitKind, name: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            connection: connection.into(),
        }
    }
}

/// Lookup from tool name to the toolkit that registered it.
pub trait ToolkitResolver: Send + Sync {
    /// Resolve the toolkit a tool belongs to, if any.
    fn toolkit_for_tool(&self, tool_name: &str) -> Option<Toolkit>;
}

/// In-memory resolver backed by explicit registrations, with optional
/// prefix-based fallback (`trino_*`, `datahub_*`, `s3_*`).
#[derive(Debug, Clone, Default)]
pub struct StaticToolkitResolver {
    tools: HashMap<String, Toolkit>,
    prefix_fallback: bool,
}

impl StaticToolkitResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver that maps tools to toolkits by name prefix, so a
    /// host gets sane behavior with zero wiring.
    pub fn with_defaults() -> Self {
        Self {
            tools: HashMap::new(),
            prefix_fallback: true,
        }
    }

    /// Register a tool with its toolkit. Explicit registrations win over
    /// the prefix fallback.
    pub fn with_tool(mut self, tool_name: impl Into<String>, toolkit: Toolkit) -> Self {
        self.tools.insert(tool_name.into(), toolkit);
        self
    }
}

impl ToolkitResolver for StaticToolkitResolver {
    fn toolkit_for_tool(&self, tool_name: &str) -> Option<Toolkit> {
        if let Some(toolkit) = self.tools.get(tool_name) {
            return Some(toolkit.clone());
        }
        if !self.prefix_fallback {
            return None;
        }
        let kind = if tool_name.starts_with("trino_") {
            ToolkitKind::Trino
        } else if tool_name.starts_with("datahub_") {
            ToolkitKind::Datahub
        } else if tool_name.starts_with("s3_") {
            ToolkitKind::S3
        } else {
            return None;
        };
        Some(Toolkit::new(kind, kind.as_str(), "default"))
    }
}
