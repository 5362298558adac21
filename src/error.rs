//! Error types for the platform middleware stack.
//!
//! Every fallible operation in the crate returns [`Result`]. Authentication
//! and authorization failures that must surface to the model client are
//! reported as tool-result errors (see [`crate::types::CallToolResult::error`]),
//! not as [`Error`] values; the variants here cover the cases a host process
//! or a provider implementation needs to propagate.

use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the middleware stack and its collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The authenticator could not establish an identity.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A metadata, query, or storage provider call failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The audit sink rejected an event.
    #[error("audit sink error: {0}")]
    Sink(String),

    /// The tool handler failed.
    #[error("tool handler error: {0}")]
    Handler(String),

    /// The request was cancelled before completion.
    #[error("request cancelled")]
    Cancelled,

    /// JSON (de)serialization failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for internal invariant violations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create an audit sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a tool handler error.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::authentication("token expired").to_string(),
            "authentication failed: token expired"
        );
        assert_eq!(
            Error::provider("datahub unreachable").to_string(),
            "provider error: datahub unreachable"
        );
        assert_eq!(Error::Cancelled.to_string(), "request cancelled");
    }

    #[test]
    fn serde_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::Serialization(_)));
    }
}
