//! Authentication and authorization abstractions.
//!
//! The middleware stack never knows about OAuth providers, tokens, or policy
//! engines; it only sees [`UserInfo`] and [`AuthDecision`]. Concrete
//! authenticators (OIDC, static keys) and authorizers (policy engines) live
//! in the host process and implement the traits here. The bundled
//! [`NoopAuthenticator`] and [`AllowAllAuthorizer`] make an unsecured
//! single-tenant deployment work out of the box.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RequestExtra;
use crate::error::Result;

/// Validated identity produced by an [`Authenticator`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable user identifier.
    pub user_id: String,
    /// Email address.
    pub email: String,
    /// Additional claims from the credential.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub claims: HashMap<String, Value>,
    /// Roles granted to the user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Which mechanism authenticated the user ("oidc", "static", "noop").
    pub auth_type: String,
}

/// Establishes who the caller is.
///
/// Returning `Ok(None)` means "no identity, proceed unauthenticated" (for
/// tools that allow anonymous access); returning `Err` means the credential
/// was presented and rejected, which fails the call.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate the request.
    async fn authenticate(&self, extra: &RequestExtra) -> Result<Option<UserInfo>>;
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Persona assigned to the caller for downstream attribution.
    pub persona: String,
    /// Human-readable reason, filled on deny.
    pub reason: String,
}

impl AuthDecision {
    /// Allow the call with the given persona.
    pub fn allow(persona: impl Into<String>) -> Self {
        Self {
            allowed: true,
            persona: persona.into(),
            reason: String::new(),
        }
    }

    /// Deny the call with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            persona: String::new(),
            reason: reason.into(),
        }
    }
}

/// Decides whether an identity may invoke a tool.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Authorize `user_id` (with `roles`) to call `tool_name`.
    async fn authorize(
        &self,
        extra: &RequestExtra,
        user_id: &str,
        roles: &[String],
        tool_name: &str,
    ) -> AuthDecision;
}

/// Authenticator that grants a fixed anonymous identity.
#[derive(Debug, Clone, Default)]
pub struct NoopAuthenticator {
    /// User id to report; defaults to `anonymous`.
    pub default_user_id: Option<String>,
    /// Roles to grant.
    pub default_roles: Vec<String>,
}

impl NoopAuthenticator {
    /// Create a noop authenticator with the default identity.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn authenticate(&self, _extra: &RequestExtra) -> Result<Option<UserInfo>> {
        Ok(Some(UserInfo {
            user_id: self
                .default_user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            email: "anonymous@localhost".to_string(),
            claims: HashMap::new(),
            roles: self.default_roles.clone(),
            auth_type: "noop".to_string(),
        }))
    }
}

/// Authorizer that allows every call with an empty persona.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn authorize(
        &self,
        _extra: &RequestExtra,
        _user_id: &str,
        _roles: &[String],
        _tool_name: &str,
    ) -> AuthDecision {
        AuthDecision::allow("")
    }
}
