//! Caller identity.
//!
//! Authentication itself happens elsewhere; this crate only consumes it as
//! "resolve the caller from ambient credentials, or reject".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AuthError;

/// Identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credentials extracted from an incoming request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Value of an `Authorization: Bearer <token>` header
    pub bearer_token: Option<String>,
}

/// Resolves the caller of a request.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credentials: &Credentials) -> Result<UserId, AuthError>;
}

/// Resolver backed by a fixed token → user table.
pub struct StaticTokenResolver {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, user)| (token, UserId(user)))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, credentials: &Credentials) -> Result<UserId, AuthError> {
        credentials
            .bearer_token
            .as_deref()
            .and_then(|token| self.tokens.get(token))
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}
