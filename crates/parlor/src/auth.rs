//! Identity seam for the admin API.
//!
//! Parlor does not issue or validate tokens itself — that belongs to the
//! external identity service. The service implements [`Authenticator`]: one
//! async method that turns a bearer token into a subject and role. The
//! admin endpoints call it and require [`AccountRole::Admin`].

use std::collections::HashMap;
use std::future::Future;

use http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// Account-level roles known to the identity service. Distinct from the
/// wire-level participant roles: only accounts can be admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Admin,
    Agent,
    Player,
}

/// The identity behind a validated token.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub role: AccountRole,
}

/// Errors from token validation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,
}

/// Validates a bearer token and returns the caller's identity.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send;
}

/// An [`Authenticator`] over a fixed token table.
///
/// For development and tests; production deployments plug in the real
/// identity service instead.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        subject: impl Into<String>,
        role: AccountRole,
    ) -> Self {
        self.tokens.insert(
            token.into(),
            Identity {
                subject: subject.into(),
                role,
            },
        );
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

/// Reads the bearer token from the `Authorization` header, falling back to
/// a `token` query parameter for clients that cannot set headers.
pub(crate) fn bearer_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some((scheme, token)) = value.split_once(' ') {
            let token = token.trim();
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    query_token
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
