//! Service discovery and identity tokens.
//!
//! The driver only sees two narrow traits, so it can be exercised against
//! fakes without cloud credentials:
//!
//! * [`ServiceLocator`]: logical service name → public base URL (the audience)
//! * [`TokenProvider`]: audience → short-lived bearer [`Credential`]
//!
//! [`cloudrun_identity::MetadataClient`] implements both against the GCE
//! metadata server and the Cloud Run admin API.

use crate::error::KwkError;
use async_trait::async_trait;
use cloudrun_identity::MetadataClient;
use std::fmt;

/// A bearer token scoped to one audience. Never logged, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header only.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Resolves a logical service name to the service's base URL.
#[async_trait]
pub trait ServiceLocator: Send + Sync {
    async fn resolve_service_url(&self, name: &str) -> Result<String, KwkError>;
}

/// Mints a bearer credential for an audience.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_identity_token(&self, audience: &str) -> Result<Credential, KwkError>;
}

#[async_trait]
impl ServiceLocator for MetadataClient {
    async fn resolve_service_url(&self, name: &str) -> Result<String, KwkError> {
        self.service_url(name)
            .await
            .map_err(|source| KwkError::Discovery {
                action: "resolve the kwkhtmltopdf service URL",
                source,
            })
    }
}

#[async_trait]
impl TokenProvider for MetadataClient {
    async fn fetch_identity_token(&self, audience: &str) -> Result<Credential, KwkError> {
        self.identity_token(audience)
            .await
            .map(Credential::new)
            .map_err(|source| KwkError::Discovery {
                action: "fetch an identity token",
                source,
            })
    }
}
