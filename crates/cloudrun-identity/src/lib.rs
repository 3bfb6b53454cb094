//! # cloudrun-identity
//!
//! Resolve the public URL of a Cloud Run service and mint Google-signed ID
//! tokens for it, using nothing but the GCE metadata server and the Cloud Run
//! admin API. This is the small slice of Google's default-credentials flow a
//! service-to-service caller needs, without pulling in a full GCP SDK.
//!
//! ## How it works
//!
//! 1. The project id comes from `GOOGLE_CLOUD_PROJECT` / `GCLOUD_PROJECT`,
//!    falling back to `project/project-id` on the metadata server.
//! 2. An OAuth access token for the default service account is read from
//!    `instance/service-accounts/default/token`.
//! 3. [`MetadataClient::service_url`] lists the project's services through
//!    `run.googleapis.com` and returns `status.url` of the matching one.
//! 4. [`MetadataClient::identity_token`] asks the metadata server for an ID
//!    token whose `aud` claim is that URL.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloudrun_identity::MetadataClient;
//!
//! # async fn demo() -> Result<(), cloudrun_identity::IdentityError> {
//! let client = MetadataClient::from_env()?;
//! let url = client.service_url("kwkhtmltopdf").await?;
//! let token = client.identity_token(&url).await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `GCE_METADATA_HOST`: `host[:port]` of the metadata server.
//! - `GOOGLE_CLOUD_PROJECT` / `GCLOUD_PROJECT`: skip the project-id lookup.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ── Public constants ─────────────────────────────────────────────────────────

/// Metadata server host used when `GCE_METADATA_HOST` is unset.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Base URL of the Cloud Run admin API.
pub const DEFAULT_RUN_API: &str = "https://run.googleapis.com";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";
const ACCESS_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by cloudrun-identity operations.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// A metadata server request failed or returned a non-200 status.
    #[error("Metadata server request '{path}' failed: {reason}")]
    Metadata { path: String, reason: String },

    /// The Cloud Run admin API request failed.
    #[error("Cloud Run API request failed: {0}")]
    RunApi(String),

    /// No service with the given name exists in the project.
    #[error("Cloud Run service '{name}' not found in project '{project}'")]
    ServiceNotFound { name: String, project: String },
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

/// Subset of the `serving.knative.dev/v1` `ServiceList` resource.
#[derive(Debug, Default, Deserialize)]
struct ServiceList {
    #[serde(default)]
    items: Vec<ServiceItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceItem {
    #[serde(default)]
    metadata: ServiceMetadata,
    #[serde(default)]
    status: ServiceStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceMetadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceStatus {
    #[serde(default)]
    url: Option<String>,
}

impl ServiceList {
    fn url_of(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.metadata.name == name)
            .and_then(|item| item.status.url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Talks to the metadata server and the Cloud Run admin API.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    metadata_base: String,
    run_api_base: String,
    project_id: Option<String>,
}

impl MetadataClient {
    /// Create a client configured from `GCE_METADATA_HOST`,
    /// `GOOGLE_CLOUD_PROJECT` and `GCLOUD_PROJECT`.
    pub fn from_env() -> Result<Self, IdentityError> {
        let mut builder = Self::builder();
        if let Some(host) = non_empty_env("GCE_METADATA_HOST") {
            builder = builder.metadata_base(format!("http://{host}"));
        }
        if let Some(project) =
            non_empty_env("GOOGLE_CLOUD_PROJECT").or_else(|| non_empty_env("GCLOUD_PROJECT"))
        {
            builder = builder.project_id(project);
        }
        builder.build()
    }

    /// Create a builder with the production endpoints.
    pub fn builder() -> MetadataClientBuilder {
        MetadataClientBuilder {
            metadata_base: format!("http://{DEFAULT_METADATA_HOST}"),
            run_api_base: DEFAULT_RUN_API.to_string(),
            project_id: None,
        }
    }

    /// The GCP project id, from configuration or the metadata server.
    pub async fn project_id(&self) -> Result<String, IdentityError> {
        if let Some(ref project) = self.project_id {
            return Ok(project.clone());
        }
        self.metadata_get(PROJECT_ID_PATH, &[]).await
    }

    /// An OAuth2 access token for the instance's default service account.
    pub async fn access_token(&self) -> Result<String, IdentityError> {
        let body = self.metadata_get(ACCESS_TOKEN_PATH, &[]).await?;
        let token: AccessToken =
            serde_json::from_str(&body).map_err(|e| IdentityError::Metadata {
                path: ACCESS_TOKEN_PATH.to_string(),
                reason: format!("invalid token response: {e}"),
            })?;
        Ok(token.access_token)
    }

    /// A Google-signed ID token whose audience is `audience`.
    pub async fn identity_token(&self, audience: &str) -> Result<String, IdentityError> {
        let token = self
            .metadata_get(IDENTITY_PATH, &[("audience", audience)])
            .await?;
        if token.is_empty() {
            return Err(IdentityError::Metadata {
                path: IDENTITY_PATH.to_string(),
                reason: "empty identity token".to_string(),
            });
        }
        Ok(token)
    }

    /// Look up the public URL of the Cloud Run service called `name`.
    pub async fn service_url(&self, name: &str) -> Result<String, IdentityError> {
        let project = self.project_id().await?;
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/apis/serving.knative.dev/v1/namespaces/{}/services",
            self.run_api_base, project
        );
        debug!("Listing Cloud Run services: {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::RunApi(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::RunApi(format!(
                "HTTP {status} for {url}: {}",
                compact(&body)
            )));
        }

        let services: ServiceList = response
            .json()
            .await
            .map_err(|e| IdentityError::RunApi(format!("invalid service list: {e}")))?;

        services
            .url_of(name)
            .map(str::to_string)
            .ok_or_else(|| IdentityError::ServiceNotFound {
                name: name.to_string(),
                project,
            })
    }

    async fn metadata_get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, IdentityError> {
        let url = format!("{}{}", self.metadata_base, path);
        let metadata_err = |reason: String| IdentityError::Metadata {
            path: path.to_string(),
            reason,
        };

        let response = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .query(query)
            .send()
            .await
            .map_err(|e| metadata_err(format!("connection failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(metadata_err(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| metadata_err(format!("read failed: {e}")))?;
        Ok(body.trim().to_string())
    }
}

/// Builder for [`MetadataClient`].
#[derive(Debug)]
pub struct MetadataClientBuilder {
    metadata_base: String,
    run_api_base: String,
    project_id: Option<String>,
}

impl MetadataClientBuilder {
    /// Base URL of the metadata server, e.g. `http://169.254.169.254`.
    pub fn metadata_base(mut self, base: impl Into<String>) -> Self {
        self.metadata_base = trim_base(base.into());
        self
    }

    /// Base URL of the Cloud Run admin API.
    pub fn run_api_base(mut self, base: impl Into<String>) -> Self {
        self.run_api_base = trim_base(base.into());
        self
    }

    /// Use a fixed project id instead of asking the metadata server.
    pub fn project_id(mut self, project: impl Into<String>) -> Self {
        self.project_id = Some(project.into());
        self
    }

    pub fn build(self) -> Result<MetadataClient, IdentityError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Client(e.to_string()))?;
        Ok(MetadataClient {
            http,
            metadata_base: self.metadata_base,
            run_api_base: self.run_api_base,
            project_id: self.project_id,
        })
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

/// API error bodies are pretty-printed JSON; keep them on one line.
fn compact(body: &str) -> String {
    body.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MetadataClient {
        MetadataClient::builder()
            .metadata_base(server.uri())
            .run_api_base(server.uri())
            .build()
            .unwrap()
    }

    #[test]
    fn service_list_picks_matching_name() {
        let list: ServiceList = serde_json::from_str(
            r#"{"items": [
                {"metadata": {"name": "other"}, "status": {"url": "https://other.run.app"}},
                {"metadata": {"name": "kwk"}, "status": {"url": "https://kwk.run.app"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(list.url_of("kwk"), Some("https://kwk.run.app"));
        assert_eq!(list.url_of("missing"), None);
    }

    #[test]
    fn service_list_tolerates_missing_fields() {
        let list: ServiceList =
            serde_json::from_str(r#"{"items": [{"metadata": {"name": "kwk"}}]}"#).unwrap();
        assert_eq!(list.url_of("kwk"), None);

        let empty: ServiceList = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let client = MetadataClient::builder()
            .metadata_base("http://127.0.0.1:8080/")
            .build()
            .unwrap();
        assert_eq!(client.metadata_base, "http://127.0.0.1:8080");
        assert_eq!(client.run_api_base, DEFAULT_RUN_API);
    }

    #[tokio::test]
    async fn project_id_prefers_configured_value() {
        let server = MockServer::start().await;
        let client = MetadataClient::builder()
            .metadata_base(server.uri())
            .project_id("configured")
            .build()
            .unwrap();
        assert_eq!(client.project_id().await.unwrap(), "configured");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn project_id_from_metadata_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECT_ID_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("my-project\n"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.project_id().await.unwrap(), "my-project");
    }

    #[tokio::test]
    async fn identity_token_passes_audience() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(IDENTITY_PATH))
            .and(query_param("audience", "https://kwk.run.app"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("eyJhbGciOi.id.token"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let token = client.identity_token("https://kwk.run.app").await.unwrap();
        assert_eq!(token, "eyJhbGciOi.id.token");
    }

    #[tokio::test]
    async fn identity_token_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(IDENTITY_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.identity_token("https://kwk.run.app").await.unwrap_err();
        assert!(matches!(err, IdentityError::Metadata { .. }), "got: {err:?}");
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn service_url_lists_services_with_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECT_ID_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("proj"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(ACCESS_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis/serving.knative.dev/v1/namespaces/proj/services"))
            .and(header("Authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"metadata": {"name": "kwk"}, "status": {"url": "https://kwk-abc.a.run.app"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.service_url("kwk").await.unwrap(),
            "https://kwk-abc.a.run.app"
        );

        let err = client.service_url("nope").await.unwrap_err();
        assert!(
            matches!(err, IdentityError::ServiceNotFound { ref name, ref project } if name == "nope" && project == "proj"),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn service_url_surfaces_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ACCESS_TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"access_token": "t"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis/serving.knative.dev/v1/namespaces/proj/services"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "{\n  \"error\": {\n    \"code\": 403,\n    \"message\": \"permission denied\"\n  }\n}\n",
            ))
            .mount(&server)
            .await;

        let client = MetadataClient::builder()
            .metadata_base(server.uri())
            .run_api_base(server.uri())
            .project_id("proj")
            .build()
            .unwrap();
        let err = client.service_url("kwk").await.unwrap_err();
        assert!(matches!(err, IdentityError::RunApi(_)), "got: {err:?}");
        let msg = err.to_string();
        assert!(msg.contains(r#""message": "permission denied""#), "got: {msg}");
        assert!(!msg.contains('\n'), "got: {msg:?}");
    }
}
