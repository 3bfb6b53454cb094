//! Client configuration.
//!
//! Everything the client needs besides the command-line tokens lives in
//! [`ClientConfig`], built via [`ClientConfigBuilder`] or read from the
//! process environment with [`ClientConfig::from_env`].
//!
//! | Variable | Field | Meaning |
//! |----------|-------|---------|
//! | `KWKHTMLTOPDF_SERVER_URL` | `server_url` | endpoint the multipart request is POSTed to |
//! | `K_SERVICE` | `service_name` | Cloud Run service whose URL is the token audience |
//! | `KWKHTMLTOPDF_TIMEOUT` | `timeout` | optional request timeout in seconds |

use crate::error::KwkError;
use std::time::Duration;

/// Size of each write to the output while streaming the response.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub const SERVER_URL_ENV: &str = "KWKHTMLTOPDF_SERVER_URL";
pub const SERVICE_NAME_ENV: &str = "K_SERVICE";
pub const TIMEOUT_ENV: &str = "KWKHTMLTOPDF_TIMEOUT";

/// Configuration for one render invocation.
///
/// # Example
/// ```rust
/// use kwkhtmltopdf_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .server_url("https://kwk.example.com")
///     .service_name("kwkhtmltopdf")
///     .build()
///     .unwrap();
/// assert!(config.timeout.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL the render request is POSTed to.
    pub server_url: Option<String>,

    /// Logical Cloud Run service name used to look up the token audience.
    pub service_name: Option<String>,

    /// Maximum bytes per write while copying the response to the output. Default: 65 536.
    pub chunk_size: usize,

    /// Whole-request timeout. Default: `None`, the call blocks until the
    /// server answers or the connection fails.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            service_name: None,
            chunk_size: CHUNK_SIZE,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
            raw_timeout: None,
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, KwkError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KwkError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(url) = get(SERVER_URL_ENV) {
            builder = builder.server_url(url);
        }
        if let Some(name) = get(SERVICE_NAME_ENV) {
            builder = builder.service_name(name);
        }
        if let Some(raw) = get(TIMEOUT_ENV) {
            builder.raw_timeout = Some(raw);
        }
        builder.build()
    }

    /// The POST target, or an error naming the variable to set.
    pub fn require_server_url(&self) -> Result<&str, KwkError> {
        self.server_url
            .as_deref()
            .ok_or(KwkError::MissingConfig {
                name: SERVER_URL_ENV,
                hint: "Set it to the URL of the kwkhtmltopdf rendering endpoint.",
            })
    }

    /// The Cloud Run service name, or an error naming the variable to set.
    pub fn require_service_name(&self) -> Result<&str, KwkError> {
        self.service_name
            .as_deref()
            .ok_or(KwkError::MissingConfig {
                name: SERVICE_NAME_ENV,
                hint: "Set it to the Cloud Run service name of the kwkhtmltopdf server.",
            })
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
    raw_timeout: Option<String>,
}

impl ClientConfigBuilder {
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = Some(url.into().trim().to_string());
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = Some(name.into().trim().to_string());
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self.raw_timeout = None;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ClientConfig, KwkError> {
        if let Some(raw) = self.raw_timeout.take() {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                KwkError::InvalidConfig(format!(
                    "{TIMEOUT_ENV} must be a whole number of seconds, got '{raw}'"
                ))
            })?;
            // Zero keeps the blocking default.
            self.config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(ref url) = self.config.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(KwkError::InvalidConfig(format!(
                    "{SERVER_URL_ENV} must be an http:// or https:// URL, got '{url}'"
                )));
            }
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_block_and_use_64k_chunks() {
        let config = ClientConfig::default();
        assert_eq!(config.chunk_size, 65_536);
        assert!(config.timeout.is_none());
        assert!(config.server_url.is_none());
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("KWKHTMLTOPDF_SERVER_URL", "https://kwk.example.com/"),
            ("K_SERVICE", "kwkhtmltopdf"),
            ("KWKHTMLTOPDF_TIMEOUT", "90"),
        ]))
        .unwrap();
        assert_eq!(config.require_server_url().unwrap(), "https://kwk.example.com/");
        assert_eq!(config.require_service_name().unwrap(), "kwkhtmltopdf");
        assert_eq!(config.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config =
            ClientConfig::from_lookup(lookup(&[("KWKHTMLTOPDF_SERVER_URL", "  ")])).unwrap();
        let err = config.require_server_url().unwrap_err();
        assert!(err.to_string().contains("KWKHTMLTOPDF_SERVER_URL"));
        assert!(config.require_service_name().is_err());
    }

    #[test]
    fn zero_timeout_keeps_blocking_default() {
        let config = ClientConfig::from_lookup(lookup(&[("KWKHTMLTOPDF_TIMEOUT", "0")])).unwrap();
        assert!(config.timeout.is_none());
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("KWKHTMLTOPDF_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, KwkError::InvalidConfig(_)), "got: {err:?}");
    }

    #[test]
    fn non_http_server_url_is_rejected() {
        let err = ClientConfig::builder()
            .server_url("ftp://kwk.example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn chunk_size_is_at_least_one() {
        let config = ClientConfig::builder().chunk_size(0).build().unwrap();
        assert_eq!(config.chunk_size, 1);
    }
}
