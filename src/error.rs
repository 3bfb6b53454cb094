//! Error types for the kwkhtmltopdf client.
//!
//! Every failure is a [`KwkError`] variant, and every variant belongs to
//! exactly one [`ErrorCategory`]. The category is fixed where the error is
//! first detected and never changes on the way up; the binary is the only
//! place that turns an error into a process exit status.
//!
//! | Category | Meaning |
//! |----------|---------|
//! | `Usage` | the invocation shape is unsupported or the client is misconfigured |
//! | `Server` | the renderer rejected the request or the response was cut short |
//! | `LocalIo` | an input file could not be read or the output could not be written |
//! | `Discovery` | the service URL or the identity token could not be obtained |

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`KwkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Server,
    LocalIo,
    Discovery,
}

/// All errors returned by the kwkhtmltopdf client library.
#[derive(Debug, Error)]
pub enum KwkError {
    // ── Usage errors ──────────────────────────────────────────────────────
    /// The caller used an invocation shape the client does not support.
    #[error("{0}")]
    Usage(String),

    /// A required setting is absent from the environment.
    #[error("{name} is not set. {hint}")]
    MissingConfig { name: &'static str, hint: &'static str },

    /// A setting is present but malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Discovery / credential errors ─────────────────────────────────────
    /// Service URL lookup or identity-token minting failed.
    #[error("Could not {action}: {source}")]
    Discovery {
        action: &'static str,
        #[source]
        source: cloudrun_identity::IdentityError,
    },

    // ── Local I/O errors ──────────────────────────────────────────────────
    /// An input file named on the command line could not be read.
    #[error("Failed to read input file '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output file could not be created.
    #[error("Failed to create output file '{path}': {source}")]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing rendered bytes to the output failed.
    #[error("Failed to write output to {target}: {source}")]
    OutputWrite {
        target: String,
        #[source]
        source: std::io::Error,
    },

    // ── Server errors ─────────────────────────────────────────────────────
    /// The HTTP client could not be built.
    #[error("Failed to initialise HTTP client: {0}")]
    Http(String),

    /// The request never reached the server or no response came back.
    #[error("kwkhtmltopdf server at {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("kwkhtmltopdf server returned {status}: {body}")]
    ServerStatus { status: u16, body: String },

    /// The response body stopped before the server finished sending it.
    #[error("kwkhtmltopdf server error, consult the kwkhtmltopdf server log ({reason})")]
    StreamInterrupted { reason: String },
}

impl KwkError {
    /// Which of the four top-level categories this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            KwkError::Usage(_) | KwkError::MissingConfig { .. } | KwkError::InvalidConfig(_) => {
                ErrorCategory::Usage
            }
            KwkError::Discovery { .. } => ErrorCategory::Discovery,
            KwkError::InputRead { .. }
            | KwkError::OutputOpen { .. }
            | KwkError::OutputWrite { .. } => ErrorCategory::LocalIo,
            KwkError::Http(_)
            | KwkError::Unreachable { .. }
            | KwkError::ServerStatus { .. }
            | KwkError::StreamInterrupted { .. } => ErrorCategory::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_display_is_verbatim() {
        let e = KwkError::Usage("stdin/stdout input is not implemented".into());
        assert_eq!(e.to_string(), "stdin/stdout input is not implemented");
        assert_eq!(e.category(), ErrorCategory::Usage);
    }

    #[test]
    fn server_status_carries_renderer_diagnostic() {
        let e = KwkError::ServerStatus {
            status: 500,
            body: "Exit with code 1 due to network error".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("network error"), "got: {msg}");
        assert_eq!(e.category(), ErrorCategory::Server);
    }

    #[test]
    fn stream_interrupted_points_to_server_log() {
        let e = KwkError::StreamInterrupted {
            reason: "connection closed before message completed".into(),
        };
        assert!(e.to_string().contains("consult the kwkhtmltopdf server log"));
        assert_eq!(e.category(), ErrorCategory::Server);
    }

    #[test]
    fn input_read_is_local_io() {
        let e = KwkError::InputRead {
            path: PathBuf::from("/tmp/page.html"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(e.to_string().contains("/tmp/page.html"));
        assert_eq!(e.category(), ErrorCategory::LocalIo);
    }

    #[test]
    fn discovery_wraps_identity_error() {
        let e = KwkError::Discovery {
            action: "resolve the kwkhtmltopdf service URL",
            source: cloudrun_identity::IdentityError::ServiceNotFound {
                name: "kwkhtmltopdf".into(),
                project: "acme-prod".into(),
            },
        };
        assert!(e.to_string().contains("service URL"));
        assert!(e.to_string().contains("'kwkhtmltopdf' not found"));
        assert_eq!(e.category(), ErrorCategory::Discovery);
    }

    #[test]
    fn missing_config_names_variable() {
        let e = KwkError::MissingConfig {
            name: "KWKHTMLTOPDF_SERVER_URL",
            hint: "Point it at the rendering endpoint.",
        };
        assert!(e.to_string().starts_with("KWKHTMLTOPDF_SERVER_URL is not set"));
        assert_eq!(e.category(), ErrorCategory::Usage);
    }
}
