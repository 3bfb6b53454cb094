//! # kwkhtmltopdf-client
//!
//! A drop-in `wkhtmltopdf` replacement that renders on a remote kwkhtmltopdf
//! server instead of locally.
//!
//! ## Why this crate?
//!
//! Applications that shell out to `wkhtmltopdf` expect its command-line
//! grammar: options, input pages or URLs, then an output file. This client
//! accepts the same tokens, uploads local inputs as a multipart request to a
//! rendering service on Cloud Run (authenticated with a Google-signed ID
//! token), and streams the PDF back to the output file or stdout.
//!
//! ## Pipeline Overview
//!
//! ```text
//! argv
//!  │
//!  ├─ 1. Classify  options / remote URLs / local files / output target
//!  ├─ 2. Load      read local files into memory
//!  ├─ 3. Locate    K_SERVICE → Cloud Run service URL (token audience)
//!  ├─ 4. Auth      metadata server → ID token for that audience
//!  ├─ 5. Send      multipart POST to KWKHTMLTOPDF_SERVER_URL
//!  └─ 6. Deliver   response streamed in 64 KiB chunks
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kwkhtmltopdf_client::render_from_env;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let summary = render_from_env(&["--page-size", "A4", "page.html", "out.pdf"]).await?;
//!     eprintln!("{} bytes written", summary.bytes_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kwkhtmltopdf` binary (tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod render;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cloudrun_identity::IdentityError;
pub use config::{ClientConfig, ClientConfigBuilder, CHUNK_SIZE};
pub use error::{ErrorCategory, KwkError};
pub use identity::{Credential, ServiceLocator, TokenProvider};
pub use pipeline::classify::{
    classify, classify_with, tokens_from_args, Argument, ClassifiedArgs, OutputTarget,
};
pub use pipeline::load::{Part, RenderRequest};
pub use render::{render, render_from_env, RenderStage, RenderSummary};
