//! Render driver: one invocation from raw tokens to a delivered document.
//!
//! ```text
//! Start ─▶ Classified ─▶ FilesLoaded ─▶ ServiceResolved ─▶ Authenticated ─▶ Sent ─▶ Delivered
//!                                                                                  └─▶ Failed
//! ```
//!
//! Stages run strictly in order and none is revisited. The first error ends
//! the run; its category was fixed where it was raised and is passed through
//! unchanged.

use crate::config::ClientConfig;
use crate::error::KwkError;
use crate::identity::{ServiceLocator, TokenProvider};
use crate::pipeline::load::RenderRequest;
use crate::pipeline::{classify, load, transport};
use cloudrun_identity::MetadataClient;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// Where a render run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Start,
    Classified,
    FilesLoaded,
    ServiceResolved,
    Authenticated,
    Sent,
    Delivered,
    Failed,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Start => "start",
            RenderStage::Classified => "classified",
            RenderStage::FilesLoaded => "files-loaded",
            RenderStage::ServiceResolved => "service-resolved",
            RenderStage::Authenticated => "authenticated",
            RenderStage::Sent => "sent",
            RenderStage::Delivered => "delivered",
            RenderStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    /// Form fields sent (options, URLs and files).
    pub parts: usize,
    /// Of which uploaded files.
    pub files: usize,
    pub bytes_written: u64,
    pub chunks: u64,
    pub duration_ms: u64,
}

/// Render `tokens` with explicit collaborators.
///
/// # Errors
/// The first error raised by any stage, unchanged.
pub async fn render<S: AsRef<str>>(
    tokens: &[S],
    config: &ClientConfig,
    locator: &dyn ServiceLocator,
    token_provider: &dyn TokenProvider,
) -> Result<RenderSummary, KwkError> {
    let start = Instant::now();
    let mut stage = RenderStage::Start;

    match run_stages(tokens, config, locator, token_provider, &mut stage).await {
        Ok(mut summary) => {
            summary.duration_ms = start.elapsed().as_millis() as u64;
            info!(
                "Render delivered: {} bytes in {}ms",
                summary.bytes_written, summary.duration_ms
            );
            Ok(summary)
        }
        Err(e) => {
            debug!(
                "Render {} after stage '{}': {}",
                RenderStage::Failed,
                stage,
                e
            );
            Err(e)
        }
    }
}

/// Render `tokens` using the process environment and the GCE metadata server.
///
/// An unsupported invocation is reported before the environment is read.
pub async fn render_from_env<S: AsRef<str>>(tokens: &[S]) -> Result<RenderSummary, KwkError> {
    classify::reject_stdio(tokens)?;
    let config = ClientConfig::from_env()?;
    let metadata = MetadataClient::from_env().map_err(|source| KwkError::Discovery {
        action: "set up the metadata client",
        source,
    })?;
    render(tokens, &config, &metadata, &metadata).await
}

async fn run_stages<S: AsRef<str>>(
    tokens: &[S],
    config: &ClientConfig,
    locator: &dyn ServiceLocator,
    token_provider: &dyn TokenProvider,
    stage: &mut RenderStage,
) -> Result<RenderSummary, KwkError> {
    let classified = classify::classify(tokens)?;
    advance(stage, RenderStage::Classified);
    debug!(
        "{} arguments, output to {}",
        classified.arguments.len(),
        classified.output
    );

    let server_url = config.require_server_url()?;
    let service_name = config.require_service_name()?;

    let request = load::load_request(classified).await?;
    advance(stage, RenderStage::FilesLoaded);
    let parts = request.parts.len();
    let files = request.file_count();

    let audience = locator.resolve_service_url(service_name).await?;
    advance(stage, RenderStage::ServiceResolved);
    debug!("Token audience: {}", audience);

    let credential = token_provider.fetch_identity_token(&audience).await?;
    advance(stage, RenderStage::Authenticated);

    let RenderRequest { parts: form, output } = request;
    let client = transport::build_client(config)?;
    let response = transport::send(&client, server_url, &credential, form).await?;
    advance(stage, RenderStage::Sent);

    let stats = transport::write_response(response, &output, config.chunk_size).await?;
    advance(stage, RenderStage::Delivered);

    Ok(RenderSummary {
        parts,
        files,
        bytes_written: stats.bytes,
        chunks: stats.chunks,
        duration_ms: 0,
    })
}

fn advance(stage: &mut RenderStage, next: RenderStage) {
    debug!("Render stage: {} -> {}", stage, next);
    *stage = next;
}
