//! File loading: turn classified arguments into uploadable parts.
//!
//! Files are read eagerly and completely before the request is built. Inputs
//! are HTML pages, stylesheets and small assets; the multipart encoder needs
//! each part's full content up front anyway.

use crate::error::KwkError;
use crate::pipeline::classify::{Argument, ClassifiedArgs, OutputTarget};
use std::path::Path;
use tracing::debug;

/// One entry of the multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Option(String),
    RemoteReference(String),
    /// `name` is the path as the caller spelled it; the server sees it as the filename.
    LocalFile { name: String, bytes: Vec<u8> },
}

/// Everything the transport needs to send one render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub parts: Vec<Part>,
    pub output: OutputTarget,
}

impl RenderRequest {
    /// Number of file parts in the request.
    pub fn file_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Part::LocalFile { .. }))
            .count()
    }
}

/// Read a local file completely.
pub async fn load_file(path: &Path) -> Result<Vec<u8>, KwkError> {
    tokio::fs::read(path).await.map_err(|source| KwkError::InputRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Load every local file referenced by `args`, preserving argument order.
pub async fn load_request(args: ClassifiedArgs) -> Result<RenderRequest, KwkError> {
    let mut parts = Vec::with_capacity(args.arguments.len());

    for argument in args.arguments {
        let part = match argument {
            Argument::Option(text) => Part::Option(text),
            Argument::RemoteReference(url) => Part::RemoteReference(url),
            Argument::LocalFile(path) => {
                let bytes = load_file(&path).await?;
                debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
                Part::LocalFile {
                    name: path.to_string_lossy().into_owned(),
                    bytes,
                }
            }
        };
        parts.push(part);
    }

    Ok(RenderRequest {
        parts,
        output: args.output,
    })
}
