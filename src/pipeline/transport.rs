//! Transport: one authenticated multipart POST, response streamed to the output.
//!
//! The rendered document is never held in memory as a whole. Response frames
//! are re-sliced so each write to the output is at most `chunk_size` bytes,
//! and bytes are written in the order they arrive.
//!
//! There are no retries. Whether the server already produced output is
//! unknown to the client, so a failed request is reported once and the whole
//! command can simply be run again.
//!
//! If the connection drops mid-body, whatever was already written stays in
//! the output. Avoiding that would mean buffering the full document.

use crate::config::ClientConfig;
use crate::error::KwkError;
use crate::identity::Credential;
use crate::pipeline::classify::OutputTarget;
use crate::pipeline::load::{Part, RenderRequest};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part as FormPart};
use std::fmt::Display;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Form field carrying an option or a remote URL.
pub const OPTION_FIELD: &str = "option";
/// Form field carrying an uploaded file.
pub const FILE_FIELD: &str = "file";

/// Totals for one streamed response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes: u64,
    pub chunks: u64,
}

/// Build the HTTP client for a render request.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, KwkError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("kwkhtmltopdf-client/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| KwkError::Http(e.to_string()))
}

/// Encode parts as a multipart form, one field per part, in order.
///
/// Filenames go out exactly as given, without RFC 5987 percent-encoding.
pub fn build_form(parts: Vec<Part>) -> Form {
    let form = Form::new().percent_encode_noop();
    parts.into_iter().fold(form, |form, part| match part {
        Part::Option(text) | Part::RemoteReference(text) => form.text(OPTION_FIELD, text),
        Part::LocalFile { name, bytes } => {
            form.part(FILE_FIELD, FormPart::bytes(bytes).file_name(name))
        }
    })
}

/// POST the parts and return the response once its status is known to be 2xx.
///
/// # Errors
/// - [`KwkError::Unreachable`]: no response was received
/// - [`KwkError::ServerStatus`]: non-2xx; the body is the renderer's diagnostic
pub async fn send(
    client: &reqwest::Client,
    url: &str,
    credential: &Credential,
    parts: Vec<Part>,
) -> Result<reqwest::Response, KwkError> {
    debug!("POST {} with {} parts", url, parts.len());

    let response = client
        .post(url)
        .bearer_auth(credential.secret())
        .multipart(build_form(parts))
        .send()
        .await
        .map_err(|e| KwkError::Unreachable {
            url: url.to_string(),
            reason: error_chain(&e),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = match response.text().await {
            Ok(text) => one_line(&text),
            Err(e) => format!("<unreadable body: {}>", error_chain(&e)),
        };
        return Err(KwkError::ServerStatus {
            status: status.as_u16(),
            body,
        });
    }

    debug!("Server answered {}", status);
    Ok(response)
}

/// Open the output sink: stdout, or a created/truncated file.
pub async fn open_output(
    target: &OutputTarget,
) -> Result<Box<dyn AsyncWrite + Unpin + Send>, KwkError> {
    match target {
        OutputTarget::Stdout => Ok(Box::new(tokio::io::stdout())),
        OutputTarget::Path(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .map_err(|source| KwkError::OutputOpen {
                    path: path.clone(),
                    source,
                })?;
            Ok(Box::new(file))
        }
    }
}

/// Copy `stream` into `sink` in writes of at most `chunk_size` bytes.
///
/// A stream error is a [`KwkError::StreamInterrupted`]; bytes written before
/// it are flushed and left in place.
pub async fn stream_body<S, E, W>(
    stream: S,
    sink: &mut W,
    chunk_size: usize,
    target: &OutputTarget,
) -> Result<StreamStats, KwkError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
    W: AsyncWrite + Unpin + ?Sized,
{
    let chunk_size = chunk_size.max(1);
    let mut stream = std::pin::pin!(stream);
    let mut stats = StreamStats::default();
    let write_err = |source| KwkError::OutputWrite {
        target: target.to_string(),
        source,
    };

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "Response stream interrupted after {} bytes; output is incomplete",
                    stats.bytes
                );
                sink.flush().await.ok();
                return Err(KwkError::StreamInterrupted {
                    reason: e.to_string(),
                });
            }
        };

        for chunk in frame.chunks(chunk_size) {
            sink.write_all(chunk).await.map_err(write_err)?;
            stats.bytes += chunk.len() as u64;
            stats.chunks += 1;
        }
    }

    sink.flush().await.map_err(write_err)?;
    Ok(stats)
}

/// Send `request` and stream the rendered document to its output target.
///
/// The output is opened only after the server accepted the request, so a
/// rejected request leaves no output file behind.
pub async fn deliver(
    client: &reqwest::Client,
    url: &str,
    credential: &Credential,
    request: RenderRequest,
    chunk_size: usize,
) -> Result<StreamStats, KwkError> {
    let RenderRequest { parts, output } = request;
    let response = send(client, url, credential, parts).await?;
    write_response(response, &output, chunk_size).await
}

/// Stream an accepted response body to `output`.
pub async fn write_response(
    response: reqwest::Response,
    output: &OutputTarget,
    chunk_size: usize,
) -> Result<StreamStats, KwkError> {
    let mut sink = open_output(output).await?;
    let body = response
        .bytes_stream()
        .map(|frame| frame.map_err(|e| error_chain(&e)));
    let stats = stream_body(body, &mut sink, chunk_size, output).await?;

    info!(
        "Wrote {} bytes to {} in {} chunks",
        stats.bytes, output, stats.chunks
    );
    Ok(stats)
}

/// Collapse a multi-line diagnostic into one line, dropping blank lines.
fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render an error with its sources; reqwest's own message omits the cause.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
