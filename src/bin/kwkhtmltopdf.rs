//! `kwkhtmltopdf` binary.
//!
//! A thin shim over the library crate: every command-line token is handed
//! to the renderer verbatim, errors become one line on stderr and a
//! non-zero exit status.

use kwkhtmltopdf_client::{render_from_env, tokens_from_args};
use std::io;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Logging setup ────────────────────────────────────────────────────
    // stdout may carry the PDF, so logs always go to stderr and stay quiet
    // unless RUST_LOG asks for more.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let result = match tokens_from_args(std::env::args_os().skip(1)) {
        Ok(tokens) => render_from_env(&tokens[..]).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(summary) => {
            debug!(
                "{} parts ({} files) → {} bytes in {} chunks, {}ms",
                summary.parts,
                summary.files,
                summary.bytes_written,
                summary.chunks,
                summary.duration_ms
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
