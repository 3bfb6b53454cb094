//! Pipeline stages for one render request.
//!
//! ## Data Flow
//!
//! ```text
//! classify ──▶ load ──▶ transport
//! (tokens)    (files)   (POST + streamed response)
//! ```
//!
//! 1. [`classify`]:  pure, tokens to options, remote URLs, local files and
//!    the output target
//! 2. [`load`]:      read each local file fully into memory
//! 3. [`transport`]: multipart POST with a bearer token, then copy the
//!    response body to the output in bounded chunks

pub mod classify;
pub mod load;
pub mod transport;
