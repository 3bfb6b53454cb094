//! Argument classification: decide what each command-line token means.
//!
//! wkhtmltopdf has no machine-readable option grammar we can rely on, so the
//! classifier works from token shape alone, in a fixed order:
//!
//! ```text
//! "-…"                  → option
//! "http://…" "https://…" → remote reference (fetched by the server)
//! "file://…"            → local file (prefix stripped)
//! existing file path    → local file
//! anything else         → option (option values, page sizes, …)
//! ```
//!
//! The file-existence probe is injected, so classification itself performs
//! no I/O. An option value that happens to name an existing file is uploaded
//! as a file; there is no table of known options to tell the two apart.

use crate::error::KwkError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const FILE_URL_PREFIX: &str = "file://";

/// Token that means "read stdin / write stdout" to wkhtmltopdf.
pub const STDIO_SENTINEL: &str = "-";

/// Option sent when the caller supplied nothing to render.
pub const HELP_OPTION: &str = "-h";

/// What a single command-line token turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Forwarded verbatim as an `option` form field.
    Option(String),
    /// An http(s) URL the server fetches itself.
    RemoteReference(String),
    /// A local file to upload.
    LocalFile(PathBuf),
}

/// Where the rendered document goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    #[default]
    Stdout,
    Path(PathBuf),
}

impl std::fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("stdout"),
            OutputTarget::Path(p) => write!(f, "'{}'", p.display()),
        }
    }
}

/// Classified arguments plus the resolved output target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedArgs {
    pub arguments: Vec<Argument>,
    pub output: OutputTarget,
}

/// Split off the output path, if the invocation ends with one.
///
/// The last token is the output when there are at least two tokens and
/// neither of the final two starts with `-`; otherwise output goes to stdout.
pub fn detect_output<S: AsRef<str>>(tokens: &[S]) -> (OutputTarget, &[S]) {
    match tokens {
        [.., second_last, last]
            if !second_last.as_ref().starts_with('-') && !last.as_ref().starts_with('-') =>
        {
            (
                OutputTarget::Path(PathBuf::from(last.as_ref())),
                &tokens[..tokens.len() - 1],
            )
        }
        _ => (OutputTarget::Stdout, tokens),
    }
}

/// Classify one token, probing the filesystem only through `is_file`.
pub fn classify_token(token: &str, is_file: impl Fn(&Path) -> bool) -> Argument {
    if token.starts_with('-') {
        Argument::Option(token.to_string())
    } else if token.starts_with("http://") || token.starts_with("https://") {
        Argument::RemoteReference(token.to_string())
    } else if let Some(path) = token.strip_prefix(FILE_URL_PREFIX) {
        Argument::LocalFile(PathBuf::from(path))
    } else if is_file(Path::new(token)) {
        Argument::LocalFile(PathBuf::from(token))
    } else {
        Argument::Option(token.to_string())
    }
}

/// Convert raw process arguments to tokens.
///
/// # Errors
/// [`KwkError::Usage`] if an argument is not valid UTF-8; a lossy copy would
/// no longer name the file on disk.
pub fn tokens_from_args<I>(args: I) -> Result<Vec<String>, KwkError>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            arg.into_string().map_err(|arg| {
                KwkError::Usage(format!(
                    "argument '{}' is not valid UTF-8",
                    arg.to_string_lossy()
                ))
            })
        })
        .collect()
}

/// Reject the stdin/stdout sentinel anywhere in the invocation.
///
/// # Errors
/// [`KwkError::Usage`] if any token is exactly `-`.
pub fn reject_stdio<S: AsRef<str>>(tokens: &[S]) -> Result<(), KwkError> {
    if tokens.iter().any(|t| t.as_ref() == STDIO_SENTINEL) {
        return Err(KwkError::Usage(
            "stdin/stdout input is not implemented; name input and output files explicitly"
                .to_string(),
        ));
    }
    Ok(())
}

/// Classify a whole invocation with an injected file-existence probe.
///
/// # Errors
/// [`KwkError::Usage`] if any token is exactly `-`.
pub fn classify_with<S: AsRef<str>>(
    tokens: &[S],
    is_file: impl Fn(&Path) -> bool,
) -> Result<ClassifiedArgs, KwkError> {
    reject_stdio(tokens)?;

    let (output, inputs) = detect_output(tokens);

    let mut arguments: Vec<Argument> = inputs
        .iter()
        .map(|t| classify_token(t.as_ref(), &is_file))
        .collect();

    if arguments.is_empty() {
        arguments.push(Argument::Option(HELP_OPTION.to_string()));
    }

    Ok(ClassifiedArgs { arguments, output })
}

/// Classify a whole invocation against the real filesystem.
pub fn classify<S: AsRef<str>>(tokens: &[S]) -> Result<ClassifiedArgs, KwkError> {
    classify_with(tokens, Path::is_file)
}
