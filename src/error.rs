//! Error taxonomy for archive conversion
//!
//! Parsing errors abort the pipeline of a single input and travel up to the
//! driver with the file name attached. Fetch failures and unresolved
//! references never leave the resolver: they are logged there and surface as
//! "not found".

use std::path::{Path, PathBuf};

/// Errors produced while loading, rewriting or writing a single input
#[derive(Debug, thiserror::Error)]
pub enum SinglefileError {
    /// Container or snapshot bytes do not have the expected structure
    #[error("malformed input: {0}")]
    Format(String),

    /// A multipart entity declared no `boundary` parameter
    #[error("no boundary found for multipart entity")]
    MissingBoundary,

    /// Fallback fetch for a missing reference failed
    #[error("cannot fetch {url}: {reason}")]
    NetworkFetch { url: String, reason: String },

    /// Markup could not be parsed or serialized
    #[error("cannot parse markup: {0}")]
    Parse(String),

    /// The external renderer failed or timed out
    #[error("render failed: {0}")]
    Render(String),

    /// The capture relay could not be started
    #[error("capture proxy: {0}")]
    Proxy(String),

    /// Rejected configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any of the above, tagged with the input it happened on
    #[error("cannot process {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: Box<SinglefileError>,
    },
}

/// Convenience alias for Result with `SinglefileError`
pub type Result<T> = std::result::Result<T, SinglefileError>;

impl SinglefileError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Attach the input file name, unless one is already attached
    #[must_use]
    pub fn with_input(self, path: &Path) -> Self {
        match self {
            Self::Input { .. } => self,
            other => Self::Input {
                path: path.to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    /// The error without any input tag
    #[must_use]
    pub fn root_cause(&self) -> &SinglefileError {
        match self {
            Self::Input { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<plist::Error> for SinglefileError {
    fn from(err: plist::Error) -> Self {
        Self::Format(format!("property list: {err}"))
    }
}

impl From<mailparse::MailParseError> for SinglefileError {
    fn from(err: mailparse::MailParseError) -> Self {
        Self::Format(format!("MIME: {err}"))
    }
}
