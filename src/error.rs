//! Error taxonomy for the mirroring pipeline.
//!
//! Acquisition errors are recoverable at the pipeline boundary (a failed
//! fetch degrades to the original URL); substitution errors are fatal by
//! design, since rendering a stale index against a truncated asset list
//! would silently show the wrong asset.

use thiserror::Error;

/// Failure while acquiring a managed file over HTTP.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The request exceeded the configured acquisition timeout.
    #[error("acquisition timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("acquisition failed with HTTP status {0}")]
    Http(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Transport or encoding failure that fits no other variant.
    #[error("acquisition failed: {0}")]
    Other(String),
}

/// Failure while substituting render nodes for rewritten markup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubstituteError {
    /// A stamped index points past the end of the found-assets list. This
    /// means the markup and the asset list come from different parses and
    /// the caller must re-parse rather than render.
    #[error("asset index {index} out of range: found-assets list has {len} entries")]
    AssetIndexOutOfRange { index: usize, len: usize },

    /// The rewritten markup could not be re-parsed.
    #[error("failed to process rewritten markup: {0}")]
    Markup(String),
}
