//! Crate-wide error taxonomy.
//!
//! Every failure an operation can produce is a reportable value here; none
//! of the library paths panic. Multi-step operations (extraction, archive
//! creation) roll back partial on-disk effects before returning an error.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bead or input name violates the naming rules.
    #[error("invalid name `{raw}`: {reason}")]
    InvalidName { raw: String, reason: String },

    /// Target path or input slot is already occupied.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// No archive, box, or input matches the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// A reference matches more than one bead lineage, or no unique
    /// default box exists.
    #[error("ambiguous reference: {0}")]
    AmbiguousReference(String),

    /// Hash verification failed, or a file changed size mid-hash.
    #[error("content mismatch for `{what}`: {reason}")]
    ContentMismatch { what: String, reason: String },

    /// An archive entry would escape the extraction destination.
    #[error("unsafe path in archive entry `{entry}`")]
    PathTraversal { entry: String },

    /// Missing or malformed container entries, unrecognized meta version,
    /// or a directory that is not a valid workspace.
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    /// Malformed timestamp string.
    #[error("invalid timestamp `{raw}`: {reason}")]
    InvalidTimestamp { raw: String, reason: String },

    /// Destroy refused: workspace state is not archived anywhere.
    #[error("unsafe state: {0}")]
    UnsafeState(String),

    /// Underlying filesystem failure.
    #[error("io failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(context: &str, path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            context: format!("{} {}", context, path.display()),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
