use std::path::PathBuf;

use copyart_host::HostError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("invalid build filter: {0}")]
    InvalidFilter(String),

    #[error("invalid build selector: {0}")]
    InvalidSelector(String),

    #[error("invalid file pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("copy cancelled")]
    Cancelled,

    #[error("unable to find project {0}")]
    ProjectNotFound(String),

    #[error("unable to find a build to copy artifacts from in {0}")]
    NoBuildFound(String),

    #[error("failed to copy artifacts from {0}: no artifacts matched")]
    NothingCopied(String),

    #[error("host error: {0}")]
    Host(#[from] HostError),
}

impl CopyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CopyError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CopyError>;
