//! Error types for copyart-host

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by build hosts and fingerprint stores
#[derive(Error, Debug)]
pub enum HostError {
    /// Filesystem failure while reading or writing host data
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Host manifest or state could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Host manifest or state could not be decoded
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
}

impl HostError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            HostError::Deserialization(err.to_string())
        } else {
            HostError::Serialization(err.to_string())
        }
    }
}
