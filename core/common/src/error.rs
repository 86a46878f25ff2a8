// core/common/src/error.rs
// Error types shared by the store, recorder and replication check

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid artifact name: {0:?}")]
    InvalidName(String),
    #[error("Artifact contents mismatch: expected {expected:?}, got {actual:?}")]
    Mismatch { expected: String, actual: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Coordination error: {0}")]
    Coordination(String),
    #[error("Upload of {0} skipped: artifact logging is disabled for this rank")]
    UploadSkipped(String),
}

impl ArtifactError {
    /// Maps an I/O failure on `path` onto the matching variant.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ArtifactError::NotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => {
                ArtifactError::PermissionDenied(path.display().to_string())
            }
            _ => ArtifactError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ArtifactError::NotFound(_) => "not_found",
            ArtifactError::PermissionDenied(_) => "permission_denied",
            ArtifactError::InvalidName(_) => "invalid_name",
            ArtifactError::Mismatch { .. } => "mismatch",
            ArtifactError::Io { .. } => "io_error",
            ArtifactError::Coordination(_) => "coordination_error",
            ArtifactError::UploadSkipped(_) => "upload_skipped",
        }
    }
}

impl Retryable for ArtifactError {
    /// Only a missing artifact is expected to resolve with time.
    fn is_retryable(&self) -> bool {
        matches!(self, ArtifactError::NotFound(_))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RecorderError {
    #[error("Record {name}[{index}] is not JSON serializable: {reason}")]
    NotSerializable {
        name: String,
        index: usize,
        reason: String,
    },
    #[error("Record {name}[{index}] has non-finite value for {key:?}")]
    NonFiniteValue {
        name: String,
        index: usize,
        key: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}
