//! Error types for vault persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing vault records.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during file operations.
    #[error("I/O error at {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored document could not be decoded.
    #[error("deserialization error at {path}: {message}")]
    FileDeserialization { path: PathBuf, message: String },

    /// Record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Owner key cannot be mapped to a storage unit.
    #[error("invalid owner key: {0:?}")]
    InvalidKey(String),
}

impl StorageError {
    /// Create a file I/O error with path context.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Create a file deserialization error with path context.
    pub fn file_deserialization(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn invalid_key(owner: impl Into<String>) -> Self {
        Self::InvalidKey(owner.into())
    }

    /// True if the stored bytes exist but could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::FileDeserialization { .. })
    }
}

/// Convenience type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
