//! Error types for fetching and unpacking.
//!
//! Errors are categorized so callers can tell a flaky network from a bad
//! artifact.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// The source does not exist.
    NotFound,
    /// The artifact does not match its checksum.
    Integrity,
    /// Unsupported or corrupt archive.
    Format,
    /// Bad input from the declaration.
    Input,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }
}

/// Errors from fetching, verifying or unpacking.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status: Option<u16>,
    },

    /// The source uses a scheme we cannot fetch.
    #[error("unsupported source scheme: {0}")]
    UnsupportedScheme(String),

    /// Hash type outside md5/sha1/sha256/sha512.
    #[error("unsupported hash type {0:?}")]
    UnknownHashType(String),

    /// The declared hash is not valid hex for its type.
    #[error("invalid {hash_type} hash {hash:?}")]
    InvalidHash { hash_type: String, hash: String },

    /// The artifact does not hash to the declared value.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Archive format could not be determined from the name.
    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),

    /// Archive could not be read.
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error with path context.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { status: Some(404), .. } => ErrorCategory::NotFound,
            Self::Http { .. } => ErrorCategory::Network,
            Self::ChecksumMismatch { .. } => ErrorCategory::Integrity,
            Self::UnsupportedArchive(_) | Self::Archive(_) => ErrorCategory::Format,
            Self::UnsupportedScheme(_) | Self::UnknownHashType(_) | Self::InvalidHash { .. } => {
                ErrorCategory::Input
            }
            Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ErrorCategory::NotFound
            }
            Self::Io { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let not_found = Error::Http {
            message: "HTTP 404".into(),
            status: Some(404),
        };
        assert_eq!(not_found.category(), ErrorCategory::NotFound);
        assert!(!not_found.is_retryable());

        let flaky = Error::Http {
            message: "connection reset".into(),
            status: None,
        };
        assert!(flaky.is_retryable());

        let missing = Error::io("/x", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(missing.category(), ErrorCategory::NotFound);

        let mismatch = Error::ChecksumMismatch {
            path: "/x".into(),
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(mismatch.category(), ErrorCategory::Integrity);
    }
}
