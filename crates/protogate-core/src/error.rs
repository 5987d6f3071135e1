//! Error types for gateway core operations.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by validation and archive processing.
#[derive(Error, Debug)]
pub enum Error {
    /// A prototyper or prototype identifier contains disallowed characters.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The requested sub-path attempts traversal or is absolute.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The archive could not be read.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The archive expands past the configured size ceiling.
    #[error("archive exceeds {limit} uncompressed bytes")]
    ArchiveTooLarge {
        /// The configured ceiling in bytes.
        limit: u64,
    },

    /// I/O error while reading archive members.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (import maps).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_display() {
        let err = Error::InvalidIdentifier("a/b".to_string());
        assert_eq!(err.to_string(), "invalid identifier: a/b");
    }

    #[test]
    fn test_archive_too_large_display() {
        let err = Error::ArchiveTooLarge { limit: 1024 };
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("truncated"));
    }
}
