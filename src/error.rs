//! Error types for the content store

use std::time::Duration;

/// Result type for content store operations.
///
/// This is a convenience type alias that uses [`StoreError`] as the error type.
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type covering every failure mode of the content store.
///
/// Ingestion validation failures (`UnsupportedContentType`, `ContentTooLarge`)
/// and `ContentNotFound` are always surfaced to the caller. Maintenance
/// operations collect per-item I/O failures into their result instead of
/// returning an error, so a single unreadable file never aborts a cleanup
/// batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the given content id
    #[error("Content not found: {id}")]
    ContentNotFound { id: String },

    /// Caller-supplied content type is outside the allow-listed MIME set
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// Memory payload exceeds the configured maximum
    #[error("Content too large: {actual} bytes exceeds maximum of {max} bytes")]
    ContentTooLarge { actual: u64, max: u64 },

    /// Invalid argument, e.g. an unknown retrieval format
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A streaming operation exceeded its configured deadline
    #[error("Operation timed out after {elapsed:?} (deadline {deadline:?})")]
    Timeout { elapsed: Duration, deadline: Duration },

    /// File system errors during hashing, copying, or resolution
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Metadata database errors
    #[error("Database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },
}

impl StoreError {
    /// Create a validation error with a custom message.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for a content id.
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::ContentNotFound { id: id.into() }
    }

    /// True if this error came from the SQLite unique constraint on the
    /// record id, which signals a concurrent ingestion of identical bytes.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database {
                source: sqlx::Error::Database(db),
            } => db.is_unique_violation(),
            _ => false,
        }
    }
}
