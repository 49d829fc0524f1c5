/*!
Error types for the modelstate core engine.
*/

use thiserror::Error;

/// Result type used throughout the modelstate core.
pub type Result<T> = std::result::Result<T, PersistError>;

/// Errors that can occur while persisting, restoring or exporting state.
#[derive(Error, Debug)]
pub enum PersistError {
    /// I/O errors during file or stream operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed bytes at the format backend level
    #[error("Format error: {0}")]
    Format(String),

    /// Tag dispatch found zero or several variants in one scope
    #[error("Expected exactly 1 {family} tag, found {found}")]
    TagMismatch { family: String, found: usize },

    /// A tag that no variant of the family is registered for
    #[error("No {family} variant corresponds to tag '{tag}'")]
    UnknownTag { family: String, tag: String },

    /// More levels ended than were started
    #[error("Scope imbalance: {0}")]
    ScopeImbalance(String),

    /// Text that does not parse as the expected primitive type
    #[error("Cannot decode '{text}' as {expected}")]
    ValueDecode { text: String, expected: &'static str },

    /// A single emitted document would exceed the maximum size
    #[error("Size bound violation: unit of {size} bytes exceeds maximum document size {max}")]
    SizeBoundViolation { size: usize, max: usize },

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Invalid checkpoint or model definition layout
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Missing required metadata fields
    #[error("Missing required metadata field: {0}")]
    MissingMetadata(String),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl PersistError {
    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    /// Create a new value decode error
    pub fn value_decode<S: Into<String>>(text: S, expected: &'static str) -> Self {
        Self::ValueDecode {
            text: text.into(),
            expected,
        }
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }
}
