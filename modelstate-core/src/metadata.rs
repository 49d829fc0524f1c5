/*!
Checkpoint metadata and integrity hashing.
*/

use crate::formats::StateFormatKind;
use crate::tag::TagMode;
use crate::{PersistError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Current metadata format version for compatibility tracking
pub const METADATA_FORMAT_VERSION: u8 = 1;

/// Describes one persisted state document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMetadata {
    /// Identifier of the analytics job that owns the state
    pub job_id: String,

    /// Sequence number of this checkpoint within the job (0, 1, 2, ...)
    pub checkpoint_index: u64,

    /// When the checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// SHA-256 of the serialized state document
    pub content_hash: String,

    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Unique identifier for this checkpoint
    pub checkpoint_id: String,

    pub description: Option<String>,

    /// Backend the state document was written with
    pub state_format: StateFormatKind,

    /// Tag form used inside the state document
    pub tag_mode: TagMode,

    /// Size of the serialized state document in bytes
    pub uncompressed_size: usize,

    /// Size of the stored checkpoint in bytes
    pub compressed_size: Option<usize>,

    pub compression_algorithm: String,
}

impl CheckpointMetadata {
    /// Create metadata for the next checkpoint of a job
    ///
    /// # Example
    /// ```rust
    /// use modelstate_core::CheckpointMetadata;
    ///
    /// let metadata = CheckpointMetadata::new("job_1", 0);
    /// assert_eq!(metadata.job_id, "job_1");
    /// assert_eq!(metadata.checkpoint_index, 0);
    /// ```
    pub fn new<S: Into<String>>(job_id: S, checkpoint_index: u64) -> Self {
        Self {
            job_id: job_id.into(),
            checkpoint_index,
            timestamp: Utc::now(),
            content_hash: String::new(),
            format_version: METADATA_FORMAT_VERSION,
            checkpoint_id: Uuid::new_v4().to_string(),
            description: None,
            state_format: StateFormatKind::default(),
            tag_mode: TagMode::default(),
            uncompressed_size: 0,
            compressed_size: None,
            compression_algorithm: "gzip".to_string(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Record how the state document was written
    pub fn with_encoding(mut self, state_format: StateFormatKind, tag_mode: TagMode) -> Self {
        self.state_format = state_format;
        self.tag_mode = tag_mode;
        self
    }

    /// Hash the serialized state and record its size
    pub fn with_content_hash(mut self, state: &[u8]) -> Self {
        self.content_hash = Self::compute_hash(state);
        self.uncompressed_size = state.len();
        self
    }

    pub fn with_compressed_size(mut self, compressed_size: usize) -> Self {
        self.compressed_size = Some(compressed_size);
        self
    }

    pub fn with_compression_algorithm<S: Into<String>>(mut self, algorithm: S) -> Self {
        self.compression_algorithm = algorithm.into();
        self
    }

    /// Hexadecimal SHA-256 of `data`
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Fail with [`PersistError::IntegrityCheckFailed`] unless `state`
    /// hashes to the recorded content hash
    pub fn verify_integrity(&self, state: &[u8]) -> Result<()> {
        let computed_hash = Self::compute_hash(state);
        if computed_hash == self.content_hash {
            Ok(())
        } else {
            Err(PersistError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual: computed_hash,
            })
        }
    }

    /// Validate that all required fields are properly set
    pub fn validate(&self) -> Result<()> {
        if self.job_id.is_empty() {
            return Err(PersistError::MissingMetadata("job_id".to_string()));
        }
        if self.content_hash.is_empty() {
            return Err(PersistError::MissingMetadata("content_hash".to_string()));
        }
        if self.checkpoint_id.is_empty() {
            return Err(PersistError::MissingMetadata("checkpoint_id".to_string()));
        }
        Ok(())
    }

    /// Check if this metadata is compatible with the current format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= METADATA_FORMAT_VERSION
    }

    /// `{job_id}_{checkpoint_index}_{timestamp}.{json|xml}.gz`
    pub fn suggested_filename(&self) -> String {
        let timestamp = self.timestamp.format("%Y%m%d_%H%M%S");
        format!(
            "{}_{}_{}.{}.gz",
            self.job_id,
            self.checkpoint_index,
            timestamp,
            self.state_format.extension()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_creation() {
        let metadata = CheckpointMetadata::new("job_1", 0);
        assert_eq!(metadata.job_id, "job_1");
        assert_eq!(metadata.checkpoint_index, 0);
        assert_eq!(metadata.format_version, METADATA_FORMAT_VERSION);
        assert_eq!(metadata.state_format, StateFormatKind::Json);
        assert!(!metadata.checkpoint_id.is_empty());
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            CheckpointMetadata::compute_hash(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_integrity_verification() {
        let state = br#"{"a":"1"}"#;
        let metadata = CheckpointMetadata::new("job", 0).with_content_hash(state);
        assert_eq!(metadata.uncompressed_size, state.len());
        assert!(metadata.verify_integrity(state).is_ok());
        assert!(matches!(
            metadata.verify_integrity(br#"{"a":"2"}"#),
            Err(PersistError::IntegrityCheckFailed { .. })
        ));
    }

    #[test]
    fn test_suggested_filename_uses_format_extension() {
        let metadata = CheckpointMetadata::new("forecast", 5)
            .with_encoding(StateFormatKind::Xml, TagMode::Readable);
        let filename = metadata.suggested_filename();
        assert!(filename.starts_with("forecast_5_"));
        assert!(filename.ends_with(".xml.gz"));
    }
}
