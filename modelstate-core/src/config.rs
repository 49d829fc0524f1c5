//! Configuration for checkpointing and model export
//!
//! [`CheckpointConfig`] selects the state format backend, tag mode,
//! compression level and local storage location. [`ExportConfig`] bounds
//! the documents written by the chunked exporter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::export::MAX_DOCUMENT_SIZE;
use crate::formats::{AnyStateFormat, StateFormatKind, XmlStateFormat};
use crate::tag::TagMode;
use crate::{PersistError, Result};

/// Highest gzip level accepted by the compressor.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Settings of the checkpoint engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// State document backend
    pub format: StateFormatKind,
    /// Write readable tag names instead of short codes
    pub readable_tags: bool,
    /// Indentation of XML output (compact when absent)
    pub xml_indent: Option<usize>,
    /// Gzip level of the checkpoint container (0-9)
    pub compression_level: u32,
    /// Base path for local storage (defaults to the current directory)
    pub local_base_path: Option<PathBuf>,
}

impl CheckpointConfig {
    /// Compact JSON checkpoints
    pub fn default_json() -> Self {
        CheckpointConfig {
            format: StateFormatKind::Json,
            readable_tags: false,
            xml_indent: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            local_base_path: None,
        }
    }

    /// Compact XML checkpoints
    pub fn default_xml() -> Self {
        CheckpointConfig {
            format: StateFormatKind::Xml,
            ..Self::default_json()
        }
    }

    /// Readable, indented XML, convenient when inspecting checkpoints by hand
    pub fn readable_xml() -> Self {
        CheckpointConfig {
            format: StateFormatKind::Xml,
            readable_tags: true,
            xml_indent: Some(2),
            ..Self::default_json()
        }
    }

    pub fn with_base_path<P: Into<PathBuf>>(mut self, base_path: P) -> Self {
        self.local_base_path = Some(base_path.into());
        self
    }

    /// Infer the state format from a checkpoint path
    ///
    /// `.xml` and `.xml.gz` select XML, `.json` and `.json.gz` select JSON.
    /// Returns the config and the path unchanged.
    pub fn from_path(path: &str) -> Result<(CheckpointConfig, String)> {
        let stem = path.strip_suffix(".gz").unwrap_or(path);
        let config = if stem.ends_with(".xml") {
            Self::default_xml()
        } else if stem.ends_with(".json") {
            Self::default_json()
        } else {
            return Err(PersistError::validation(format!(
                "Cannot infer the state format of '{path}': expected a .json or .xml extension"
            )));
        };
        Ok((config, path.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(PersistError::validation(format!(
                "Compression level {} is above {MAX_COMPRESSION_LEVEL}",
                self.compression_level
            )));
        }
        if self.xml_indent.is_some() && self.format != StateFormatKind::Xml {
            return Err(PersistError::validation(
                "xml_indent only applies to the XML format",
            ));
        }
        Ok(())
    }

    pub fn tag_mode(&self) -> TagMode {
        if self.readable_tags {
            TagMode::Readable
        } else {
            TagMode::Compact
        }
    }

    /// The configured backend.
    pub fn state_format(&self) -> AnyStateFormat {
        match (self.format, self.xml_indent) {
            (StateFormatKind::Xml, Some(indent)) => XmlStateFormat::with_indent(indent).into(),
            (kind, _) => AnyStateFormat::of_kind(kind),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::default_json()
    }
}

/// Settings of the chunked model exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Upper bound on the encoded text of one document
    pub max_document_size: usize,
    /// Gzip level of the exported stream (0-9)
    pub compression_level: u32,
}

impl ExportConfig {
    pub fn with_max_document_size(max_document_size: usize) -> Self {
        Self {
            max_document_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_document_size == 0 {
            return Err(PersistError::SizeBoundViolation {
                size: 1,
                max: self.max_document_size,
            });
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(PersistError::validation(format!(
                "Compression level {} is above {MAX_COMPRESSION_LEVEL}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_document_size: MAX_DOCUMENT_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::StateFormat;

    #[test]
    fn test_default_checkpoint_config() {
        let config = CheckpointConfig::default();
        assert_eq!(config.format, StateFormatKind::Json);
        assert_eq!(config.tag_mode(), TagMode::Compact);
        assert!(config.local_base_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_readable_xml_config() {
        let config = CheckpointConfig::readable_xml();
        assert_eq!(config.tag_mode(), TagMode::Readable);
        assert_eq!(config.state_format().name(), "xml");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_path() {
        let (config, path) = CheckpointConfig::from_path("/tmp/job/state_3.xml.gz").unwrap();
        assert_eq!(config.format, StateFormatKind::Xml);
        assert_eq!(path, "/tmp/job/state_3.xml.gz");

        let (config, _) = CheckpointConfig::from_path("state.json").unwrap();
        assert_eq!(config.format, StateFormatKind::Json);

        let error = CheckpointConfig::from_path("state.bin").unwrap_err();
        assert!(error.to_string().contains(".json or .xml"));
    }

    #[test]
    fn test_validate_checkpoint_config() {
        let mut config = CheckpointConfig::default_json();
        config.compression_level = 10;
        assert!(config.validate().is_err());

        let mut config = CheckpointConfig::default_json();
        config.xml_indent = Some(4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_export_config() {
        let config = ExportConfig::default();
        assert_eq!(config.max_document_size, MAX_DOCUMENT_SIZE);
        assert!(config.validate().is_ok());

        let zero = ExportConfig::with_max_document_size(0);
        assert!(matches!(
            zero.validate(),
            Err(PersistError::SizeBoundViolation { max: 0, .. })
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = CheckpointConfig::readable_xml().with_base_path("/var/lib/modelstate");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""format":"xml""#));
        let parsed: CheckpointConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
