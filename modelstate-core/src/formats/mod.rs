/*!
Format backends that turn a [`StateDocument`] into bytes and back.

Both backends carry the same tree: sibling order is preserved and sibling
names may repeat. The markup backend also writes the root element name and
its attributes; the compact backend writes the root's children as the
top-level object.
*/

pub mod json;
pub mod xml;

pub use json::JsonStateFormat;
pub use xml::XmlStateFormat;

use serde::{Deserialize, Serialize};

use crate::document::StateDocument;
use crate::{PersistError, Result};

/// Serialize and parse state documents.
pub trait StateFormat: Send + Sync {
    /// Short name stored in checkpoint metadata.
    fn name(&self) -> &'static str;

    /// Serialize a complete document.
    fn write(&self, document: &StateDocument) -> Result<Vec<u8>>;

    /// Parse bytes produced by [`write`](Self::write).
    fn read(&self, bytes: &[u8]) -> Result<StateDocument>;
}

/// The available backends, selectable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFormatKind {
    #[default]
    Json,
    Xml,
}

impl StateFormatKind {
    /// Parse a backend name as stored in metadata.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            other => Err(PersistError::validation(format!(
                "Unknown state format '{other}'"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Json => json::FORMAT_NAME,
            Self::Xml => xml::FORMAT_NAME,
        }
    }

    /// File extension conventionally used for this backend.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

/// A backend chosen at runtime.
#[derive(Debug, Clone)]
pub enum AnyStateFormat {
    Json(JsonStateFormat),
    Xml(XmlStateFormat),
}

impl AnyStateFormat {
    /// Default configuration of the given backend.
    pub fn of_kind(kind: StateFormatKind) -> Self {
        match kind {
            StateFormatKind::Json => Self::Json(JsonStateFormat::new()),
            StateFormatKind::Xml => Self::Xml(XmlStateFormat::new()),
        }
    }

    pub fn kind(&self) -> StateFormatKind {
        match self {
            Self::Json(_) => StateFormatKind::Json,
            Self::Xml(_) => StateFormatKind::Xml,
        }
    }
}

impl From<JsonStateFormat> for AnyStateFormat {
    fn from(format: JsonStateFormat) -> Self {
        Self::Json(format)
    }
}

impl From<XmlStateFormat> for AnyStateFormat {
    fn from(format: XmlStateFormat) -> Self {
        Self::Xml(format)
    }
}

impl StateFormat for AnyStateFormat {
    fn name(&self) -> &'static str {
        match self {
            Self::Json(format) => format.name(),
            Self::Xml(format) => format.name(),
        }
    }

    fn write(&self, document: &StateDocument) -> Result<Vec<u8>> {
        match self {
            Self::Json(format) => format.write(document),
            Self::Xml(format) => format.write(document),
        }
    }

    fn read(&self, bytes: &[u8]) -> Result<StateDocument> {
        match self {
            Self::Json(format) => format.read(bytes),
            Self::Xml(format) => format.read(bytes),
        }
    }
}
