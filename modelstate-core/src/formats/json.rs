/*!
Compact-document backend.

Values become JSON strings, levels become objects. Repeated sibling names are
written as repeated keys so that sibling order survives the round trip; the
reader keeps every entry of an object in document order.
*/

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::StateFormat;
use crate::document::{StateDocument, StateNode};
use crate::{PersistError, Result};

pub(crate) const FORMAT_NAME: &str = "json";

/// JSON state backend.
#[derive(Debug, Clone)]
pub struct JsonStateFormat {
    pretty: bool,
    root_name: String,
}

impl Default for JsonStateFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStateFormat {
    /// Compact output, documents read back with root name `root`.
    pub fn new() -> Self {
        Self {
            pretty: false,
            root_name: "root".to_string(),
        }
    }

    /// Indented output for human inspection.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Root name assigned to documents on read; JSON does not store it.
    pub fn with_root_name<S: Into<String>>(mut self, root_name: S) -> Self {
        self.root_name = root_name.into();
        self
    }
}

impl StateFormat for JsonStateFormat {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn write(&self, document: &StateDocument) -> Result<Vec<u8>> {
        let level = LevelRef(&document.children);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&level)?
        } else {
            serde_json::to_vec(&level)?
        };
        Ok(bytes)
    }

    fn read(&self, bytes: &[u8]) -> Result<StateDocument> {
        let level: Level = serde_json::from_slice(bytes)
            .map_err(|e| PersistError::format(format!("Malformed JSON state: {e}")))?;
        let mut document = StateDocument::new(self.root_name.clone());
        document.children = level.0;
        Ok(document)
    }
}

struct LevelRef<'a>(&'a [StateNode]);

impl Serialize for LevelRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for node in self.0 {
            match &node.value {
                Some(value) => map.serialize_entry(&node.name, value)?,
                None => map.serialize_entry(&node.name, &LevelRef(&node.children))?,
            }
        }
        map.end()
    }
}

struct Level(Vec<StateNode>);

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(EntryVisitor).and_then(|content| match content {
            Content::Level(children) => Ok(Level(children)),
            Content::Text(_) => Err(de::Error::custom("state document must be an object")),
        })
    }
}

enum Content {
    Text(String),
    Level(Vec<StateNode>),
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(EntryVisitor)
    }
}

struct EntryVisitor;

impl<'de> Visitor<'de> for EntryVisitor {
    type Value = Content;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string value or an object of nested values")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Content, E> {
        Ok(Content::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<Content, E> {
        Ok(Content::Text(value))
    }

    // Hand-edited documents sometimes carry unquoted scalars.
    fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<Content, E> {
        Ok(Content::Text(value.to_string()))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Content, E> {
        Ok(Content::Text(value.to_string()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Content, E> {
        Ok(Content::Text(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Content, E> {
        Ok(Content::Text(value.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Content, E> {
        Ok(Content::Text(String::new()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Content, A::Error> {
        let mut children = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(name) = map.next_key::<String>()? {
            let node = match map.next_value::<Content>()? {
                Content::Text(value) => StateNode::value(name, value),
                Content::Level(nested) => StateNode {
                    children: nested,
                    ..StateNode::level(name)
                },
            };
            children.push(node);
        }
        Ok(Content::Level(children))
    }
}
