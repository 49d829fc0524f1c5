/*!
Feature encoders applied before the trained model.
*/

use std::collections::BTreeMap;

use super::size_info::EncodingSizeInfo;
use super::writer::StructuredWriter;
use super::{tags, utf16_len};
use crate::Result;

/// Maps each value of `field` to the name of a 0/1 indicator feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OneHotEncoding {
    pub field: String,
    pub hot_map: BTreeMap<String, String>,
}

impl OneHotEncoding {
    pub fn new(field: impl Into<String>, hot_map: BTreeMap<String, String>) -> Self {
        Self {
            field: field.into(),
            hot_map,
        }
    }

    /// Name of the indicator feature that is hot for `value`.
    pub fn encode(&self, value: &str) -> Option<&str> {
        self.hot_map.get(value).map(String::as_str)
    }
}

/// Replaces a categorical value by its frequency in the training data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrequencyEncoding {
    pub field: String,
    pub feature_name: String,
    pub frequency_map: BTreeMap<String, f64>,
}

impl FrequencyEncoding {
    pub fn new(
        field: impl Into<String>,
        feature_name: impl Into<String>,
        frequency_map: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            field: field.into(),
            feature_name: feature_name.into(),
            frequency_map,
        }
    }

    /// Unseen values have frequency zero.
    pub fn encode(&self, value: &str) -> f64 {
        self.frequency_map.get(value).copied().unwrap_or(0.0)
    }
}

/// Replaces a categorical value by the mean target of its category.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetMeanEncoding {
    pub field: String,
    pub feature_name: String,
    pub target_map: BTreeMap<String, f64>,
    pub default_value: f64,
}

impl TargetMeanEncoding {
    pub fn new(
        field: impl Into<String>,
        feature_name: impl Into<String>,
        target_map: BTreeMap<String, f64>,
        default_value: f64,
    ) -> Self {
        Self {
            field: field.into(),
            feature_name: feature_name.into(),
            target_map,
            default_value,
        }
    }

    pub fn encode(&self, value: &str) -> f64 {
        self.target_map
            .get(value)
            .copied()
            .unwrap_or(self.default_value)
    }
}

/// A preprocessor of the model definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    OneHot(OneHotEncoding),
    Frequency(FrequencyEncoding),
    TargetMean(TargetMeanEncoding),
    /// Custom preprocessor JSON supplied by the caller and copied verbatim.
    Opaque(serde_json::Value),
}

impl Encoding {
    /// Wrapper key of a typed encoder; `None` for opaque ones.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Encoding::OneHot(_) => Some(tags::ONE_HOT_ENCODING),
            Encoding::Frequency(_) => Some(tags::FREQUENCY_ENCODING),
            Encoding::TargetMean(_) => Some(tags::TARGET_MEAN_ENCODING),
            Encoding::Opaque(_) => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Encoding::Opaque(_))
    }

    /// Input field the encoder reads.
    pub fn field(&self) -> Option<&str> {
        match self {
            Encoding::OneHot(encoding) => Some(&encoding.field),
            Encoding::Frequency(encoding) => Some(&encoding.field),
            Encoding::TargetMean(encoding) => Some(&encoding.field),
            Encoding::Opaque(_) => None,
        }
    }

    /// Write this encoder as an element of the `preprocessors` array.
    ///
    /// Typed encoders become `{"<type>": {...}}`. Opaque arrays are spliced
    /// into the enclosing array, non-empty opaque objects are copied as-is and
    /// anything else is dropped.
    pub fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        if let Encoding::Opaque(value) = self {
            return write_opaque(value, writer);
        }
        writer.start_object()?;
        match self {
            Encoding::OneHot(encoding) => {
                writer.key(tags::ONE_HOT_ENCODING)?;
                writer.start_object()?;
                writer.key(tags::FIELD)?;
                writer.string(&encoding.field)?;
                writer.key(tags::HOT_MAP)?;
                writer.start_object()?;
                for (value, feature) in &encoding.hot_map {
                    writer.key(value)?;
                    writer.string(feature)?;
                }
                writer.end_object()?;
            }
            Encoding::Frequency(encoding) => {
                writer.key(tags::FREQUENCY_ENCODING)?;
                writer.start_object()?;
                writer.key(tags::FIELD)?;
                writer.string(&encoding.field)?;
                writer.key(tags::FEATURE_NAME)?;
                writer.string(&encoding.feature_name)?;
                write_number_map(writer, tags::FREQUENCY_MAP, &encoding.frequency_map)?;
            }
            Encoding::TargetMean(encoding) => {
                writer.key(tags::TARGET_MEAN_ENCODING)?;
                writer.start_object()?;
                writer.key(tags::FIELD)?;
                writer.string(&encoding.field)?;
                writer.key(tags::DEFAULT_VALUE)?;
                writer.number(encoding.default_value)?;
                writer.key(tags::FEATURE_NAME)?;
                writer.string(&encoding.feature_name)?;
                write_number_map(writer, tags::TARGET_MAP, &encoding.target_map)?;
            }
            Encoding::Opaque(_) => {}
        }
        writer.end_object()?;
        writer.end_object()
    }

    /// Structural size of a typed encoder; opaque encoders are not sized.
    pub fn size_info(&self) -> Option<EncodingSizeInfo> {
        match self {
            Encoding::OneHot(encoding) => Some(EncodingSizeInfo::OneHotEncoding {
                field_length: utf16_len(&encoding.field),
                field_value_lengths: encoding.hot_map.keys().map(|value| utf16_len(value)).collect(),
                feature_name_lengths: encoding
                    .hot_map
                    .values()
                    .map(|feature| utf16_len(feature))
                    .collect(),
            }),
            Encoding::Frequency(encoding) => Some(EncodingSizeInfo::FrequencyEncoding {
                field_length: utf16_len(&encoding.field),
                feature_name_length: utf16_len(&encoding.feature_name),
                field_value_lengths: encoding
                    .frequency_map
                    .keys()
                    .map(|value| utf16_len(value))
                    .collect(),
            }),
            Encoding::TargetMean(encoding) => Some(EncodingSizeInfo::TargetMeanEncoding {
                field_length: utf16_len(&encoding.field),
                feature_name_length: utf16_len(&encoding.feature_name),
                field_value_lengths: encoding
                    .target_map
                    .keys()
                    .map(|value| utf16_len(value))
                    .collect(),
            }),
            Encoding::Opaque(_) => None,
        }
    }
}

fn write_opaque<W: StructuredWriter + ?Sized>(
    value: &serde_json::Value,
    writer: &mut W,
) -> Result<()> {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                writer.raw_value(item)?;
            }
        }
        serde_json::Value::Object(members) if !members.is_empty() => writer.raw_value(value)?,
        other => tracing::debug!("Skipping custom preprocessor that is not an object: {}", other),
    }
    Ok(())
}

fn write_number_map<W: StructuredWriter + ?Sized>(
    writer: &mut W,
    key: &str,
    map: &BTreeMap<String, f64>,
) -> Result<()> {
    writer.key(key)?;
    writer.start_object()?;
    for (value, number) in map {
        writer.key(value)?;
        writer.number(*number)?;
    }
    writer.end_object()
}

impl From<OneHotEncoding> for Encoding {
    fn from(encoding: OneHotEncoding) -> Self {
        Encoding::OneHot(encoding)
    }
}

impl From<FrequencyEncoding> for Encoding {
    fn from(encoding: FrequencyEncoding) -> Self {
        Encoding::Frequency(encoding)
    }
}

impl From<TargetMeanEncoding> for Encoding {
    fn from(encoding: TargetMeanEncoding) -> Self {
        Encoding::TargetMean(encoding)
    }
}
