//! Reading model definition JSON back into the object model.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use super::encoding::{Encoding, FrequencyEncoding, OneHotEncoding, TargetMeanEncoding};
use super::tree::{DecisionType, SplitNode, TreeNode};
use super::{tags, AggregateOutput, Ensemble, ModelCommon, ModelDefinition, TargetType, TrainedModel, Tree};
use crate::codec::decode_f64;
use crate::{PersistError, Result};

/// A model number: a JSON number or one of the codec's non-finite tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ModelNumber(f64);

impl<'de> Deserialize<'de> for ModelNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct NumberVisitor;

        impl Visitor<'_> for NumberVisitor {
            type Value = ModelNumber;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a number or one of \"nan\", \"inf\", \"-inf\"")
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<ModelNumber, E> {
                Ok(ModelNumber(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<ModelNumber, E> {
                Ok(ModelNumber(value as f64))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<ModelNumber, E> {
                Ok(ModelNumber(value as f64))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<ModelNumber, E> {
                match decode_f64(value) {
                    Ok(number) if !number.is_finite() => Ok(ModelNumber(number)),
                    _ => Err(E::invalid_value(de::Unexpected::Str(value), &self)),
                }
            }
        }

        deserializer.deserialize_any(NumberVisitor)
    }
}

fn numbers(values: Vec<ModelNumber>) -> Vec<f64> {
    values.into_iter().map(|ModelNumber(value)| value).collect()
}

fn number_map(values: BTreeMap<String, ModelNumber>) -> BTreeMap<String, f64> {
    values
        .into_iter()
        .map(|(key, ModelNumber(value))| (key, value))
        .collect()
}

#[derive(Deserialize)]
struct DefinitionJson {
    #[serde(default)]
    preprocessors: Vec<serde_json::Value>,
    trained_model: TrainedModelJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TrainedModelJson {
    Tree(TreeJson),
    Ensemble(EnsembleJson),
}

#[derive(Deserialize)]
struct CommonJson {
    #[serde(default)]
    feature_names: Vec<String>,
    #[serde(default)]
    classification_labels: Option<Vec<String>>,
    #[serde(default)]
    classification_weights: Option<Vec<ModelNumber>>,
    target_type: String,
}

#[derive(Deserialize)]
struct TreeJson {
    #[serde(flatten)]
    common: CommonJson,
    tree_structure: Vec<NodeJson>,
}

#[derive(Deserialize)]
struct EnsembleJson {
    #[serde(flatten)]
    common: CommonJson,
    trained_models: Vec<TrainedModelJson>,
    aggregate_output: BTreeMap<String, WeightsJson>,
}

#[derive(Deserialize)]
struct WeightsJson {
    weights: Vec<ModelNumber>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LeafValue {
    Scalar(ModelNumber),
    Vector(Vec<ModelNumber>),
}

#[derive(Deserialize)]
struct NodeJson {
    node_index: usize,
    #[serde(default)]
    number_samples: u64,
    split_feature: Option<usize>,
    split_gain: Option<ModelNumber>,
    threshold: Option<ModelNumber>,
    #[serde(default)]
    default_left: bool,
    decision_type: Option<String>,
    left_child: Option<usize>,
    right_child: Option<usize>,
    leaf_value: Option<LeafValue>,
}

#[derive(Deserialize)]
struct OneHotJson {
    field: String,
    hot_map: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct FrequencyJson {
    field: String,
    feature_name: String,
    frequency_map: BTreeMap<String, ModelNumber>,
}

#[derive(Deserialize)]
struct TargetMeanJson {
    field: String,
    feature_name: String,
    target_map: BTreeMap<String, ModelNumber>,
    default_value: ModelNumber,
}

impl ModelDefinition {
    /// Rebuild a definition from the JSON written by
    /// [`write_to`](ModelDefinition::write_to).
    ///
    /// Preprocessors that are not one of the typed encoders are kept as
    /// [`Encoding::Opaque`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    pub fn from_json_slice(json: &[u8]) -> Result<Self> {
        let parsed: DefinitionJson = serde_json::from_slice(json)?;
        let preprocessors = parsed
            .preprocessors
            .into_iter()
            .map(parse_encoding)
            .collect::<Result<Vec<_>>>()?;
        let trained_model = match parsed.trained_model {
            TrainedModelJson::Tree(tree) => TrainedModel::Tree(build_tree(tree)?),
            TrainedModelJson::Ensemble(ensemble) => TrainedModel::Ensemble(build_ensemble(ensemble)?),
        };
        Ok(ModelDefinition::new(trained_model).with_preprocessors(preprocessors))
    }
}

fn parse_encoding(value: serde_json::Value) -> Result<Encoding> {
    let typed = value
        .as_object()
        .filter(|members| members.len() == 1)
        .and_then(|members| members.iter().next())
        .map(|(name, body)| (name.clone(), body.clone()));
    let Some((name, body)) = typed else {
        return Ok(Encoding::Opaque(value));
    };
    let encoding = match name.as_str() {
        tags::ONE_HOT_ENCODING => {
            let body: OneHotJson = serde_json::from_value(body)?;
            Encoding::OneHot(OneHotEncoding::new(body.field, body.hot_map))
        }
        tags::FREQUENCY_ENCODING => {
            let body: FrequencyJson = serde_json::from_value(body)?;
            Encoding::Frequency(FrequencyEncoding::new(
                body.field,
                body.feature_name,
                number_map(body.frequency_map),
            ))
        }
        tags::TARGET_MEAN_ENCODING => {
            let body: TargetMeanJson = serde_json::from_value(body)?;
            Encoding::TargetMean(TargetMeanEncoding::new(
                body.field,
                body.feature_name,
                number_map(body.target_map),
                body.default_value.0,
            ))
        }
        _ => Encoding::Opaque(value),
    };
    Ok(encoding)
}

fn build_common(common: CommonJson) -> Result<ModelCommon> {
    Ok(ModelCommon {
        feature_names: common.feature_names,
        target_type: TargetType::from_name(&common.target_type)?,
        classification_labels: common.classification_labels,
        classification_weights: common.classification_weights.map(numbers),
    })
}

fn build_node(node: NodeJson) -> Result<TreeNode> {
    if let Some(leaf_value) = node.leaf_value {
        let values = match leaf_value {
            LeafValue::Scalar(ModelNumber(value)) => vec![value],
            LeafValue::Vector(values) => numbers(values),
        };
        return Ok(TreeNode::leaf(node.node_index, node.number_samples, values));
    }
    let missing = |field: &str| {
        PersistError::invalid_format(format!(
            "Node {} has neither '{}' nor '{field}'",
            node.node_index,
            tags::LEAF_VALUE
        ))
    };
    let split = SplitNode {
        split_feature: node.split_feature.ok_or_else(|| missing(tags::SPLIT_FEATURE))?,
        threshold: node.threshold.ok_or_else(|| missing(tags::THRESHOLD))?.0,
        default_left: node.default_left,
        decision_type: match &node.decision_type {
            Some(name) => DecisionType::from_name(name)?,
            None => DecisionType::default(),
        },
        left_child: node.left_child.ok_or_else(|| missing(tags::LEFT_CHILD))?,
        right_child: node.right_child.ok_or_else(|| missing(tags::RIGHT_CHILD))?,
        split_gain: node.split_gain.map(|ModelNumber(gain)| gain),
    };
    Ok(TreeNode::split(node.node_index, node.number_samples, split))
}

fn build_tree(tree: TreeJson) -> Result<Tree> {
    let nodes = tree
        .tree_structure
        .into_iter()
        .map(build_node)
        .collect::<Result<Vec<_>>>()?;
    Tree::from_parts(build_common(tree.common)?, nodes)
}

fn build_ensemble(ensemble: EnsembleJson) -> Result<Ensemble> {
    let trees = ensemble
        .trained_models
        .into_iter()
        .map(|model| match model {
            TrainedModelJson::Tree(tree) => build_tree(tree),
            TrainedModelJson::Ensemble(_) => Err(PersistError::invalid_format(
                "Nested ensembles are not supported",
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    let mut aggregates = ensemble.aggregate_output.into_iter();
    let aggregate_output = match (aggregates.next(), aggregates.next()) {
        (Some((name, body)), None) => AggregateOutput::from_name(&name, numbers(body.weights))?,
        _ => {
            return Err(PersistError::invalid_format(
                "Ensemble needs exactly one aggregate output",
            ))
        }
    };
    Ensemble::from_parts(build_common(ensemble.common)?, trees, aggregate_output)
}
