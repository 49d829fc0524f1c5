/*!
Structural size reports of a model definition.

The report lets a consumer estimate the memory a model needs before loading
it. Name lengths are counted in UTF-16 code units.
*/

use serde::{Deserialize, Serialize};

use super::{utf16_len, Ensemble, ModelCommon, TargetType, Tree};
use crate::Result;

/// Size of one typed preprocessor, keyed by the encoder's type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingSizeInfo {
    OneHotEncoding {
        field_length: usize,
        field_value_lengths: Vec<usize>,
        feature_name_lengths: Vec<usize>,
    },
    FrequencyEncoding {
        field_length: usize,
        feature_name_length: usize,
        field_value_lengths: Vec<usize>,
    },
    TargetMeanEncoding {
        field_length: usize,
        feature_name_length: usize,
        field_value_lengths: Vec<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSizeInfo {
    pub num_nodes: usize,
    pub num_leaves: usize,
}

impl From<&Tree> for TreeSizeInfo {
    fn from(tree: &Tree) -> Self {
        let (num_nodes, num_leaves) = tree.node_counts();
        Self {
            num_nodes,
            num_leaves,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleSizeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_classification_weights: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<usize>,
    pub feature_name_lengths: Vec<usize>,
    pub tree_sizes: Vec<TreeSizeInfo>,
    pub num_output_processor_weights: usize,
    pub num_operations: usize,
}

impl From<&Ensemble> for EnsembleSizeInfo {
    fn from(ensemble: &Ensemble) -> Self {
        let (num_classification_weights, num_classes) = classification_counts(ensemble.common());
        Self {
            num_classification_weights,
            num_classes,
            feature_name_lengths: ensemble
                .feature_names()
                .iter()
                .map(|name| utf16_len(name))
                .collect(),
            tree_sizes: ensemble.trees().iter().map(TreeSizeInfo::from).collect(),
            num_output_processor_weights: ensemble.trees().len(),
            num_operations: ensemble.trees().iter().map(Tree::num_operations).sum(),
        }
    }
}

/// Size of the trained model: a full ensemble report or the counts of a
/// single tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainedModelSizeInfo {
    Ensemble(EnsembleSizeInfo),
    Tree(TreeSizeInfo),
}

impl TrainedModelSizeInfo {
    pub fn num_operations(&self) -> usize {
        match self {
            TrainedModelSizeInfo::Ensemble(info) => info.num_operations,
            TrainedModelSizeInfo::Tree(info) => {
                ((info.num_nodes + info.num_leaves + 1) as f64).log2().ceil() as usize
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainedModelSize {
    pub ensemble_model_size: TrainedModelSizeInfo,
}

/// `model_size_info` report of a whole definition.
///
/// # Example
/// ```rust
/// use modelstate_core::model::{ModelDefinition, TargetType, Tree, TreeNode};
///
/// let tree = Tree::new(vec![], TargetType::Regression, vec![TreeNode::leaf(0, 1, vec![0.5])])?;
/// let info = ModelDefinition::new(tree.into()).size_info();
/// assert_eq!(
///     info.json_string()?,
///     r#"{"preprocessors":[],"trained_model_size":{"ensemble_model_size":{"num_nodes":0,"num_leaves":1}}}"#
/// );
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSizeInfo {
    pub preprocessors: Vec<EncodingSizeInfo>,
    pub trained_model_size: TrainedModelSize,
}

impl ModelSizeInfo {
    pub const TYPE_NAME: &'static str = "model_size_info";

    pub fn json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn num_operations(&self) -> usize {
        self.trained_model_size.ensemble_model_size.num_operations()
    }
}

fn classification_counts(common: &ModelCommon) -> (Option<usize>, Option<usize>) {
    match common.target_type {
        TargetType::Classification => (
            Some(common.classification_weights.as_ref().map_or(0, Vec::len)),
            Some(common.classification_labels.as_ref().map_or(0, Vec::len)),
        ),
        TargetType::Regression => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encoding_size_info_is_keyed_by_type() {
        let info = EncodingSizeInfo::FrequencyEncoding {
            field_length: 4,
            feature_name_length: 9,
            field_value_lengths: vec![1, 2],
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"frequency_encoding": {
                "field_length": 4,
                "feature_name_length": 9,
                "field_value_lengths": [1, 2]
            }})
        );
    }

    #[test]
    fn test_ensemble_size_field_order() {
        let info = EnsembleSizeInfo {
            num_classification_weights: Some(2),
            num_classes: Some(2),
            feature_name_lengths: vec![2],
            tree_sizes: vec![TreeSizeInfo {
                num_nodes: 1,
                num_leaves: 2,
            }],
            num_output_processor_weights: 1,
            num_operations: 2,
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"num_classification_weights":2,"num_classes":2,"feature_name_lengths":[2],"tree_sizes":[{"num_nodes":1,"num_leaves":2}],"num_output_processor_weights":1,"num_operations":2}"#
        );
    }

    #[test]
    fn test_report_parses_back() {
        let info = ModelSizeInfo {
            preprocessors: vec![],
            trained_model_size: TrainedModelSize {
                ensemble_model_size: TrainedModelSizeInfo::Tree(TreeSizeInfo {
                    num_nodes: 3,
                    num_leaves: 4,
                }),
            },
        };
        let parsed: ModelSizeInfo = serde_json::from_str(&info.json_string().unwrap()).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.num_operations(), 3);
    }
}
