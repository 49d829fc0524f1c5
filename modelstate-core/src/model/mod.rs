/*!
Trained model object model.

Trees, ensembles, feature encoders and output aggregators. Each artifact
streams itself to a [`StructuredWriter`] and reports its structural size.
[`ModelDefinition`] ties preprocessing and the trained model together and is
the payload handed to the [chunked exporter](crate::export).
[`ModelMetadata`] is published beside it with training statistics.
*/

pub mod aggregate;
pub mod definition;
pub mod encoding;
pub mod ensemble;
pub mod metadata;
mod parse;
pub mod size_info;
pub mod tree;
pub mod writer;

pub use aggregate::AggregateOutput;
pub use definition::{ModelDefinition, TrainedModel};
pub use encoding::{Encoding, FrequencyEncoding, OneHotEncoding, TargetMeanEncoding};
pub use ensemble::Ensemble;
pub use metadata::{
    FeatureImportance, Hyperparameter, HyperparameterValue, ModelMetadata, PredictionFieldType,
};
pub use size_info::ModelSizeInfo;
pub use tree::{DecisionType, NodeKind, SplitNode, Tree, TreeNode};
pub use writer::{JsonStreamWriter, StructuredWriter};

use crate::{PersistError, Result};

/// Field names of the model definition JSON.
pub mod tags {
    pub const PREPROCESSORS: &str = "preprocessors";
    pub const TRAINED_MODEL: &str = "trained_model";

    pub const TREE: &str = "tree";
    pub const ENSEMBLE: &str = "ensemble";
    pub const TREE_STRUCTURE: &str = "tree_structure";
    pub const TRAINED_MODELS: &str = "trained_models";
    pub const AGGREGATE_OUTPUT: &str = "aggregate_output";

    pub const FEATURE_NAMES: &str = "feature_names";
    pub const CLASSIFICATION_LABELS: &str = "classification_labels";
    pub const CLASSIFICATION_WEIGHTS: &str = "classification_weights";
    pub const TARGET_TYPE: &str = "target_type";

    pub const NODE_INDEX: &str = "node_index";
    pub const NUMBER_SAMPLES: &str = "number_samples";
    pub const SPLIT_FEATURE: &str = "split_feature";
    pub const SPLIT_GAIN: &str = "split_gain";
    pub const THRESHOLD: &str = "threshold";
    pub const DEFAULT_LEFT: &str = "default_left";
    pub const DECISION_TYPE: &str = "decision_type";
    pub const LEFT_CHILD: &str = "left_child";
    pub const RIGHT_CHILD: &str = "right_child";
    pub const LEAF_VALUE: &str = "leaf_value";

    pub const WEIGHTS: &str = "weights";
    pub const WEIGHTED_SUM: &str = "weighted_sum";
    pub const WEIGHTED_MODE: &str = "weighted_mode";
    pub const LOGISTIC_REGRESSION: &str = "logistic_regression";
    pub const EXPONENT: &str = "exponent";

    pub const ONE_HOT_ENCODING: &str = "one_hot_encoding";
    pub const FREQUENCY_ENCODING: &str = "frequency_encoding";
    pub const TARGET_MEAN_ENCODING: &str = "target_mean_encoding";
    pub const FIELD: &str = "field";
    pub const FEATURE_NAME: &str = "feature_name";
    pub const HOT_MAP: &str = "hot_map";
    pub const FREQUENCY_MAP: &str = "frequency_map";
    pub const TARGET_MAP: &str = "target_map";
    pub const DEFAULT_VALUE: &str = "default_value";

    pub const MODEL_METADATA: &str = "model_metadata";
    pub const TOTAL_FEATURE_IMPORTANCE: &str = "total_feature_importance";
    pub const IMPORTANCE: &str = "importance";
    pub const MEAN_MAGNITUDE: &str = "mean_magnitude";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const CLASSES: &str = "classes";
    pub const CLASS_NAME: &str = "class_name";
    pub const FEATURE_IMPORTANCE_BASELINE: &str = "feature_importance_baseline";
    pub const BASELINE: &str = "baseline";
    pub const HYPERPARAMETERS: &str = "hyperparameters";
    pub const NAME: &str = "name";
    pub const VALUE: &str = "value";
    pub const ABSOLUTE_IMPORTANCE: &str = "absolute_importance";
    pub const RELATIVE_IMPORTANCE: &str = "relative_importance";
    pub const SUPPLIED: &str = "supplied";
    pub const TRAIN_PROPERTIES: &str = "train_properties";
    pub const NUM_TRAIN_ROWS: &str = "num_train_rows";
    pub const TRAIN_FRACTION_PER_FOLD: &str = "train_fraction_per_fold";
}

/// What a model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    Classification,
    #[default]
    Regression,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Classification => "classification",
            TargetType::Regression => "regression",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "classification" => Ok(TargetType::Classification),
            "regression" => Ok(TargetType::Regression),
            other => Err(PersistError::invalid_format(format!(
                "Unknown target type '{other}'"
            ))),
        }
    }
}

/// Attributes shared by every trained model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelCommon {
    pub feature_names: Vec<String>,
    pub target_type: TargetType,
    pub classification_labels: Option<Vec<String>>,
    pub classification_weights: Option<Vec<f64>>,
}

impl ModelCommon {
    pub fn new(feature_names: Vec<String>, target_type: TargetType) -> Self {
        Self {
            feature_names,
            target_type,
            classification_labels: None,
            classification_weights: None,
        }
    }

    /// Number of classes, from the labels or else the class weights.
    pub fn num_classes(&self) -> Option<usize> {
        self.classification_labels
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.classification_weights.as_ref().map(Vec::len))
    }

    /// Write the shared members into the currently open object.
    pub(crate) fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.string_array(tags::FEATURE_NAMES, &self.feature_names)?;
        if let Some(labels) = &self.classification_labels {
            writer.string_array(tags::CLASSIFICATION_LABELS, labels)?;
        }
        if let Some(weights) = &self.classification_weights {
            writer.number_array(tags::CLASSIFICATION_WEIGHTS, weights)?;
        }
        writer.key(tags::TARGET_TYPE)?;
        writer.string(self.target_type.as_str())
    }
}

/// Length of `text` in UTF-16 code units, the unit the size estimates use.
pub(crate) fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}
