/*!
Complete model definition: preprocessing plus the trained model.
*/

use std::io::Write;

use super::encoding::Encoding;
use super::size_info::{ModelSizeInfo, TrainedModelSize, TrainedModelSizeInfo, TreeSizeInfo};
use super::writer::{JsonStreamWriter, StructuredWriter};
use super::{tags, Ensemble, ModelCommon, Tree};
use crate::Result;

/// The trained model of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainedModel {
    Tree(Tree),
    Ensemble(Ensemble),
}

impl TrainedModel {
    pub fn common(&self) -> &ModelCommon {
        match self {
            TrainedModel::Tree(tree) => tree.common(),
            TrainedModel::Ensemble(ensemble) => ensemble.common(),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.common().feature_names
    }

    /// See [`Tree::remove_unused_features`] and
    /// [`Ensemble::remove_unused_features`].
    pub fn remove_unused_features(&mut self) -> Vec<String> {
        match self {
            TrainedModel::Tree(tree) => tree.remove_unused_features(),
            TrainedModel::Ensemble(ensemble) => ensemble.remove_unused_features(),
        }
    }

    pub fn size_info(&self) -> TrainedModelSizeInfo {
        match self {
            TrainedModel::Tree(tree) => TrainedModelSizeInfo::Tree(TreeSizeInfo::from(tree)),
            TrainedModel::Ensemble(ensemble) => TrainedModelSizeInfo::Ensemble(ensemble.into()),
        }
    }

    fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        match self {
            TrainedModel::Tree(tree) => tree.write_to(writer),
            TrainedModel::Ensemble(ensemble) => ensemble.write_to(writer),
        }
    }
}

impl From<Tree> for TrainedModel {
    fn from(tree: Tree) -> Self {
        TrainedModel::Tree(tree)
    }
}

impl From<Ensemble> for TrainedModel {
    fn from(ensemble: Ensemble) -> Self {
        TrainedModel::Ensemble(ensemble)
    }
}

/// What an inference host needs to run a trained model.
///
/// # Example
/// ```rust
/// use modelstate_core::model::{ModelDefinition, TargetType, Tree, TreeNode};
///
/// let tree = Tree::new(vec![], TargetType::Regression, vec![TreeNode::leaf(0, 5, vec![1.5])])?;
/// let definition = ModelDefinition::new(tree.into());
/// let json = definition.json_string()?;
/// assert!(json.starts_with(r#"{"preprocessors":[],"trained_model":{"tree":"#));
/// assert_eq!(ModelDefinition::from_json_str(&json)?, definition);
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    preprocessors: Vec<Encoding>,
    trained_model: TrainedModel,
}

impl ModelDefinition {
    pub fn new(trained_model: TrainedModel) -> Self {
        Self {
            preprocessors: Vec::new(),
            trained_model,
        }
    }

    pub fn with_preprocessors(mut self, preprocessors: Vec<Encoding>) -> Self {
        self.preprocessors = preprocessors;
        self
    }

    pub fn add_preprocessor(&mut self, encoding: impl Into<Encoding>) {
        self.preprocessors.push(encoding.into());
    }

    pub fn preprocessors(&self) -> &[Encoding] {
        &self.preprocessors
    }

    pub fn trained_model(&self) -> &TrainedModel {
        &self.trained_model
    }

    pub fn trained_model_mut(&mut self) -> &mut TrainedModel {
        &mut self.trained_model
    }

    /// Stream the whole definition as one JSON object.
    ///
    /// Opaque preprocessors are written before the typed ones.
    pub fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.start_object()?;
        writer.key(tags::PREPROCESSORS)?;
        writer.start_array()?;
        let (opaque, typed): (Vec<&Encoding>, Vec<&Encoding>) =
            self.preprocessors.iter().partition(|encoding| encoding.is_opaque());
        for encoding in opaque.into_iter().chain(typed) {
            encoding.write_to(writer)?;
        }
        writer.end_array()?;
        writer.key(tags::TRAINED_MODEL)?;
        writer.start_object()?;
        self.trained_model.write_to(writer)?;
        writer.end_object()?;
        writer.end_object()
    }

    /// Write compact JSON to `out` and hand it back.
    pub fn write_json<W: Write>(&self, out: W) -> Result<W> {
        let mut writer = JsonStreamWriter::new(out);
        self.write_to(&mut writer)?;
        writer.finish()
    }

    pub fn json_string(&self) -> Result<String> {
        let bytes = self.write_json(Vec::new())?;
        String::from_utf8(bytes)
            .map_err(|e| crate::PersistError::format(format!("Model JSON is not UTF-8: {e}")))
    }

    pub fn size_info(&self) -> ModelSizeInfo {
        ModelSizeInfo {
            preprocessors: self
                .preprocessors
                .iter()
                .filter_map(Encoding::size_info)
                .collect(),
            trained_model_size: TrainedModelSize {
                ensemble_model_size: self.trained_model.size_info(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AggregateOutput, DecisionType, FrequencyEncoding, SplitNode, TargetType, TreeNode,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    fn stump(names: &[&str], feature: usize) -> Tree {
        Tree::new(
            names.iter().map(|name| name.to_string()).collect(),
            TargetType::Classification,
            vec![
                TreeNode::split(
                    0,
                    8,
                    SplitNode {
                        split_feature: feature,
                        threshold: 1.0,
                        default_left: true,
                        decision_type: DecisionType::Lt,
                        left_child: 1,
                        right_child: 2,
                        split_gain: None,
                    },
                ),
                TreeNode::leaf(1, 5, vec![0.1, 0.9]),
                TreeNode::leaf(2, 3, vec![0.7, 0.3]),
            ],
        )
        .unwrap()
    }

    fn definition() -> ModelDefinition {
        let names = ["f1", "f2"];
        let mut ensemble = Ensemble::new(
            names.iter().map(|name| name.to_string()).collect(),
            TargetType::Classification,
            vec![stump(&names, 0), stump(&names, 1)],
            AggregateOutput::LogisticRegression(vec![0.5, 0.5]),
        )
        .unwrap();
        ensemble.set_classification_labels(vec!["no".into(), "yes".into()]);
        ensemble.set_classification_weights(vec![1.0, 2.0]);
        let mut definition = ModelDefinition::new(ensemble.into());
        definition.add_preprocessor(FrequencyEncoding::new(
            "city",
            "f2",
            BTreeMap::from([("paris".to_string(), 0.5)]),
        ));
        definition.add_preprocessor(Encoding::Opaque(json!({"custom": {"a": 1}})));
        definition
    }

    #[test]
    fn test_opaque_preprocessors_come_first() {
        let json: serde_json::Value =
            serde_json::from_str(&definition().json_string().unwrap()).unwrap();
        let preprocessors = json["preprocessors"].as_array().unwrap();
        assert_eq!(preprocessors[0], json!({"custom": {"a": 1}}));
        assert!(preprocessors[1].get("frequency_encoding").is_some());
        assert!(json["trained_model"]["ensemble"].is_object());
    }

    #[test]
    fn test_size_info_for_classification_ensemble() {
        let info = definition().size_info();
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({
                "preprocessors": [{"frequency_encoding": {
                    "field_length": 4,
                    "feature_name_length": 2,
                    "field_value_lengths": [5]
                }}],
                "trained_model_size": {"ensemble_model_size": {
                    "num_classification_weights": 2,
                    "num_classes": 2,
                    "feature_name_lengths": [2, 2],
                    "tree_sizes": [
                        {"num_nodes": 1, "num_leaves": 2},
                        {"num_nodes": 1, "num_leaves": 2}
                    ],
                    "num_output_processor_weights": 2,
                    "num_operations": 4
                }}
            })
        );
    }

    #[test]
    fn test_write_json_into_any_sink() {
        let definition = definition();
        let mut sink = Vec::from(&b"prefix:"[..]);
        sink = definition.write_json(sink).unwrap();
        assert!(sink.starts_with(b"prefix:{\"preprocessors\""));
        assert_eq!(&sink[7..], definition.json_string().unwrap().as_bytes());
    }
}
