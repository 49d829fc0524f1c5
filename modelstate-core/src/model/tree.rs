/*!
Decision trees stored as an arena of nodes addressed by index.
*/

use std::collections::HashMap;

use super::writer::StructuredWriter;
use super::{tags, ModelCommon, TargetType};
use crate::{PersistError, Result};

/// Comparison applied at a split node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionType {
    /// Go left when `feature < threshold`
    #[default]
    Lt,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Lt => "lt",
        }
    }

    /// Parse the name written by [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "lt" => Ok(DecisionType::Lt),
            other => Err(PersistError::invalid_format(format!(
                "Unknown decision type '{other}'"
            ))),
        }
    }
}

/// Split parameters of an internal node.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitNode {
    pub split_feature: usize,
    pub threshold: f64,
    pub default_left: bool,
    pub decision_type: DecisionType,
    pub left_child: usize,
    pub right_child: usize,
    pub split_gain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Split(SplitNode),
    /// One value per loss function parameter.
    Leaf(Vec<f64>),
}

/// One node of a tree arena.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub node_index: usize,
    pub number_samples: u64,
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn split(node_index: usize, number_samples: u64, split: SplitNode) -> Self {
        Self {
            node_index,
            number_samples,
            kind: NodeKind::Split(split),
        }
    }

    pub fn leaf(node_index: usize, number_samples: u64, value: Vec<f64>) -> Self {
        Self {
            node_index,
            number_samples,
            kind: NodeKind::Leaf(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.key(tags::NODE_INDEX)?;
        writer.unsigned(self.node_index as u64)?;
        writer.key(tags::NUMBER_SAMPLES)?;
        writer.unsigned(self.number_samples)?;
        match &self.kind {
            NodeKind::Split(split) => {
                writer.key(tags::SPLIT_FEATURE)?;
                writer.unsigned(split.split_feature as u64)?;
                if let Some(gain) = split.split_gain {
                    writer.key(tags::SPLIT_GAIN)?;
                    writer.number(gain)?;
                }
                writer.key(tags::THRESHOLD)?;
                writer.number(split.threshold)?;
                writer.key(tags::DEFAULT_LEFT)?;
                writer.boolean(split.default_left)?;
                writer.key(tags::DECISION_TYPE)?;
                writer.string(split.decision_type.as_str())?;
                writer.key(tags::LEFT_CHILD)?;
                writer.unsigned(split.left_child as u64)?;
                writer.key(tags::RIGHT_CHILD)?;
                writer.unsigned(split.right_child as u64)?;
            }
            NodeKind::Leaf(values) if values.len() == 1 => {
                writer.key(tags::LEAF_VALUE)?;
                writer.number(values[0])?;
            }
            NodeKind::Leaf(values) => writer.number_array(tags::LEAF_VALUE, values)?,
        }
        Ok(())
    }
}

/// A single decision tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub(crate) common: ModelCommon,
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Build a tree and check its structure.
    pub fn new(feature_names: Vec<String>, target_type: TargetType, nodes: Vec<TreeNode>) -> Result<Self> {
        let tree = Self {
            common: ModelCommon::new(feature_names, target_type),
            nodes,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn common(&self) -> &ModelCommon {
        &self.common
    }

    pub fn feature_names(&self) -> &[String] {
        &self.common.feature_names
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of nodes in the arena.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Counts of `(split nodes, leaves)`.
    pub fn node_counts(&self) -> (usize, usize) {
        let leaves = self.nodes.iter().filter(|node| node.is_leaf()).count();
        (self.nodes.len() - leaves, leaves)
    }

    /// Estimated number of comparisons to evaluate the tree.
    pub fn num_operations(&self) -> usize {
        let (nodes, leaves) = self.node_counts();
        ((nodes + leaves + 1) as f64).log2().ceil() as usize
    }

    /// Check the arena: indices match positions, children are in range,
    /// every node but the root has exactly one parent and split features
    /// name a known feature.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PersistError::validation("tree has no nodes"));
        }
        let mut parents = vec![0usize; self.nodes.len()];
        for (position, node) in self.nodes.iter().enumerate() {
            if node.node_index != position {
                return Err(PersistError::validation(format!(
                    "node at position {position} has index {}",
                    node.node_index
                )));
            }
            match &node.kind {
                NodeKind::Split(split) => {
                    for child in [split.left_child, split.right_child] {
                        if child == 0 || child >= self.nodes.len() {
                            return Err(PersistError::validation(format!(
                                "node {position} has invalid child {child}"
                            )));
                        }
                        parents[child] += 1;
                    }
                    if split.split_feature >= self.common.feature_names.len() {
                        return Err(PersistError::validation(format!(
                            "node {position} splits on feature {} of {}",
                            split.split_feature,
                            self.common.feature_names.len()
                        )));
                    }
                }
                NodeKind::Leaf(values) if values.is_empty() => {
                    return Err(PersistError::validation(format!(
                        "leaf {position} has no value"
                    )));
                }
                NodeKind::Leaf(_) => {}
            }
        }
        if let Some(orphan) = parents.iter().skip(1).position(|&count| count != 1) {
            return Err(PersistError::validation(format!(
                "node {} is reached from {} parents",
                orphan + 1,
                parents[orphan + 1]
            )));
        }
        // One parent each still allows a detached cycle.
        let mut reached = 0;
        let mut pending = vec![0];
        while let Some(index) = pending.pop() {
            reached += 1;
            if let NodeKind::Split(split) = &self.nodes[index].kind {
                pending.push(split.left_child);
                pending.push(split.right_child);
            }
        }
        if reached != self.nodes.len() {
            return Err(PersistError::validation(format!(
                "only {reached} of {} nodes are reachable from the root",
                self.nodes.len()
            )));
        }
        Ok(())
    }

    /// Find the leaf that `features` fall into. Missing values (NaN) follow
    /// the default branch.
    pub fn leaf_for(&self, features: &[f64]) -> Result<&[f64]> {
        let mut index = 0;
        for _ in 0..self.nodes.len() {
            match &self.nodes[index].kind {
                NodeKind::Leaf(values) => return Ok(values),
                NodeKind::Split(split) => {
                    let value = features.get(split.split_feature).copied().ok_or_else(|| {
                        PersistError::validation(format!(
                            "feature vector has no value for feature {}",
                            split.split_feature
                        ))
                    })?;
                    let go_left = if value.is_nan() {
                        split.default_left
                    } else {
                        match split.decision_type {
                            DecisionType::Lt => value < split.threshold,
                        }
                    };
                    index = if go_left { split.left_child } else { split.right_child };
                }
            }
        }
        Err(PersistError::validation("tree contains a cycle"))
    }

    /// Remap split features to a dense range in first-encounter order and
    /// keep only the names of features that are used. Returns those names.
    pub fn remove_unused_features(&mut self) -> Vec<String> {
        let mut selected: HashMap<usize, usize> = HashMap::new();
        let mut order = Vec::new();
        for node in &mut self.nodes {
            if let NodeKind::Split(split) = &mut node.kind {
                let feature = split.split_feature;
                let next = selected.len();
                split.split_feature = *selected.entry(feature).or_insert_with(|| {
                    order.push(feature);
                    next
                });
            }
        }
        let names: Vec<String> = order
            .into_iter()
            .map(|old| self.common.feature_names.get(old).cloned().unwrap_or_default())
            .collect();
        self.common.feature_names = names.clone();
        names
    }

    /// Rewrite split features through `mapping` (old index to new index).
    pub(crate) fn remap_features(&mut self, mapping: &[usize]) {
        for node in &mut self.nodes {
            if let NodeKind::Split(split) = &mut node.kind {
                if let Some(&index) = mapping.get(split.split_feature) {
                    split.split_feature = index;
                }
            }
        }
    }

    /// Stream the body of `{"tree": {...}}`.
    pub fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.key(tags::TREE)?;
        writer.start_object()?;
        self.common.write_to(writer)?;
        writer.key(tags::TREE_STRUCTURE)?;
        writer.start_array()?;
        for node in &self.nodes {
            writer.start_object()?;
            node.write_to(writer)?;
            writer.end_object()?;
        }
        writer.end_array()?;
        writer.end_object()
    }

    pub(crate) fn from_parts(common: ModelCommon, nodes: Vec<TreeNode>) -> Result<Self> {
        let tree = Self { common, nodes };
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JsonStreamWriter;

    fn stump(feature_names: &[&str], feature: usize, threshold: f64) -> Tree {
        Tree::new(
            feature_names.iter().map(|name| name.to_string()).collect(),
            TargetType::Regression,
            vec![
                TreeNode::split(
                    0,
                    10,
                    SplitNode {
                        split_feature: feature,
                        threshold,
                        default_left: true,
                        decision_type: DecisionType::Lt,
                        left_child: 1,
                        right_child: 2,
                        split_gain: Some(12.5),
                    },
                ),
                TreeNode::leaf(1, 6, vec![1.0]),
                TreeNode::leaf(2, 4, vec![2.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_leaf_for_routes_by_threshold_and_default() {
        let tree = stump(&["f1", "f2"], 1, 0.5);
        assert_eq!(tree.leaf_for(&[9.0, 0.1]).unwrap(), &[1.0]);
        assert_eq!(tree.leaf_for(&[9.0, 0.5]).unwrap(), &[2.0]);
        assert_eq!(tree.leaf_for(&[9.0, f64::NAN]).unwrap(), &[1.0]);
        assert!(tree.leaf_for(&[9.0]).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_arenas() {
        let names = vec!["f".to_string()];
        let bad_child = vec![
            TreeNode::split(
                0,
                1,
                SplitNode {
                    split_feature: 0,
                    threshold: 0.0,
                    default_left: false,
                    decision_type: DecisionType::Lt,
                    left_child: 1,
                    right_child: 5,
                    split_gain: None,
                },
            ),
            TreeNode::leaf(1, 1, vec![0.0]),
        ];
        assert!(Tree::new(names.clone(), TargetType::Regression, bad_child).is_err());

        let orphan = vec![TreeNode::leaf(0, 1, vec![0.0]), TreeNode::leaf(1, 1, vec![0.0])];
        assert!(Tree::new(names.clone(), TargetType::Regression, orphan).is_err());

        let empty_leaf = vec![TreeNode::leaf(0, 1, vec![])];
        assert!(Tree::new(names.clone(), TargetType::Regression, empty_leaf).is_err());

        assert!(Tree::new(names, TargetType::Regression, vec![]).is_err());
    }

    #[test]
    fn test_remove_unused_features_is_idempotent() {
        let mut tree = stump(&["f1", "f2", "f3"], 2, 0.5);
        assert_eq!(tree.remove_unused_features(), ["f3"]);
        let before = tree.clone();
        assert_eq!(tree.remove_unused_features(), ["f3"]);
        assert_eq!(tree, before);
        match &tree.nodes()[0].kind {
            NodeKind::Split(split) => assert_eq!(split.split_feature, 0),
            NodeKind::Leaf(_) => panic!("root should split"),
        }
    }

    #[test]
    fn test_size_estimates() {
        let tree = stump(&["f"], 0, 0.0);
        assert_eq!(tree.node_counts(), (1, 2));
        assert_eq!(tree.num_operations(), 2);
    }

    #[test]
    fn test_stream_output() {
        let mut tree = stump(&["f"], 0, 0.5);
        if let NodeKind::Leaf(values) = &mut tree.nodes[2].kind {
            values.push(3.0);
        }
        let mut writer = JsonStreamWriter::new(Vec::new());
        writer.start_object().unwrap();
        tree.write_to(&mut writer).unwrap();
        writer.end_object().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&writer.finish().unwrap()).unwrap();

        let tree_json = &json["tree"];
        assert_eq!(tree_json["feature_names"], serde_json::json!(["f"]));
        assert_eq!(tree_json["target_type"], "regression");
        let nodes = tree_json["tree_structure"].as_array().unwrap();
        assert_eq!(nodes[0]["decision_type"], "lt");
        assert_eq!(nodes[0]["split_gain"], 12.5);
        assert_eq!(nodes[0]["left_child"], 1);
        assert_eq!(nodes[1]["leaf_value"], 1.0);
        assert_eq!(nodes[2]["leaf_value"], serde_json::json!([2.0, 3.0]));
        assert!(nodes[1].get("split_feature").is_none());
    }
}
