/*!
Tree ensembles.
*/

use super::aggregate::AggregateOutput;
use super::writer::StructuredWriter;
use super::{tags, ModelCommon, TargetType, Tree};
use crate::{PersistError, Result};

/// Trees whose outputs are combined by one [`AggregateOutput`].
///
/// Every member shares the ensemble's target type, feature names and
/// classification attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    common: ModelCommon,
    trees: Vec<Tree>,
    aggregate_output: AggregateOutput,
}

impl Ensemble {
    /// Build an ensemble and broadcast `feature_names` and `target_type` to
    /// every member.
    ///
    /// Fails when the aggregator does not have one weight per tree or a
    /// member splits on a feature outside `feature_names`.
    pub fn new(
        feature_names: Vec<String>,
        target_type: TargetType,
        trees: Vec<Tree>,
        aggregate_output: AggregateOutput,
    ) -> Result<Self> {
        Self::from_parts(
            ModelCommon::new(feature_names, target_type),
            trees,
            aggregate_output,
        )
    }

    pub(crate) fn from_parts(
        common: ModelCommon,
        mut trees: Vec<Tree>,
        aggregate_output: AggregateOutput,
    ) -> Result<Self> {
        if aggregate_output.weights().len() != trees.len() {
            return Err(PersistError::validation(format!(
                "{} aggregate weights for {} trees",
                aggregate_output.weights().len(),
                trees.len()
            )));
        }
        for tree in &mut trees {
            tree.common = common.clone();
            tree.validate()?;
        }
        Ok(Self {
            common,
            trees,
            aggregate_output,
        })
    }

    pub fn common(&self) -> &ModelCommon {
        &self.common
    }

    pub fn feature_names(&self) -> &[String] {
        &self.common.feature_names
    }

    pub fn target_type(&self) -> TargetType {
        self.common.target_type
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn aggregate_output(&self) -> &AggregateOutput {
        &self.aggregate_output
    }

    pub fn size(&self) -> usize {
        self.trees.len()
    }

    pub fn set_classification_labels(&mut self, labels: Vec<String>) {
        for tree in &mut self.trees {
            tree.common.classification_labels = Some(labels.clone());
        }
        self.common.classification_labels = Some(labels);
    }

    pub fn set_classification_weights(&mut self, weights: Vec<f64>) {
        for tree in &mut self.trees {
            tree.common.classification_weights = Some(weights.clone());
        }
        self.common.classification_weights = Some(weights);
    }

    /// Evaluate every member on `features` and aggregate the leaf values.
    pub fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        let outputs = self
            .trees
            .iter()
            .map(|tree| tree.leaf_for(features).map(<[f64]>::to_vec))
            .collect::<Result<Vec<_>>>()?;
        self.aggregate_output
            .combine(&outputs, self.common.num_classes())
    }

    /// Drop features no member splits on.
    ///
    /// Each member first compacts its own feature table; the union of the
    /// surviving names, sorted, becomes the shared table and every member's
    /// split indices are rewritten into it. Returns the shared table.
    pub fn remove_unused_features(&mut self) -> Vec<String> {
        let per_tree: Vec<Vec<String>> = self
            .trees
            .iter_mut()
            .map(Tree::remove_unused_features)
            .collect();

        let mut shared: Vec<String> = per_tree.iter().flatten().cloned().collect();
        shared.sort();
        shared.dedup();

        for (tree, local) in self.trees.iter_mut().zip(&per_tree) {
            let mapping: Vec<usize> = local
                .iter()
                .map(|name| shared.binary_search(name).unwrap_or_default())
                .collect();
            tree.remap_features(&mapping);
            tree.common.feature_names = shared.clone();
        }
        tracing::debug!(
            "Ensemble of {} trees uses {} features",
            self.trees.len(),
            shared.len()
        );
        self.common.feature_names = shared.clone();
        shared
    }

    /// Stream `"ensemble": {...}` into the currently open object.
    pub fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.key(tags::ENSEMBLE)?;
        writer.start_object()?;
        self.common.write_to(writer)?;
        writer.key(tags::TRAINED_MODELS)?;
        writer.start_array()?;
        for tree in &self.trees {
            writer.start_object()?;
            tree.write_to(writer)?;
            writer.end_object()?;
        }
        writer.end_array()?;
        writer.key(tags::AGGREGATE_OUTPUT)?;
        self.aggregate_output.write_to(writer)?;
        writer.end_object()
    }
}
