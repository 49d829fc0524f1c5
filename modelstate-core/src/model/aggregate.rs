/*!
Ensemble output aggregators.
*/

use super::tags;
use super::writer::StructuredWriter;
use crate::{PersistError, Result};

/// Combines the outputs of an ensemble's members.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutput {
    /// Weighted sum of member outputs.
    WeightedSum(Vec<f64>),
    /// Weighted vote over the class index each member predicts.
    WeightedMode(Vec<f64>),
    /// Weighted sum passed through the logistic function downstream.
    LogisticRegression(Vec<f64>),
    /// Weighted sum passed through `exp` downstream.
    Exponent(Vec<f64>),
}

impl AggregateOutput {
    /// `size` equal weights of `weight` of the same kind as `self`.
    pub fn uniform(&self, size: usize, weight: f64) -> Self {
        let weights = vec![weight; size];
        match self {
            AggregateOutput::WeightedSum(_) => AggregateOutput::WeightedSum(weights),
            AggregateOutput::WeightedMode(_) => AggregateOutput::WeightedMode(weights),
            AggregateOutput::LogisticRegression(_) => AggregateOutput::LogisticRegression(weights),
            AggregateOutput::Exponent(_) => AggregateOutput::Exponent(weights),
        }
    }

    /// Name written in the model definition.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOutput::WeightedSum(_) => tags::WEIGHTED_SUM,
            AggregateOutput::WeightedMode(_) => tags::WEIGHTED_MODE,
            AggregateOutput::LogisticRegression(_) => tags::LOGISTIC_REGRESSION,
            AggregateOutput::Exponent(_) => tags::EXPONENT,
        }
    }

    /// Build an aggregator from its written name.
    pub fn from_name(name: &str, weights: Vec<f64>) -> Result<Self> {
        match name {
            tags::WEIGHTED_SUM => Ok(AggregateOutput::WeightedSum(weights)),
            tags::WEIGHTED_MODE => Ok(AggregateOutput::WeightedMode(weights)),
            tags::LOGISTIC_REGRESSION => Ok(AggregateOutput::LogisticRegression(weights)),
            tags::EXPONENT => Ok(AggregateOutput::Exponent(weights)),
            other => Err(PersistError::invalid_format(format!(
                "Unknown aggregate output '{other}'"
            ))),
        }
    }

    pub fn weights(&self) -> &[f64] {
        match self {
            AggregateOutput::WeightedSum(weights)
            | AggregateOutput::WeightedMode(weights)
            | AggregateOutput::LogisticRegression(weights)
            | AggregateOutput::Exponent(weights) => weights,
        }
    }

    /// Combine one output vector per member.
    ///
    /// Sum-style aggregators return the weighted element-wise sum and ignore
    /// `num_classes`. The mode aggregator reads the first element of each
    /// output as a class index below `num_classes` and returns the
    /// accumulated vote per class.
    pub fn combine(&self, outputs: &[Vec<f64>], num_classes: Option<usize>) -> Result<Vec<f64>> {
        let weights = self.weights();
        if outputs.len() != weights.len() {
            return Err(PersistError::validation(format!(
                "{} outputs for {} weights",
                outputs.len(),
                weights.len()
            )));
        }
        match self {
            AggregateOutput::WeightedMode(_) => {
                let num_classes = num_classes.ok_or_else(|| {
                    PersistError::validation("weighted mode needs the number of classes")
                })?;
                let mut votes = vec![0.0; num_classes];
                for (output, weight) in outputs.iter().zip(weights) {
                    let class = output.first().copied().unwrap_or(f64::NAN);
                    if !(class >= 0.0 && class.fract() == 0.0 && class < num_classes as f64) {
                        return Err(PersistError::validation(format!(
                            "{class} is not a class index below {num_classes}"
                        )));
                    }
                    votes[class as usize] += weight;
                }
                Ok(votes)
            }
            _ => {
                let width = outputs.first().map_or(0, Vec::len);
                let mut sum = vec![0.0; width];
                for (output, weight) in outputs.iter().zip(weights) {
                    if output.len() != width {
                        return Err(PersistError::validation(
                            "member outputs have different lengths",
                        ));
                    }
                    for (total, value) in sum.iter_mut().zip(output) {
                        *total += weight * value;
                    }
                }
                Ok(sum)
            }
        }
    }

    /// Stream `{"<name>": {"weights": [...]}}`.
    pub fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.start_object()?;
        writer.key(self.name())?;
        writer.start_object()?;
        writer.number_array(tags::WEIGHTS, self.weights())?;
        writer.end_object()?;
        writer.end_object()
    }
}
