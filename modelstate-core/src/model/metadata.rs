/*!
Training metadata published next to a model definition.

The `model_metadata` document carries the total feature importance, the
baseline the per-row importances are corrections to, the tuned
hyperparameters and a few properties of the training run.

Binary classification models report a single importance per feature for
the second class; the first class is written as its negation.
*/

use std::collections::BTreeMap;
use std::io::Write;

use super::tags;
use super::writer::{JsonStreamWriter, StructuredWriter};
use crate::{PersistError, Result};

/// How class names are typed when written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionFieldType {
    #[default]
    String,
    Int,
    Bool,
}

impl PredictionFieldType {
    fn write_value<W: StructuredWriter + ?Sized>(&self, value: &str, writer: &mut W) -> Result<()> {
        match self {
            PredictionFieldType::String => writer.string(value),
            PredictionFieldType::Int => {
                let parsed: i64 = value.trim().parse().map_err(|_| {
                    PersistError::validation(format!("Class '{value}' is not an integer"))
                })?;
                writer.raw_value(&serde_json::Value::from(parsed))
            }
            PredictionFieldType::Bool => match value.trim() {
                "true" | "1" => writer.boolean(true),
                "false" | "0" => writer.boolean(false),
                _ => Err(PersistError::validation(format!(
                    "Class '{value}' is not a boolean"
                ))),
            },
        }
    }
}

/// Summary of one feature's importance for one output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureImportance {
    /// Mean of the absolute per-row importances.
    pub mean_magnitude: f64,
    pub min: f64,
    pub max: f64,
}

impl FeatureImportance {
    fn negated(self) -> Self {
        Self {
            mean_magnitude: self.mean_magnitude,
            min: -self.max,
            max: -self.min,
        }
    }

    fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.start_object()?;
        writer.key(tags::MEAN_MAGNITUDE)?;
        writer.number(self.mean_magnitude)?;
        writer.key(tags::MIN)?;
        writer.number(self.min)?;
        writer.key(tags::MAX)?;
        writer.number(self.max)?;
        writer.end_object()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ImportanceAccumulator {
    count: u64,
    magnitude_sums: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
}

impl ImportanceAccumulator {
    fn new(width: usize) -> Self {
        Self {
            count: 0,
            magnitude_sums: vec![0.0; width],
            min: vec![f64::INFINITY; width],
            max: vec![f64::NEG_INFINITY; width],
        }
    }

    fn add(&mut self, values: &[f64]) {
        self.count += 1;
        for (j, value) in values.iter().enumerate() {
            self.magnitude_sums[j] += value.abs();
            self.min[j] = self.min[j].min(*value);
            self.max[j] = self.max[j].max(*value);
        }
    }

    fn summary(&self) -> Vec<FeatureImportance> {
        (0..self.magnitude_sums.len())
            .map(|j| FeatureImportance {
                mean_magnitude: self.magnitude_sums[j] / self.count as f64,
                min: self.min[j],
                max: self.max[j],
            })
            .collect()
    }
}

/// Value of a tuned hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HyperparameterValue {
    Double(f64),
    Count(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameter {
    pub name: String,
    pub value: HyperparameterValue,
    pub absolute_importance: f64,
    pub relative_importance: f64,
    /// Set by the user rather than found by tuning; its importances are not
    /// written.
    pub supplied: bool,
}

impl Hyperparameter {
    pub fn tuned(
        name: impl Into<String>,
        value: HyperparameterValue,
        absolute_importance: f64,
        relative_importance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            absolute_importance,
            relative_importance,
            supplied: false,
        }
    }

    pub fn supplied(name: impl Into<String>, value: HyperparameterValue) -> Self {
        Self {
            name: name.into(),
            value,
            absolute_importance: 0.0,
            relative_importance: 0.0,
            supplied: true,
        }
    }

    fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.start_object()?;
        writer.key(tags::NAME)?;
        writer.string(&self.name)?;
        writer.key(tags::VALUE)?;
        match self.value {
            HyperparameterValue::Double(value) => writer.number(value)?,
            HyperparameterValue::Count(value) => writer.unsigned(value)?,
        }
        if !self.supplied {
            writer.key(tags::ABSOLUTE_IMPORTANCE)?;
            writer.number(self.absolute_importance)?;
            writer.key(tags::RELATIVE_IMPORTANCE)?;
            writer.number(self.relative_importance)?;
        }
        writer.key(tags::SUPPLIED)?;
        writer.boolean(self.supplied)?;
        writer.end_object()
    }
}

/// Accumulates and writes the `model_metadata` document.
///
/// # Example
/// ```rust
/// use modelstate_core::model::ModelMetadata;
///
/// let mut metadata = ModelMetadata::new(vec!["f1".to_string()]);
/// metadata.add_to_feature_importance(0, &[0.5])?;
/// metadata.add_to_feature_importance(0, &[-1.5])?;
/// metadata.number_training_rows(2);
/// let json: serde_json::Value = serde_json::from_str(&metadata.json_string()?).unwrap();
/// let importance = &json["model_metadata"]["total_feature_importance"][0]["importance"];
/// assert_eq!(importance["mean_magnitude"], 1.0);
/// assert_eq!(importance["min"], -1.5);
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelMetadata {
    column_names: Vec<String>,
    class_values: Vec<String>,
    prediction_field_type: PredictionFieldType,
    importances: BTreeMap<usize, ImportanceAccumulator>,
    baseline: Option<Vec<f64>>,
    hyperparameters: Vec<Hyperparameter>,
    num_train_rows: u64,
    train_fraction_per_fold: f64,
}

impl ModelMetadata {
    pub fn new(column_names: Vec<String>) -> Self {
        Self {
            column_names,
            ..Self::default()
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Class names of a classification model; empty for regression.
    pub fn with_class_values(mut self, class_values: Vec<String>) -> Self {
        self.class_values = class_values;
        self
    }

    pub fn with_prediction_field_type(mut self, field_type: PredictionFieldType) -> Self {
        self.prediction_field_type = field_type;
        self
    }

    /// Number of importance values expected per row.
    fn importance_width(&self) -> usize {
        match self.class_values.len() {
            0 | 2 => 1,
            classes => classes,
        }
    }

    /// Add one row's importances for feature `index`.
    pub fn add_to_feature_importance(&mut self, index: usize, values: &[f64]) -> Result<()> {
        if index >= self.column_names.len() {
            return Err(PersistError::validation(format!(
                "Feature {index} is outside the {} columns",
                self.column_names.len()
            )));
        }
        let width = self.importance_width();
        if values.len() != width {
            return Err(PersistError::validation(format!(
                "{} importances for '{}', expected {width}",
                values.len(),
                self.column_names[index]
            )));
        }
        self.importances
            .entry(index)
            .or_insert_with(|| ImportanceAccumulator::new(width))
            .add(values);
        Ok(())
    }

    /// Total importance of feature `index`, one entry per output.
    pub fn total_feature_importance(&self, index: usize) -> Option<Vec<FeatureImportance>> {
        self.importances.get(&index).map(ImportanceAccumulator::summary)
    }

    /// Value the per-row importances are additive corrections to.
    pub fn feature_importance_baseline(&mut self, baseline: Vec<f64>) -> Result<()> {
        let width = self.importance_width();
        if baseline.len() != width {
            return Err(PersistError::validation(format!(
                "{} baseline values, expected {width}",
                baseline.len()
            )));
        }
        self.baseline = Some(baseline);
        Ok(())
    }

    /// Replace the hyperparameters, most important first.
    pub fn hyperparameters(&mut self, mut hyperparameters: Vec<Hyperparameter>) {
        hyperparameters.sort_by(|a, b| b.absolute_importance.total_cmp(&a.absolute_importance));
        self.hyperparameters = hyperparameters;
    }

    pub fn number_training_rows(&mut self, rows: u64) {
        self.num_train_rows = rows;
    }

    /// Fraction of each fold used for training while tuning.
    pub fn train_fraction_per_fold(&mut self, fraction: f64) {
        self.train_fraction_per_fold = fraction;
    }

    /// Stream `"model_metadata": {...}` into the currently open object.
    pub fn write_to<W: StructuredWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.key(tags::MODEL_METADATA)?;
        writer.start_object()?;
        self.write_total_feature_importance(writer)?;
        if let Some(baseline) = &self.baseline {
            self.write_baseline(baseline, writer)?;
        }
        writer.key(tags::HYPERPARAMETERS)?;
        writer.start_array()?;
        for hyperparameter in &self.hyperparameters {
            hyperparameter.write_to(writer)?;
        }
        writer.end_array()?;
        writer.key(tags::TRAIN_PROPERTIES)?;
        writer.start_object()?;
        writer.key(tags::NUM_TRAIN_ROWS)?;
        writer.unsigned(self.num_train_rows)?;
        writer.key(tags::TRAIN_FRACTION_PER_FOLD)?;
        writer.number(self.train_fraction_per_fold)?;
        writer.end_object()?;
        writer.end_object()
    }

    /// Write `{"model_metadata": {...}}` as one JSON object to `out`.
    pub fn write_json<W: Write>(&self, out: W) -> Result<W> {
        let mut writer = JsonStreamWriter::new(out);
        writer.start_object()?;
        self.write_to(&mut writer)?;
        writer.end_object()?;
        writer.finish()
    }

    pub fn json_string(&self) -> Result<String> {
        let bytes = self.write_json(Vec::new())?;
        String::from_utf8(bytes)
            .map_err(|e| PersistError::format(format!("Metadata JSON is not UTF-8: {e}")))
    }

    fn write_total_feature_importance<W: StructuredWriter + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<()> {
        writer.key(tags::TOTAL_FEATURE_IMPORTANCE)?;
        writer.start_array()?;
        for (index, accumulator) in &self.importances {
            let summary = accumulator.summary();
            writer.start_object()?;
            writer.key(tags::FEATURE_NAME)?;
            writer.string(&self.column_names[*index])?;
            if self.class_values.is_empty() {
                writer.key(tags::IMPORTANCE)?;
                summary[0].write_to(writer)?;
            } else {
                writer.key(tags::CLASSES)?;
                writer.start_array()?;
                for (class, importance) in self.per_class(&summary, FeatureImportance::negated) {
                    writer.start_object()?;
                    writer.key(tags::CLASS_NAME)?;
                    self.prediction_field_type.write_value(class, writer)?;
                    writer.key(tags::IMPORTANCE)?;
                    importance.write_to(writer)?;
                    writer.end_object()?;
                }
                writer.end_array()?;
            }
            writer.end_object()?;
        }
        writer.end_array()?;
        tracing::debug!(
            "Wrote total importance of {} of {} features",
            self.importances.len(),
            self.column_names.len()
        );
        Ok(())
    }

    fn write_baseline<W: StructuredWriter + ?Sized>(
        &self,
        baseline: &[f64],
        writer: &mut W,
    ) -> Result<()> {
        writer.key(tags::FEATURE_IMPORTANCE_BASELINE)?;
        writer.start_object()?;
        if self.class_values.is_empty() {
            writer.key(tags::BASELINE)?;
            writer.number(baseline[0])?;
        } else {
            writer.key(tags::CLASSES)?;
            writer.start_array()?;
            for (class, value) in self.per_class(baseline, |value: f64| -value) {
                writer.start_object()?;
                writer.key(tags::CLASS_NAME)?;
                self.prediction_field_type.write_value(class, writer)?;
                writer.key(tags::BASELINE)?;
                writer.number(value)?;
                writer.end_object()?;
            }
            writer.end_array()?;
        }
        writer.end_object()
    }

    /// Pair class names with per-output values, expanding a binary model's
    /// single value into both classes.
    fn per_class<'a, T: Copy>(
        &'a self,
        values: &[T],
        negate: impl Fn(T) -> T,
    ) -> Vec<(&'a str, T)> {
        if self.class_values.len() == 2 {
            vec![
                (self.class_values[0].as_str(), negate(values[0])),
                (self.class_values[1].as_str(), values[0]),
            ]
        } else {
            self.class_values
                .iter()
                .map(String::as_str)
                .zip(values.iter().copied())
                .collect()
        }
    }
}
