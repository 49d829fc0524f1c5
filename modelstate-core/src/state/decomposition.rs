/*!
Time series decomposition state and its tag-dispatched family.

A series is modelled either by a full decomposition (trend plus seasonal
components) or by a stub that carries no state at all. The stub is persisted
as an empty value under its own tag so that restore can tell the two apart.
*/

use crate::codec::{decode_f64_list, encode_f64_list, Precision};
use crate::dispatch::TagDispatch;
use crate::inserter::{PersistState, StateInserter};
use crate::tag::{Tag, TagContext};
use crate::traverser::{required, StateTraverser};
use crate::{PersistError, Result};

const TIME_SERIES_DECOMPOSITION_TAG: Tag = Tag::new("a", "time_series_decomposition");
const TIME_SERIES_DECOMPOSITION_STUB_TAG: Tag = Tag::new("b", "time_series_decomposition_stub");

const LAST_VALUE_TIME_TAG: Tag = Tag::new("a", "last_value_time");
const LAST_PROPAGATION_TIME_TAG: Tag = Tag::new("b", "last_propagation_time");
const TREND_TAG: Tag = Tag::new("c", "trend");
const SEASONAL_COMPONENT_TAG: Tag = Tag::new("d", "seasonal_component");
const MEAN_VARIANCE_SCALE_TAG: Tag = Tag::new("e", "mean_variance_scale");

const PERIOD_TAG: Tag = Tag::new("a", "period");
const VALUES_TAG: Tag = Tag::new("b", "values");

const VARIANT_TAGS: &[Tag] = &[TIME_SERIES_DECOMPOSITION_TAG, TIME_SERIES_DECOMPOSITION_STUB_TAG];

pub(crate) const FAMILY_TAG_CONTEXT: TagContext = TagContext::new("decomposition", VARIANT_TAGS);

pub(crate) const TAG_CONTEXT: TagContext = TagContext::new(
    "time_series_decomposition",
    &[
        LAST_VALUE_TIME_TAG,
        LAST_PROPAGATION_TIME_TAG,
        TREND_TAG,
        SEASONAL_COMPONENT_TAG,
        MEAN_VARIANCE_SCALE_TAG,
    ],
);

pub(crate) const COMPONENT_TAG_CONTEXT: TagContext =
    TagContext::new("seasonal_component", &[PERIOD_TAG, VALUES_TAG]);

/// Default number of buckets per seasonal component.
pub const COMPONENT_SIZE: usize = 36;

/// Values the caller supplies when restoring a decomposition. They come from
/// the job configuration, not from the saved state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionRestoreParams {
    pub decay_rate: f64,
    pub minimum_bucket_length: i64,
    pub component_size: usize,
}

impl DecompositionRestoreParams {
    pub fn new(decay_rate: f64, minimum_bucket_length: i64) -> Self {
        Self {
            decay_rate,
            minimum_bucket_length,
            component_size: COMPONENT_SIZE,
        }
    }

    pub fn with_component_size(mut self, component_size: usize) -> Self {
        self.component_size = component_size;
        self
    }
}

/// One seasonal component: a period and its bucket values.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalComponent {
    pub period: i64,
    pub values: Vec<f64>,
}

/// Trend and seasonal state of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesDecomposition {
    decay_rate: f64,
    minimum_bucket_length: i64,
    component_size: usize,
    last_value_time: i64,
    last_propagation_time: i64,
    mean_variance_scale: f64,
    trend: Vec<f64>,
    seasonal_components: Vec<SeasonalComponent>,
}

impl TimeSeriesDecomposition {
    pub fn new(params: &DecompositionRestoreParams) -> Self {
        Self {
            decay_rate: params.decay_rate,
            minimum_bucket_length: params.minimum_bucket_length,
            component_size: params.component_size,
            last_value_time: 0,
            last_propagation_time: 0,
            mean_variance_scale: 1.0,
            trend: Vec::new(),
            seasonal_components: Vec::new(),
        }
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn minimum_bucket_length(&self) -> i64 {
        self.minimum_bucket_length
    }

    pub fn last_value_time(&self) -> i64 {
        self.last_value_time
    }

    pub fn trend(&self) -> &[f64] {
        &self.trend
    }

    pub fn seasonal_components(&self) -> &[SeasonalComponent] {
        &self.seasonal_components
    }

    pub fn set_trend(&mut self, trend: Vec<f64>) {
        self.trend = trend;
    }

    pub fn set_mean_variance_scale(&mut self, scale: f64) {
        self.mean_variance_scale = scale;
    }

    /// Record that values up to `time` have been seen.
    pub fn observe(&mut self, time: i64) {
        self.last_value_time = self.last_value_time.max(time);
    }

    /// Record that state was aged up to `time`.
    pub fn propagate_forwards_to(&mut self, time: i64) {
        self.last_propagation_time = self.last_propagation_time.max(time);
    }

    /// Add a seasonal component of `period` with zeroed buckets.
    pub fn add_component(&mut self, period: i64) -> Result<&mut SeasonalComponent> {
        if period < self.minimum_bucket_length {
            return Err(PersistError::validation(format!(
                "Period {period} is shorter than the bucket length {}",
                self.minimum_bucket_length
            )));
        }
        self.seasonal_components.push(SeasonalComponent {
            period,
            values: vec![0.0; self.component_size],
        });
        let index = self.seasonal_components.len() - 1;
        Ok(&mut self.seasonal_components[index])
    }

    fn restore(
        params: &DecompositionRestoreParams,
        traverser: &mut StateTraverser<'_>,
    ) -> Result<Self> {
        let mut decomposition = Self::new(params);
        let mut last_value_time: Option<i64> = None;
        traverser.each_node(|traverser| {
            let name = traverser.name();
            if LAST_VALUE_TIME_TAG == name {
                last_value_time = Some(traverser.value_as()?);
            } else if LAST_PROPAGATION_TIME_TAG == name {
                decomposition.last_propagation_time = traverser.value_as()?;
            } else if TREND_TAG == name {
                decomposition.trend = decode_f64_list(traverser.value())?;
            } else if MEAN_VARIANCE_SCALE_TAG == name {
                decomposition.mean_variance_scale = traverser.value_as()?;
            } else if SEASONAL_COMPONENT_TAG == name {
                let component = traverser.traverse_sub_level(restore_component)?;
                decomposition.seasonal_components.push(component);
            }
            Ok(())
        })?;
        decomposition.last_value_time =
            required(last_value_time, LAST_VALUE_TIME_TAG, "time series decomposition")?;
        Ok(decomposition)
    }
}

impl PersistState for TimeSeriesDecomposition {
    fn accept_persist_inserter(&self, inserter: &mut StateInserter) {
        inserter.insert_value(LAST_VALUE_TIME_TAG, self.last_value_time);
        inserter.insert_value(LAST_PROPAGATION_TIME_TAG, self.last_propagation_time);
        inserter.insert_value(TREND_TAG, encode_f64_list(&self.trend, Precision::Full).as_str());
        inserter.insert_f64(MEAN_VARIANCE_SCALE_TAG, self.mean_variance_scale, Precision::Full);
        for component in &self.seasonal_components {
            inserter.insert_level(SEASONAL_COMPONENT_TAG, |inserter| {
                inserter.insert_value(PERIOD_TAG, component.period);
                inserter.insert_value(
                    VALUES_TAG,
                    encode_f64_list(&component.values, Precision::Full).as_str(),
                );
            });
        }
    }
}

fn restore_component(traverser: &mut StateTraverser<'_>) -> Result<SeasonalComponent> {
    let mut period: Option<i64> = None;
    let mut values = Vec::new();
    traverser.each_node(|traverser| {
        let name = traverser.name();
        if PERIOD_TAG == name {
            period = Some(traverser.value_as()?);
        } else if VALUES_TAG == name {
            values = decode_f64_list(traverser.value())?;
        }
        Ok(())
    })?;
    Ok(SeasonalComponent {
        period: required(period, PERIOD_TAG, "seasonal component")?,
        values,
    })
}

/// A series decomposition: full state or a stateless stub.
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Full(TimeSeriesDecomposition),
    Stub,
}

impl Decomposition {
    pub fn is_stub(&self) -> bool {
        matches!(self, Decomposition::Stub)
    }
}

impl TagDispatch for Decomposition {
    const FAMILY: &'static str = "decomposition";
    type Params = DecompositionRestoreParams;

    fn variant_tags() -> &'static [Tag] {
        VARIANT_TAGS
    }

    fn restore_variant(
        index: usize,
        params: &Self::Params,
        traverser: &mut StateTraverser<'_>,
    ) -> Result<Self> {
        match index {
            0 => traverser
                .traverse_sub_level(|traverser| TimeSeriesDecomposition::restore(params, traverser))
                .map(Decomposition::Full),
            _ => Ok(Decomposition::Stub),
        }
    }

    fn persist(&self, inserter: &mut StateInserter) {
        match self {
            Decomposition::Full(decomposition) => {
                inserter.insert_state(TIME_SERIES_DECOMPOSITION_TAG, decomposition)
            }
            Decomposition::Stub => inserter.insert_value(TIME_SERIES_DECOMPOSITION_STUB_TAG, ""),
        }
    }
}
