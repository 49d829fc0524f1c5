/*!
Composite per-series model state.

Groups the polymorphic members of one series model so that a job checkpoint
can save and restore them together.
*/

use crate::dispatch::{restore_tagged, TagDispatch};
use crate::inserter::{PersistState, StateInserter};
use crate::tag::{Tag, TagContext};
use crate::traverser::{required, StateTraverser};
use crate::Result;

use super::decomposition::{Decomposition, DecompositionRestoreParams};
use super::prior::{DistributionRestoreParams, Prior};
use super::progress::LoopProgress;

const ID_TAG: Tag = Tag::new("a", "id");
const IS_FORECASTABLE_TAG: Tag = Tag::new("b", "is_forecastable");
const DECOMPOSITION_TAG: Tag = Tag::new("c", "decomposition");
const RESIDUAL_MODEL_TAG: Tag = Tag::new("d", "residual_model");
const PROGRESS_TAG: Tag = Tag::new("e", "progress");

pub(crate) const TAG_CONTEXT: TagContext = TagContext::new(
    "time_series_model",
    &[
        ID_TAG,
        IS_FORECASTABLE_TAG,
        DECOMPOSITION_TAG,
        RESIDUAL_MODEL_TAG,
        PROGRESS_TAG,
    ],
);

/// Restore parameters for every member of a [`TimeSeriesModelState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRestoreParams {
    pub decomposition: DecompositionRestoreParams,
    pub distribution: DistributionRestoreParams,
}

/// State of one modelled series.
#[derive(Debug, PartialEq)]
pub struct TimeSeriesModelState {
    pub id: usize,
    pub is_forecastable: bool,
    pub decomposition: Decomposition,
    pub residual_model: Prior,
    pub progress: Option<LoopProgress>,
}

impl TimeSeriesModelState {
    pub fn new(id: usize, decomposition: Decomposition, residual_model: Prior) -> Self {
        Self {
            id,
            is_forecastable: !decomposition.is_stub(),
            decomposition,
            residual_model,
            progress: None,
        }
    }

    /// Restore from the current level using caller-supplied parameters.
    pub fn restore(params: &ModelRestoreParams, traverser: &mut StateTraverser<'_>) -> Result<Self> {
        let mut id: Option<usize> = None;
        let mut is_forecastable = true;
        let mut decomposition = None;
        let mut residual_model = None;
        let mut progress = None;
        traverser.each_node(|traverser| {
            let name = traverser.name();
            if ID_TAG == name {
                id = Some(traverser.value_as()?);
            } else if IS_FORECASTABLE_TAG == name {
                is_forecastable = traverser.value_as()?;
            } else if DECOMPOSITION_TAG == name {
                decomposition = Some(traverser.traverse_sub_level(|traverser| {
                    restore_tagged::<Decomposition>(&params.decomposition, traverser)
                })?);
            } else if RESIDUAL_MODEL_TAG == name {
                residual_model = Some(traverser.traverse_sub_level(|traverser| {
                    restore_tagged::<Prior>(&params.distribution, traverser)
                })?);
            } else if PROGRESS_TAG == name {
                progress = Some(traverser.restore::<LoopProgress>()?);
            } else {
                tracing::debug!("Ignoring unknown time series model field '{}'", name);
            }
            Ok(())
        })?;
        Ok(Self {
            id: required(id, ID_TAG, "time series model")?,
            is_forecastable,
            decomposition: required(decomposition, DECOMPOSITION_TAG, "time series model")?,
            residual_model: required(residual_model, RESIDUAL_MODEL_TAG, "time series model")?,
            progress,
        })
    }
}

impl PersistState for TimeSeriesModelState {
    fn accept_persist_inserter(&self, inserter: &mut StateInserter) {
        inserter.insert_value(ID_TAG, self.id);
        inserter.insert_value(IS_FORECASTABLE_TAG, self.is_forecastable);
        inserter.insert_level(DECOMPOSITION_TAG, |inserter| self.decomposition.persist(inserter));
        inserter.insert_level(RESIDUAL_MODEL_TAG, |inserter| self.residual_model.persist(inserter));
        if let Some(progress) = &self.progress {
            inserter.insert_state(PROGRESS_TAG, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{JsonStateFormat, StateFormat, XmlStateFormat};
    use crate::state::decomposition::TimeSeriesDecomposition;
    use crate::tag::TagMode;

    fn params() -> ModelRestoreParams {
        ModelRestoreParams {
            decomposition: DecompositionRestoreParams::new(0.01, 600),
            distribution: DistributionRestoreParams::new(0.01),
        }
    }

    fn model() -> TimeSeriesModelState {
        let params = params();
        let mut decomposition = TimeSeriesDecomposition::new(&params.decomposition);
        decomposition.observe(1_700_000_000);
        decomposition.set_trend(vec![10.0, 0.5]);
        let mut state = TimeSeriesModelState::new(
            7,
            Decomposition::Full(decomposition),
            Prior::normal(&params.distribution),
        );
        let mut progress = LoopProgress::new(10);
        progress.increment(4);
        state.progress = Some(progress);
        state
    }

    #[test]
    fn test_model_roundtrip_all_formats_and_modes() {
        let state = model();
        for mode in [TagMode::Compact, TagMode::Readable] {
            let mut inserter = StateInserter::with_mode("model_state", mode);
            state.accept_persist_inserter(&mut inserter);
            let document = inserter.into_document();
            for format in [&JsonStateFormat::new() as &dyn StateFormat, &XmlStateFormat::with_indent(2)] {
                let restored_document = format.read(&format.write(&document).unwrap()).unwrap();
                let restored = TimeSeriesModelState::restore(
                    &params(),
                    &mut StateTraverser::new(&restored_document),
                )
                .unwrap();
                assert_eq!(restored, state);
            }
        }
    }

    #[test]
    fn test_stub_model_is_not_forecastable() {
        let state = TimeSeriesModelState::new(
            1,
            Decomposition::Stub,
            Prior::poisson(&params().distribution),
        );
        assert!(!state.is_forecastable);
        let mut inserter = StateInserter::new("model_state");
        state.accept_persist_inserter(&mut inserter);
        let document = inserter.into_document();
        let restored =
            TimeSeriesModelState::restore(&params(), &mut StateTraverser::new(&document)).unwrap();
        assert_eq!(restored, state);
        assert!(restored.progress.is_none());
    }

    #[test]
    fn test_missing_decomposition_is_an_error() {
        let mut inserter = StateInserter::new("model_state");
        inserter.insert_value(ID_TAG, 3);
        let document = inserter.into_document();
        let error = TimeSeriesModelState::restore(&params(), &mut StateTraverser::new(&document))
            .unwrap_err();
        assert!(error.to_string().contains("decomposition"));
    }
}
