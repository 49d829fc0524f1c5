/*!
Residual distribution priors.

Each prior keeps the sufficient statistics of a conjugate model. Which prior a
series uses is only known from the tag it was saved under.
*/

use crate::codec::{decode_f64_list, encode_f64_list, Precision};
use crate::dispatch::TagDispatch;
use crate::inserter::StateInserter;
use crate::tag::{Tag, TagContext};
use crate::traverser::{required, StateTraverser};
use crate::{PersistError, Result};

const NORMAL_TAG: Tag = Tag::new("a", "normal");
const POISSON_TAG: Tag = Tag::new("b", "poisson");
const MULTINOMIAL_TAG: Tag = Tag::new("c", "multinomial");

const VARIANT_TAGS: &[Tag] = &[NORMAL_TAG, POISSON_TAG, MULTINOMIAL_TAG];

// Shared by every prior.
const NUMBER_SAMPLES_TAG: Tag = Tag::new("a", "number_samples");

const GAUSSIAN_MEAN_TAG: Tag = Tag::new("b", "gaussian_mean");
const GAUSSIAN_PRECISION_TAG: Tag = Tag::new("c", "gaussian_precision");
const GAMMA_SHAPE_TAG: Tag = Tag::new("d", "gamma_shape");
const GAMMA_RATE_TAG: Tag = Tag::new("e", "gamma_rate");

const CATEGORIES_TAG: Tag = Tag::new("b", "categories");
const CONCENTRATIONS_TAG: Tag = Tag::new("c", "concentrations");
const TOTAL_CONCENTRATION_TAG: Tag = Tag::new("d", "total_concentration");

pub(crate) const FAMILY_TAG_CONTEXT: TagContext = TagContext::new("prior", VARIANT_TAGS);

pub(crate) const NORMAL_TAG_CONTEXT: TagContext = TagContext::new(
    "normal_prior",
    &[
        NUMBER_SAMPLES_TAG,
        GAUSSIAN_MEAN_TAG,
        GAUSSIAN_PRECISION_TAG,
        GAMMA_SHAPE_TAG,
        GAMMA_RATE_TAG,
    ],
);

pub(crate) const POISSON_TAG_CONTEXT: TagContext = TagContext::new(
    "poisson_prior",
    &[NUMBER_SAMPLES_TAG, GAMMA_SHAPE_TAG, GAMMA_RATE_TAG],
);

pub(crate) const MULTINOMIAL_TAG_CONTEXT: TagContext = TagContext::new(
    "multinomial_prior",
    &[
        NUMBER_SAMPLES_TAG,
        CATEGORIES_TAG,
        CONCENTRATIONS_TAG,
        TOTAL_CONCENTRATION_TAG,
    ],
);

/// Caller-supplied settings for restored priors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionRestoreParams {
    pub decay_rate: f64,
}

impl DistributionRestoreParams {
    pub fn new(decay_rate: f64) -> Self {
        Self { decay_rate }
    }
}

/// Normal-gamma prior for continuous residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalPrior {
    pub decay_rate: f64,
    pub number_samples: f64,
    pub gaussian_mean: f64,
    pub gaussian_precision: f64,
    pub gamma_shape: f64,
    pub gamma_rate: f64,
}

/// Gamma prior on a Poisson rate for count residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonPrior {
    pub decay_rate: f64,
    pub number_samples: f64,
    pub gamma_shape: f64,
    pub gamma_rate: f64,
}

/// Dirichlet prior over observed categories.
#[derive(Debug, Clone, PartialEq)]
pub struct MultinomialPrior {
    pub decay_rate: f64,
    pub number_samples: f64,
    pub categories: Vec<f64>,
    pub concentrations: Vec<f64>,
    pub total_concentration: f64,
}

/// The residual model of a series.
#[derive(Debug, Clone, PartialEq)]
pub enum Prior {
    Normal(NormalPrior),
    Poisson(PoissonPrior),
    Multinomial(MultinomialPrior),
}

impl Prior {
    /// Non-informative normal prior.
    pub fn normal(params: &DistributionRestoreParams) -> Self {
        Prior::Normal(NormalPrior {
            decay_rate: params.decay_rate,
            number_samples: 0.0,
            gaussian_mean: 0.0,
            gaussian_precision: 0.0,
            gamma_shape: 1.0,
            gamma_rate: 0.0,
        })
    }

    /// Non-informative Poisson prior.
    pub fn poisson(params: &DistributionRestoreParams) -> Self {
        Prior::Poisson(PoissonPrior {
            decay_rate: params.decay_rate,
            number_samples: 0.0,
            gamma_shape: 1.0,
            gamma_rate: 0.0,
        })
    }

    pub fn number_samples(&self) -> f64 {
        match self {
            Prior::Normal(prior) => prior.number_samples,
            Prior::Poisson(prior) => prior.number_samples,
            Prior::Multinomial(prior) => prior.number_samples,
        }
    }

    pub fn decay_rate(&self) -> f64 {
        match self {
            Prior::Normal(prior) => prior.decay_rate,
            Prior::Poisson(prior) => prior.decay_rate,
            Prior::Multinomial(prior) => prior.decay_rate,
        }
    }
}

impl TagDispatch for Prior {
    const FAMILY: &'static str = "prior";
    type Params = DistributionRestoreParams;

    fn variant_tags() -> &'static [Tag] {
        VARIANT_TAGS
    }

    fn restore_variant(
        index: usize,
        params: &Self::Params,
        traverser: &mut StateTraverser<'_>,
    ) -> Result<Self> {
        match index {
            0 => traverser.traverse_sub_level(|t| restore_normal(params, t)),
            1 => traverser.traverse_sub_level(|t| restore_poisson(params, t)),
            _ => traverser.traverse_sub_level(|t| restore_multinomial(params, t)),
        }
    }

    fn persist(&self, inserter: &mut StateInserter) {
        match self {
            Prior::Normal(prior) => inserter.insert_level(NORMAL_TAG, |inserter| {
                inserter.insert_f64(NUMBER_SAMPLES_TAG, prior.number_samples, Precision::Full);
                inserter.insert_f64(GAUSSIAN_MEAN_TAG, prior.gaussian_mean, Precision::Full);
                inserter.insert_f64(GAUSSIAN_PRECISION_TAG, prior.gaussian_precision, Precision::Full);
                inserter.insert_f64(GAMMA_SHAPE_TAG, prior.gamma_shape, Precision::Full);
                inserter.insert_f64(GAMMA_RATE_TAG, prior.gamma_rate, Precision::Full);
            }),
            Prior::Poisson(prior) => inserter.insert_level(POISSON_TAG, |inserter| {
                inserter.insert_f64(NUMBER_SAMPLES_TAG, prior.number_samples, Precision::Full);
                inserter.insert_f64(GAMMA_SHAPE_TAG, prior.gamma_shape, Precision::Full);
                inserter.insert_f64(GAMMA_RATE_TAG, prior.gamma_rate, Precision::Full);
            }),
            Prior::Multinomial(prior) => inserter.insert_level(MULTINOMIAL_TAG, |inserter| {
                inserter.insert_f64(NUMBER_SAMPLES_TAG, prior.number_samples, Precision::Full);
                inserter.insert_value(
                    CATEGORIES_TAG,
                    encode_f64_list(&prior.categories, Precision::Full).as_str(),
                );
                inserter.insert_value(
                    CONCENTRATIONS_TAG,
                    encode_f64_list(&prior.concentrations, Precision::Full).as_str(),
                );
                inserter.insert_f64(
                    TOTAL_CONCENTRATION_TAG,
                    prior.total_concentration,
                    Precision::Full,
                );
            }),
        }
    }
}

fn restore_normal(params: &DistributionRestoreParams, traverser: &mut StateTraverser<'_>) -> Result<Prior> {
    let mut number_samples: Option<f64> = None;
    let mut gaussian_mean: Option<f64> = None;
    let mut gaussian_precision: Option<f64> = None;
    let mut gamma_shape: Option<f64> = None;
    let mut gamma_rate: Option<f64> = None;
    traverser.each_node(|traverser| {
        let name = traverser.name();
        if NUMBER_SAMPLES_TAG == name {
            number_samples = Some(traverser.value_as()?);
        } else if GAUSSIAN_MEAN_TAG == name {
            gaussian_mean = Some(traverser.value_as()?);
        } else if GAUSSIAN_PRECISION_TAG == name {
            gaussian_precision = Some(traverser.value_as()?);
        } else if GAMMA_SHAPE_TAG == name {
            gamma_shape = Some(traverser.value_as()?);
        } else if GAMMA_RATE_TAG == name {
            gamma_rate = Some(traverser.value_as()?);
        }
        Ok(())
    })?;
    Ok(Prior::Normal(NormalPrior {
        decay_rate: params.decay_rate,
        number_samples: required(number_samples, NUMBER_SAMPLES_TAG, "normal prior")?,
        gaussian_mean: required(gaussian_mean, GAUSSIAN_MEAN_TAG, "normal prior")?,
        gaussian_precision: required(gaussian_precision, GAUSSIAN_PRECISION_TAG, "normal prior")?,
        gamma_shape: required(gamma_shape, GAMMA_SHAPE_TAG, "normal prior")?,
        gamma_rate: required(gamma_rate, GAMMA_RATE_TAG, "normal prior")?,
    }))
}

fn restore_poisson(params: &DistributionRestoreParams, traverser: &mut StateTraverser<'_>) -> Result<Prior> {
    let mut number_samples: Option<f64> = None;
    let mut gamma_shape: Option<f64> = None;
    let mut gamma_rate: Option<f64> = None;
    traverser.each_node(|traverser| {
        let name = traverser.name();
        if NUMBER_SAMPLES_TAG == name {
            number_samples = Some(traverser.value_as()?);
        } else if GAMMA_SHAPE_TAG == name {
            gamma_shape = Some(traverser.value_as()?);
        } else if GAMMA_RATE_TAG == name {
            gamma_rate = Some(traverser.value_as()?);
        }
        Ok(())
    })?;
    Ok(Prior::Poisson(PoissonPrior {
        decay_rate: params.decay_rate,
        number_samples: required(number_samples, NUMBER_SAMPLES_TAG, "poisson prior")?,
        gamma_shape: required(gamma_shape, GAMMA_SHAPE_TAG, "poisson prior")?,
        gamma_rate: required(gamma_rate, GAMMA_RATE_TAG, "poisson prior")?,
    }))
}

fn restore_multinomial(
    params: &DistributionRestoreParams,
    traverser: &mut StateTraverser<'_>,
) -> Result<Prior> {
    let mut number_samples: Option<f64> = None;
    let mut categories = Vec::new();
    let mut concentrations = Vec::new();
    let mut total_concentration = 0.0;
    traverser.each_node(|traverser| {
        let name = traverser.name();
        if NUMBER_SAMPLES_TAG == name {
            number_samples = Some(traverser.value_as()?);
        } else if CATEGORIES_TAG == name {
            categories = decode_f64_list(traverser.value())?;
        } else if CONCENTRATIONS_TAG == name {
            concentrations = decode_f64_list(traverser.value())?;
        } else if TOTAL_CONCENTRATION_TAG == name {
            total_concentration = traverser.value_as::<f64>()?;
        }
        Ok(())
    })?;
    if categories.len() != concentrations.len() {
        return Err(PersistError::invalid_format(format!(
            "multinomial prior has {} categories but {} concentrations",
            categories.len(),
            concentrations.len()
        )));
    }
    Ok(Prior::Multinomial(MultinomialPrior {
        decay_rate: params.decay_rate,
        number_samples: required(number_samples, NUMBER_SAMPLES_TAG, "multinomial prior")?,
        categories,
        concentrations,
        total_concentration,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{persist_tagged, restore_tagged};
    use crate::formats::{JsonStateFormat, StateFormat, XmlStateFormat};

    fn priors() -> Vec<Prior> {
        let params = DistributionRestoreParams::new(0.001);
        vec![
            Prior::Normal(NormalPrior {
                decay_rate: 0.001,
                number_samples: 102.5,
                gaussian_mean: -3.25,
                gaussian_precision: 0.1,
                gamma_shape: 51.25,
                gamma_rate: 7.0e-12,
            }),
            Prior::poisson(&params),
            Prior::Multinomial(MultinomialPrior {
                decay_rate: 0.001,
                number_samples: 3.0,
                categories: vec![1.0, 4.0, 9.0],
                concentrations: vec![0.5, 1.5, 1.0],
                total_concentration: 3.0,
            }),
        ]
    }

    #[test]
    fn test_every_prior_roundtrips() {
        let params = DistributionRestoreParams::new(0.001);
        for prior in priors() {
            for format in [&JsonStateFormat::new() as &dyn StateFormat, &XmlStateFormat::new()] {
                let mut inserter = StateInserter::new("root");
                persist_tagged(&prior, &mut inserter);
                let bytes = format.write(&inserter.into_document()).unwrap();
                let document = format.read(&bytes).unwrap();
                let restored: Prior =
                    restore_tagged(&params, &mut StateTraverser::new(&document)).unwrap();
                assert_eq!(restored, prior);
            }
        }
    }

    #[test]
    fn test_mismatched_multinomial_lists_rejected() {
        let mut inserter = StateInserter::new("root");
        inserter.insert_level(MULTINOMIAL_TAG, |inserter| {
            inserter.insert_value(NUMBER_SAMPLES_TAG, 1);
            inserter.insert_value(CATEGORIES_TAG, "1,2");
            inserter.insert_value(CONCENTRATIONS_TAG, "1");
        });
        let document = inserter.into_document();
        let result: Result<Prior> = restore_tagged(
            &DistributionRestoreParams::new(0.0),
            &mut StateTraverser::new(&document),
        );
        assert!(matches!(result, Err(PersistError::InvalidFormat(_))));
    }

    #[test]
    fn test_decay_rate_comes_from_params() {
        let prior = Prior::normal(&DistributionRestoreParams::new(0.2));
        let mut inserter = StateInserter::new("root");
        persist_tagged(&prior, &mut inserter);
        let document = inserter.into_document();
        let restored: Prior = restore_tagged(
            &DistributionRestoreParams::new(0.7),
            &mut StateTraverser::new(&document),
        )
        .unwrap();
        assert_eq!(restored.decay_rate(), 0.7);
        assert_eq!(restored.number_samples(), 0.0);
    }
}
