/*!
Stateful components persisted through the inserter and traverser facade.
*/

pub mod decomposition;
pub mod examples;
pub mod model;
pub mod prior;
pub mod progress;

pub use decomposition::{
    Decomposition, DecompositionRestoreParams, SeasonalComponent, TimeSeriesDecomposition,
};
pub use examples::{CategoryExamplesCollector, CategoryId};
pub use model::{ModelRestoreParams, TimeSeriesModelState};
pub use prior::{DistributionRestoreParams, MultinomialPrior, NormalPrior, PoissonPrior, Prior};
pub use progress::{LoopProgress, ProgressCallback};

use crate::tag::TagContext;

/// Every tag context declared in this module.
pub static TAG_CONTEXTS: [TagContext; 11] = [
    progress::TAG_CONTEXT,
    examples::TAG_CONTEXT,
    examples::ENTRY_TAG_CONTEXT,
    decomposition::FAMILY_TAG_CONTEXT,
    decomposition::TAG_CONTEXT,
    decomposition::COMPONENT_TAG_CONTEXT,
    prior::FAMILY_TAG_CONTEXT,
    prior::NORMAL_TAG_CONTEXT,
    prior::POISSON_TAG_CONTEXT,
    prior::MULTINOMIAL_TAG_CONTEXT,
    model::TAG_CONTEXT,
];
