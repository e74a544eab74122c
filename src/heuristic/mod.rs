/*
 *  The parameterized move evaluator: features, weights, kernels, and the
 *  noisy scoring engine itself.
 */

pub(crate) mod evaluator;
pub(crate) mod feature;
pub mod kernels;
pub mod parameters;

pub mod prelude {
    pub(crate) use crate::utils::prelude::*;

    pub use super::{
        evaluator::{FourByNineHeuristic, Heuristic},
        feature::{Feature, FeatureGroupWeights, FeatureWithMeta},
        kernels::{default_feature_set, FeatureKernel},
        parameters::{
            bads_to_model_parameters, default_parameters, ScalarParameters, BADS_PARAMETER_COUNT,
            DEFAULT_BADS_PARAMETERS, MODEL_PARAMETER_COUNT,
        },
    };
}
