/*
 *  Fitting the heuristic to observed human play: observation ingestion,
 *  inverse binomial sampling, the shared-loss worker pool, and the outer
 *  optimizer loop.
 */

pub mod bads;
pub(crate) mod fitter;
pub(crate) mod ibs;
pub(crate) mod observation;
pub mod parameters;

pub mod prelude {
    pub(crate) use crate::utils::prelude::*;

    pub use super::{
        bads::{BadsOptions, BadsResult},
        fitter::{generate_splits, CrossValidation, FitOutcome, ModelFitter},
        ibs::{IbsEstimator, SuccessFrequencyTracker},
        observation::{parse_participant_csv, parse_participant_file, Observation},
        parameters::{
            parse_bads_parameter_file_to_model_parameters, parse_bads_parameter_line, LOWER_BOUNDS,
            PLAUSIBLE_LOWER_BOUNDS, PLAUSIBLE_UPPER_BOUNDS, UPPER_BOUNDS,
        },
    };
}
