use crate::heuristic::prelude::*;

/// Length of the compact parameter vector handled by the outer optimizer.
pub const BADS_PARAMETER_COUNT: usize = 10;

/// Length of the full model parameter vector: seven scalars, then per-group
/// active weights, passive weights, and drop rates for seventeen groups.
pub const MODEL_PARAMETER_COUNT: usize = 7 + 17 * 3;

/// The canonical starting point for fits, in optimizer coordinates.
pub const DEFAULT_BADS_PARAMETERS: [f64; BADS_PARAMETER_COUNT] =
    [2.0, 0.02, 0.2, 0.05, 1.2, 0.8, 1.0, 0.4, 3.5, 5.0];

/// The seven scalar knobs of the evaluator, in model-vector order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarParameters {
    pub stopping_threshold: f64,
    pub pruning_threshold: f64,
    pub gamma: f64,
    pub lapse_rate: f64,
    pub opponent_scale: f64,
    pub exploration_constant: f64,
    pub center_weight: f64,
}

impl ScalarParameters {
    pub fn from_slice(values: &[f64]) -> Result<ScalarParameters> {
        if values.len() < 7 {
            return Err(anyhow!(
                "invalid parameter vector: expected at least 7 scalars, received {}",
                values.len()
            ));
        }
        Ok(ScalarParameters {
            stopping_threshold: values[0],
            pruning_threshold: values[1],
            gamma: values[2],
            lapse_rate: values[3],
            opponent_scale: values[4],
            exploration_constant: values[5],
            center_weight: values[6],
        })
    }
}

/// Expands a 10-entry optimizer vector into the full 58-entry model vector.
///
/// The layout is part of the external contract and must not drift:
/// `[10000, p0, p1, p3, 1, 1, p5]`, then the four feature weights `p6..p9`
/// repeated over the four orientations followed by a zero for the center
/// group (as active weights), the same sixteen scaled by `p4` followed by a
/// zero (as passive weights), and finally `p2` as the drop rate of all
/// seventeen groups.
pub fn bads_to_model_parameters(params: &[f64]) -> Result<Vec<f64>> {
    if params.len() != BADS_PARAMETER_COUNT {
        return Err(anyhow!(
            "invalid parameter vector: expected {BADS_PARAMETER_COUNT} parameters, received {}",
            params.len()
        ));
    }
    let mut out = Vec::with_capacity(MODEL_PARAMETER_COUNT);
    out.extend([10000.0, params[0], params[1], params[3], 1.0, 1.0, params[5]]);
    for _ in 0..4 {
        out.extend_from_slice(&params[6..]);
    }
    out.push(0.0);
    for _ in 0..4 {
        out.extend(params[6..].iter().map(|w| w * params[4]));
    }
    out.push(0.0);
    out.extend(std::iter::repeat(params[2]).take(17));
    debug_assert_eq!(out.len(), MODEL_PARAMETER_COUNT);
    Ok(out)
}

/// The default full model vector.
pub fn default_parameters() -> Vec<f64> {
    bads_to_model_parameters(&DEFAULT_BADS_PARAMETERS).expect("default vector has the right arity")
}
