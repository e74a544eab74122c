use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::fitting::prelude::*;

/// Options for the outer optimizer, mirroring the knobs the fitting loop
/// actually sets: noisy-objective handling, optional final re-sampling, and a
/// hard evaluation budget.
#[derive(Clone, Copy, Debug)]
pub struct BadsOptions {
    pub uncertainty_handling: bool,
    pub noise_final_samples: usize,
    pub max_fun_evals: usize,
}

impl Default for BadsOptions {
    fn default() -> Self {
        BadsOptions { uncertainty_handling: true, noise_final_samples: 0, max_fun_evals: 2000 }
    }
}

#[derive(Clone, Debug)]
pub struct BadsResult {
    pub x: Vec<f64>,
    pub fval: f64,
    pub fun_evals: usize,
}

/// Minimizes a noisy black-box objective over a bounded box, BADS style: a
/// mesh-adaptive direct search that polls the coordinate directions on an
/// adaptive mesh scaled to the plausible box, expanding the mesh on success
/// and contracting it on failure. Under `uncertainty_handling` the incumbent
/// value is a running average that is refreshed after every failed poll, so a
/// lucky noise draw cannot pin the search down.
pub fn optimize(
    mut objective: impl FnMut(&[f64]) -> f64,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    plausible_lower: &[f64],
    plausible_upper: &[f64],
    options: BadsOptions,
    rng: &mut StdRng,
) -> Result<BadsResult> {
    let dims = x0.len();
    if [lower, upper, plausible_lower, plausible_upper].iter().any(|b| b.len() != dims) {
        return Err(anyhow!("invalid parameter vector: bounds do not match the start point"));
    }

    let clamp = |x: &mut Vec<f64>| {
        for i in 0..dims {
            x[i] = x[i].clamp(lower[i], upper[i]);
        }
    };
    let scale: Vec<f64> = (0..dims)
        .map(|i| (plausible_upper[i] - plausible_lower[i]).max(f64::EPSILON))
        .collect();

    let mut incumbent = x0.to_vec();
    clamp(&mut incumbent);
    let mut value_sum = objective(&incumbent);
    let mut value_count = 1usize;
    let mut evals = 1usize;

    let mut mesh = 0.25;
    const MESH_FLOOR: f64 = 1e-6;

    let mut directions: Vec<(usize, f64)> =
        (0..dims).flat_map(|i| [(i, 1.0), (i, -1.0)]).collect();

    while evals < options.max_fun_evals && mesh > MESH_FLOOR {
        let mut improved = false;
        directions.shuffle(rng);

        for &(axis, sign) in directions.iter() {
            if evals >= options.max_fun_evals {
                break;
            }
            let mut candidate = incumbent.clone();
            candidate[axis] += sign * mesh * scale[axis];
            clamp(&mut candidate);
            if candidate == incumbent {
                continue;
            }

            let value = objective(&candidate);
            evals += 1;
            if value < value_sum / value_count as f64 {
                incumbent = candidate;
                value_sum = value;
                value_count = 1;
                improved = true;
                // Opportunistic polling: take the first improvement and
                // re-center the poll set on it.
                break;
            }
        }

        if improved {
            mesh = (mesh * 2.0).min(1.0);
        } else {
            if options.uncertainty_handling && evals < options.max_fun_evals {
                value_sum += objective(&incumbent);
                value_count += 1;
                evals += 1;
            }
            mesh *= 0.5;
        }
        log::debug!(
            "poll round complete: mesh {mesh:.2e}, incumbent value {:.4}, {evals} evaluations",
            value_sum / value_count as f64
        );
    }

    for _ in 0..options.noise_final_samples {
        value_sum += objective(&incumbent);
        value_count += 1;
        evals += 1;
    }

    Ok(BadsResult { x: incumbent, fval: value_sum / value_count as f64, fun_evals: evals })
}
