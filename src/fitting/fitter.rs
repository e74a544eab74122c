use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::fitting::bads::{self, BadsOptions};
use crate::fitting::ibs::IbsEstimator;
use crate::fitting::observation::Observation;
use crate::fitting::parameters::{
    LOWER_BOUNDS, PLAUSIBLE_LOWER_BOUNDS, PLAUSIBLE_UPPER_BOUNDS, UPPER_BOUNDS,
};
use crate::fitting::prelude::*;
use crate::heuristic::prelude::*;

/// Grid resolution of the dilogarithm interpolants.
const DILOG_POINTS: usize = 1_000_000;

/// The two sampling-effort interpolants, tabulated over `p ∈ (0, 1)` from the
/// cumulative construction `dilog(p) = π²/6 + Σ ln(x)/(1−x) / n`, which is
/// the dilogarithm of the complementary probability. Queries interpolate
/// linearly and extrapolate linearly past the grid edges.
struct DilogInterpolants {
    origin: f64,
    step: f64,
    interp1: Vec<f64>,
    interp2: Vec<f64>,
}

impl DilogInterpolants {
    fn build(points: usize) -> DilogInterpolants {
        let origin = 1e-6;
        let end = 1.0 - 1e-6;
        let step = (end - origin) / (points - 1) as f64;

        let mut interp1 = Vec::with_capacity(points);
        let mut interp2 = Vec::with_capacity(points);
        let mut cumulative = 0.0;
        for i in 0..points {
            let x = origin + step * i as f64;
            cumulative += x.ln() / (1.0 - x);
            let dilog = PI * PI / 6.0 + cumulative / points as f64;
            interp1.push((x * dilog).max(0.0).sqrt());
            interp2.push((dilog / x).max(0.0).sqrt());
        }
        DilogInterpolants { origin, step, interp1, interp2 }
    }

    fn eval(&self, table: &[f64], p: f64) -> f64 {
        let t = (p - self.origin) / self.step;
        let i = (t.floor() as isize).clamp(0, table.len() as isize - 2) as usize;
        let frac = t - i as f64;
        table[i] + frac * (table[i + 1] - table[i])
    }

    fn interp1(&self, p: f64) -> f64 {
        self.eval(&self.interp1, p)
    }

    fn interp2(&self, p: f64) -> f64 {
        self.eval(&self.interp2, p)
    }
}

/// The result of one fit: the optimizer-coordinate parameters and the
/// post-fit loss re-evaluations.
#[derive(Clone, Debug)]
pub struct FitOutcome {
    pub parameters: Vec<f64>,
    pub loglik_train: Vec<f64>,
}

/// One cross-validation fold: parameters fit on the training groups, their
/// training losses, and the per-observation held-out losses.
#[derive(Clone, Debug)]
pub struct CrossValidation {
    pub parameters: Vec<f64>,
    pub loglik_train: Vec<f64>,
    pub loglik_test: Vec<f64>,
}

/// The outer fitting loop: calibrates per-observation success targets from an
/// initial likelihood estimate, hands the summed IBS loss to the optimizer,
/// and re-evaluates the fit afterwards.
#[derive(Clone, Debug)]
pub struct ModelFitter {
    pub estimator: IbsEstimator,
    /// Sampling-effort constant for target calibration.
    pub c: f64,
    /// Evaluate only this many randomly chosen observations per optimizer
    /// call, without replacement, re-drawn per call.
    pub subsample: Option<usize>,
    /// Averaging passes for the initial and final likelihood estimates.
    pub l_value_samples: usize,
    pub bads_options: BadsOptions,
    /// Seed for the outer loop's own generators; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ModelFitter {
    fn default() -> Self {
        ModelFitter {
            estimator: IbsEstimator::default(),
            c: 50.0,
            subsample: None,
            l_value_samples: 10,
            bads_options: BadsOptions::default(),
            seed: None,
        }
    }
}

impl ModelFitter {
    fn outer_rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0xA076_1D64_78BD_642F)),
            None => StdRng::from_entropy(),
        }
    }

    /// Derives each observation's required success count from an initial
    /// log-likelihood estimate, matching expected sampling effort to
    /// informativeness.
    pub fn generate_attempt_counts(&self, l_values: &[f64]) -> Vec<u64> {
        let interpolants = DilogInterpolants::build(DILOG_POINTS);
        let probabilities: Vec<f64> = l_values.iter().map(|l| (-l).exp()).collect();
        let mean: f64 = probabilities.iter().map(|&p| interpolants.interp2(p)).sum::<f64>()
            / probabilities.len().max(1) as f64;
        probabilities
            .iter()
            .map(|&p| {
                let count = (self.c * interpolants.interp1(p) / mean).round();
                count.max(1.0) as u64
            })
            .collect()
    }

    /// The scalar loss at one parameter vector: the summed IBS estimate over
    /// the batch, optionally over a fresh random subsample.
    fn loss(
        &self,
        observations: &[Observation],
        required: &[u64],
        model_params: &[f64],
        rng: &mut StdRng,
    ) -> Result<f64> {
        let l_values = match self.subsample {
            Some(size) if size < observations.len() => {
                let chosen = rand::seq::index::sample(rng, observations.len(), size);
                let subset: Vec<Observation> =
                    chosen.iter().map(|i| observations[i].clone()).collect();
                let targets: Vec<u64> = chosen.iter().map(|i| required[i]).collect();
                self.estimator.compute_loglik(&subset, &targets, model_params)?
            }
            _ => self.estimator.compute_loglik(observations, required, model_params)?,
        };
        Ok(l_values.iter().sum())
    }

    /// Estimates per-observation likelihoods at the default start point and
    /// derives the success targets for the fit proper.
    fn calibrate_targets(&self, observations: &[Observation]) -> Result<Vec<u64>> {
        log::info!("estimating initial log-likelihoods over {} observations", observations.len());
        let start = bads_to_model_parameters(&DEFAULT_BADS_PARAMETERS)?;
        let ones = vec![1u64; observations.len()];
        let mut averages = vec![0.0; observations.len()];
        for pass in 0..self.l_value_samples.max(1) {
            let l_values = self.estimator.compute_loglik(observations, &ones, &start)?;
            for (sum, l) in averages.iter_mut().zip(l_values) {
                *sum += l;
            }
            log::debug!("initial estimation pass {} complete", pass + 1);
        }
        for sum in averages.iter_mut() {
            *sum /= self.l_value_samples.max(1) as f64;
        }
        Ok(self.generate_attempt_counts(&averages))
    }

    /// Fits the model to a batch of observations.
    pub fn fit_model(&self, observations: &[Observation]) -> Result<FitOutcome> {
        if observations.is_empty() {
            return Err(anyhow!("no observations to fit"));
        }
        let required = self.calibrate_targets(observations)?;

        let mut subsample_rng = self.outer_rng(1);
        let mut poll_rng = self.outer_rng(2);
        let mut iteration = 0usize;
        let objective = |x: &[f64]| -> f64 {
            iteration += 1;
            log::debug!("probing the objective, iteration {iteration}, theta = {x:?}");
            match bads_to_model_parameters(x)
                .and_then(|params| self.loss(observations, &required, &params, &mut subsample_rng))
            {
                Ok(value) => value,
                Err(e) => {
                    log::error!("objective evaluation failed: {e}");
                    f64::INFINITY
                }
            }
        };

        let result = bads::optimize(
            objective,
            &DEFAULT_BADS_PARAMETERS,
            &LOWER_BOUNDS,
            &UPPER_BOUNDS,
            &PLAUSIBLE_LOWER_BOUNDS,
            &PLAUSIBLE_UPPER_BOUNDS,
            self.bads_options,
            &mut poll_rng,
        )?;
        log::info!("optimizer finished after {} evaluations, loss {:.4}", result.fun_evals, result.fval);

        let fitted = bads_to_model_parameters(&result.x)?;
        let mut final_rng = self.outer_rng(3);
        let loglik_train = (0..self.l_value_samples.max(1))
            .map(|_| self.loss(observations, &required, &fitted, &mut final_rng))
            .collect::<Result<Vec<f64>>>()?;

        Ok(FitOutcome { parameters: result.x, loglik_train })
    }

    /// Fits on every group but `index` and evaluates the held-out group under
    /// the fitted parameters. A single group trains and tests on itself.
    pub fn cross_validate(&self, groups: &[Vec<Observation>], index: usize) -> Result<CrossValidation> {
        log::info!(
            "cross validating split {} against the other {} splits",
            index + 1,
            groups.len().saturating_sub(1)
        );
        let test = groups
            .get(index)
            .ok_or_else(|| anyhow!("inconsistent request: no split at index {}", index + 1))?;
        let train: Vec<Observation> = if groups.len() == 1 {
            groups[0].clone()
        } else {
            groups
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != index)
                .flat_map(|(_, group)| group.iter().cloned())
                .collect()
        };

        let outcome = self.fit_model(&train)?;
        let fitted = bads_to_model_parameters(&outcome.parameters)?;
        let ones = vec![1u64; test.len()];
        let loglik_test = self.estimator.compute_loglik(test, &ones, &fitted)?;

        Ok(CrossValidation {
            parameters: outcome.parameters,
            loglik_train: outcome.loglik_train,
            loglik_test,
        })
    }
}

/// Partitions observations into `split_count` groups whose sizes differ by at
/// most one, stamping each observation with its group id. Order is shuffled
/// unless a single split is requested.
pub fn generate_splits(
    moves: Vec<Observation>,
    split_count: usize,
    rng: &mut StdRng,
) -> Vec<Vec<Observation>> {
    let split_count = split_count.max(1);
    let mut indices: Vec<usize> = (0..moves.len()).collect();
    if split_count != 1 {
        indices.shuffle(rng);
    }
    let mut groups: Vec<Vec<Observation>> = vec![vec![]; split_count];
    for (i, &index) in indices.iter().enumerate() {
        let mut observation = moves[index].clone();
        observation.group = (i % split_count) as u32 + 1;
        groups[i % split_count].push(observation);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::{generate_splits, DilogInterpolants, ModelFitter};
    use crate::fitting::observation::Observation;
    use crate::fitting::prelude::*;
    use crate::ninarow::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn center_observation() -> Observation {
        Observation::new(
            FourByNineBoard::default(),
            Move::new(13, Player::Black, 0.0),
            1000.0,
            1,
            "tester".into(),
        )
        .unwrap()
    }

    #[test]
    fn dilog_interpolants_match_known_values() {
        let interpolants = DilogInterpolants::build(200_000);
        // dilog(p) here is Li2(1 - p): at p near 1 it vanishes, at p near 0
        // it approaches pi^2 / 6, so interp2 blows up while interp1 shrinks.
        assert!(interpolants.interp1(0.999) < 0.05);
        assert!(interpolants.interp2(1e-4) > 10.0);

        // Li2(0.632) is about 0.775, so interp1(0.368) ~ sqrt(0.368 * 0.775).
        let got = interpolants.interp1(0.368);
        assert!((got - 0.534).abs() < 0.01, "interp1(0.368) = {got}");
    }

    #[test]
    fn attempt_counts_scale_with_predictability() {
        let fitter = ModelFitter::default();
        // For a batch of one, the two interpolants cancel to c * p exactly:
        // well-predicted observations sustain many cheap repeats.
        assert_eq!(fitter.generate_attempt_counts(&[0.7]), vec![25]);
        // Expensive observations bottom out at a single required success.
        assert_eq!(fitter.generate_attempt_counts(&[6.0]), vec![1]);
    }

    #[test]
    fn splits_partition_evenly_and_preserve_the_pool() {
        let moves: Vec<Observation> = (0..500)
            .map(|i| {
                let mut o = center_observation();
                o.participant = format!("subject-{i}");
                o
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(6);
        let groups = generate_splits(moves.clone(), 5, &mut rng);

        assert_eq!(groups.len(), 5);
        assert!(groups.iter().all(|g| g.len() == 100));
        for (number, group) in groups.iter().enumerate() {
            assert!(group.iter().all(|o| o.group == number as u32 + 1));
        }

        let mut recovered: Vec<String> =
            groups.iter().flatten().map(|o| o.participant.clone()).collect();
        recovered.sort();
        let mut expected: Vec<String> = moves.iter().map(|o| o.participant.clone()).collect();
        expected.sort();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn single_split_keeps_input_order() {
        let moves = vec![center_observation(), center_observation()];
        let mut rng = StdRng::seed_from_u64(8);
        let groups = generate_splits(moves, 1, &mut rng);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert!(groups[0].iter().all(|o| o.group == 1));
    }

    #[test]
    fn a_tiny_fit_runs_end_to_end() {
        let fitter = ModelFitter {
            estimator: IbsEstimator { workers: 2, seed: Some(5), ..Default::default() },
            l_value_samples: 1,
            bads_options: BadsOptions { max_fun_evals: 3, ..Default::default() },
            seed: Some(5),
            ..Default::default()
        };
        let observations = vec![center_observation()];
        let outcome = fitter.fit_model(&observations).unwrap();
        assert_eq!(outcome.parameters.len(), 10);
        assert_eq!(outcome.loglik_train.len(), 1);
        assert!(outcome.loglik_train[0].is_finite());
    }
}
