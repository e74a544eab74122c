use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::fitting::observation::Observation;
use crate::fitting::prelude::*;
use crate::heuristic::prelude::*;

/// Per-observation bookkeeping for inverse binomial sampling. Failed attempts
/// accumulate `expt_factor / (R * attempt)` into the running log-likelihood
/// estimate; the tracker is done once it has recorded `R` successes.
#[derive(Clone, Debug, PartialEq)]
pub struct SuccessFrequencyTracker {
    pub attempt_count: u64,
    pub success_count: u64,
    pub required_success_count: u64,
    pub l_value: f64,
    pub expt_factor: f64,
}

impl SuccessFrequencyTracker {
    pub fn new(expt_factor: f64) -> SuccessFrequencyTracker {
        SuccessFrequencyTracker {
            attempt_count: 1,
            success_count: 0,
            required_success_count: 1,
            l_value: 0.0,
            expt_factor,
        }
    }

    pub fn with_required(mut self, required_success_count: u64) -> SuccessFrequencyTracker {
        self.required_success_count = required_success_count.max(1);
        self
    }

    pub fn is_done(&self) -> bool {
        self.success_count == self.required_success_count
    }

    /// Records one trial. Once the tracker is done, further reports are the
    /// caller's bug; nothing here mutates past that point.
    pub fn report_success(&mut self, success: bool) {
        if self.is_done() {
            return;
        }
        if success {
            self.success_count += 1;
            if !self.is_done() {
                self.attempt_count = 1;
            }
        } else {
            self.l_value +=
                self.expt_factor / (self.required_success_count as f64 * self.attempt_count as f64);
            self.attempt_count += 1;
        }
    }
}

/// An `f64` accumulator sharable across the pool. Updates go through a
/// compare-exchange loop over the bit representation.
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> AtomicF64 {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let updated = (f64::from_bits(current) + delta).to_bits();
            match self.0.compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(seen) => current = seen,
            }
        }
    }
}

/// The shared state of one estimation batch: the task board behind a single
/// lock, and the expected-loss accumulator updated per trial.
struct TaskBoard {
    trackers: Vec<SuccessFrequencyTracker>,
    unfinished: Vec<usize>,
}

/// The inverse-binomial-sampling estimator and its worker pool.
///
/// Every worker owns its own heuristic (isolating generator state) and plays
/// sample-until-success rounds against randomly chosen unfinished
/// observations, committing each success back under the lock only if it is
/// the first to record it.
#[derive(Clone, Debug)]
pub struct IbsEstimator {
    pub workers: usize,
    pub expt_factor: f64,
    pub cutoff: f64,
    /// Base seed for the worker generators; `None` re-seeds from entropy.
    /// With one worker, noise enabled, and a fixed seed, estimates are
    /// reproducible byte for byte.
    pub seed: Option<u64>,
}

impl Default for IbsEstimator {
    fn default() -> Self {
        IbsEstimator { workers: 16, expt_factor: 1.0, cutoff: 3.5, seed: None }
    }
}

impl IbsEstimator {
    /// Estimates the per-observation negative log-likelihoods of `params`
    /// over a batch. `required` gives each observation's success target.
    ///
    /// Returns the tracker L values; if the stop-loss trips the sums are an
    /// over-estimate, which the outer optimizer treats as a noisy upper
    /// bound.
    pub fn compute_loglik(
        &self,
        observations: &[Observation],
        required: &[u64],
        params: &[f64],
    ) -> Result<Vec<f64>> {
        debug_assert_eq!(observations.len(), required.len());
        if observations.is_empty() {
            return Ok(vec![]);
        }
        // Vet the vector once, before the pool spins up.
        FourByNineHeuristic::from_parameters(params)?;

        let batch_size = observations.len();
        let board = Mutex::new(TaskBoard {
            trackers: required
                .iter()
                .map(|&r| SuccessFrequencyTracker::new(self.expt_factor).with_required(r))
                .collect(),
            unfinished: (0..batch_size).collect(),
        });
        let expected_loss = AtomicF64::new(batch_size as f64 * self.expt_factor);
        let stop_loss = self.cutoff * batch_size as f64;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .build()
            .context("could not build the estimation worker pool")?;
        pool.broadcast(|context| {
            self.worker_loop(
                context.index(),
                observations,
                params,
                &board,
                &expected_loss,
                stop_loss,
            );
        });

        let board = board.into_inner().expect("the pool has shut down");
        Ok(board.trackers.into_iter().map(|t| t.l_value).collect())
    }

    fn worker_seed(&self, index: usize) -> u64 {
        match self.seed {
            Some(seed) => seed.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(index as u64 + 1)),
            None => rand::random(),
        }
    }

    fn worker_loop(
        &self,
        index: usize,
        observations: &[Observation],
        params: &[f64],
        board: &Mutex<TaskBoard>,
        expected_loss: &AtomicF64,
        stop_loss: f64,
    ) {
        let Ok(mut heuristic) = FourByNineHeuristic::from_parameters(params) else {
            return;
        };
        heuristic.set_noise_enabled(true);
        heuristic.seed_generator(self.worker_seed(index));
        let mut picker = StdRng::seed_from_u64(self.worker_seed(index).rotate_left(17));

        loop {
            if expected_loss.load() > stop_loss {
                return;
            }

            // Deep-copy a random unfinished tracker to work against.
            let Some((task, mut local)) = ({
                let guard = board.lock().expect("task board lock");
                guard
                    .unfinished
                    .choose(&mut picker)
                    .copied()
                    .map(|task| (task, guard.trackers[task].clone()))
            }) else {
                return;
            };

            let observation = &observations[task];
            let player = observation.board.active_player();
            let required = local.required_success_count as f64;

            // One inverse-binomial inner loop: sample until the observed move
            // comes up, polling the stop-loss between trials.
            let mut succeeded = false;
            let mut aborted = false;
            loop {
                if expected_loss.load() > stop_loss {
                    aborted = true;
                    break;
                }
                let Ok(best) = heuristic.get_best_move(&observation.board, player) else {
                    return;
                };
                if best.position == observation.played.position {
                    expected_loss.add(-self.expt_factor / required);
                    local.report_success(true);
                    succeeded = true;
                    break;
                }
                expected_loss.add(self.expt_factor / (required * local.attempt_count as f64));
                local.report_success(false);
            }

            let mut guard = board.lock().expect("task board lock");
            if succeeded {
                // First worker to record this success wins; duplicated work
                // from a racing worker is discarded here.
                let shared = &guard.trackers[task];
                if !shared.is_done() && shared.success_count + 1 == local.success_count {
                    let finished = local.is_done();
                    guard.trackers[task] = local;
                    if finished {
                        guard.unfinished.retain(|&t| t != task);
                    }
                }
            } else if guard.trackers[task].success_count == local.success_count {
                // Aborted mid-round: fold the failure mass in so the batch
                // total stays an over-estimate, matching the stop-loss
                // contract.
                guard.trackers[task].l_value = local.l_value;
                guard.trackers[task].attempt_count = local.attempt_count;
            }
            drop(guard);

            if aborted {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IbsEstimator, SuccessFrequencyTracker};
    use crate::fitting::observation::Observation;
    use crate::heuristic::prelude::*;
    use crate::ninarow::prelude::*;

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
    fn tracker_accumulates_failures_harmonically() {
        let mut tracker = SuccessFrequencyTracker::new(1.0).with_required(2);
        tracker.report_success(false);
        tracker.report_success(false);
        tracker.report_success(true);
        // Two failures at attempts 1 and 2 against R = 2.
        assert!((tracker.l_value - (0.5 + 0.25)).abs() < 1e-12);
        assert_eq!(tracker.attempt_count, 1);
        assert!(!tracker.is_done());

        tracker.report_success(true);
        assert!(tracker.is_done());

        // A done tracker is frozen.
        let frozen = tracker.clone();
        tracker.report_success(false);
        assert_eq!(tracker, frozen);
    }

    #[test]
    fn single_required_success_reduces_to_one_round() {
        let estimator = IbsEstimator { workers: 1, seed: Some(11), cutoff: f64::INFINITY, ..Default::default() };
        let observations = vec![center_observation()];
        let l = estimator
            .compute_loglik(&observations, &[1], &default_parameters())
            .unwrap();
        assert_eq!(l.len(), 1);
        assert!(l[0] >= 0.0);
    }

    #[test]
    fn disabled_stop_loss_runs_every_observation_to_completion() {
        let estimator = IbsEstimator { workers: 2, seed: Some(3), cutoff: f64::INFINITY, ..Default::default() };
        let observations = vec![center_observation(), center_observation()];
        let l = estimator
            .compute_loglik(&observations, &[2, 1], &default_parameters())
            .unwrap();
        assert_eq!(l.len(), 2);
        assert!(l.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn deterministic_mode_is_reproducible() {
        let estimator = IbsEstimator { workers: 1, seed: Some(99), cutoff: f64::INFINITY, ..Default::default() };
        let observations = vec![center_observation()];
        let first = estimator.compute_loglik(&observations, &[2], &default_parameters()).unwrap();
        let second = estimator.compute_loglik(&observations, &[2], &default_parameters()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mean_estimate_brackets_the_true_surprisal() {
        // The center move is modal under the default heuristic, so its
        // surprisal is far from both 0 and the stop-loss scale.
        let observations = vec![center_observation()];
        let params = default_parameters();

        let rounds: u64 = 200;
        let mut total = 0.0;
        for round in 0..rounds {
            let estimator = IbsEstimator {
                workers: 1,
                seed: Some(7 + round),
                cutoff: f64::INFINITY,
                ..Default::default()
            };
            total += estimator.compute_loglik(&observations, &[1], &params).unwrap()[0];
        }
        let mean = total / rounds as f64;
        assert!((0.5..=3.5).contains(&mean), "mean surprisal was {mean}");
    }

    #[test]
    fn parameter_arity_fails_the_batch() {
        let estimator = IbsEstimator::default();
        let observations = vec![center_observation()];
        assert!(estimator.compute_loglik(&observations, &[1], &[0.0; 12]).is_err());
    }
}
