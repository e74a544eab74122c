use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::heuristic::kernels::{default_feature_set, DEFAULT_GROUP_COUNT};
use crate::heuristic::prelude::*;
use crate::ninarow::prelude::*;
use crate::search::BestFirstSearch;

/// The parameterized, noisy move evaluator.
///
/// A heuristic bundles the immutable feature tables with seven scalar knobs,
/// a pseudo-random generator, and a noise switch. Every worker owns its own
/// copy so that generator state never crosses threads.
#[derive(Clone, Debug)]
pub struct Heuristic<const H: usize, const W: usize> {
    scalars: ScalarParameters,
    groups: Vec<FeatureGroupWeights>,
    features: Vec<FeatureWithMeta<H, W>>,
    center_prior: Vec<f64>,
    noise: Normal<f64>,
    rng: StdRng,
    noise_enabled: bool,
    dropped: Vec<bool>,
}

pub type FourByNineHeuristic = Heuristic<BOARD_HEIGHT, BOARD_WIDTH>;

impl<const H: usize, const W: usize> Heuristic<H, W> {
    /// Builds a heuristic from a model parameter vector.
    ///
    /// A 7-entry vector carries the scalars alone and leaves the feature
    /// tables empty, for callers that assemble their own packs. The full
    /// 58-entry vector additionally populates the default feature set and its
    /// seventeen weight groups.
    pub fn from_parameters(params: &[f64]) -> Result<Heuristic<H, W>> {
        let scalars = ScalarParameters::from_slice(params)?;
        let (groups, features) = match params.len() {
            7 => (vec![], vec![]),
            MODEL_PARAMETER_COUNT => {
                let groups = (0..DEFAULT_GROUP_COUNT)
                    .map(|g| {
                        FeatureGroupWeights::new(
                            params[7 + g],
                            params[7 + DEFAULT_GROUP_COUNT + g],
                            params[7 + 2 * DEFAULT_GROUP_COUNT + g],
                        )
                    })
                    .collect();
                (groups, default_feature_set::<H, W>())
            }
            n => {
                return Err(anyhow!(
                    "invalid parameter vector: expected 7 or {MODEL_PARAMETER_COUNT} parameters, received {n}"
                ));
            }
        };
        let noise = Normal::new(0.0, scalars.exploration_constant.max(0.0))
            .map_err(|e| anyhow!("invalid parameter vector: bad noise scale ({e})"))?;
        let dropped = vec![false; features.len()];
        Ok(Heuristic {
            scalars,
            groups,
            features,
            center_prior: center_prior_table::<H, W>(),
            noise,
            rng: StdRng::seed_from_u64(0),
            noise_enabled: true,
            dropped,
        })
    }

    /// The default heuristic for this board size.
    pub fn create_default() -> Heuristic<H, W> {
        Heuristic::from_parameters(&default_parameters()).expect("default parameters are well-formed")
    }

    pub fn scalars(&self) -> &ScalarParameters {
        &self.scalars
    }

    pub fn feature_group_weights(&self) -> &[FeatureGroupWeights] {
        &self.groups
    }

    pub fn features_with_metadata(&self) -> &[FeatureWithMeta<H, W>] {
        &self.features
    }

    /// Appends a new weight group and returns its index.
    pub fn add_feature_pack(&mut self, weight_act: f64, weight_pass: f64, drop_rate: f64) -> usize {
        self.groups.push(FeatureGroupWeights::new(weight_act, weight_pass, drop_rate));
        self.groups.len() - 1
    }

    /// Binds a feature to an existing weight group.
    pub fn add_feature(&mut self, weight_index: usize, feature: Feature<H, W>) -> Result<()> {
        if weight_index >= self.groups.len() {
            return Err(anyhow!("no feature pack at index {weight_index}"));
        }
        self.features.push(FeatureWithMeta { feature, weight_index });
        self.dropped.push(false);
        Ok(())
    }

    /// Re-seeds the generator. With noise disabled the heuristic is fully
    /// deterministic regardless of seed.
    pub fn seed_generator(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn set_noise_enabled(&mut self, enabled: bool) {
        self.noise_enabled = enabled;
    }

    pub fn noise_enabled(&self) -> bool {
        self.noise_enabled
    }

    /// One Bernoulli roll of the per-expansion stopping probability.
    pub fn sample_stop(&mut self) -> bool {
        self.noise_enabled && self.rng.gen_bool(self.scalars.gamma.clamp(0.0, 1.0))
    }

    fn sample_lapse(&mut self) -> bool {
        self.noise_enabled && self.rng.gen_bool(self.scalars.lapse_rate.clamp(0.0, 1.0))
    }

    /// Redraws the per-evaluation feature dropout mask.
    fn refresh_dropout(&mut self) {
        self.dropped.resize(self.features.len(), false);
        if !self.noise_enabled {
            self.dropped.fill(false);
            return;
        }
        for (index, meta) in self.features.iter().enumerate() {
            let rate = self.groups[meta.weight_index].drop_rate.clamp(0.0, 1.0);
            self.dropped[index] = rate > 0.0 && self.rng.gen_bool(rate);
        }
    }

    /// The absolute-orientation value of a board, seen through `evaluator`'s
    /// asymmetry: their own contained features count with the active weight,
    /// the opponent's with the scaled passive weight. Black-positive.
    pub fn board_value(&self, board: &Board<H, W>, evaluator: Player) -> f64 {
        let mut value = 0.0;
        for square in board.pieces(Player::Black).positions() {
            value += self.scalars.center_weight * self.center_prior[square];
        }
        for square in board.pieces(Player::White).positions() {
            value -= self.scalars.center_weight * self.center_prior[square];
        }
        for (index, meta) in self.features.iter().enumerate() {
            if self.dropped.get(index).copied().unwrap_or(false) {
                continue;
            }
            let weights = self.groups[meta.weight_index];
            for owner in [Player::Black, Player::White] {
                if meta.feature.contained_in(board, owner) {
                    let weight = if owner == evaluator {
                        weights.weight_act
                    } else {
                        self.scalars.opponent_scale * weights.weight_pass
                    };
                    value += owner.perspective() * weight;
                }
            }
        }
        value
    }

    /// Scores every legal move for `player`, one entry per empty square in
    /// ascending position order. Values are Black-positive board values of
    /// the successor position; proven moves carry the terminal sentinels.
    /// Deterministic whenever noise is disabled.
    pub fn score_moves(&mut self, board: &Board<H, W>, player: Player) -> Vec<Move> {
        if board.game_has_ended() {
            return vec![];
        }
        self.refresh_dropout();

        let sign = player.perspective();
        let opponent = -player;
        let occupied = board.occupied();
        let base = self.board_value(board, player);

        // Per-square weight shifts: completions by the mover, suffocations of
        // either side's contained features.
        let mut shift = vec![0.0; H * W];
        for (index, meta) in self.features.iter().enumerate() {
            if self.dropped[index] {
                continue;
            }
            let feature = meta.feature;
            let weights = self.groups[meta.weight_index];

            let missing = board.missing_pieces(feature.pieces, player);
            if let (1, Some(square)) = (missing.count(), missing.lowest()) {
                if !occupied.contains(square)
                    && board.count_spaces(feature.spaces) >= feature.min_space_occupancy
                {
                    shift[square] += weights.weight_act;
                }
            }

            if board.count_spaces(feature.spaces) == feature.min_space_occupancy {
                let open = feature.spaces - occupied;
                if feature.contained_in(board, player) {
                    for square in open.positions() {
                        shift[square] -= weights.weight_act;
                    }
                }
                if feature.contained_in(board, opponent) {
                    for square in open.positions() {
                        shift[square] += self.scalars.opponent_scale * weights.weight_pass;
                    }
                }
            }
        }

        let my_wins = board.winning_squares(player);
        let opponent_wins = board.winning_squares(opponent);
        let fills_board = board.piece_count() as usize + 1 == H * W;

        let mut out = Vec::with_capacity(board.spaces().count() as usize);
        for square in board.spaces().positions() {
            let value = if my_wins.contains(square) {
                sign * TERMINAL_VALUE
            } else if !fills_board && !(opponent_wins - Pattern::single(square)).is_empty() {
                // Any unblocked threat hands the opponent the game next turn.
                -sign * TERMINAL_VALUE
            } else {
                let mut value = base
                    + sign * (self.scalars.center_weight * self.center_prior[square] + shift[square]);
                if self.noise_enabled {
                    value += self.noise.sample(&mut self.rng);
                }
                value
            };
            out.push(Move::new(square, player, value));
        }
        out
    }

    /// The best move recorded in a finished (or merely advanced) search tree.
    pub fn best_known_move(&self, search: &BestFirstSearch<H, W>) -> Result<Move> {
        search
            .best_child()
            .and_then(|node| node.move_in)
            .ok_or_else(|| anyhow!("the search root has no children to choose from"))
    }

    /// A uniformly random legal move.
    pub fn best_random_move(&mut self, board: &Board<H, W>, player: Player) -> Result<Move> {
        let options: Vec<usize> = board.spaces().positions().collect();
        if options.is_empty() {
            return Err(anyhow!("illegal move: no empty squares remain"));
        }
        let square = options[self.rng.gen_range(0..options.len())];
        Ok(Move::new(square, player, 0.0))
    }

    /// Simulates one move choice: a lapse plays uniformly at random, anything
    /// else grows a best-first tree and reads its best root child.
    pub fn get_best_move(&mut self, board: &Board<H, W>, player: Player) -> Result<Move> {
        if board.game_has_ended() {
            return Err(anyhow!("illegal move: the game has already ended"));
        }
        if self.sample_lapse() {
            return self.best_random_move(board, player);
        }
        let mut search = BestFirstSearch::new(&*self, player, *board);
        search.complete_search(self)?;
        self.best_known_move(&search)
    }
}

/// The fixed positional prior: inverse distance to the board's geometric
/// center, symmetric by construction.
fn center_prior_table<const H: usize, const W: usize>() -> Vec<f64> {
    let center_row = (H as f64 - 1.0) / 2.0;
    let center_col = (W as f64 - 1.0) / 2.0;
    (0..H * W)
        .map(|square| {
            let row = (square / W) as f64;
            let col = (square % W) as f64;
            let distance = ((row - center_row).powi(2) + (col - center_col).powi(2)).sqrt();
            1.0 / (1.0 + distance)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{center_prior_table, FourByNineHeuristic};
    use crate::heuristic::prelude::*;
    use crate::ninarow::prelude::*;

    fn quiet(h: &mut FourByNineHeuristic) {
        h.set_noise_enabled(false);
    }

    #[test]
    fn prior_is_symmetric_and_peaks_at_the_center() {
        let prior = center_prior_table::<BOARD_HEIGHT, BOARD_WIDTH>();
        assert_eq!(prior.len(), 36);
        // 13 and 22 flank the center point and tie for the maximum.
        assert!((prior[13] - prior[22]).abs() < 1e-12);
        assert!(prior[13] > prior[0]);
        // Left-right mirror symmetry.
        assert!((prior[9] - prior[17]).abs() < 1e-12);
    }

    #[test]
    fn empty_board_scores_every_square() {
        let mut h = FourByNineHeuristic::create_default();
        quiet(&mut h);
        let moves = h.score_moves(&FourByNineBoard::default(), Player::Black);
        assert_eq!(moves.len(), 36);

        let best = moves
            .iter()
            .max_by(|a, b| a.value.partial_cmp(&b.value).unwrap())
            .unwrap();
        assert!(best.position == 13 || best.position == 22);
    }

    #[test]
    fn scoring_is_deterministic_without_noise() {
        let board = FourByNineBoard::default()
            .play(&Move::new(13, Player::Black, 0.0))
            .unwrap();
        let mut a = FourByNineHeuristic::create_default();
        let mut b = FourByNineHeuristic::create_default();
        quiet(&mut a);
        quiet(&mut b);
        let left = a.score_moves(&board, Player::White);
        let right = b.score_moves(&board, Player::White);
        assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(right.iter()) {
            assert_eq!(l.position, r.position);
            assert_eq!(l.value, r.value);
        }
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let board = FourByNineBoard::default();
        let mut a = FourByNineHeuristic::create_default();
        let mut b = FourByNineHeuristic::create_default();
        a.seed_generator(42);
        b.seed_generator(42);
        let left = a.score_moves(&board, Player::Black);
        let right = b.score_moves(&board, Player::Black);
        for (l, r) in left.iter().zip(right.iter()) {
            assert_eq!(l.value, r.value);
        }
    }

    #[test]
    fn winning_and_losing_moves_use_the_sentinels() {
        // Black holds 0..=2 on the top row, White holds 27..=29 on the bottom.
        let black = FourByNinePattern::new(0b111);
        let white =
            FourByNinePattern::single(27) | FourByNinePattern::single(28) | FourByNinePattern::single(29);
        let board = FourByNineBoard::new(black, white);
        assert_eq!(board.active_player(), Player::Black);

        let mut h = FourByNineHeuristic::create_default();
        quiet(&mut h);
        let moves = h.score_moves(&board, Player::Black);
        let value_at = |p: usize| moves.iter().find(|m| m.position == p).unwrap().value;

        // Completing the top row wins outright.
        assert_eq!(value_at(3), TERMINAL_VALUE);
        // Ignoring White's threat at 30 loses on the spot.
        assert_eq!(value_at(17), -TERMINAL_VALUE);
        // Blocking at 30 is an ordinary, finite score.
        assert!(value_at(30).abs() < TERMINAL_VALUE);
    }

    #[test]
    fn completion_bonus_shows_up_in_the_delta() {
        // Black on 13; 14 extends to a connected pair, far corners do not.
        let board = FourByNineBoard::default()
            .play(&Move::new(13, Player::Black, 0.0))
            .unwrap()
            .play(&Move::new(27, Player::White, 0.0))
            .unwrap();
        let mut h = FourByNineHeuristic::create_default();
        quiet(&mut h);
        let moves = h.score_moves(&board, Player::Black);
        let value_at = |p: usize| moves.iter().find(|m| m.position == p).unwrap().value;
        assert!(value_at(14) > value_at(8));
    }

    #[test]
    fn dropped_features_are_silent_for_a_whole_evaluation() {
        // Zero noise scale and zero lapse isolate the dropout channel.
        let scalars = [10000.0, 5.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let board = FourByNineBoard::new(FourByNinePattern::single(0), FourByNinePattern::single(27));
        let feature = Feature::new(FourByNinePattern::new(0b11), FourByNinePattern::new(0b1100), 2);

        let score_with_drop_rate = |rate: f64| {
            let mut h = FourByNineHeuristic::from_parameters(&scalars).unwrap();
            let pack = h.add_feature_pack(3.0, 3.0, rate);
            h.add_feature(pack, feature).unwrap();
            let moves = h.score_moves(&board, Player::Black);
            moves.iter().find(|m| m.position == 1).unwrap().value
        };

        // A certain drop silences the completion bonus; a certain keep shows it.
        assert!(score_with_drop_rate(0.0) > score_with_drop_rate(1.0) + 2.0);
    }

    #[test]
    fn custom_packs_extend_a_bare_heuristic() {
        let scalars = [10000.0, 5.0, 0.01, 0.0, 1.0, 0.0, 1.0];
        let mut h = FourByNineHeuristic::from_parameters(&scalars).unwrap();
        quiet(&mut h);
        assert!(h.features_with_metadata().is_empty());

        let pack = h.add_feature_pack(0.8, 0.8, 0.2);
        let feature = Feature::new(FourByNinePattern::new(0b11), FourByNinePattern::new(0b1100), 2);
        h.add_feature(pack, feature).unwrap();
        assert_eq!(h.features_with_metadata().len(), 1);
        assert!(h.add_feature(7, feature).is_err());

        // Square 1 completes the pair once square 0 is held.
        let board = FourByNineBoard::new(FourByNinePattern::single(0), FourByNinePattern::single(27));
        let moves = h.score_moves(&board, Player::Black);
        let value_at = |p: usize| moves.iter().find(|m| m.position == p).unwrap().value;
        assert!(value_at(1) > value_at(20));
    }

    #[test]
    fn parameter_arity_is_checked() {
        assert!(FourByNineHeuristic::from_parameters(&[1.0; 10]).is_err());
        assert!(FourByNineHeuristic::from_parameters(&[1.0; 57]).is_err());
        assert!(FourByNineHeuristic::from_parameters(&default_parameters()).is_ok());
    }
}
