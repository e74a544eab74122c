use crate::ninarow::prelude::*;

/// A local piece/space pattern. A feature is contained in a board for a
/// player when that player holds every `pieces` square and at least
/// `min_space_occupancy` of the `spaces` squares are still empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Feature<const H: usize, const W: usize> {
    pub pieces: Pattern<H, W>,
    pub spaces: Pattern<H, W>,
    pub min_space_occupancy: u32,
}

impl<const H: usize, const W: usize> Feature<H, W> {
    pub fn new(pieces: Pattern<H, W>, spaces: Pattern<H, W>, min_space_occupancy: u32) -> Feature<H, W> {
        debug_assert!((pieces & spaces).is_empty(), "feature pieces and spaces must be disjoint");
        Feature { pieces, spaces, min_space_occupancy }
    }

    pub fn contained_in(&self, board: &Board<H, W>, owner: Player) -> bool {
        self.pieces.is_subset_of(&board.pieces(owner))
            && board.count_spaces(self.spaces) >= self.min_space_occupancy
    }

    /// Whether `owner` playing `position` turns this feature from one piece
    /// short into contained.
    pub fn completed_by(&self, board: &Board<H, W>, owner: Player, position: usize) -> bool {
        self.pieces.contains(position)
            && board.missing_pieces(self.pieces, owner) == Pattern::single(position)
            && !board.occupied().contains(position)
            && board.count_spaces(self.spaces) >= self.min_space_occupancy
    }

    /// Whether occupying `position` starves a currently contained feature of
    /// its required spaces. The square must be one of the feature's spaces and
    /// the free-space count must sit exactly at the minimum.
    pub fn broken_by(&self, board: &Board<H, W>, owner: Player, position: usize) -> bool {
        self.spaces.contains(position)
            && self.contained_in(board, owner)
            && board.count_spaces(self.spaces) == self.min_space_occupancy
    }
}

/// Weights shared by every feature in one group. Features owned by the
/// evaluating player contribute `weight_act`, the opponent's contribute
/// `weight_pass`; each feature is silenced with probability `drop_rate` per
/// evaluation when noise is enabled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureGroupWeights {
    pub weight_act: f64,
    pub weight_pass: f64,
    pub drop_rate: f64,
}

impl FeatureGroupWeights {
    pub fn new(weight_act: f64, weight_pass: f64, drop_rate: f64) -> FeatureGroupWeights {
        FeatureGroupWeights { weight_act, weight_pass, drop_rate }
    }
}

/// A feature bound to its weight group.
#[derive(Clone, Copy, Debug)]
pub struct FeatureWithMeta<const H: usize, const W: usize> {
    pub feature: Feature<H, W>,
    pub weight_index: usize,
}

#[cfg(test)]
mod tests {
    use super::Feature;
    use crate::ninarow::prelude::*;

    type F = Feature<BOARD_HEIGHT, BOARD_WIDTH>;

    fn pair_feature() -> F {
        // Pieces on 0 and 1, spaces on 2 and 3, both spaces required.
        F::new(FourByNinePattern::new(0b0011), FourByNinePattern::new(0b1100), 2)
    }

    #[test]
    fn nothing_is_contained_in_an_empty_board() {
        let board = FourByNineBoard::default();
        assert!(!pair_feature().contained_in(&board, Player::Black));
        assert!(!pair_feature().contained_in(&board, Player::White));
    }

    #[test]
    fn containment_needs_pieces_and_spaces() {
        let feature = pair_feature();
        let black = FourByNinePattern::new(0b0011);
        let open = FourByNineBoard::new(black, FourByNinePattern::default());
        assert!(feature.contained_in(&open, Player::Black));
        assert!(!feature.contained_in(&open, Player::White));

        // Losing one required space to the opponent breaks containment.
        let crowded = FourByNineBoard::new(black, FourByNinePattern::single(2));
        assert!(!feature.contained_in(&crowded, Player::Black));
    }

    #[test]
    fn completion_detects_the_single_missing_piece() {
        let feature = pair_feature();
        let board = FourByNineBoard::new(FourByNinePattern::single(0), FourByNinePattern::default());
        assert!(feature.completed_by(&board, Player::Black, 1));
        assert!(!feature.completed_by(&board, Player::Black, 2));
        assert!(!feature.completed_by(&board, Player::White, 1));
    }

    #[test]
    fn breaking_requires_a_critical_space() {
        let feature = pair_feature();
        let board = FourByNineBoard::new(FourByNinePattern::new(0b0011), FourByNinePattern::default());
        // Both spaces free and both required: occupying either breaks it.
        assert!(feature.broken_by(&board, Player::Black, 2));
        assert!(feature.broken_by(&board, Player::Black, 3));
        assert!(!feature.broken_by(&board, Player::Black, 4));

        // With a surplus space the feature survives one intrusion.
        let slack = F::new(FourByNinePattern::new(0b0011), FourByNinePattern::new(0b1100), 1);
        assert!(!slack.broken_by(&board, Player::Black, 2));
    }
}
