use std::ops::Neg;

use crate::utils::prelude::*;

pub const BOARD_HEIGHT: usize = 4;
pub const BOARD_WIDTH: usize = 9;
pub const BOARD_SIZE: usize = BOARD_HEIGHT * BOARD_WIDTH;

/// The length of a winning line.
pub const LINE_LENGTH: usize = 4;

/// Sentinel attached to proven positions. Kept finite so that sort orders
/// over move values stay total even after propagation.
pub const TERMINAL_VALUE: f64 = 1e12;

// A piece typing. Black always moves first on an empty board.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Player {
    Black = 0,
    White = 1,
}

impl Player {
    /// Notates the player.
    pub fn notate(&self) -> String {
        match self {
            Player::Black => "Black",
            Player::White => "White",
        }
        .into()
    }

    /// The given player's scoring factor.
    /// Choosing 1 and -1 allows for branchless negamax.
    pub fn perspective(&self) -> f64 {
        match self {
            Player::Black => 1.0,
            Player::White => -1.0,
        }
    }

    /// Parses a player token as it appears in participant records.
    pub fn parse(s: &str) -> Result<Player> {
        match s.to_ascii_lowercase().as_str() {
            "black" | "0" => Ok(Player::Black),
            "white" | "1" => Ok(Player::White),
            _ => Err(anyhow!("malformed input: unrecognized player token {s}")),
        }
    }
}

impl Neg for Player {
    type Output = Player;
    fn neg(self) -> Self::Output {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Player;

    #[test]
    fn parse_tokens() {
        for tok in ["Black", "black", "0"] {
            assert_eq!(Player::parse(tok).unwrap(), Player::Black);
        }
        for tok in ["White", "white", "1"] {
            assert_eq!(Player::parse(tok).unwrap(), Player::White);
        }
        assert!(Player::parse("red").is_err());
    }

    #[test]
    fn negation_flips() {
        assert_eq!(-Player::Black, Player::White);
        assert_eq!(-Player::White, Player::Black);
    }
}
