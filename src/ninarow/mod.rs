/*
 *  The n-in-a-row board core: bit patterns, boards, moves, and line queries.
 */

pub(crate) mod board;
pub(crate) mod consts;
pub(crate) mod lines;
pub mod pattern;

pub mod prelude {
    pub(crate) use crate::utils::prelude::*;

    pub use super::{
        board::{Board, FourByNineBoard, Move},
        consts::*,
        pattern::{FourByNinePattern, Pattern},
    };
}
