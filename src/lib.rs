#![allow(dead_code)]

pub mod fitting;
pub mod heuristic;
pub mod ninarow;
pub mod search;

pub mod utils {
    pub mod prelude {
        pub use anyhow::{anyhow, Context, Error};
        pub type Result<T> = anyhow::Result<T, Error>;

        pub use std::collections::{BTreeSet, HashMap, HashSet};
    }
}

pub mod prelude {
    pub use super::fitting::prelude::*;
    pub use super::heuristic::prelude::*;
    pub use super::ninarow::prelude::*;
    pub use super::search::*;
    pub use super::utils::prelude::*;
}
