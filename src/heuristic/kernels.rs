use crate::heuristic::feature::{Feature, FeatureWithMeta};
use crate::heuristic::prelude::*;
use crate::ninarow::prelude::*;

/// A feature authored as a small grid: the bounding box of the pattern, with
/// piece and space cells marked. Expansion emits every translation that fits
/// the board, optionally closed under rotation and reflection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureKernel {
    rows: usize,
    cols: usize,
    pieces: Vec<bool>,
    spaces: Vec<bool>,
    min_space_occupancy: u32,
}

impl FeatureKernel {
    /// Builds a kernel from a glyph grid: `x` marks a piece, `o` a space,
    /// anything else an indifferent cell.
    pub fn from_rows(rows: &[&str], min_space_occupancy: u32) -> Result<FeatureKernel> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        if height == 0 || width == 0 || rows.iter().any(|r| r.len() != width) {
            return Err(anyhow!("kernel rows must be non-empty and rectangular"));
        }
        let mut pieces = vec![false; height * width];
        let mut spaces = vec![false; height * width];
        for (r, row) in rows.iter().enumerate() {
            for (c, glyph) in row.chars().enumerate() {
                match glyph {
                    'x' => pieces[r * width + c] = true,
                    'o' => spaces[r * width + c] = true,
                    _ => {}
                }
            }
        }
        Ok(FeatureKernel { rows: height, cols: width, pieces, spaces, min_space_occupancy })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// A quarter-turn counterclockwise.
    pub fn rotate90(&self) -> FeatureKernel {
        let map = |grid: &Vec<bool>| {
            let mut out = vec![false; self.rows * self.cols];
            for r in 0..self.cols {
                for c in 0..self.rows {
                    out[r * self.rows + c] = grid[c * self.cols + (self.cols - 1 - r)];
                }
            }
            out
        };
        FeatureKernel {
            rows: self.cols,
            cols: self.rows,
            pieces: map(&self.pieces),
            spaces: map(&self.spaces),
            min_space_occupancy: self.min_space_occupancy,
        }
    }

    /// Mirrors top-to-bottom.
    pub fn flip_rows(&self) -> FeatureKernel {
        let map = |grid: &Vec<bool>| {
            let mut out = vec![false; self.rows * self.cols];
            for r in 0..self.rows {
                for c in 0..self.cols {
                    out[r * self.cols + c] = grid[(self.rows - 1 - r) * self.cols + c];
                }
            }
            out
        };
        FeatureKernel { pieces: map(&self.pieces), spaces: map(&self.spaces), ..self.clone() }
    }

    /// Mirrors left-to-right.
    pub fn flip_cols(&self) -> FeatureKernel {
        let map = |grid: &Vec<bool>| {
            let mut out = vec![false; self.rows * self.cols];
            for r in 0..self.rows {
                for c in 0..self.cols {
                    out[r * self.cols + c] = grid[r * self.cols + (self.cols - 1 - c)];
                }
            }
            out
        };
        FeatureKernel { pieces: map(&self.pieces), spaces: map(&self.spaces), ..self.clone() }
    }

    /// The closure of this kernel under the requested symmetries, deduplicated.
    pub fn variants(&self, rotations: bool, reflections: bool) -> Vec<FeatureKernel> {
        let mut out = vec![self.clone()];
        let mut push_unique = |set: &mut Vec<FeatureKernel>, candidate: FeatureKernel| {
            if !set.contains(&candidate) {
                set.push(candidate);
            }
        };
        if rotations {
            let mut turned = self.clone();
            for _ in 0..3 {
                turned = turned.rotate90();
                push_unique(&mut out, turned.clone());
            }
        }
        if reflections {
            for base in out.clone() {
                push_unique(&mut out, base.flip_rows());
                push_unique(&mut out, base.flip_cols());
            }
        }
        out
    }

    /// Every placement of this kernel on an `H` by `W` board.
    pub fn translations<const H: usize, const W: usize>(&self) -> Vec<Feature<H, W>> {
        let mut out = Vec::new();
        if self.rows > H || self.cols > W {
            return out;
        }
        for anchor_row in 0..=(H - self.rows) {
            for anchor_col in 0..=(W - self.cols) {
                let place = |grid: &Vec<bool>| {
                    let mut bits = 0u64;
                    for r in 0..self.rows {
                        for c in 0..self.cols {
                            if grid[r * self.cols + c] {
                                bits |= 1u64 << ((anchor_row + r) * W + anchor_col + c);
                            }
                        }
                    }
                    Pattern::new(bits)
                };
                out.push(Feature::new(place(&self.pieces), place(&self.spaces), self.min_space_occupancy));
            }
        }
        out
    }

    /// Expands the kernel into board features: symmetry closure, then every
    /// translation, with duplicates removed.
    pub fn expand<const H: usize, const W: usize>(&self, rotations: bool, reflections: bool) -> Vec<Feature<H, W>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for variant in self.variants(rotations, reflections) {
            for feature in variant.translations::<H, W>() {
                if seen.insert((feature.pieces.bits(), feature.spaces.bits(), feature.min_space_occupancy)) {
                    out.push(feature);
                }
            }
        }
        out
    }
}

/// The four line orientations, in weight-table order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
    Diagonal,
    AntiDiagonal,
}

const ORIENTATIONS: [Orientation; 4] = [
    Orientation::Horizontal,
    Orientation::Vertical,
    Orientation::Diagonal,
    Orientation::AntiDiagonal,
];

/// Lays a length-4 window string out along an orientation. Horizontal windows
/// are 1x4, vertical 4x1, diagonals occupy a 4x4 box.
fn oriented_kernel(window: &str, orientation: Orientation, min_space_occupancy: u32) -> Result<FeatureKernel> {
    debug_assert_eq!(window.len(), LINE_LENGTH);
    let rows: Vec<String> = match orientation {
        Orientation::Horizontal => vec![window.into()],
        Orientation::Vertical => window.chars().map(|g| g.to_string()).collect(),
        Orientation::Diagonal | Orientation::AntiDiagonal => {
            let mut grid = vec![vec!['.'; LINE_LENGTH]; LINE_LENGTH];
            for (i, glyph) in window.chars().enumerate() {
                let col = match orientation {
                    Orientation::Diagonal => i,
                    _ => LINE_LENGTH - 1 - i,
                };
                grid[i][col] = glyph;
            }
            grid.into_iter().map(|r| r.into_iter().collect()).collect()
        }
    };
    let borrowed: Vec<&str> = rows.iter().map(|r| r.as_str()).collect();
    FeatureKernel::from_rows(&borrowed, min_space_occupancy)
}

/// The window contents for each feature type, in weight-table order:
/// connected two, unconnected two, three in a row, four in a row.
const WINDOW_KINDS: [(&[&str], u32); 4] = [
    (&["xxoo", "oxxo", "ooxx"], 2),
    (&["xoxo", "xoox", "oxox"], 2),
    (&["oxxx", "xoxx", "xxox", "xxxo"], 1),
    (&["xxxx"], 0),
];

/// How many weight groups the default table defines: one per orientation and
/// window kind, plus the trailing center group.
pub const DEFAULT_GROUP_COUNT: usize = ORIENTATIONS.len() * WINDOW_KINDS.len() + 1;

/// Builds the default feature table. Group `4 * orientation + kind` holds the
/// oriented line features; the last group holds one single-square feature per
/// board cell, whose weights come from the scalar center term under the
/// standard parameter mapping.
pub fn default_feature_set<const H: usize, const W: usize>() -> Vec<FeatureWithMeta<H, W>> {
    let mut out = Vec::new();
    for (o, orientation) in ORIENTATIONS.iter().enumerate() {
        for (k, (windows, min_spaces)) in WINDOW_KINDS.iter().enumerate() {
            let weight_index = o * WINDOW_KINDS.len() + k;
            for window in windows.iter() {
                let kernel = oriented_kernel(window, *orientation, *min_spaces)
                    .expect("default kernels are well-formed");
                for feature in kernel.expand::<H, W>(false, false) {
                    out.push(FeatureWithMeta { feature, weight_index });
                }
            }
        }
    }

    let center = FeatureKernel::from_rows(&["x"], 0).expect("default kernels are well-formed");
    for feature in center.expand::<H, W>(false, false) {
        out.push(FeatureWithMeta { feature, weight_index: DEFAULT_GROUP_COUNT - 1 });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{default_feature_set, FeatureKernel, DEFAULT_GROUP_COUNT};
    use crate::ninarow::prelude::*;

    #[test]
    fn translation_census() {
        // A 1x4 window slides into 6 columns on each of 4 rows.
        let kernel = FeatureKernel::from_rows(&["xxoo"], 2).unwrap();
        assert_eq!(kernel.translations::<BOARD_HEIGHT, BOARD_WIDTH>().len(), 24);

        // A 4x4 diagonal box slides into 6 columns on a single row band.
        let diag = FeatureKernel::from_rows(&["x...", ".x..", "..x.", "...x"], 0).unwrap();
        assert_eq!(diag.translations::<BOARD_HEIGHT, BOARD_WIDTH>().len(), 6);
    }

    #[test]
    fn rotation_produces_the_vertical_window() {
        let kernel = FeatureKernel::from_rows(&["xxxx"], 0).unwrap();
        let variants = kernel.variants(true, false);
        // A bare line has two distinct images under rotation.
        assert_eq!(variants.len(), 2);
        assert!(variants.iter().any(|v| v.rows() == 4 && v.cols() == 1));
    }

    #[test]
    fn reflections_deduplicate_symmetric_kernels() {
        let symmetric = FeatureKernel::from_rows(&["oxxo"], 2).unwrap();
        assert_eq!(symmetric.variants(false, true).len(), 1);

        let skew = FeatureKernel::from_rows(&["xxoo"], 2).unwrap();
        assert_eq!(skew.variants(false, true).len(), 2);
    }

    #[test]
    fn default_table_shape() {
        let features = default_feature_set::<BOARD_HEIGHT, BOARD_WIDTH>();
        assert_eq!(DEFAULT_GROUP_COUNT, 17);

        // Horizontal 264, vertical 99, 66 per diagonal direction, 36 center.
        assert_eq!(features.len(), 531);
        assert!(features.iter().all(|f| f.weight_index < DEFAULT_GROUP_COUNT));

        let center_count = features.iter().filter(|f| f.weight_index == 16).count();
        assert_eq!(center_count, 36);

        let four_in_a_row = features
            .iter()
            .filter(|f| f.weight_index % 4 == 3 && f.weight_index != 16)
            .count();
        assert_eq!(four_in_a_row, 45);
    }
}
