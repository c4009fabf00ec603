//! Toroidal boolean grid and the Game-of-Life transition rule.
//!
//! A [`Grid`] is a rectangular, non-empty matrix of cells stored row-major in
//! a flat vector. Its edges wrap: the cell left of column 0 is the last
//! column, the cell above row 0 is the last row. The rule is the standard
//! B3/S23 rule evaluated against a read-only copy of the current generation.
//!
//! On the wire a grid is an array of rows, each row an array of booleans.
//! Decoding validates the shape, so a [`Grid`] value is always rectangular.
//! Client-supplied grids are also capped at [`MAX_GRID_SIDE`].

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Largest accepted height or width of a grid.
pub const MAX_GRID_SIDE: usize = 512;

/// Character used for a live cell in [`Grid::render`].
const ALIVE_RENDER: char = '#';

/// Character used for a dead cell in [`Grid::render`].
const DEAD_RENDER: char = '.';

/// Errors produced when building a grid from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// The grid has no rows or its rows have no cells.
    #[error("grid must have at least one row and one column")]
    Empty,

    /// A row differs in length from the first row.
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Length of the first row.
        expected: usize,
        /// Length of the offending row.
        found: usize,
    },

    /// One of the sides exceeds [`MAX_GRID_SIDE`].
    #[error("grid of {height}x{width} exceeds the maximum side of {max}")]
    TooLarge {
        /// Requested number of rows.
        height: usize,
        /// Requested number of columns.
        width: usize,
        /// The configured maximum side.
        max: usize,
    },
}

/// A rectangular toroidal grid of live/dead cells.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<Vec<bool>>")]
pub struct Grid {
    height: usize,
    width: usize,
    cells: Vec<bool>,
}

impl Grid {
    /// Create an all-dead grid of the given dimensions.
    ///
    /// Only emptiness is checked here: merged grids are built by the engine
    /// and may be larger than [`MAX_GRID_SIDE`]. Client input goes through
    /// [`Grid::from_rows`].
    pub fn dead(height: usize, width: usize) -> Result<Self, GridError> {
        if height == 0 || width == 0 {
            return Err(GridError::Empty);
        }
        let len = height.checked_mul(width).ok_or(GridError::TooLarge {
            height,
            width,
            max: MAX_GRID_SIDE,
        })?;
        Ok(Self {
            height,
            width,
            cells: vec![false; len],
        })
    }

    /// Build a grid from rows of cells, validating the shape.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        check_dimensions(height, width)?;

        let mut cells = Vec::with_capacity(height.saturating_mul(width));
        for (row, line) in rows.into_iter().enumerate() {
            if line.len() != width {
                return Err(GridError::Ragged {
                    row,
                    expected: width,
                    found: line.len(),
                });
            }
            cells.extend(line);
        }

        Ok(Self {
            height,
            width,
            cells,
        })
    }

    /// Number of rows.
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Whether the cell at (`y`, `x`) is alive. Out-of-range cells read as dead.
    pub fn is_alive(&self, y: usize, x: usize) -> bool {
        self.index(y, x)
            .and_then(|i| self.cells.get(i).copied())
            .unwrap_or(false)
    }

    /// Set the cell at (`y`, `x`). Returns `false` if the position is out of range.
    pub fn set(&mut self, y: usize, x: usize, alive: bool) -> bool {
        match self.index(y, x).and_then(|i| self.cells.get_mut(i)) {
            Some(cell) => {
                *cell = alive;
                true
            }
            None => false,
        }
    }

    /// Iterate over the rows as slices.
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.cells.chunks_exact(self.width)
    }

    /// Count of live cells.
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Count live neighbours of (`y`, `x`) using 8-neighbour toroidal adjacency.
    pub fn live_neighbours(&self, y: usize, x: usize) -> u8 {
        let rows = [wrap_prev(y, self.height), y, wrap_next(y, self.height)];
        let cols = [wrap_prev(x, self.width), x, wrap_next(x, self.width)];

        let mut count: u8 = 0;
        for (ri, &ny) in rows.iter().enumerate() {
            for (ci, &nx) in cols.iter().enumerate() {
                if ri == 1 && ci == 1 {
                    continue;
                }
                if self.is_alive(ny, nx) {
                    count = count.saturating_add(1);
                }
            }
        }
        count
    }

    /// Compute the next generation without touching `self`.
    ///
    /// Every neighbour count is read from `self`, so the result does not
    /// depend on the order in which cells are visited.
    pub fn step(&self) -> Self {
        let mut cells = Vec::with_capacity(self.cells.len());
        for y in 0..self.height {
            for x in 0..self.width {
                let neighbours = self.live_neighbours(y, x);
                let alive = self.is_alive(y, x);
                cells.push(matches!((alive, neighbours), (true, 2 | 3) | (false, 3)));
            }
        }
        Self {
            height: self.height,
            width: self.width,
            cells,
        }
    }

    /// Content fingerprint over the dimensions and every cell.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.height as u64).to_le_bytes());
        hasher.update(&(self.width as u64).to_le_bytes());
        let packed: Vec<u8> = self.cells.iter().map(|&c| u8::from(c)).collect();
        hasher.update(&packed);
        hasher.finalize()
    }

    /// Copy `source` into `self` with its top-left corner at (`top`, `left`).
    ///
    /// Cells that would fall outside `self` are dropped.
    pub fn blit(&mut self, source: &Self, top: usize, left: usize) {
        for (sy, row) in source.rows().enumerate() {
            for (sx, &alive) in row.iter().enumerate() {
                if let (Some(y), Some(x)) = (top.checked_add(sy), left.checked_add(sx)) {
                    self.set(y, x, alive);
                }
            }
        }
    }

    /// Render the grid as text, one line per row.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.cells.len().saturating_add(self.height));
        for row in self.rows() {
            out.extend(
                row.iter()
                    .map(|&c| if c { ALIVE_RENDER } else { DEAD_RENDER }),
            );
            out.push('\n');
        }
        out
    }

    fn index(&self, y: usize, x: usize) -> Option<usize> {
        if y >= self.height || x >= self.width {
            return None;
        }
        y.checked_mul(self.width)?.checked_add(x)
    }
}

impl TryFrom<Vec<Vec<bool>>> for Grid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<bool>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("alive", &self.alive_count())
            .finish()
    }
}

const fn check_dimensions(height: usize, width: usize) -> Result<(), GridError> {
    if height == 0 || width == 0 {
        return Err(GridError::Empty);
    }
    if height > MAX_GRID_SIDE || width > MAX_GRID_SIDE {
        return Err(GridError::TooLarge {
            height,
            width,
            max: MAX_GRID_SIDE,
        });
    }
    Ok(())
}

// `len` is never zero for a validated grid.
#[allow(clippy::arithmetic_side_effects)]
const fn wrap_prev(i: usize, len: usize) -> usize {
    if i == 0 { len - 1 } else { i - 1 }
}

#[allow(clippy::arithmetic_side_effects)]
const fn wrap_next(i: usize, len: usize) -> usize {
    if i + 1 >= len { 0 } else { i + 1 }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Straightforward modular-arithmetic version of the rule.
    fn reference_step(rows: &[Vec<bool>]) -> Vec<Vec<bool>> {
        let h = rows.len() as isize;
        let w = rows[0].len() as isize;
        let mut next = rows.to_vec();
        for y in 0..h {
            for x in 0..w {
                let mut n = 0;
                for dy in -1..=1_isize {
                    for dx in -1..=1_isize {
                        if dy == 0 && dx == 0 {
                            continue;
                        }
                        let ny = (y + dy).rem_euclid(h) as usize;
                        let nx = (x + dx).rem_euclid(w) as usize;
                        if rows[ny][nx] {
                            n += 1;
                        }
                    }
                }
                let alive = rows[y as usize][x as usize];
                next[y as usize][x as usize] = (alive && (n == 2 || n == 3)) || (!alive && n == 3);
            }
        }
        next
    }

    fn to_rows(grid: &Grid) -> Vec<Vec<bool>> {
        grid.rows().map(<[bool]>::to_vec).collect()
    }

    fn arb_rows() -> impl Strategy<Value = Vec<Vec<bool>>> {
        (1_usize..12, 1_usize..12).prop_flat_map(|(h, w)| {
            prop::collection::vec(prop::collection::vec(any::<bool>(), w), h)
        })
    }

    proptest! {
        #[test]
        fn step_matches_reference_rule(rows in arb_rows()) {
            let grid = Grid::from_rows(rows.clone()).unwrap();
            prop_assert_eq!(to_rows(&grid.step()), reference_step(&rows));
        }

        #[test]
        fn step_leaves_source_untouched(rows in arb_rows()) {
            let grid = Grid::from_rows(rows.clone()).unwrap();
            let _next = grid.step();
            prop_assert_eq!(to_rows(&grid), rows);
        }
    }

    #[test]
    fn rejects_empty_grid() {
        assert_eq!(Grid::from_rows(Vec::new()).unwrap_err(), GridError::Empty);
        assert_eq!(
            Grid::from_rows(vec![Vec::new()]).unwrap_err(),
            GridError::Empty
        );
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Grid::from_rows(vec![vec![true, false], vec![true]]).unwrap_err();
        assert_eq!(
            err,
            GridError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn rejects_oversized_grid() {
        let rows = vec![vec![false]; MAX_GRID_SIDE + 1];
        let err = Grid::from_rows(rows).unwrap_err();
        assert!(matches!(err, GridError::TooLarge { .. }));
        assert_eq!(Grid::dead(0, 3).unwrap_err(), GridError::Empty);
    }

    #[test]
    fn neighbours_wrap_around_corners() {
        let mut grid = Grid::dead(5, 5).unwrap();
        grid.set(4, 4, true);
        grid.set(0, 4, true);
        grid.set(4, 0, true);
        // (0,0) touches all three across the edges.
        assert_eq!(grid.live_neighbours(0, 0), 3);
    }

    #[test]
    fn serializes_as_nested_arrays() {
        let grid = Grid::from_rows(vec![vec![true, false], vec![false, true]]).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(json, "[[true,false],[false,true]]");
    }

    #[test]
    fn deserialize_validates_shape() {
        let ok: Grid = serde_json::from_str("[[true],[false]]").unwrap();
        assert_eq!((ok.height(), ok.width()), (2, 1));
        assert!(serde_json::from_str::<Grid>("[[true],[false,true]]").is_err());
        assert!(serde_json::from_str::<Grid>("[]").is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Grid::from_rows(vec![vec![true, false]]).unwrap();
        let b = Grid::from_rows(vec![vec![false, true]]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn blit_copies_at_offset() {
        let mut target = Grid::dead(4, 4).unwrap();
        let source = Grid::from_rows(vec![vec![true, true], vec![false, true]]).unwrap();
        target.blit(&source, 2, 1);
        assert!(target.is_alive(2, 1));
        assert!(target.is_alive(2, 2));
        assert!(!target.is_alive(3, 1));
        assert!(target.is_alive(3, 2));
        assert_eq!(target.alive_count(), 3);
    }

    #[test]
    fn render_marks_live_cells() {
        let grid = Grid::from_rows(vec![vec![true, false], vec![false, false]]).unwrap();
        assert_eq!(grid.render(), "#.\n..\n");
    }
}
