//! Rectangular lattice geometry for the Self-Organizing Map.

use serde::{Deserialize, Serialize};

/// The fixed `height x width` lattice of map units.
///
/// Units are addressed by `(row, col)` in matrix convention and stored in
/// row-major order, so unit `(i, j)` has flat index `i * width + j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    /// Number of rows.
    pub height: usize,
    /// Number of columns.
    pub width: usize,
}

impl Grid {
    /// Creates a new grid.
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Returns the total number of units.
    #[inline]
    pub fn len(&self) -> usize {
        self.height * self.width
    }

    /// Returns true if the grid has no units.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the grid shape as `(height, width)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Converts a flat row-major index to `(row, col)`.
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index / self.width, index % self.width)
    }

    /// Converts `(row, col)` to a flat row-major index.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Squared Euclidean distance between two units (avoids sqrt).
    #[inline]
    pub fn squared_distance(&self, a: (usize, usize), b: (usize, usize)) -> f64 {
        let dr = a.0 as f64 - b.0 as f64;
        let dc = a.1 as f64 - b.1 as f64;
        dr * dr + dc * dc
    }

    /// Chebyshev (max-coordinate) distance between two units.
    ///
    /// Two distinct units are adjacent, diagonals included, exactly when this is 1.
    #[inline]
    pub fn chebyshev_distance(&self, a: (usize, usize), b: (usize, usize)) -> usize {
        a.0.abs_diff(b.0).max(a.1.abs_diff(b.1))
    }

    /// Iterates over all unit coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.len()).map(move |i| self.coords(i))
    }
}
