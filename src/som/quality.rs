//! Map quality measures: quantization error (QE) and topographic error (TE).
//!
//! Both are derived from the distance matrix of a sample against the grid.
//! Ties are broken deterministically: the first unit in row-major order wins,
//! both for the best-matching unit and for the runner-up.

use crate::error::Result;
use crate::som::{Distance, Grid};
use ndarray::{Array2, ArrayView2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

/// One error snapshot taken during training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Global iteration at which the snapshot was taken.
    pub iteration: usize,
    /// Mean quantization error over the sampled subset.
    pub quantization_error: f64,
    /// Fraction of the sampled subset with non-adjacent top-2 units.
    pub topographic_error: f64,
}

/// Returns the flat index and value of the minimum entry (first occurrence wins).
pub fn argmin(distances: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, &d) in distances.iter().enumerate() {
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// Returns the flat indices of the best and second-best units.
///
/// The runner-up is `None` on a single-unit grid.
pub fn best_two(distances: &Array2<f64>) -> (usize, Option<usize>) {
    let mut best: Option<(usize, f64)> = None;
    let mut second: Option<(usize, f64)> = None;

    for (i, &d) in distances.iter().enumerate() {
        match best {
            Some((_, bd)) if !(d < bd) => {
                if second.map_or(true, |(_, sd)| d < sd) {
                    second = Some((i, d));
                }
            }
            _ => {
                second = best;
                best = Some((i, d));
            }
        }
    }

    (best.map_or(0, |(i, _)| i), second.map(|(i, _)| i))
}

/// Quantization error of one sample: distance to its best-matching unit.
pub fn sample_quantization_error(distances: &Array2<f64>) -> f64 {
    argmin(distances).1
}

/// Topographic error of one sample: 1 if the best and second-best units are
/// not adjacent on the grid (Chebyshev distance above 1), else 0.
pub fn sample_topographic_error(distances: &Array2<f64>, grid: &Grid) -> u8 {
    match best_two(distances) {
        (first, Some(second)) => {
            let hops = grid.chebyshev_distance(grid.coords(first), grid.coords(second));
            u8::from(hops > 1)
        }
        (_, None) => 0,
    }
}

/// Per-sample quantization errors.
pub fn quantization_errors(
    metric: &Distance,
    prototypes: ArrayView4<'_, f64>,
    data: ndarray::ArrayView3<'_, f64>,
) -> Result<Vec<f64>> {
    data.axis_iter(Axis(0))
        .map(|sample| metric.matrix(prototypes, sample).map(|d| sample_quantization_error(&d)))
        .collect()
}

/// Per-sample topographic errors (0 or 1).
pub fn topographic_errors(
    metric: &Distance,
    prototypes: ArrayView4<'_, f64>,
    data: ndarray::ArrayView3<'_, f64>,
) -> Result<Vec<u8>> {
    let grid = Grid::new(prototypes.shape()[0], prototypes.shape()[1]);
    data.axis_iter(Axis(0))
        .map(|sample| metric.matrix(prototypes, sample).map(|d| sample_topographic_error(&d, &grid)))
        .collect()
}

/// Mean QE and TE over a subset of samples, sharing one distance evaluation per sample.
pub fn mean_errors<'s>(
    metric: &Distance,
    prototypes: ArrayView4<'_, f64>,
    samples: impl Iterator<Item = ArrayView2<'s, f64>>,
) -> Result<(f64, f64)> {
    let grid = Grid::new(prototypes.shape()[0], prototypes.shape()[1]);
    let mut qe_sum = 0.0;
    let mut te_sum = 0usize;
    let mut count = 0usize;

    for sample in samples {
        let distances = metric.matrix(prototypes, sample)?;
        qe_sum += sample_quantization_error(&distances);
        te_sum += sample_topographic_error(&distances, &grid) as usize;
        count += 1;
    }

    if count == 0 {
        return Ok((0.0, 0.0));
    }
    Ok((qe_sum / count as f64, te_sum as f64 / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3, Array4};

    #[test]
    fn test_argmin_first_occurrence() {
        let d = array![[3.0, 1.0, 1.0], [2.0, 1.0, 5.0]];
        assert_eq!(argmin(&d), (1, 1.0));
    }

    #[test]
    fn test_best_two_distinct() {
        let d = array![[3.0, 0.5, 4.0], [0.2, 9.0, 7.0]];
        assert_eq!(best_two(&d), (3, Some(1)));
    }

    #[test]
    fn test_best_two_ties_are_row_major() {
        let d = array![[2.0, 1.0], [1.0, 1.0]];
        assert_eq!(best_two(&d), (1, Some(2)));

        let flat = Array2::<f64>::from_elem((1, 4), 0.7);
        assert_eq!(best_two(&flat), (0, Some(1)));
    }

    #[test]
    fn test_best_two_runner_up_before_best() {
        let d = array![[0.4, 0.9, 0.1]];
        assert_eq!(best_two(&d), (2, Some(0)));
    }

    #[test]
    fn test_best_two_single_unit() {
        let d = array![[0.4]];
        assert_eq!(best_two(&d), (0, None));
        assert_eq!(sample_topographic_error(&d, &Grid::new(1, 1)), 0);
    }

    #[test]
    fn test_topographic_error_adjacency() {
        let grid = Grid::new(3, 3);
        // best (0,0), second (1,1): diagonal neighbours
        let adjacent = array![[0.0, 5.0, 5.0], [5.0, 1.0, 5.0], [5.0, 5.0, 5.0]];
        assert_eq!(sample_topographic_error(&adjacent, &grid), 0);
        // best (0,0), second (2,1)
        let distant = array![[0.0, 5.0, 5.0], [5.0, 5.0, 5.0], [5.0, 1.0, 5.0]];
        assert_eq!(sample_topographic_error(&distant, &grid), 1);
    }

    #[test]
    fn test_identical_prototypes_have_no_topographic_error() {
        let prototypes = Array4::<f64>::ones((1, 5, 4, 2));
        let data = Array3::from_shape_fn((6, 4, 2), |(n, t, d)| (n + t + d) as f64 * 0.3);
        let te = topographic_errors(&Distance::Euclidean, prototypes.view(), data.view()).unwrap();
        assert_eq!(te, vec![0; 6]);
    }

    #[test]
    fn test_quantization_errors_are_minimum_distances() {
        let prototypes = Array4::from_shape_fn((2, 2, 3, 2), |(i, j, _, _)| (i * 2 + j) as f64);
        let data = Array3::from_shape_fn((2, 3, 2), |(n, _, _)| if n == 0 { 2.0 } else { 0.5 });
        let qe = quantization_errors(&Distance::Euclidean, prototypes.view(), data.view()).unwrap();
        assert_eq!(qe[0], 0.0);
        assert!((qe[1] - 6.0 * 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_mean_errors() {
        let prototypes = Array4::from_shape_fn((1, 3, 2, 1), |(_, j, _, _)| j as f64);
        let data = Array3::from_shape_fn((2, 2, 1), |(n, _, _)| n as f64 * 2.0);
        let (qe, te) = mean_errors(
            &Distance::Euclidean,
            prototypes.view(),
            data.axis_iter(Axis(0)),
        )
        .unwrap();
        assert_eq!(qe, 0.0);
        // sample 0 -> units 0 then 1 (adjacent); sample 1 -> units 2 then 1 (adjacent)
        assert_eq!(te, 0.0);
    }
}
