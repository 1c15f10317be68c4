//! Distance metrics between a grid of prototype sequences and one sample.
//!
//! Every metric maps prototypes of shape `(H, W, seq_len, point_dim)` and a
//! sample of shape `(seq_len, point_dim)` to an `(H, W)` matrix of
//! non-negative distances:
//!
//! - **Euclidean**: sum of squared differences over the whole sequence.
//! - **DTW**: Dynamic Time Warping alignment cost. DTW is `O(n * m)` per unit
//!   and dominates training time, so the grid is evaluated in parallel with
//!   rayon (one task per unit, results collected before BMU selection).
//!
//! DTW is symmetric in its two arguments but is not a metric in the strict
//! sense: it does not satisfy the triangle inequality.

use crate::error::{HysomError, Result};
use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayView4, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A distance metric over the prototype grid.
///
/// Implementations must be pure and safe to call from several threads.
pub trait DistanceMetric: Send + Sync {
    /// Returns the `(H, W)` matrix of distances from `sample` to every prototype.
    fn distances(&self, prototypes: ArrayView4<'_, f64>, sample: ArrayView2<'_, f64>) -> Array2<f64>;
}

impl<F> DistanceMetric for F
where
    F: Fn(ArrayView4<'_, f64>, ArrayView2<'_, f64>) -> Array2<f64> + Send + Sync,
{
    fn distances(&self, prototypes: ArrayView4<'_, f64>, sample: ArrayView2<'_, f64>) -> Array2<f64> {
        self(prototypes, sample)
    }
}

/// Squared Euclidean distance between two points.
#[inline]
fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Point dimensions must match");

    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean metric: elementwise squared difference summed over each sequence.
pub fn euclidean(prototypes: ArrayView4<'_, f64>, sample: ArrayView2<'_, f64>) -> Array2<f64> {
    let (h, w) = (prototypes.shape()[0], prototypes.shape()[1]);

    Array2::from_shape_fn((h, w), |(i, j)| {
        prototypes
            .slice(s![i, j, .., ..])
            .iter()
            .zip(sample.iter())
            .map(|(p, x)| (p - x) * (p - x))
            .sum()
    })
}

/// Dynamic Time Warping cost between two sequences of points.
///
/// `x` has shape `(n, d)` and `y` has shape `(m, d)`; the lengths may differ.
/// With local cost `c(i, j) = |x_i - y_j|^2` the cumulative cost is
///
/// ```text
/// R[0, 0] = c(0, 0)
/// R[i, j] = c(i, j) + min(R[i-1, j], R[i, j-1], R[i-1, j-1])
/// ```
///
/// with out-of-range predecessors treated as infinite. Returns `sqrt(R[n-1, m-1])`.
/// Only two rows of `R` are kept. An empty sequence yields infinity.
pub fn dtw(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> f64 {
    let (n, m) = (x.nrows(), y.nrows());
    if n == 0 || m == 0 {
        return f64::INFINITY;
    }

    let mut prev = vec![f64::INFINITY; m];
    let mut curr = vec![f64::INFINITY; m];

    for i in 0..n {
        let xi = x.row(i);
        for j in 0..m {
            let cost = squared_distance(xi, y.row(j));
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                let up = if i > 0 { prev[j] } else { f64::INFINITY };
                let left = if j > 0 { curr[j - 1] } else { f64::INFINITY };
                let diag = if i > 0 && j > 0 { prev[j - 1] } else { f64::INFINITY };
                up.min(left).min(diag)
            };
            curr[j] = cost + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m - 1].sqrt()
}

/// DTW metric over the whole grid, one rayon task per unit.
pub fn dtw_grid(prototypes: ArrayView4<'_, f64>, sample: ArrayView2<'_, f64>) -> Array2<f64> {
    let (h, w) = (prototypes.shape()[0], prototypes.shape()[1]);
    let mut out = Array2::<f64>::zeros((h, w));

    Zip::indexed(&mut out).par_for_each(|(i, j), d| {
        *d = dtw(prototypes.slice(s![i, j, .., ..]), sample);
    });

    out
}

/// Distance metric selection.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    /// See [`euclidean`].
    Euclidean,
    /// See [`dtw_grid`].
    #[default]
    Dtw,
    /// User-supplied metric.
    #[serde(skip)]
    Custom(Arc<dyn DistanceMetric>),
}

impl Distance {
    /// Names accepted by [`FromStr`].
    pub const NAMES: [&'static str; 2] = ["euclidean", "dtw"];

    /// Wraps a custom metric.
    pub fn custom<F: DistanceMetric + 'static>(f: F) -> Self {
        Distance::Custom(Arc::new(f))
    }

    /// Returns the registry name, or `"custom"`.
    pub fn name(&self) -> &'static str {
        match self {
            Distance::Euclidean => "euclidean",
            Distance::Dtw => "dtw",
            Distance::Custom(_) => "custom",
        }
    }

    /// Returns true for metrics that can be persisted by name.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Distance::Custom(_))
    }

    /// Computes the distance matrix, checking the shape of custom results.
    pub fn matrix(&self, prototypes: ArrayView4<'_, f64>, sample: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let distances = match self {
            Distance::Euclidean => euclidean(prototypes, sample),
            Distance::Dtw => dtw_grid(prototypes, sample),
            Distance::Custom(f) => f.distances(prototypes, sample),
        };

        let grid = &prototypes.shape()[..2];
        if distances.shape() != grid {
            return Err(HysomError::shape(grid, distances.shape()));
        }
        Ok(distances)
    }
}

impl FromStr for Distance {
    type Err = HysomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Distance::Euclidean),
            "dtw" => Ok(Distance::Dtw),
            other => Err(HysomError::InvalidParameter(format!(
                "unknown distance function '{}'; expected one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Custom(_) => f.write_str("Custom(..)"),
            named => f.write_str(named.name()),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
