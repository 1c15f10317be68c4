//! Neighborhood kernels.
//!
//! A kernel produces the `(height, width)` matrix of update weights around the
//! best-matching unit: 1.0 at the center, non-increasing with grid distance.

use crate::error::{HysomError, Result};
use crate::som::Grid;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A neighborhood kernel.
pub trait NeighborhoodFunction: Send + Sync {
    /// Returns the weight matrix over `grid` centered at `center` with radius `sigma`.
    fn weights(&self, grid: &Grid, center: (usize, usize), sigma: f64) -> Array2<f64>;
}

impl<F> NeighborhoodFunction for F
where
    F: Fn(&Grid, (usize, usize), f64) -> Array2<f64> + Send + Sync,
{
    fn weights(&self, grid: &Grid, center: (usize, usize), sigma: f64) -> Array2<f64> {
        self(grid, center, sigma)
    }
}

/// Gaussian kernel: `exp(-d^2 / (2 sigma^2))` with `d` the Euclidean grid distance.
pub fn gaussian(grid: &Grid, center: (usize, usize), sigma: f64) -> Array2<f64> {
    let denom = 2.0 * sigma * sigma;
    Array2::from_shape_fn(grid.shape(), |unit| {
        (-grid.squared_distance(unit, center) / denom).exp()
    })
}

/// Neighborhood kernel selection.
///
/// `Bubble` and `MexicanHat` are registered names without a defined kernel;
/// selecting them for training fails with [`HysomError::InvalidParameter`].
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// See [`gaussian`].
    #[default]
    Gaussian,
    /// Reserved name.
    Bubble,
    /// Reserved name.
    MexicanHat,
    /// User-supplied kernel.
    #[serde(skip)]
    Custom(Arc<dyn NeighborhoodFunction>),
}

impl Neighborhood {
    /// Names accepted by [`FromStr`].
    pub const NAMES: [&'static str; 3] = ["gaussian", "bubble", "mexican_hat"];

    /// Wraps a custom kernel.
    pub fn custom<F: NeighborhoodFunction + 'static>(f: F) -> Self {
        Neighborhood::Custom(Arc::new(f))
    }

    /// Returns the registry name, or `"custom"`.
    pub fn name(&self) -> &'static str {
        match self {
            Neighborhood::Gaussian => "gaussian",
            Neighborhood::Bubble => "bubble",
            Neighborhood::MexicanHat => "mexican_hat",
            Neighborhood::Custom(_) => "custom",
        }
    }

    /// Fails if the selected kernel has no definition.
    pub fn ensure_defined(&self) -> Result<()> {
        match self {
            Neighborhood::Bubble | Neighborhood::MexicanHat => Err(self.undefined()),
            _ => Ok(()),
        }
    }

    fn undefined(&self) -> HysomError {
        HysomError::InvalidParameter(format!(
            "neighborhood function '{}' is not implemented",
            self.name()
        ))
    }

    /// Evaluates the kernel, checking the shape of custom results.
    pub fn weights(&self, grid: &Grid, center: (usize, usize), sigma: f64) -> Result<Array2<f64>> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(HysomError::NumericDegeneracy(format!(
                "neighborhood radius must be positive, got {}",
                sigma
            )));
        }
        let weights = match self {
            Neighborhood::Gaussian => gaussian(grid, center, sigma),
            Neighborhood::Custom(f) => f.weights(grid, center, sigma),
            Neighborhood::Bubble | Neighborhood::MexicanHat => return Err(self.undefined()),
        };

        if weights.dim() != grid.shape() {
            return Err(HysomError::shape(&[grid.height, grid.width], weights.shape()));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(HysomError::NumericDegeneracy(format!(
                "{} kernel produced a non-finite weight (sigma={})",
                self.name(),
                sigma
            )));
        }
        Ok(weights)
    }
}

impl FromStr for Neighborhood {
    type Err = HysomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" => Ok(Neighborhood::Gaussian),
            "bubble" => Ok(Neighborhood::Bubble),
            "mexican_hat" => Ok(Neighborhood::MexicanHat),
            other => Err(HysomError::InvalidParameter(format!(
                "unknown neighborhood function '{}'; expected one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Debug for Neighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Neighborhood::Custom(_) => f.write_str("Custom(..)"),
            named => f.write_str(named.name()),
        }
    }
}

impl fmt::Display for Neighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
