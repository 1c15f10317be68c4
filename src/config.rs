//! Configuration for the HySOM engine.

use crate::error::{HysomError, Result};
use crate::som::{Decay, Distance, Neighborhood};
use crate::{DEFAULT_GRID_SIDE, DEFAULT_POINT_DIM, DEFAULT_SEQ_LEN};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Map construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomConfig {
    /// Number of grid columns.
    /// Default: 8.
    pub width: usize,

    /// Number of grid rows.
    /// Default: 8.
    pub height: usize,

    /// Shape of one sample as `(seq_len, point_dim)`.
    /// Default: (50, 2), i.e. a loop of fifty (x, y) points.
    pub input_dim: (usize, usize),

    /// Random seed for initialization, shuffling and error sampling.
    /// Default: None (random).
    pub seed: Option<u64>,

    /// Number of threads used to evaluate distances over the grid.
    /// Default: 0 (use rayon's global pool).
    pub num_threads: usize,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_GRID_SIDE,
            height: DEFAULT_GRID_SIDE,
            input_dim: (DEFAULT_SEQ_LEN, DEFAULT_POINT_DIM),
            seed: None,
            num_threads: 0,
        }
    }
}

impl SomConfig {
    /// Returns the total number of units in the map.
    #[inline]
    pub fn total_units(&self) -> usize {
        self.width * self.height
    }

    /// Checks that every dimension is positive.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HysomError::InvalidParameter(format!(
                "grid dimensions must be positive, got {}x{}",
                self.height, self.width
            )));
        }
        if self.input_dim.0 == 0 || self.input_dim.1 == 0 {
            return Err(HysomError::InvalidParameter(format!(
                "input_dim must be positive, got {:?}",
                self.input_dim
            )));
        }
        Ok(())
    }
}

/// Training options.
///
/// The history of error snapshots grows by `errors_sampling_rate + 1` entries
/// per epoch when `track_errors` is set; callers bound its size through those
/// two options and `epochs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of passes over the data.
    /// Default: 1.
    pub epochs: usize,

    /// Shuffle samples every epoch instead of feeding them in order.
    /// Default: true.
    pub random_order: bool,

    /// Neighborhood radius at the first iteration.
    /// Default: None (sqrt(width * height)).
    pub initial_sigma: Option<f64>,

    /// Learning rate at the first iteration.
    /// Default: 1.0.
    pub initial_learning_rate: f64,

    /// Neighborhood radius at the last iteration.
    /// Default: 0.3.
    pub min_sigma: f64,

    /// Learning rate at the last iteration.
    /// Default: 0.01.
    pub min_learning_rate: f64,

    /// Decay schedule for the neighborhood radius.
    /// Default: power.
    pub decay_sigma: Decay,

    /// Decay schedule for the learning rate.
    /// Default: power.
    pub decay_learning_rate: Decay,

    /// Neighborhood kernel.
    /// Default: gaussian.
    pub neighborhood: Neighborhood,

    /// Distance metric used for BMU search and error estimation.
    /// Default: dtw.
    pub distance: Distance,

    /// Record QE/TE snapshots during training.
    /// Default: false.
    pub track_errors: bool,

    /// Snapshots per epoch (in addition to the one taken before each epoch).
    /// Default: 4.
    pub errors_sampling_rate: usize,

    /// Fraction of the data sampled for each snapshot, in [0, 1].
    /// Default: 1.0.
    pub errors_data_fraction: f64,

    /// Status lines logged at info level per epoch (0 = quiet).
    /// Default: 0.
    pub verbose: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            random_order: true,
            initial_sigma: None,
            initial_learning_rate: 1.0,
            min_sigma: 0.3,
            min_learning_rate: 0.01,
            decay_sigma: Decay::Power,
            decay_learning_rate: Decay::Power,
            neighborhood: Neighborhood::Gaussian,
            distance: Distance::Dtw,
            track_errors: false,
            errors_sampling_rate: 4,
            errors_data_fraction: 1.0,
            verbose: 0,
        }
    }
}

impl TrainConfig {
    /// Creates a configuration with the given number of epochs and defaults elsewhere.
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            ..Default::default()
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Returns the initial radius, defaulting to `sqrt(width * height)`.
    pub fn initial_sigma_for(&self, width: usize, height: usize) -> f64 {
        self.initial_sigma
            .unwrap_or_else(|| ((width * height) as f64).sqrt())
    }

    /// Checks every option that can be checked without data.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(HysomError::InvalidParameter(
                "epochs must be a positive integer".to_string(),
            ));
        }
        if self.errors_sampling_rate == 0 {
            return Err(HysomError::InvalidParameter(
                "errors_sampling_rate must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.errors_data_fraction) {
            return Err(HysomError::InvalidParameter(format!(
                "errors_data_fraction must be between 0 and 1, got {}",
                self.errors_data_fraction
            )));
        }

        let rates = [
            ("initial_learning_rate", self.initial_learning_rate),
            ("min_learning_rate", self.min_learning_rate),
        ];
        for (name, value) in rates {
            if !value.is_finite() {
                return Err(HysomError::InvalidParameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        let sigmas = [("initial_sigma", self.initial_sigma), ("min_sigma", Some(self.min_sigma))];
        for (name, value) in sigmas {
            if let Some(sigma) = value {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(HysomError::InvalidParameter(format!(
                        "{} must be positive, got {}",
                        name, sigma
                    )));
                }
            }
        }

        self.neighborhood.ensure_defined()
    }
}
