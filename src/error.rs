//! Error types for the HySOM engine.

use thiserror::Error;

/// The main error type for HySOM operations.
#[derive(Error, Debug)]
pub enum HysomError {
    /// Malformed configuration: non-positive epochs, out-of-range fractions,
    /// unknown function names, or a function with no defined behavior.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A prototype set or sample whose shape disagrees with the map.
    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// The shape the map was declared with.
        expected: Vec<usize>,
        /// The shape that was supplied.
        found: Vec<usize>,
    },

    /// Not enough samples to draw the initial prototypes.
    #[error("Insufficient data: {required} samples required, {available} available")]
    InsufficientData {
        /// Number of samples needed.
        required: usize,
        /// Number of samples supplied.
        available: usize,
    },

    /// A schedule or metric produced a division by zero or a non-finite value.
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// The map has no prototypes yet.
    #[error("SOM has no prototypes; call random_init, set_prototypes or train first")]
    NotInitialized,

    /// Training was cancelled through a [`CancelToken`](crate::som::CancelToken).
    #[error("Training cancelled at iteration {iteration}")]
    Cancelled {
        /// Number of samples processed before cancellation.
        iteration: usize,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid persisted map file.
    #[error("Invalid map format: {0}")]
    InvalidMapFormat(String),
}

/// Result type alias for HySOM operations.
pub type Result<T> = std::result::Result<T, HysomError>;

impl From<bincode::Error> for HysomError {
    fn from(err: bincode::Error) -> Self {
        HysomError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for HysomError {
    fn from(err: serde_json::Error) -> Self {
        HysomError::Serialization(err.to_string())
    }
}

impl HysomError {
    pub(crate) fn shape(expected: &[usize], found: &[usize]) -> Self {
        HysomError::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
