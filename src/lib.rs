//! # HySOM - Self-Organizing Maps for Loops
//!
//! HySOM trains Self-Organizing Maps (SOMs) whose inputs are 2-D trajectories,
//! such as concentration-discharge hysteresis loops, rather than flat feature
//! vectors.
//!
//! ## Overview
//!
//! A map is a fixed `height x width` grid of units. Each unit holds a
//! prototype loop with the same shape as the samples, `(seq_len, point_dim)`.
//! Training feeds samples one at a time: the unit closest to the sample (the
//! best-matching unit, BMU) and its grid neighbours are pulled towards it, with
//! a learning rate and neighbourhood radius that shrink over time. After
//! training, similar loops land on nearby units.
//!
//! ## Key Features
//!
//! - **Dynamic Time Warping** distance between loops, evaluated over the grid in parallel
//! - **Power and linear** decay schedules, plus user-supplied ones
//! - **Gaussian** neighbourhood kernel, plus user-supplied ones
//! - **Quantization and topographic errors**, optionally tracked during training
//! - **Reproducible** training from a seed
//! - **Efficient binary format** for persistence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hysom::{LoopDataset, Som, SomConfig, TrainConfig};
//!
//! let dataset = LoopDataset::from_json_file("classified_loops.json")?;
//!
//! let mut som = Som::new(&SomConfig {
//!     width: 8,
//!     height: 8,
//!     input_dim: dataset.input_dim(),
//!     seed: Some(42),
//!     ..Default::default()
//! })?;
//!
//! let config = TrainConfig {
//!     track_errors: true,
//!     ..TrainConfig::new(5)
//! };
//! let summary = som.train(dataset.samples(), &config)?;
//!
//! let bmus = som.bmus(dataset.samples())?;
//! som.save("loops.hsom")?;
//! ```
//!
//! ## Architecture
//!
//! - [`som`] - Grid, schedules, kernels, metrics, the map and its trainer
//! - [`config`] - Map and training configuration
//! - [`dataset`] - JSON loop datasets
//! - [`storage`] - Binary format and persistence

#![warn(missing_docs)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod som;
pub mod storage;

// Re-export commonly used types
pub use config::{SomConfig, TrainConfig};
pub use dataset::LoopDataset;
pub use error::{HysomError, Result};
pub use som::{
    CancelToken, Decay, Distance, ErrorRecord, Grid, Neighborhood, Som, SomState, SomTrainer,
    TrainingProgress, TrainingSummary,
};
pub use storage::{MapFormat, MapSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default grid width and height.
pub const DEFAULT_GRID_SIDE: usize = 8;

/// Default number of points per loop.
pub const DEFAULT_SEQ_LEN: usize = 50;

/// Default point dimension, (x, y).
pub const DEFAULT_POINT_DIM: usize = 2;
