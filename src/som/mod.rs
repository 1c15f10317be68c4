//! Self-Organizing Map over sequences of points.
//!
//! - **Grid**: lattice geometry (grid.rs)
//! - **Schedules**: learning-rate and radius decay (decay.rs)
//! - **Kernels**: neighborhood weights around the BMU (neighborhood.rs)
//! - **Metrics**: Euclidean and DTW over the prototype grid (distance.rs)
//! - **Quality**: quantization and topographic errors (quality.rs)
//! - **Engine**: prototypes, BMU search and updates (map.rs)
//! - **Training**: the online training loop (training.rs)

pub mod decay;
pub mod distance;
mod grid;
mod map;
pub mod neighborhood;
pub mod quality;
pub mod training;

pub use decay::{Decay, DecayFunction};
pub use distance::{dtw, euclidean, Distance, DistanceMetric};
pub use grid::Grid;
pub use map::{Som, SomState};
pub use neighborhood::{gaussian, Neighborhood, NeighborhoodFunction};
pub use quality::ErrorRecord;
pub use training::{CancelToken, SomTrainer, TrainingProgress, TrainingSummary};
