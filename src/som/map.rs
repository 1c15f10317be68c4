//! Self-Organizing Map (SOM) over sequences.

use crate::config::{SomConfig, TrainConfig};
use crate::error::{HysomError, Result};
use crate::som::quality::{self, ErrorRecord};
use crate::som::training::{SomTrainer, TrainingSummary};
use crate::som::{Distance, Grid, Neighborhood};
use crate::storage::{MapFormat, MapSnapshot};
use log::debug;
use ndarray::{s, Array2, Array4, ArrayView2, ArrayView3, ArrayView4, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::Path;
use std::sync::Arc;

/// Lifecycle state of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SomState {
    /// No prototypes yet.
    Uninitialized,
    /// Prototypes are set; the map can be queried or (re)trained.
    Initialized,
}

/// A Self-Organizing Map whose units hold prototype sequences.
///
/// The map is a fixed `height x width` lattice. Every unit stores a prototype
/// of shape `input_dim = (seq_len, point_dim)`, so the prototype set is a dense
/// array of shape `(height, width, seq_len, point_dim)`. The lattice never
/// changes after construction; only prototype values do, and only through
/// [`Som::update`] (called once per sample by the trainer).
#[derive(Debug, Clone)]
pub struct Som {
    grid: Grid,
    input_dim: (usize, usize),
    prototypes: Option<Array4<f64>>,
    distance: Distance,
    neighborhood: Neighborhood,
    /// Stream for initialization and epoch shuffles.
    rng: ChaCha8Rng,
    /// Separate stream for error-subset draws, so tracking never perturbs training.
    error_rng: ChaCha8Rng,
    qe_history: Vec<(usize, f64)>,
    te_history: Vec<(usize, f64)>,
    pool: Option<Arc<ThreadPool>>,
}

fn rng_streams(seed: Option<u64>) -> (ChaCha8Rng, ChaCha8Rng) {
    let rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut error_rng = rng.clone();
    error_rng.set_stream(1);
    (rng, error_rng)
}

impl Som {
    /// Creates an uninitialized map.
    pub fn new(config: &SomConfig) -> Result<Self> {
        config.validate()?;
        let (rng, error_rng) = rng_streams(config.seed);

        let pool = if config.num_threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .build()
                .map_err(|e| HysomError::InvalidParameter(format!("thread pool: {}", e)))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self {
            grid: Grid::new(config.height, config.width),
            input_dim: config.input_dim,
            prototypes: None,
            distance: Distance::default(),
            neighborhood: Neighborhood::default(),
            rng,
            error_rng,
            qe_history: Vec::new(),
            te_history: Vec::new(),
            pool,
        })
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SomState {
        if self.prototypes.is_some() {
            SomState::Initialized
        } else {
            SomState::Uninitialized
        }
    }

    /// Returns the lattice.
    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Shape of one sample, `(seq_len, point_dim)`.
    #[inline]
    pub fn input_dim(&self) -> (usize, usize) {
        self.input_dim
    }

    /// Expected prototype array shape, `(height, width) + input_dim`.
    pub fn prototype_shape(&self) -> [usize; 4] {
        [self.grid.height, self.grid.width, self.input_dim.0, self.input_dim.1]
    }

    /// Returns the current prototypes, if any.
    pub fn prototypes(&self) -> Option<&Array4<f64>> {
        self.prototypes.as_ref()
    }

    /// Returns the metric used for BMU search and error queries.
    pub fn distance(&self) -> &Distance {
        &self.distance
    }

    /// Sets the metric used by queries. Training replaces it with its own choice.
    pub fn set_distance(&mut self, distance: Distance) {
        self.distance = distance;
    }

    /// Returns the kernel used by [`Som::update`].
    pub fn neighborhood(&self) -> &Neighborhood {
        &self.neighborhood
    }

    /// Sets the kernel used by [`Som::update`]. Training replaces it with its own choice.
    pub fn set_neighborhood(&mut self, neighborhood: Neighborhood) -> Result<()> {
        neighborhood.ensure_defined()?;
        self.neighborhood = neighborhood;
        Ok(())
    }

    /// History of `(iteration, quantization error)` snapshots.
    pub fn qe_history(&self) -> &[(usize, f64)] {
        &self.qe_history
    }

    /// History of `(iteration, topographic error)` snapshots.
    pub fn te_history(&self) -> &[(usize, f64)] {
        &self.te_history
    }

    /// Initializes the prototypes with `height * width` samples drawn
    /// without replacement from `data`.
    pub fn random_init(&mut self, data: ArrayView3<'_, f64>) -> Result<()> {
        self.check_data(data)?;

        let available = data.len_of(Axis(0));
        let required = self.grid.len();
        if available < required {
            return Err(HysomError::InsufficientData { required, available });
        }

        let picks = rand::seq::index::sample(&mut self.rng, available, required);
        let grid = self.grid;
        let prototypes = Array4::from_shape_fn(self.prototype_shape(), |(i, j, t, d)| {
            data[[picks.index(grid.index(i, j)), t, d]]
        });

        debug!(
            "Initialized {}x{} prototypes from {} samples",
            grid.height, grid.width, available
        );
        self.prototypes = Some(prototypes);
        Ok(())
    }

    /// Sets explicit initial prototypes of shape `(height, width) + input_dim`.
    pub fn set_prototypes(&mut self, prototypes: Array4<f64>) -> Result<()> {
        let expected = self.prototype_shape();
        if prototypes.shape() != expected {
            return Err(HysomError::shape(&expected, prototypes.shape()));
        }
        self.prototypes = Some(prototypes);
        Ok(())
    }

    /// Computes the `(height, width)` distance matrix of `sample` against every prototype.
    pub fn distance_map(&self, sample: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_sample(sample)?;
        let prototypes = self.prototypes_view()?;
        self.install(|| self.distance.matrix(prototypes, sample))
    }

    /// Returns the grid coordinates of the best-matching unit for `sample`.
    ///
    /// Ties go to the first minimum in row-major order.
    pub fn bmu(&self, sample: ArrayView2<'_, f64>) -> Result<(usize, usize)> {
        let distances = self.distance_map(sample)?;
        let (index, _) = quality::argmin(&distances);
        Ok(self.grid.coords(index))
    }

    /// Moves every prototype towards `sample`:
    /// `p += learning_rate * h(unit) * (sample - p)`, where `h` is the
    /// neighborhood weight of the unit around the BMU.
    ///
    /// Returns the BMU.
    pub fn update(
        &mut self,
        sample: ArrayView2<'_, f64>,
        learning_rate: f64,
        sigma: f64,
    ) -> Result<(usize, usize)> {
        let bmu = self.bmu(sample)?;
        let weights = self.neighborhood.weights(&self.grid, bmu, sigma)?;
        let prototypes = self.prototypes.as_mut().ok_or(HysomError::NotInitialized)?;

        for ((i, j), &h) in weights.indexed_iter() {
            let influence = learning_rate * h;
            prototypes
                .slice_mut(s![i, j, .., ..])
                .zip_mut_with(&sample, |p, &x| *p += influence * (x - *p));
        }

        Ok(bmu)
    }

    /// Trains the map, see [`SomTrainer::train`].
    pub fn train(&mut self, data: ArrayView3<'_, f64>, config: &TrainConfig) -> Result<TrainingSummary> {
        SomTrainer::new(config.clone()).train(self, data)
    }

    /// Quantization error of every sample in `data` against the current prototypes.
    pub fn quantization_error(&self, data: ArrayView3<'_, f64>) -> Result<Vec<f64>> {
        self.check_data(data)?;
        let prototypes = self.prototypes_view()?;
        self.install(|| quality::quantization_errors(&self.distance, prototypes, data))
    }

    /// Topographic error (0 or 1) of every sample in `data` against the current prototypes.
    pub fn topographic_error(&self, data: ArrayView3<'_, f64>) -> Result<Vec<u8>> {
        self.check_data(data)?;
        let prototypes = self.prototypes_view()?;
        self.install(|| quality::topographic_errors(&self.distance, prototypes, data))
    }

    /// Best-matching unit of every sample in `data`.
    pub fn bmus(&self, data: ArrayView3<'_, f64>) -> Result<Vec<(usize, usize)>> {
        self.check_data(data)?;
        data.axis_iter(Axis(0)).map(|sample| self.bmu(sample)).collect()
    }

    /// Number of samples in `data` that select each unit as their BMU.
    pub fn activation_frequencies(&self, data: ArrayView3<'_, f64>) -> Result<Array2<usize>> {
        let mut counts = Array2::zeros(self.grid.shape());
        for bmu in self.bmus(data)? {
            counts[bmu] += 1;
        }
        Ok(counts)
    }

    /// Draws `subset_size` samples without replacement from `data`, records
    /// their mean QE/TE at `iteration`, and returns the snapshot.
    pub(crate) fn track_errors(
        &mut self,
        iteration: usize,
        data: ArrayView3<'_, f64>,
        subset_size: usize,
    ) -> Result<ErrorRecord> {
        let prototypes = self.prototypes.as_ref().ok_or(HysomError::NotInitialized)?.view();
        let n = data.len_of(Axis(0));
        let subset = rand::seq::index::sample(&mut self.error_rng, n, subset_size.min(n));

        let distance = &self.distance;
        let samples = subset.iter().map(|i| data.index_axis(Axis(0), i));
        let (qe, te) = match &self.pool {
            Some(pool) => pool.install(|| quality::mean_errors(distance, prototypes, samples)),
            None => quality::mean_errors(distance, prototypes, samples),
        }?;

        let record = ErrorRecord {
            iteration,
            quantization_error: qe,
            topographic_error: te,
        };
        self.qe_history.push((iteration, qe));
        self.te_history.push((iteration, te));
        debug!("Iteration {}: QE={:.4}, TE={:.4}", iteration, qe, te);
        Ok(record)
    }

    pub(crate) fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub(crate) fn configure(&mut self, distance: Distance, neighborhood: Neighborhood) {
        self.distance = distance;
        self.neighborhood = neighborhood;
    }

    /// Checks that `data` has shape `(n, seq_len, point_dim)`.
    pub fn check_data(&self, data: ArrayView3<'_, f64>) -> Result<()> {
        let (len, dim) = self.input_dim;
        if data.shape()[1..] != [len, dim] {
            return Err(HysomError::shape(
                &[data.shape()[0], len, dim],
                data.shape(),
            ));
        }
        Ok(())
    }

    /// Checks that `sample` has shape `input_dim`.
    pub fn check_sample(&self, sample: ArrayView2<'_, f64>) -> Result<()> {
        if sample.dim() != self.input_dim {
            return Err(HysomError::shape(
                &[self.input_dim.0, self.input_dim.1],
                sample.shape(),
            ));
        }
        Ok(())
    }

    fn prototypes_view(&self) -> Result<ArrayView4<'_, f64>> {
        self.prototypes
            .as_ref()
            .map(|p| p.view())
            .ok_or(HysomError::NotInitialized)
    }

    fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Saves the map (prototypes, histories, built-in metric) to a binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let prototypes = self.prototypes.clone().ok_or(HysomError::NotInitialized)?;
        let snapshot = MapSnapshot {
            height: self.grid.height,
            width: self.grid.width,
            input_dim: self.input_dim,
            prototypes,
            qe_history: self.qe_history.clone(),
            te_history: self.te_history.clone(),
            distance: self.distance.is_builtin().then(|| self.distance.clone()),
        };
        MapFormat::write(path, &snapshot)
    }

    /// Loads a map saved with [`Som::save`]. `seed` drives any further training.
    pub fn load<P: AsRef<Path>>(path: P, seed: Option<u64>) -> Result<Self> {
        let snapshot = MapFormat::read(path)?;
        let config = SomConfig {
            width: snapshot.width,
            height: snapshot.height,
            input_dim: snapshot.input_dim,
            seed,
            num_threads: 0,
        };

        let mut som = Self::new(&config)?;
        som.set_prototypes(snapshot.prototypes)?;
        som.qe_history = snapshot.qe_history;
        som.te_history = snapshot.te_history;
        if let Some(distance) = snapshot.distance {
            som.distance = distance;
        }
        Ok(som)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn test_config() -> SomConfig {
        SomConfig {
            width: 3,
            height: 2,
            input_dim: (4, 2),
            seed: Some(42),
            num_threads: 0,
        }
    }

    fn test_data(n: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, 4, 2), |(s, t, d)| s as f64 + 0.1 * t as f64 - 0.05 * d as f64)
    }

    #[test]
    fn test_som_creation() {
        let som = Som::new(&test_config()).unwrap();
        assert_eq!(som.width(), 3);
        assert_eq!(som.height(), 2);
        assert_eq!(som.prototype_shape(), [2, 3, 4, 2]);
        assert_eq!(som.state(), SomState::Uninitialized);
        assert!(som.prototypes().is_none());
        assert!(som.qe_history().is_empty());
    }

    #[test]
    fn test_queries_require_prototypes() {
        let som = Som::new(&test_config()).unwrap();
        let data = test_data(6);
        assert!(matches!(
            som.quantization_error(data.view()),
            Err(HysomError::NotInitialized)
        ));
    }

    #[test]
    fn test_random_init_draws_distinct_samples() {
        let mut som = Som::new(&test_config()).unwrap();
        let data = test_data(10);
        som.random_init(data.view()).unwrap();
        assert_eq!(som.state(), SomState::Initialized);

        let prototypes = som.prototypes().unwrap();
        assert_eq!(prototypes.shape(), &[2, 3, 4, 2]);

        // Sample s is identified by its first coordinate.
        let mut picked = Vec::new();
        for (i, j) in som.grid().iter() {
            let source = prototypes[[i, j, 0, 0]] as usize;
            assert_eq!(prototypes.slice(s![i, j, .., ..]), data.index_axis(Axis(0), source));
            picked.push(source);
        }
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 6);
    }

    #[test]
    fn test_random_init_is_reproducible() {
        let data = test_data(10);
        let mut a = Som::new(&test_config()).unwrap();
        let mut b = Som::new(&test_config()).unwrap();
        a.random_init(data.view()).unwrap();
        b.random_init(data.view()).unwrap();
        assert_eq!(a.prototypes(), b.prototypes());
    }

    #[test]
    fn test_random_init_insufficient_data() {
        let mut som = Som::new(&test_config()).unwrap();
        let data = test_data(5);
        let err = som.random_init(data.view()).unwrap_err();
        assert!(matches!(
            err,
            HysomError::InsufficientData { required: 6, available: 5 }
        ));
        assert_eq!(som.state(), SomState::Uninitialized);
    }

    #[test]
    fn test_set_prototypes_shape_mismatch() {
        let mut som = Som::new(&test_config()).unwrap();
        let err = som.set_prototypes(Array4::zeros((3, 2, 4, 2))).unwrap_err();
        assert!(matches!(err, HysomError::ShapeMismatch { .. }));
        assert_eq!(som.state(), SomState::Uninitialized);

        som.set_prototypes(Array4::zeros((2, 3, 4, 2))).unwrap();
        assert_eq!(som.state(), SomState::Initialized);
    }

    #[test]
    fn test_sample_shape_checked() {
        let mut som = Som::new(&test_config()).unwrap();
        som.set_prototypes(Array4::zeros((2, 3, 4, 2))).unwrap();
        let wrong = Array2::<f64>::zeros((5, 2));
        assert!(matches!(
            som.bmu(wrong.view()),
            Err(HysomError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_bmu_indexes_minimum() {
        let mut som = Som::new(&test_config()).unwrap();
        som.set_distance(Distance::Euclidean);
        let data = test_data(10);
        som.random_init(data.view()).unwrap();

        for sample in data.axis_iter(Axis(0)) {
            let distances = som.distance_map(sample).unwrap();
            let bmu = som.bmu(sample).unwrap();
            let min = distances.iter().cloned().fold(f64::INFINITY, f64::min);
            assert_eq!(distances[bmu], min);
        }
    }

    #[test]
    fn test_update_moves_towards_sample() {
        let mut som = Som::new(&test_config()).unwrap();
        som.set_distance(Distance::Euclidean);
        som.set_prototypes(Array4::zeros((2, 3, 4, 2))).unwrap();
        let sample = Array2::<f64>::ones((4, 2));

        let bmu = som.update(sample.view(), 0.5, 1.0).unwrap();
        assert_eq!(bmu, (0, 0));

        let prototypes = som.prototypes().unwrap();
        // BMU gets the full learning rate.
        assert!(prototypes.slice(s![0, 0, .., ..]).iter().all(|&p| (p - 0.5).abs() < 1e-12));
        // Neighbour (0, 1) gets exp(-1/2) of it, broadcast over the sequence.
        let expected = 0.5 * (-0.5f64).exp();
        assert!(prototypes.slice(s![0, 1, .., ..]).iter().all(|&p| (p - expected).abs() < 1e-12));
        // Farther units move less.
        assert!(prototypes[[1, 2, 0, 0]] < prototypes[[0, 1, 0, 0]]);
    }

    #[test]
    fn test_update_with_zero_radius_fails_without_change() {
        let mut som = Som::new(&test_config()).unwrap();
        som.set_distance(Distance::Euclidean);
        som.set_prototypes(Array4::zeros((2, 3, 4, 2))).unwrap();
        let sample = Array2::<f64>::ones((4, 2));

        assert!(matches!(
            som.update(sample.view(), 0.5, 0.0),
            Err(HysomError::NumericDegeneracy(_))
        ));
        assert!(som.prototypes().unwrap().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_errors_are_idempotent() {
        let mut som = Som::new(&test_config()).unwrap();
        let data = test_data(8);
        som.random_init(data.view()).unwrap();

        let qe1 = som.quantization_error(data.view()).unwrap();
        let qe2 = som.quantization_error(data.view()).unwrap();
        let te1 = som.topographic_error(data.view()).unwrap();
        let te2 = som.topographic_error(data.view()).unwrap();
        assert_eq!(qe1, qe2);
        assert_eq!(te1, te2);
        assert_eq!(qe1.len(), 8);
    }

    #[test]
    fn test_activation_frequencies_sum_to_samples() {
        let mut som = Som::new(&test_config()).unwrap();
        let data = test_data(9);
        som.random_init(data.view()).unwrap();
        let counts = som.activation_frequencies(data.view()).unwrap();
        assert_eq!(counts.dim(), (2, 3));
        assert_eq!(counts.sum(), 9);
    }

    #[test]
    fn test_dedicated_thread_pool() {
        let config = SomConfig {
            num_threads: 2,
            ..test_config()
        };
        let mut som = Som::new(&config).unwrap();
        let data = test_data(6);
        som.random_init(data.view()).unwrap();
        let qe = som.quantization_error(data.view()).unwrap();
        assert!(qe.iter().any(|&q| q == 0.0));
    }
}
