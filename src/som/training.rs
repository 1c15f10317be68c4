//! SOM training loop.
//!
//! One iteration processes one sample: compute the decayed learning rate and
//! radius, find the BMU, and move every prototype towards the sample. An epoch
//! feeds each sample exactly once, in a fresh random permutation or in order.
//!
//! When error tracking is on, a QE/TE snapshot is taken before every epoch and
//! after every `max(1, n / errors_sampling_rate)` samples within it, on a
//! random subset of `max(1, floor(n * errors_data_fraction))` samples.

use crate::config::TrainConfig;
use crate::error::{HysomError, Result};
use crate::som::quality::ErrorRecord;
use crate::som::{Som, SomState};
use log::{info, log, warn, Level};
use ndarray::{ArrayView3, Axis};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag for cooperative cancellation of a training run.
///
/// The trainer checks it before every sample.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress report emitted after every processed sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingProgress {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Total epochs.
    pub epochs: usize,
    /// Zero-based global iteration of the sample just processed.
    pub iteration: usize,
    /// Total iterations, `n_samples * epochs`.
    pub max_iter: usize,
    /// Learning rate used for this sample.
    pub learning_rate: f64,
    /// Neighborhood radius used for this sample.
    pub sigma: f64,
}

/// Outcome of a completed training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Epochs run.
    pub epochs: usize,
    /// Samples processed.
    pub iterations: usize,
    /// Learning rate used for the last sample.
    pub final_learning_rate: f64,
    /// Radius used for the last sample.
    pub final_sigma: f64,
    /// Mean QE of the last snapshot, if errors were tracked.
    pub last_quantization_error: Option<f64>,
    /// Mean TE of the last snapshot, if errors were tracked.
    pub last_topographic_error: Option<f64>,
}

/// SOM trainer with configurable hyperparameters.
#[derive(Debug, Clone)]
pub struct SomTrainer {
    config: TrainConfig,
    cancel: Option<CancelToken>,
}

impl SomTrainer {
    /// Creates a new trainer with the given configuration.
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Attaches a cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Trains `som` on `data` (shape `(n_samples, seq_len, point_dim)`).
    ///
    /// Prototypes are randomly initialized from `data` if the map has none.
    /// Options are validated before the map is touched.
    pub fn train(&self, som: &mut Som, data: ArrayView3<'_, f64>) -> Result<TrainingSummary> {
        self.train_with_progress(som, data, |_| {})
    }

    /// Like [`SomTrainer::train`], calling `on_progress` after every sample.
    pub fn train_with_progress<F>(
        &self,
        som: &mut Som,
        data: ArrayView3<'_, f64>,
        mut on_progress: F,
    ) -> Result<TrainingSummary>
    where
        F: FnMut(&TrainingProgress),
    {
        let config = &self.config;
        config.validate()?;
        som.check_data(data)?;

        let nsamples = data.len_of(Axis(0));
        if nsamples == 0 {
            return Err(HysomError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let epochs = config.epochs;
        let max_iter = nsamples * epochs;
        let initial_sigma = config.initial_sigma_for(som.width(), som.height());

        // Both schedules must be defined over the whole run.
        for iteration in [0, max_iter / 2, max_iter] {
            self.learning_rate(iteration, max_iter)?;
            self.sigma(initial_sigma, iteration, max_iter)?;
        }

        if som.state() == SomState::Uninitialized {
            som.random_init(data)?;
        }
        som.configure(config.distance.clone(), config.neighborhood.clone());

        let track = config.track_errors;
        let samples_per_error = (nsamples / config.errors_sampling_rate).max(1);
        let subset_size = ((nsamples as f64 * config.errors_data_fraction) as usize).max(1);
        if track && nsamples as f64 * config.errors_data_fraction < 1.0 {
            warn!(
                "errors_data_fraction={} selects no samples; using 1 sample per snapshot",
                config.errors_data_fraction
            );
        }

        let level = if config.verbose > 0 { Level::Info } else { Level::Debug };
        let samples_per_status = (config.verbose > 0).then(|| (nsamples / config.verbose).max(1));

        info!(
            "Starting SOM training: {} samples, {}x{} units, {} epochs, distance={}",
            nsamples,
            som.height(),
            som.width(),
            epochs,
            config.distance
        );

        let mut iteration = 0;
        let mut learning_rate = config.initial_learning_rate;
        let mut sigma = initial_sigma;
        let mut last: Option<ErrorRecord> = None;

        for epoch in 0..epochs {
            let mut order: Vec<usize> = (0..nsamples).collect();
            if config.random_order {
                order.shuffle(som.rng_mut());
            }

            if track {
                last = Some(som.track_errors(iteration, data, subset_size)?);
            }
            log!(
                level,
                "Epoch {}/{} - QE: {} - TE: {}",
                epoch + 1,
                epochs,
                format_error(last.map(|r| r.quantization_error)),
                format_error(last.map(|r| r.topographic_error))
            );

            for (inner, &idx) in order.iter().enumerate() {
                if self.is_cancelled() {
                    warn!("Training cancelled at iteration {}/{}", iteration, max_iter);
                    return Err(HysomError::Cancelled { iteration });
                }

                learning_rate = self.learning_rate(iteration, max_iter)?;
                sigma = self.sigma(initial_sigma, iteration, max_iter)?;
                som.update(data.index_axis(Axis(0), idx), learning_rate, sigma)?;

                if track && (inner + 1) % samples_per_error == 0 {
                    last = Some(som.track_errors(iteration, data, subset_size)?);
                }
                if let Some(every) = samples_per_status {
                    if (inner + 1) % every == 0 {
                        log!(
                            level,
                            "[{}/{}] {:.0}%",
                            inner + 1,
                            nsamples,
                            100.0 * (inner + 1) as f64 / nsamples as f64
                        );
                    }
                }

                on_progress(&TrainingProgress {
                    epoch,
                    epochs,
                    iteration,
                    max_iter,
                    learning_rate,
                    sigma,
                });
                iteration += 1;
            }
        }

        let summary = TrainingSummary {
            epochs,
            iterations: iteration,
            final_learning_rate: learning_rate,
            final_sigma: sigma,
            last_quantization_error: last.map(|r| r.quantization_error),
            last_topographic_error: last.map(|r| r.topographic_error),
        };
        info!(
            "Training completed - QE: {} - TE: {}",
            format_error(summary.last_quantization_error),
            format_error(summary.last_topographic_error)
        );
        Ok(summary)
    }

    /// Learning rate at `iteration` of `max_iter`.
    #[inline]
    pub fn learning_rate(&self, iteration: usize, max_iter: usize) -> Result<f64> {
        let c = &self.config;
        c.decay_learning_rate
            .value(c.initial_learning_rate, iteration, max_iter, c.min_learning_rate)
    }

    /// Neighborhood radius at `iteration` of `max_iter`, starting from `initial_sigma`.
    #[inline]
    pub fn sigma(&self, initial_sigma: f64, iteration: usize, max_iter: usize) -> Result<f64> {
        let c = &self.config;
        let sigma = c.decay_sigma.value(initial_sigma, iteration, max_iter, c.min_sigma)?;
        if sigma <= 0.0 {
            return Err(HysomError::NumericDegeneracy(format!(
                "{} decay gave radius {} at iteration {}/{}",
                c.decay_sigma, sigma, iteration, max_iter
            )));
        }
        Ok(sigma)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}

fn format_error(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SomConfig;
    use crate::som::{Decay, Distance};
    use ndarray::Array3;

    fn test_som() -> Som {
        Som::new(&SomConfig {
            width: 3,
            height: 2,
            input_dim: (5, 2),
            seed: Some(42),
            num_threads: 0,
        })
        .unwrap()
    }

    fn test_data(n: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, 5, 2), |(s, t, d)| {
            let phase = s as f64 * 0.7 + t as f64 * 0.4;
            if d == 0 {
                phase.cos() * (1.0 + s as f64 * 0.1)
            } else {
                phase.sin()
            }
        })
    }

    fn euclidean_config(epochs: usize) -> TrainConfig {
        TrainConfig {
            distance: Distance::Euclidean,
            ..TrainConfig::new(epochs)
        }
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(!token.is_cancelled());
        shared.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_train_simple() {
        let mut som = test_som();
        let data = test_data(8);
        let summary = SomTrainer::new(euclidean_config(3))
            .train(&mut som, data.view())
            .unwrap();

        assert_eq!(summary.epochs, 3);
        assert_eq!(summary.iterations, 24);
        assert!(summary.final_learning_rate < 1.0);
        assert!(summary.last_quantization_error.is_none());
        assert_eq!(som.state(), SomState::Initialized);
        assert!(som.prototypes().unwrap().iter().all(|v| v.is_finite()));
        assert!(som.qe_history().is_empty());
    }

    #[test]
    fn test_schedule_matches_decay() {
        let trainer = SomTrainer::new(TrainConfig::new(2));
        assert_eq!(trainer.learning_rate(0, 10).unwrap(), 1.0);
        assert!((trainer.learning_rate(10, 10).unwrap() - 0.01).abs() < 1e-12);
        assert!((trainer.sigma(2.0, 10, 10).unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_progress_reports_every_sample() {
        let mut som = test_som();
        let data = test_data(7);
        let mut reports = Vec::new();
        SomTrainer::new(euclidean_config(2))
            .train_with_progress(&mut som, data.view(), |p| reports.push(*p))
            .unwrap();

        assert_eq!(reports.len(), 14);
        for (k, report) in reports.iter().enumerate() {
            assert_eq!(report.iteration, k);
            assert_eq!(report.max_iter, 14);
            assert_eq!(report.epoch, k / 7);
        }
        assert_eq!(reports[0].learning_rate, 1.0);
        assert!((reports[0].sigma - 6.0f64.sqrt()).abs() < 1e-12);
        assert!(reports.windows(2).all(|w| w[1].learning_rate < w[0].learning_rate));
    }

    #[test]
    fn test_error_history_schedule() {
        let mut som = test_som();
        let data = test_data(8);
        let config = TrainConfig {
            track_errors: true,
            errors_sampling_rate: 4,
            ..euclidean_config(2)
        };
        let summary = SomTrainer::new(config).train(&mut som, data.view()).unwrap();

        let stamps: Vec<usize> = som.qe_history().iter().map(|&(t, _)| t).collect();
        assert_eq!(stamps, vec![0, 1, 3, 5, 7, 8, 9, 11, 13, 15]);
        assert_eq!(som.te_history().len(), som.qe_history().len());
        assert_eq!(summary.last_quantization_error, Some(som.qe_history()[9].1));
        assert!(som.te_history().iter().all(|&(_, te)| (0.0..=1.0).contains(&te)));
    }

    #[test]
    fn test_tracking_does_not_change_training() {
        let data = test_data(9);

        let mut plain = test_som();
        SomTrainer::new(euclidean_config(2)).train(&mut plain, data.view()).unwrap();

        let mut tracked = test_som();
        let config = TrainConfig {
            track_errors: true,
            errors_data_fraction: 0.5,
            ..euclidean_config(2)
        };
        SomTrainer::new(config).train(&mut tracked, data.view()).unwrap();

        assert_eq!(plain.prototypes(), tracked.prototypes());
    }

    #[test]
    fn test_invalid_options_leave_map_untouched() {
        let mut som = test_som();
        let data = test_data(8);

        let err = SomTrainer::new(TrainConfig::new(0)).train(&mut som, data.view()).unwrap_err();
        assert!(matches!(err, HysomError::InvalidParameter(_)));
        assert_eq!(som.state(), SomState::Uninitialized);

        let config = TrainConfig {
            initial_learning_rate: 0.0,
            decay_learning_rate: Decay::Power,
            ..euclidean_config(1)
        };
        let err = SomTrainer::new(config).train(&mut som, data.view()).unwrap_err();
        assert!(matches!(err, HysomError::NumericDegeneracy(_)));
        assert_eq!(som.state(), SomState::Uninitialized);
    }

    #[test]
    fn test_sign_changing_schedule_rejected_before_init() {
        let mut som = test_som();
        let data = test_data(12);
        let config = TrainConfig {
            min_learning_rate: -0.01,
            ..euclidean_config(1)
        };
        let err = SomTrainer::new(config).train(&mut som, data.view()).unwrap_err();
        assert!(matches!(err, HysomError::NumericDegeneracy(_)));
        assert_eq!(som.state(), SomState::Uninitialized);
    }

    #[test]
    fn test_vanishing_radius_rejected_before_init() {
        let mut som = test_som();
        let data = test_data(12);

        let config = TrainConfig {
            min_sigma: 0.0,
            ..euclidean_config(1)
        };
        let err = SomTrainer::new(config).train(&mut som, data.view()).unwrap_err();
        assert!(matches!(err, HysomError::InvalidParameter(_)));
        assert_eq!(som.state(), SomState::Uninitialized);

        // custom schedule that reaches zero halfway through
        let config = TrainConfig {
            decay_sigma: Decay::custom(|init: f64, t: usize, max: usize, _: f64| {
                init * (1.0 - 2.0 * t as f64 / max as f64)
            }),
            ..euclidean_config(1)
        };
        let err = SomTrainer::new(config).train(&mut som, data.view()).unwrap_err();
        assert!(matches!(err, HysomError::NumericDegeneracy(_)));
        assert_eq!(som.state(), SomState::Uninitialized);
    }

    #[test]
    fn test_empty_and_misshaped_data() {
        let mut som = test_som();
        let trainer = SomTrainer::new(euclidean_config(1));

        let empty = Array3::<f64>::zeros((0, 5, 2));
        assert!(matches!(
            trainer.train(&mut som, empty.view()),
            Err(HysomError::InsufficientData { .. })
        ));

        let misshaped = Array3::<f64>::zeros((8, 4, 2));
        assert!(matches!(
            trainer.train(&mut som, misshaped.view()),
            Err(HysomError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_cancellation_keeps_progress() {
        let mut som = test_som();
        let data = test_data(8);
        let token = CancelToken::new();
        let trainer = SomTrainer::new(euclidean_config(2)).with_cancel_token(token.clone());

        let err = trainer
            .train_with_progress(&mut som, data.view(), |p| {
                if p.iteration == 2 {
                    token.cancel();
                }
            })
            .unwrap_err();

        assert!(matches!(err, HysomError::Cancelled { iteration: 3 }));
        assert_eq!(som.state(), SomState::Initialized);
    }

    #[test]
    fn test_sequential_order_is_deterministic() {
        let data = test_data(8);
        let config = TrainConfig {
            random_order: false,
            ..euclidean_config(2)
        };

        let mut a = test_som();
        let mut b = test_som();
        SomTrainer::new(config.clone()).train(&mut a, data.view()).unwrap();
        SomTrainer::new(config).train(&mut b, data.view()).unwrap();
        assert_eq!(a.prototypes(), b.prototypes());
    }
}
