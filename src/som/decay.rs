//! Decay schedules for the learning rate and the neighborhood radius.
//!
//! A schedule maps `(initial value, iteration, max iterations, final value)`
//! to the value in effect at that iteration. Built-in schedules are selected
//! by name through [`Decay`]; any type implementing [`DecayFunction`] (closures
//! included) can be plugged in with [`Decay::custom`].

use crate::error::{HysomError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A decay schedule.
///
/// Implementations must be pure: the same arguments always give the same value.
pub trait DecayFunction: Send + Sync {
    /// Returns the value at `iteration` for a schedule running from `init`
    /// (iteration 0) to `final_value` (iteration `max_iter`).
    fn decay(&self, init: f64, iteration: usize, max_iter: usize, final_value: f64) -> f64;
}

impl<F> DecayFunction for F
where
    F: Fn(f64, usize, usize, f64) -> f64 + Send + Sync,
{
    fn decay(&self, init: f64, iteration: usize, max_iter: usize, final_value: f64) -> f64 {
        self(init, iteration, max_iter, final_value)
    }
}

/// Linear decay: `init - ((init - final) / max_iter) * iteration`.
pub fn decay_linear(init: f64, iteration: usize, max_iter: usize, final_value: f64) -> Result<f64> {
    if max_iter == 0 {
        return Err(HysomError::NumericDegeneracy(
            "linear decay with max_iter = 0".to_string(),
        ));
    }
    if iteration == max_iter {
        return Ok(final_value);
    }

    let slope = (init - final_value) / max_iter as f64;
    Ok(init - slope * iteration as f64)
}

/// Power (geometric) decay: `init * (final / init)^(iteration / max_iter)`.
///
/// Fails with [`HysomError::NumericDegeneracy`] when `init` is zero or when
/// `init` and `final_value` have opposite signs.
pub fn decay_power(init: f64, iteration: usize, max_iter: usize, final_value: f64) -> Result<f64> {
    if max_iter == 0 {
        return Err(HysomError::NumericDegeneracy(
            "power decay with max_iter = 0".to_string(),
        ));
    }
    if init == 0.0 {
        return Err(HysomError::NumericDegeneracy(
            "power decay requires a non-zero initial value".to_string(),
        ));
    }
    let ratio = final_value / init;
    if ratio < 0.0 {
        return Err(HysomError::NumericDegeneracy(format!(
            "power decay from {} to {} crosses zero",
            init, final_value
        )));
    }
    if iteration == max_iter {
        return Ok(final_value);
    }

    Ok(init * ratio.powf(iteration as f64 / max_iter as f64))
}

/// Decay schedule selection.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decay {
    /// Geometric decay, see [`decay_power`].
    #[default]
    Power,
    /// Linear decay, see [`decay_linear`].
    Linear,
    /// User-supplied schedule.
    #[serde(skip)]
    Custom(Arc<dyn DecayFunction>),
}

impl Decay {
    /// Names accepted by [`FromStr`].
    pub const NAMES: [&'static str; 2] = ["power", "linear"];

    /// Wraps a custom schedule.
    pub fn custom<F: DecayFunction + 'static>(f: F) -> Self {
        Decay::Custom(Arc::new(f))
    }

    /// Returns the registry name, or `"custom"`.
    pub fn name(&self) -> &'static str {
        match self {
            Decay::Power => "power",
            Decay::Linear => "linear",
            Decay::Custom(_) => "custom",
        }
    }

    /// Evaluates the schedule, rejecting non-finite results.
    pub fn value(&self, init: f64, iteration: usize, max_iter: usize, final_value: f64) -> Result<f64> {
        let value = match self {
            Decay::Power => decay_power(init, iteration, max_iter, final_value)?,
            Decay::Linear => decay_linear(init, iteration, max_iter, final_value)?,
            Decay::Custom(f) => f.decay(init, iteration, max_iter, final_value),
        };

        if !value.is_finite() {
            return Err(HysomError::NumericDegeneracy(format!(
                "{} decay produced {} at iteration {}/{} (init={}, final={})",
                self.name(),
                value,
                iteration,
                max_iter,
                init,
                final_value
            )));
        }
        Ok(value)
    }
}

impl FromStr for Decay {
    type Err = HysomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "power" => Ok(Decay::Power),
            "linear" => Ok(Decay::Linear),
            other => Err(HysomError::InvalidParameter(format!(
                "unknown decay function '{}'; expected one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Debug for Decay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decay::Custom(_) => f.write_str("Custom(..)"),
            named => f.write_str(named.name()),
        }
    }
}

impl fmt::Display for Decay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        for decay in [Decay::Power, Decay::Linear] {
            for &(init, fin) in &[(1.0, 0.01), (5.0, 0.3), (3.0, 0.7)] {
                assert_eq!(decay.value(init, 0, 1000, fin).unwrap(), init);
                assert_eq!(decay.value(init, 1000, 1000, fin).unwrap(), fin);
            }
        }
    }

    #[test]
    fn test_power_boundary_exact() {
        assert_eq!(decay_power(1.0, 500, 500, 0.01).unwrap(), 0.01);
    }

    #[test]
    fn test_monotone() {
        for decay in [Decay::Power, Decay::Linear] {
            let values: Vec<f64> = (0..=100)
                .map(|t| decay.value(3.0, t, 100, 0.3).unwrap())
                .collect();
            assert!(values.windows(2).all(|w| w[1] <= w[0]), "{} not monotone", decay);
        }
    }

    #[test]
    fn test_linear_midpoint() {
        let v = decay_linear(1.0, 50, 100, 0.0).unwrap();
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_power_midpoint_is_geometric_mean() {
        let v = decay_power(1.0, 50, 100, 0.01).unwrap();
        assert!((v - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_power_sign_change_fails_at_every_iteration() {
        for iteration in [0, 1, 10] {
            assert!(matches!(
                decay_power(1.0, iteration, 10, -0.01),
                Err(HysomError::NumericDegeneracy(_))
            ));
        }
        assert!(decay_linear(1.0, 5, 10, -0.01).is_ok());
    }

    #[test]
    fn test_power_zero_init_fails() {
        let err = Decay::Power.value(0.0, 3, 10, 0.01).unwrap_err();
        assert!(matches!(err, HysomError::NumericDegeneracy(_)));
    }

    #[test]
    fn test_zero_max_iter_fails() {
        assert!(matches!(
            decay_linear(1.0, 0, 0, 0.1),
            Err(HysomError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn test_custom_non_finite_rejected() {
        let decay = Decay::custom(|_: f64, _: usize, _: usize, _: f64| f64::NAN);
        assert!(matches!(
            decay.value(1.0, 0, 10, 0.1),
            Err(HysomError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn test_custom_closure() {
        let step = Decay::custom(|init: f64, iter: usize, max_iter: usize, fin: f64| {
            if iter < max_iter / 2 { init } else { fin }
        });
        assert_eq!(step.value(2.0, 1, 10, 0.5).unwrap(), 2.0);
        assert_eq!(step.value(2.0, 7, 10, 0.5).unwrap(), 0.5);
        assert_eq!(step.name(), "custom");
    }

    #[test]
    fn test_from_str() {
        assert!(matches!("power".parse::<Decay>(), Ok(Decay::Power)));
        assert!(matches!("linear".parse::<Decay>(), Ok(Decay::Linear)));
        assert!(matches!(
            "piecewise".parse::<Decay>(),
            Err(HysomError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Decay::Linear).unwrap();
        assert_eq!(json, "\"linear\"");
        let back: Decay = serde_json::from_str("\"power\"").unwrap();
        assert!(matches!(back, Decay::Power));
        assert!(serde_json::to_string(&Decay::custom(|a: f64, _: usize, _: usize, _: f64| a)).is_err());
    }
}
