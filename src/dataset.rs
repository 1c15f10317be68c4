//! In-memory loop datasets.
//!
//! Datasets are stored as JSON objects of the form
//!
//! ```json
//! {"arrays": [[[x, y], [x, y], ...], ...], "classes": ["A", "B", ...]}
//! ```
//!
//! where every entry of `arrays` is one loop (a sequence of points) and the
//! optional `classes` list carries one label per loop.

use crate::error::{HysomError, Result};
use ndarray::{Array3, ArrayView3, Axis};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawDataset {
    arrays: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    classes: Option<Vec<serde_json::Value>>,
}

/// A set of equally shaped loops, optionally labelled.
#[derive(Debug, Clone)]
pub struct LoopDataset {
    samples: Array3<f64>,
    classes: Option<Vec<String>>,
}

impl LoopDataset {
    /// Builds a dataset from nested sample arrays, checking that every
    /// sample has the same `(seq_len, point_dim)` shape and finite values.
    pub fn from_arrays(arrays: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        let first = arrays.first().ok_or(HysomError::InsufficientData {
            required: 1,
            available: 0,
        })?;
        let seq_len = first.len();
        let point_dim = first.first().map_or(0, Vec::len);
        if seq_len == 0 || point_dim == 0 {
            return Err(HysomError::InvalidParameter(
                "samples must contain at least one point with one coordinate".to_string(),
            ));
        }

        let mut flat = Vec::with_capacity(arrays.len() * seq_len * point_dim);
        for (k, sample) in arrays.iter().enumerate() {
            if sample.len() != seq_len {
                return Err(HysomError::shape(&[seq_len, point_dim], &[sample.len(), point_dim]));
            }
            for point in sample {
                if point.len() != point_dim {
                    return Err(HysomError::shape(&[seq_len, point_dim], &[seq_len, point.len()]));
                }
                if let Some(v) = point.iter().find(|v| !v.is_finite()) {
                    return Err(HysomError::InvalidParameter(format!(
                        "sample {} contains a non-finite value ({})",
                        k, v
                    )));
                }
                flat.extend_from_slice(point);
            }
        }

        let samples = Array3::from_shape_vec((arrays.len(), seq_len, point_dim), flat)
            .map_err(|e| HysomError::InvalidParameter(e.to_string()))?;
        Ok(Self {
            samples,
            classes: None,
        })
    }

    /// Attaches one label per sample.
    pub fn with_classes(mut self, classes: Vec<String>) -> Result<Self> {
        if classes.len() != self.len() {
            return Err(HysomError::InvalidParameter(format!(
                "{} classes given for {} samples",
                classes.len(),
                self.len()
            )));
        }
        self.classes = Some(classes);
        Ok(self)
    }

    /// Parses a dataset from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawDataset = serde_json::from_str(json)?;
        let dataset = Self::from_arrays(raw.arrays)?;

        match raw.classes {
            Some(classes) => {
                let labels = classes
                    .into_iter()
                    .map(|c| match c {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect();
                dataset.with_classes(labels)
            }
            None => Ok(dataset),
        }
    }

    /// Loads a dataset from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Samples as an `(n_samples, seq_len, point_dim)` view.
    pub fn samples(&self) -> ArrayView3<'_, f64> {
        self.samples.view()
    }

    /// Labels, if the dataset carries them.
    pub fn classes(&self) -> Option<&[String]> {
        self.classes.as_deref()
    }

    /// Shape of one sample, `(seq_len, point_dim)`.
    pub fn input_dim(&self) -> (usize, usize) {
        let (_, seq_len, point_dim) = self.samples.dim();
        (seq_len, point_dim)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len_of(Axis(0))
    }

    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
