//! Datasets of supervised samples
//!
//! A [`Dataset`] owns an ordered collection of [`Sample`]s with a fixed
//! input width and target width. Datasets are never mutated in place once
//! built; shuffle, split and selection operations return new datasets.

use crate::error::{EnsembraError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// One supervised sample: an identifier, an input vector and a target vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Identifier, preserved through shuffles and splits
    pub id: String,
    /// Input feature vector
    pub input: Array1<f64>,
    /// Ideal output vector
    pub target: Array1<f64>,
}

impl Sample {
    /// Create a new sample
    pub fn new(id: impl Into<String>, input: Vec<f64>, target: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            input: Array1::from_vec(input),
            target: Array1::from_vec(target),
        }
    }
}

/// Ordered, immutable collection of samples with consistent vector widths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
    input_width: usize,
    target_width: usize,
}

impl Dataset {
    /// Create an empty dataset with fixed input and target widths
    pub fn new(input_width: usize, target_width: usize) -> Self {
        Self {
            samples: Vec::new(),
            input_width,
            target_width,
        }
    }

    /// Build a dataset from samples, validating width consistency
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
        let first = samples.first().ok_or_else(|| {
            EnsembraError::DataError("cannot build a dataset from zero samples".to_string())
        })?;
        let mut dataset = Dataset::new(first.input.len(), first.target.len());
        for sample in samples {
            dataset.push(sample)?;
        }
        Ok(dataset)
    }

    /// Append a sample, rejecting inconsistent vector widths
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        if sample.input.len() != self.input_width {
            return Err(EnsembraError::ShapeError {
                expected: format!("input width {}", self.input_width),
                actual: format!("input width {}", sample.input.len()),
            });
        }
        if sample.target.len() != self.target_width {
            return Err(EnsembraError::ShapeError {
                expected: format!("target width {}", self.target_width),
                actual: format!("target width {}", sample.target.len()),
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Input vector width
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Target vector width
    pub fn target_width(&self) -> usize {
        self.target_width
    }

    /// Borrow the samples in order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Sample at a given index
    pub fn get(&self, idx: usize) -> Option<&Sample> {
        self.samples.get(idx)
    }

    /// Iterate over samples in order
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Return a new dataset with samples shuffled by a seeded generator
    pub fn shuffled(&self, seed: u64) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut samples = self.samples.clone();
        samples.shuffle(&mut rng);
        Dataset {
            samples,
            input_width: self.input_width,
            target_width: self.target_width,
        }
    }

    /// Return a new dataset containing the samples at the given indices
    pub fn select(&self, indices: &[usize]) -> Result<Dataset> {
        let mut samples = Vec::with_capacity(indices.len());
        for &idx in indices {
            let sample = self.samples.get(idx).ok_or_else(|| {
                EnsembraError::DataError(format!(
                    "sample index {} out of range for dataset of {} samples",
                    idx,
                    self.samples.len()
                ))
            })?;
            samples.push(sample.clone());
        }
        Ok(Dataset {
            samples,
            input_width: self.input_width,
            target_width: self.target_width,
        })
    }

    /// Split into two datasets, the first receiving `ratio` of the samples
    pub fn split(&self, ratio: f64) -> Result<(Dataset, Dataset)> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(EnsembraError::InvalidParameter {
                name: "ratio".to_string(),
                value: ratio.to_string(),
                reason: "must lie strictly between 0 and 1".to_string(),
            });
        }
        let head = ((self.samples.len() as f64) * ratio).round() as usize;
        let head = head.clamp(1, self.samples.len().saturating_sub(1));
        let first = Dataset {
            samples: self.samples[..head].to_vec(),
            input_width: self.input_width,
            target_width: self.target_width,
        };
        let second = Dataset {
            samples: self.samples[head..].to_vec(),
            input_width: self.input_width,
            target_width: self.target_width,
        };
        Ok((first, second))
    }
}

/// Contiguous fold index ranges over `n_samples`, sized as evenly as possible
pub fn fold_indices(n_samples: usize, n_folds: usize) -> Vec<Vec<usize>> {
    let base = n_samples / n_folds;
    let remainder = n_samples % n_folds;
    let mut folds = Vec::with_capacity(n_folds);
    let mut current = 0;
    for fold_idx in 0..n_folds {
        let size = if fold_idx < remainder { base + 1 } else { base };
        folds.push((current..current + size).collect());
        current += size;
    }
    folds
}
