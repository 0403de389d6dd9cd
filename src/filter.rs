//! Per-feature range normalization
//!
//! A [`RangeFilter`] maps each input feature into a fixed range and back.
//! Fitting scans the dataset in contiguous parallel partitions with a
//! mutex-guarded merge, the same pattern the evaluator uses.

use crate::data::{Dataset, Sample};
use crate::error::{EnsembraError, Result};
use ndarray::{Array1, ArrayView1};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Min/max normalization filter over input features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeFilter {
    mins: Vec<f64>,
    maxs: Vec<f64>,
    lo: f64,
    hi: f64,
}

impl RangeFilter {
    /// Fit a filter over the input features of a dataset, mapping observed
    /// values into `[lo, hi]`
    pub fn fit(data: &Dataset, lo: f64, hi: f64) -> Result<Self> {
        if data.is_empty() {
            return Err(EnsembraError::DataError(
                "cannot fit a range filter over an empty dataset".to_string(),
            ));
        }
        if !(lo < hi) {
            return Err(EnsembraError::InvalidParameter {
                name: "range".to_string(),
                value: format!("[{}, {}]", lo, hi),
                reason: "lower bound must be below upper bound".to_string(),
            });
        }

        let width = data.input_width();
        let shared = Mutex::new((vec![f64::INFINITY; width], vec![f64::NEG_INFINITY; width]));

        let workers = crate::evaluate::worker_count();
        let chunk = (data.len() + workers - 1) / workers;
        data.samples().par_chunks(chunk).for_each(|partition| {
            let mut mins = vec![f64::INFINITY; width];
            let mut maxs = vec![f64::NEG_INFINITY; width];
            for sample in partition {
                for (idx, &v) in sample.input.iter().enumerate() {
                    mins[idx] = mins[idx].min(v);
                    maxs[idx] = maxs[idx].max(v);
                }
            }
            let mut guard = shared.lock();
            for idx in 0..width {
                guard.0[idx] = guard.0[idx].min(mins[idx]);
                guard.1[idx] = guard.1[idx].max(maxs[idx]);
            }
        });

        let (mins, maxs) = shared.into_inner();
        Ok(Self { mins, maxs, lo, hi })
    }

    /// Number of features the filter was fitted over
    pub fn width(&self) -> usize {
        self.mins.len()
    }

    /// Map one feature value into the target range
    pub fn normalize_value(&self, feature_idx: usize, value: f64) -> f64 {
        let (min, max) = (self.mins[feature_idx], self.maxs[feature_idx]);
        let span = max - min;
        if span == 0.0 {
            // Constant feature maps to the middle of the range.
            (self.lo + self.hi) / 2.0
        } else {
            self.lo + (value - min) / span * (self.hi - self.lo)
        }
    }

    /// Map one normalized feature value back to its original scale
    pub fn denormalize_value(&self, feature_idx: usize, value: f64) -> f64 {
        let (min, max) = (self.mins[feature_idx], self.maxs[feature_idx]);
        let span = max - min;
        if span == 0.0 {
            min
        } else {
            min + (value - self.lo) / (self.hi - self.lo) * span
        }
    }

    /// Normalize a full input vector
    pub fn normalize(&self, input: ArrayView1<f64>) -> Result<Array1<f64>> {
        if input.len() != self.width() {
            return Err(EnsembraError::ShapeError {
                expected: format!("{} input features", self.width()),
                actual: format!("{} input features", input.len()),
            });
        }
        Ok(Array1::from_iter(
            input
                .iter()
                .enumerate()
                .map(|(idx, &v)| self.normalize_value(idx, v)),
        ))
    }

    /// Denormalize a full input vector
    pub fn denormalize(&self, input: ArrayView1<f64>) -> Result<Array1<f64>> {
        if input.len() != self.width() {
            return Err(EnsembraError::ShapeError {
                expected: format!("{} input features", self.width()),
                actual: format!("{} input features", input.len()),
            });
        }
        Ok(Array1::from_iter(
            input
                .iter()
                .enumerate()
                .map(|(idx, &v)| self.denormalize_value(idx, v)),
        ))
    }

    /// Return a new dataset with every sample's input normalized
    pub fn normalize_dataset(&self, data: &Dataset) -> Result<Dataset> {
        let mut normalized = Dataset::new(data.input_width(), data.target_width());
        for sample in data.iter() {
            normalized.push(Sample {
                id: sample.id.clone(),
                input: self.normalize(sample.input.view())?,
                target: sample.target.clone(),
            })?;
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn toy_dataset() -> Dataset {
        Dataset::from_samples(vec![
            Sample::new("a", vec![0.0, 10.0, 5.0], vec![1.0]),
            Sample::new("b", vec![4.0, 30.0, 5.0], vec![0.0]),
            Sample::new("c", vec![2.0, 20.0, 5.0], vec![1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_and_roundtrip() {
        let filter = RangeFilter::fit(&toy_dataset(), -1.0, 1.0).unwrap();
        let input = arr1(&[1.0, 15.0, 5.0]);
        let normalized = filter.normalize(input.view()).unwrap();
        assert!(normalized.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        assert_abs_diff_eq!(normalized[0], -0.5, epsilon = 1e-12);

        let restored = filter.denormalize(normalized.view()).unwrap();
        assert_abs_diff_eq!(restored[0], input[0], epsilon = 1e-12);
        assert_abs_diff_eq!(restored[1], input[1], epsilon = 1e-12);
    }

    #[test]
    fn test_constant_feature_maps_to_midpoint() {
        let filter = RangeFilter::fit(&toy_dataset(), 0.0, 1.0).unwrap();
        assert_abs_diff_eq!(filter.normalize_value(2, 5.0), 0.5);
        assert_abs_diff_eq!(filter.denormalize_value(2, 0.5), 5.0);
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        assert!(RangeFilter::fit(&toy_dataset(), 1.0, 1.0).is_err());
    }

    #[test]
    fn test_normalize_dataset_preserves_targets() {
        let data = toy_dataset();
        let filter = RangeFilter::fit(&data, 0.0, 1.0).unwrap();
        let normalized = filter.normalize_dataset(&data).unwrap();
        assert_eq!(normalized.len(), data.len());
        for (orig, norm) in data.iter().zip(normalized.iter()) {
            assert_eq!(orig.target, norm.target);
            assert_eq!(orig.id, norm.id);
        }
    }
}
