//! Trainable predictors
//!
//! The training controller drives predictors through a narrow contract:
//! compute an output vector from an input vector, train one epoch in place,
//! and reinitialize from a seed. Two implementations are provided:
//! - [`MlpNetwork`] - feed-forward network trained by backpropagation
//! - [`RandomProjectionNetwork`] - fixed random expansion with a trained
//!   linear readout
//!
//! [`PredictorKind`] is the closed variant type carried inside models so the
//! whole object graph stays serializable.

mod mlp;
mod random_projection;

pub use mlp::{Activation, MlpConfig, MlpNetwork};
pub use random_projection::{RandomProjectionConfig, RandomProjectionNetwork};

use crate::data::Dataset;
use crate::error::Result;
use crate::stats::OutputTaskKind;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Summary statistics over one layer's weights, for reporting only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    /// Fan-in of the layer
    pub inputs: usize,
    /// Fan-out of the layer
    pub outputs: usize,
    pub weight_mean: f64,
    pub weight_stddev: f64,
    pub weight_min: f64,
    pub weight_max: f64,
}

impl LayerStats {
    /// Compute summary statistics from a weight iterator
    pub fn from_weights<'a>(
        inputs: usize,
        outputs: usize,
        weights: impl Iterator<Item = &'a f64> + Clone,
    ) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &w in weights.clone() {
            count += 1;
            sum += w;
            min = min.min(w);
            max = max.max(w);
        }
        let mean = if count == 0 { 0.0 } else { sum / count as f64 };
        let variance = if count == 0 {
            0.0
        } else {
            weights.map(|&w| (w - mean).powi(2)).sum::<f64>() / count as f64
        };
        Self {
            inputs,
            outputs,
            weight_mean: mean,
            weight_stddev: variance.sqrt(),
            weight_min: if count == 0 { 0.0 } else { min },
            weight_max: if count == 0 { 0.0 } else { max },
        }
    }
}

/// Contract between the training controller and a trainable predictor
pub trait TrainablePredictor {
    /// Input vector width
    fn input_count(&self) -> usize;

    /// Output vector width
    fn output_count(&self) -> usize;

    /// Task kind of the output features
    fn task_kind(&self) -> OutputTaskKind;

    /// Compute the output vector for one input vector, no side effects
    fn compute(&self, input: ArrayView1<f64>) -> Array1<f64>;

    /// Train one epoch in place; returns whether another epoch is meaningful
    fn run_epoch(&mut self, data: &Dataset) -> Result<bool>;

    /// Discard learned state and reinitialize weights from a seed
    fn reinitialize(&mut self, seed: u64);

    /// Per-layer weight summary statistics, for reporting only
    fn layer_summary(&self) -> Vec<LayerStats>;
}

/// Closed set of predictor implementations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PredictorKind {
    Mlp(MlpNetwork),
    RandomProjection(RandomProjectionNetwork),
}

impl TrainablePredictor for PredictorKind {
    fn input_count(&self) -> usize {
        match self {
            PredictorKind::Mlp(p) => p.input_count(),
            PredictorKind::RandomProjection(p) => p.input_count(),
        }
    }

    fn output_count(&self) -> usize {
        match self {
            PredictorKind::Mlp(p) => p.output_count(),
            PredictorKind::RandomProjection(p) => p.output_count(),
        }
    }

    fn task_kind(&self) -> OutputTaskKind {
        match self {
            PredictorKind::Mlp(p) => p.task_kind(),
            PredictorKind::RandomProjection(p) => p.task_kind(),
        }
    }

    fn compute(&self, input: ArrayView1<f64>) -> Array1<f64> {
        match self {
            PredictorKind::Mlp(p) => p.compute(input),
            PredictorKind::RandomProjection(p) => p.compute(input),
        }
    }

    fn run_epoch(&mut self, data: &Dataset) -> Result<bool> {
        match self {
            PredictorKind::Mlp(p) => p.run_epoch(data),
            PredictorKind::RandomProjection(p) => p.run_epoch(data),
        }
    }

    fn reinitialize(&mut self, seed: u64) {
        match self {
            PredictorKind::Mlp(p) => p.reinitialize(seed),
            PredictorKind::RandomProjection(p) => p.reinitialize(seed),
        }
    }

    fn layer_summary(&self) -> Vec<LayerStats> {
        match self {
            PredictorKind::Mlp(p) => p.layer_summary(),
            PredictorKind::RandomProjection(p) => p.layer_summary(),
        }
    }
}
