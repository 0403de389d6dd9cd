//! Random-projection predictor
//!
//! A reservoir-style predictor: inputs pass through a fixed, seeded random
//! expansion with tanh nonlinearity, and only the linear readout on top of
//! the expansion is trained. Each `run_epoch` makes one stochastic pass
//! over the dataset updating the readout.

use super::{LayerStats, TrainablePredictor};
use crate::data::Dataset;
use crate::error::Result;
use crate::stats::OutputTaskKind;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Random-projection hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomProjectionConfig {
    /// Width of the random expansion layer
    pub expansion: usize,
    /// Learning rate for the readout
    pub learning_rate: f64,
}

impl Default for RandomProjectionConfig {
    fn default() -> Self {
        Self {
            expansion: 64,
            learning_rate: 0.05,
        }
    }
}

/// Fixed random expansion with a trained linear readout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomProjectionNetwork {
    config: RandomProjectionConfig,
    task: OutputTaskKind,
    input_count: usize,
    output_count: usize,
    projection: Array2<f64>,
    projection_bias: Array1<f64>,
    readout: Array2<f64>,
    readout_bias: Array1<f64>,
    seed: u64,
    epoch: u64,
}

impl RandomProjectionNetwork {
    /// Create a predictor with a freshly seeded projection
    pub fn new(
        input_count: usize,
        output_count: usize,
        task: OutputTaskKind,
        config: RandomProjectionConfig,
        seed: u64,
    ) -> Self {
        let mut network = Self {
            config,
            task,
            input_count,
            output_count,
            projection: Array2::zeros((0, 0)),
            projection_bias: Array1::zeros(0),
            readout: Array2::zeros((0, 0)),
            readout_bias: Array1::zeros(0),
            seed,
            epoch: 0,
        };
        network.reinitialize(seed);
        network
    }

    fn expand(&self, input: ArrayView1<f64>) -> Array1<f64> {
        (input.dot(&self.projection) + &self.projection_bias).mapv(f64::tanh)
    }

    fn activate_output(&self, z: Array1<f64>) -> Array1<f64> {
        match self.task {
            OutputTaskKind::Regression => z,
            OutputTaskKind::Binary => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            OutputTaskKind::Categorical => {
                let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exp = z.mapv(|v| (v - max).exp());
                let sum = exp.sum();
                exp / sum
            }
        }
    }
}

impl TrainablePredictor for RandomProjectionNetwork {
    fn input_count(&self) -> usize {
        self.input_count
    }

    fn output_count(&self) -> usize {
        self.output_count
    }

    fn task_kind(&self) -> OutputTaskKind {
        self.task
    }

    fn compute(&self, input: ArrayView1<f64>) -> Array1<f64> {
        let hidden = self.expand(input);
        self.activate_output(hidden.dot(&self.readout) + &self.readout_bias)
    }

    fn run_epoch(&mut self, data: &Dataset) -> Result<bool> {
        let n = data.len();
        if n == 0 {
            return Ok(false);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(self.epoch));
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let lr = self.config.learning_rate;
        for idx in indices {
            let sample = &data.samples()[idx];
            let hidden = self.expand(sample.input.view());
            let output =
                self.activate_output(hidden.dot(&self.readout) + &self.readout_bias);
            let delta = output - &sample.target;

            let grad = hidden
                .view()
                .insert_axis(Axis(1))
                .dot(&delta.view().insert_axis(Axis(0)));
            self.readout = &self.readout - &(&grad * lr);
            self.readout_bias = &self.readout_bias - &(&delta * lr);
        }

        self.epoch += 1;
        Ok(true)
    }

    fn reinitialize(&mut self, seed: u64) {
        self.seed = seed;
        self.epoch = 0;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let scale = (1.0 / self.input_count.max(1) as f64).sqrt();
        let projection: Vec<f64> = (0..self.input_count * self.config.expansion)
            .map(|_| rng.gen::<f64>() * 2.0 * scale - scale)
            .collect();
        self.projection =
            Array2::from_shape_vec((self.input_count, self.config.expansion), projection)
                .expect("sized above");
        self.projection_bias =
            Array1::from_iter((0..self.config.expansion).map(|_| rng.gen::<f64>() - 0.5));
        self.readout = Array2::zeros((self.config.expansion, self.output_count));
        self.readout_bias = Array1::zeros(self.output_count);
    }

    fn layer_summary(&self) -> Vec<LayerStats> {
        vec![
            LayerStats::from_weights(
                self.projection.nrows(),
                self.projection.ncols(),
                self.projection.iter(),
            ),
            LayerStats::from_weights(
                self.readout.nrows(),
                self.readout.ncols(),
                self.readout.iter(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;
    use ndarray::arr1;

    fn linear_dataset() -> Dataset {
        let samples = (0..20)
            .map(|i| {
                let x = i as f64 / 10.0;
                Sample::new(format!("s{}", i), vec![x, 1.0 - x], vec![2.0 * x + 0.5])
            })
            .collect();
        Dataset::from_samples(samples).unwrap()
    }

    #[test]
    fn test_projection_is_fixed_across_epochs() {
        let data = linear_dataset();
        let mut network = RandomProjectionNetwork::new(
            2,
            1,
            OutputTaskKind::Regression,
            RandomProjectionConfig::default(),
            17,
        );
        let projection_before = network.projection.clone();
        for _ in 0..5 {
            network.run_epoch(&data).unwrap();
        }
        assert_eq!(projection_before, network.projection);
    }

    #[test]
    fn test_readout_training_reduces_error() {
        let data = linear_dataset();
        let mut network = RandomProjectionNetwork::new(
            2,
            1,
            OutputTaskKind::Regression,
            RandomProjectionConfig {
                expansion: 32,
                learning_rate: 0.02,
            },
            4,
        );
        let loss = |n: &RandomProjectionNetwork| -> f64 {
            data.iter()
                .map(|s| (n.compute(s.input.view())[0] - s.target[0]).powi(2))
                .sum()
        };
        let before = loss(&network);
        for _ in 0..50 {
            network.run_epoch(&data).unwrap();
        }
        assert!(loss(&network) < before);
    }

    #[test]
    fn test_reinitialize_is_reproducible() {
        let mut a = RandomProjectionNetwork::new(
            3,
            2,
            OutputTaskKind::Binary,
            RandomProjectionConfig::default(),
            8,
        );
        let b = RandomProjectionNetwork::new(
            3,
            2,
            OutputTaskKind::Binary,
            RandomProjectionConfig::default(),
            8,
        );
        a.reinitialize(8);
        let x = arr1(&[0.1, 0.5, 0.9]);
        assert_eq!(a.compute(x.view()), b.compute(x.view()));
    }
}
