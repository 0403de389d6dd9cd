//! Feed-forward network trained by backpropagation
//!
//! A multi-output MLP trained one epoch at a time with minibatch SGD and
//! momentum. The output activation follows the task kind: linear for
//! regression, sigmoid for binary decisions, softmax for categorical
//! outputs, so the output delta is `computed - ideal` in every case.

use super::{LayerStats, TrainablePredictor};
use crate::data::Dataset;
use crate::error::Result;
use crate::stats::OutputTaskKind;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Sigmoid,
    Tanh,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Tanh
    }
}

impl Activation {
    fn apply(&self, z: f64) -> f64 {
        match self {
            Activation::ReLU => z.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            Activation::Tanh => z.tanh(),
        }
    }

    fn derivative(&self, z: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => {
                let s = 1.0 / (1.0 + (-z).exp());
                s * (1.0 - s)
            }
            Activation::Tanh => 1.0 - z.tanh().powi(2),
        }
    }
}

/// MLP hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
    /// Activation function for hidden layers
    pub activation: Activation,
    /// Learning rate
    pub learning_rate: f64,
    /// Minibatch size
    pub batch_size: usize,
    /// Momentum
    pub momentum: f64,
    /// L2 regularization
    pub alpha: f64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![16],
            activation: Activation::Tanh,
            learning_rate: 0.05,
            batch_size: 16,
            momentum: 0.9,
            alpha: 0.0,
        }
    }
}

/// Feed-forward network with one output per target feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpNetwork {
    config: MlpConfig,
    task: OutputTaskKind,
    input_count: usize,
    output_count: usize,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    velocities_w: Vec<Array2<f64>>,
    velocities_b: Vec<Array1<f64>>,
    seed: u64,
    epoch: u64,
}

impl MlpNetwork {
    /// Create a network with freshly initialized weights
    pub fn new(
        input_count: usize,
        output_count: usize,
        task: OutputTaskKind,
        config: MlpConfig,
        seed: u64,
    ) -> Self {
        let mut network = Self {
            config,
            task,
            input_count,
            output_count,
            weights: Vec::new(),
            biases: Vec::new(),
            velocities_w: Vec::new(),
            velocities_b: Vec::new(),
            seed,
            epoch: 0,
        };
        network.reinitialize(seed);
        network
    }

    fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.input_count];
        sizes.extend(&self.config.hidden_layers);
        sizes.push(self.output_count);
        sizes
    }

    fn apply_output_activation(&self, z: Array1<f64>) -> Array1<f64> {
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

    /// Forward pass keeping every layer's pre-activation and activation
    fn forward_trace(&self, input: ArrayView1<f64>) -> (Vec<Array1<f64>>, Vec<Array1<f64>>) {
        let n_layers = self.weights.len();
        let mut activations = vec![input.to_owned()];
        let mut zs = Vec::with_capacity(n_layers);
        for (idx, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[idx].dot(w) + b;
            let a = if idx + 1 == n_layers {
                self.apply_output_activation(z.clone())
            } else {
                z.mapv(|v| self.config.activation.apply(v))
            };
            zs.push(z);
            activations.push(a);
        }
        (activations, zs)
    }

    /// Backpropagate one sample, adding into the gradient accumulators
    fn accumulate_gradients(
        &self,
        input: ArrayView1<f64>,
        target: ArrayView1<f64>,
        grads_w: &mut [Array2<f64>],
        grads_b: &mut [Array1<f64>],
    ) {
        let (activations, zs) = self.forward_trace(input);
        let n_layers = self.weights.len();

        // Output delta is computed - ideal for all three output couplings.
        let mut delta = &activations[n_layers] - &target;
        for layer in (0..n_layers).rev() {
            let a_prev = &activations[layer];
            grads_w[layer] = &grads_w[layer]
                + &a_prev
                    .view()
                    .insert_axis(Axis(1))
                    .dot(&delta.view().insert_axis(Axis(0)));
            grads_b[layer] = &grads_b[layer] + &delta;

            if layer > 0 {
                let back = self.weights[layer].dot(&delta);
                delta = back
                    * zs[layer - 1].mapv(|z| self.config.activation.derivative(z));
            }
        }
    }
}

impl TrainablePredictor for MlpNetwork {
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
        let (activations, _) = self.forward_trace(input);
        activations.into_iter().next_back().unwrap_or_else(|| input.to_owned())
    }

    fn run_epoch(&mut self, data: &Dataset) -> Result<bool> {
        let n = data.len();
        if n == 0 {
            return Ok(false);
        }

        // Minibatch order is derived from the seed and epoch counter so a
        // reloaded network continues deterministically.
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(self.epoch));
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let batch_size = self.config.batch_size.max(1);
        for batch in indices.chunks(batch_size) {
            let mut grads_w: Vec<Array2<f64>> = self
                .weights
                .iter()
                .map(|w| Array2::zeros(w.raw_dim()))
                .collect();
            let mut grads_b: Vec<Array1<f64>> = self
                .biases
                .iter()
                .map(|b| Array1::zeros(b.len()))
                .collect();

            for &idx in batch {
                let sample = &data.samples()[idx];
                self.accumulate_gradients(
                    sample.input.view(),
                    sample.target.view(),
                    &mut grads_w,
                    &mut grads_b,
                );
            }

            let scale = 1.0 / batch.len() as f64;
            for layer in 0..self.weights.len() {
                self.velocities_w[layer] = &self.velocities_w[layer] * self.config.momentum
                    - &(&grads_w[layer] * (scale * self.config.learning_rate));
                self.velocities_b[layer] = &self.velocities_b[layer] * self.config.momentum
                    - &(&grads_b[layer] * (scale * self.config.learning_rate));

                self.weights[layer] = &self.weights[layer] + &self.velocities_w[layer];
                self.biases[layer] = &self.biases[layer] + &self.velocities_b[layer];

                if self.config.alpha > 0.0 {
                    self.weights[layer] = &self.weights[layer]
                        * (1.0 - self.config.alpha * self.config.learning_rate);
                }
            }
        }

        self.epoch += 1;
        Ok(true)
    }

    fn reinitialize(&mut self, seed: u64) {
        self.seed = seed;
        self.epoch = 0;
        self.weights.clear();
        self.biases.clear();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let sizes = self.layer_sizes();
        for window in sizes.windows(2) {
            let (n_in, n_out) = (window[0], window[1]);
            // Xavier/Glorot initialization
            let scale = (2.0 / (n_in + n_out) as f64).sqrt();
            let weights: Vec<f64> = (0..n_in * n_out)
                .map(|_| rng.gen::<f64>() * 2.0 * scale - scale)
                .collect();
            self.weights
                .push(Array2::from_shape_vec((n_in, n_out), weights).expect("sized above"));
            self.biases.push(Array1::zeros(n_out));
        }

        self.velocities_w = self
            .weights
            .iter()
            .map(|w| Array2::zeros(w.raw_dim()))
            .collect();
        self.velocities_b = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();
    }

    fn layer_summary(&self) -> Vec<LayerStats> {
        self.weights
            .iter()
            .map(|w| LayerStats::from_weights(w.nrows(), w.ncols(), w.iter()))
            .collect()
    }
}
