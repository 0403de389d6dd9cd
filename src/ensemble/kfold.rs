//! K-fold bagging
//!
//! The dataset is shuffled with a fixed seed and cut into F contiguous
//! folds. Each fold index i yields one member trained on the other folds
//! with fold i held out for validation, so every member sees genuinely
//! unseen data. Aggregation weights are each member's per-feature
//! confidence.

use super::n_folds_for_ratio;
use crate::data::{fold_indices, Dataset};
use crate::error::{EnsembraError, Result};
use crate::model::{EnsembleModel, Model, ModelInfo};
use crate::network::PredictorKind;
use crate::stats::ConfidenceMetric;
use crate::training::{TrainingConfig, TrainingController};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

/// K-fold bagging parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KFoldConfig {
    /// Fraction of the dataset held out per fold, in (0, 0.5]
    pub fold_ratio: f64,
    /// Seed for the initial shuffle
    pub seed: u64,
    /// Training budget for every member
    pub training: TrainingConfig,
}

impl Default for KFoldConfig {
    fn default() -> Self {
        Self {
            fold_ratio: 0.2,
            seed: 42,
            training: TrainingConfig::default(),
        }
    }
}

impl KFoldConfig {
    pub fn with_fold_ratio(mut self, fold_ratio: f64) -> Self {
        self.fold_ratio = fold_ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fold_ratio > 0.0 && self.fold_ratio <= 0.5) {
            return Err(EnsembraError::InvalidParameter {
                name: "fold_ratio".to_string(),
                value: self.fold_ratio.to_string(),
                reason: "must lie in (0, 0.5]".to_string(),
            });
        }
        self.training.validate()
    }
}

/// Builds a bagged ensemble of fold-trained members
#[derive(Debug, Clone)]
pub struct KFoldBuilder {
    config: KFoldConfig,
}

impl KFoldBuilder {
    /// Create a builder, validating the configuration eagerly
    pub fn new(config: KFoldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Number of folds implied by the configured ratio
    pub fn n_folds(&self) -> usize {
        n_folds_for_ratio(self.config.fold_ratio)
    }

    /// Train one member per fold and combine them into an ensemble.
    ///
    /// Every member starts from a clone of `prototype`; the training
    /// controller reinitializes it with a fold-derived seed.
    pub fn build(&self, name: &str, prototype: &PredictorKind, data: &Dataset) -> Result<Model> {
        let n_folds = self.n_folds();
        if data.len() < n_folds {
            return Err(EnsembraError::DataError(format!(
                "{} samples cannot fill {} folds",
                data.len(),
                n_folds
            )));
        }

        let shuffled = data.shuffled(self.config.seed);
        let folds = fold_indices(shuffled.len(), n_folds);

        let n_features = data.target_width();
        let mut members = Vec::with_capacity(n_folds);
        let mut weights = Array2::zeros((n_folds, n_features));
        for (fold, holdout) in folds.iter().enumerate() {
            let train_idx: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != fold)
                .flat_map(|(_, indices)| indices.iter().copied())
                .collect();
            let train_set = shuffled.select(&train_idx)?;
            let val_set = shuffled.select(holdout)?;

            let training = self
                .config
                .training
                .clone()
                .with_seed(self.config.training.seed.wrapping_add(fold as u64));
            let controller = TrainingController::new(training)?;
            let member = controller.train(
                &format!("{}-fold-{}", name, fold),
                prototype.clone(),
                &train_set,
                Some(&val_set),
            )?;

            info!(fold, cost = member.confidence().cost(), "fold member trained");
            for feature in 0..n_features {
                weights[[fold, feature]] = member.confidence().feature_confidence()[feature];
            }
            members.push(member);
        }

        let confidence = ConfidenceMetric::merged(
            &members
                .iter()
                .map(|m| m.confidence().clone())
                .collect::<Vec<_>>(),
        )?;
        let output_names = members[0].output_names().to_vec();
        Ok(Model::KFoldEnsemble(EnsembleModel {
            info: ModelInfo {
                name: name.to_string(),
                task: members[0].task_kind(),
                output_names,
                confidence,
            },
            members,
            weights,
        }))
    }
}
