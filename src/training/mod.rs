//! Training control
//!
//! [`TrainingController`] drives a trainable predictor through bounded
//! attempts and epochs, scoring a candidate after every epoch and keeping
//! the best one seen. Configuration is validated eagerly; invalid ranges
//! fail at construction, never get clamped.

mod controller;

pub use controller::TrainingController;

use crate::error::{EnsembraError, Result};
use crate::stats::ConfidenceMetric;
use serde::{Deserialize, Serialize};

/// Training RMSE below which a regression run with no held-out data stops
/// outright; there is no validation signal left to refine against.
pub const REGRESSION_STOP_RMSE: f64 = 1e-6;

/// Budget and stopping parameters for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of reinitialized attempts before giving up
    pub max_attempts: usize,
    /// Epoch budget per attempt
    pub max_epochs_per_attempt: usize,
    /// Fraction of the epoch budget an attempt may go without improvement
    pub patience_ratio: f64,
    /// Keep training after a classification model reaches perfect accuracy,
    /// hunting for log-loss improvement
    pub fine_tune: bool,
    /// Weight coefficient for blending validation statistics
    pub validation_coeff: f64,
    /// Base seed; each attempt reseeds the predictor from `seed + attempt`
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_epochs_per_attempt: 200,
            patience_ratio: 0.2,
            fine_tune: true,
            validation_coeff: 1.0,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_epochs_per_attempt(mut self, max_epochs: usize) -> Self {
        self.max_epochs_per_attempt = max_epochs;
        self
    }

    pub fn with_patience_ratio(mut self, patience_ratio: f64) -> Self {
        self.patience_ratio = patience_ratio;
        self
    }

    pub fn with_fine_tune(mut self, fine_tune: bool) -> Self {
        self.fine_tune = fine_tune;
        self
    }

    pub fn with_validation_coeff(mut self, validation_coeff: f64) -> Self {
        self.validation_coeff = validation_coeff;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check every parameter range, failing fast on the first violation
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EnsembraError::InvalidParameter {
                name: "max_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one training attempt is required".to_string(),
            });
        }
        if self.max_epochs_per_attempt == 0 {
            return Err(EnsembraError::InvalidParameter {
                name: "max_epochs_per_attempt".to_string(),
                value: "0".to_string(),
                reason: "at least one epoch per attempt is required".to_string(),
            });
        }
        if !(self.patience_ratio > 0.0 && self.patience_ratio <= 1.0) {
            return Err(EnsembraError::InvalidParameter {
                name: "patience_ratio".to_string(),
                value: self.patience_ratio.to_string(),
                reason: "must lie in (0, 1]".to_string(),
            });
        }
        if !(self.validation_coeff > 0.0) {
            return Err(EnsembraError::InvalidParameter {
                name: "validation_coeff".to_string(),
                value: self.validation_coeff.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Observational snapshot delivered after every epoch.
///
/// Purely informational; the callback cannot influence control flow.
#[derive(Debug)]
pub struct ProgressUpdate<'a> {
    /// Zero-based attempt index
    pub attempt: usize,
    pub total_attempts: usize,
    /// One-based epoch index within the attempt
    pub epoch: usize,
    /// Current epoch budget of the attempt, including any fine-tune extension
    pub total_epochs: usize,
    /// Metric of the candidate trained this epoch
    pub current: &'a ConfidenceMetric,
    /// Metric of the best candidate seen so far across all attempts
    pub best: &'a ConfidenceMetric,
    /// Whether the controller will stop after this update
    pub stopping: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        assert!(TrainingConfig::default().with_max_attempts(0).validate().is_err());
        assert!(TrainingConfig::default()
            .with_max_epochs_per_attempt(0)
            .validate()
            .is_err());
        assert!(TrainingConfig::default().with_patience_ratio(0.0).validate().is_err());
        assert!(TrainingConfig::default().with_patience_ratio(1.5).validate().is_err());
        assert!(TrainingConfig::default()
            .with_validation_coeff(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = TrainingConfig::default()
            .with_max_attempts(3)
            .with_max_epochs_per_attempt(50)
            .with_seed(7)
            .with_fine_tune(false);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_epochs_per_attempt, 50);
        assert_eq!(config.seed, 7);
        assert!(!config.fine_tune);
    }
}
