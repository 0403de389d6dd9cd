//! Multi-attempt early-stopping training state machine
//!
//! One attempt reinitializes the predictor from a derived seed and trains
//! epoch by epoch. After every epoch the candidate is scored; the best
//! candidate across all attempts wins. An attempt stops when its patience
//! runs out or its epoch budget is exhausted; the whole run stops early
//! when a no-validation convergence shortcut fires or the fine-tune phase
//! stops improving. A failed epoch abandons the attempt, counting against
//! the attempt budget; the controller moves on to the next attempt.

use super::{ProgressUpdate, TrainingConfig, REGRESSION_STOP_RMSE};
use crate::data::Dataset;
use crate::error::{EnsembraError, Result};
use crate::evaluate;
use crate::model::{Model, ModelInfo, NetworkModel};
use crate::network::{PredictorKind, TrainablePredictor};
use crate::stats::{ConfidenceMetric, ErrorStatistic, OutputTaskKind};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Snapshot of the winning candidate at some epoch
struct Candidate {
    predictor: PredictorKind,
    train_stat: ErrorStatistic,
    validation_stat: Option<ErrorStatistic>,
    metric: ConfidenceMetric,
}

/// Drives a trainable predictor to the best model a bounded budget allows
#[derive(Debug, Clone)]
pub struct TrainingController {
    config: TrainingConfig,
}

impl TrainingController {
    /// Create a controller, validating the configuration eagerly
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train without observing progress
    pub fn train(
        &self,
        name: &str,
        predictor: PredictorKind,
        train_data: &Dataset,
        validation: Option<&Dataset>,
    ) -> Result<Model> {
        self.train_with_progress(name, predictor, train_data, validation, |_| {})
    }

    /// Train, invoking `on_progress` synchronously after every epoch
    pub fn train_with_progress<F>(
        &self,
        name: &str,
        mut predictor: PredictorKind,
        train_data: &Dataset,
        validation: Option<&Dataset>,
        mut on_progress: F,
    ) -> Result<Model>
    where
        F: FnMut(&ProgressUpdate),
    {
        self.check_data(&predictor, train_data, validation)?;

        let task = predictor.task_kind();
        let max_epochs = self.config.max_epochs_per_attempt;
        let patience =
            (max_epochs as f64 * self.config.patience_ratio).ceil().max(1.0) as usize;

        let mut best: Option<Candidate> = None;
        let mut stop_all = false;

        'attempts: for attempt in 0..self.config.max_attempts {
            predictor.reinitialize(self.config.seed.wrapping_add(attempt as u64));

            let mut attempt_best: Option<ConfidenceMetric> = None;
            let mut last_improvement_epoch = 0usize;
            let mut fine_tuning = false;
            let mut deadline = max_epochs;
            let mut epoch = 0usize;

            while epoch < deadline {
                match predictor.run_epoch(train_data) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        warn!(attempt, epoch, error = %err, "epoch failed, abandoning attempt");
                        break;
                    }
                }
                epoch += 1;

                let train_stat = evaluate::error_statistic(
                    |input| Ok(predictor.compute(input)),
                    task,
                    train_data,
                )?;
                let validation_stat = validation
                    .map(|v| {
                        evaluate::error_statistic(|input| Ok(predictor.compute(input)), task, v)
                    })
                    .transpose()?;
                let metric = match &validation_stat {
                    Some(v) => ConfidenceMetric::from_validated(
                        &train_stat,
                        v,
                        self.config.validation_coeff,
                    )?,
                    None => ConfidenceMetric::from_training(&train_stat),
                };

                if attempt_best
                    .as_ref()
                    .map_or(true, |b| metric.compare(b) == Ordering::Greater)
                {
                    attempt_best = Some(metric.clone());
                    last_improvement_epoch = epoch;
                }

                let improved_global = best
                    .as_ref()
                    .map_or(true, |b| metric.compare(&b.metric) == Ordering::Greater);
                if improved_global {
                    debug!(attempt, epoch, cost = metric.cost(), "new best candidate");
                    best = Some(Candidate {
                        predictor: predictor.clone(),
                        train_stat: train_stat.clone(),
                        validation_stat: validation_stat.clone(),
                        metric: metric.clone(),
                    });
                } else if fine_tuning {
                    // The fine-tune phase ends the moment it stops paying off.
                    stop_all = true;
                }

                if validation.is_none() && converged_without_validation(task, &train_stat) {
                    stop_all = true;
                }

                if !stop_all && task.is_classification() && !fine_tuning {
                    let perfect = best
                        .as_ref()
                        .map_or(false, |b| b.metric.binary_accuracy() >= 1.0);
                    if perfect {
                        if self.config.fine_tune {
                            fine_tuning = true;
                            deadline = epoch + max_epochs;
                        } else {
                            stop_all = true;
                        }
                    }
                }

                let patience_exhausted = epoch - last_improvement_epoch >= patience;
                let stopping = stop_all || patience_exhausted || epoch >= deadline;

                let best_metric = match &best {
                    Some(b) => &b.metric,
                    None => &metric,
                };
                on_progress(&ProgressUpdate {
                    attempt,
                    total_attempts: self.config.max_attempts,
                    epoch,
                    total_epochs: deadline,
                    current: &metric,
                    best: best_metric,
                    stopping,
                });

                if stop_all {
                    break 'attempts;
                }
                if patience_exhausted {
                    debug!(attempt, epoch, "patience exhausted, stopping attempt");
                    break;
                }
            }
        }

        let candidate = best.ok_or_else(|| {
            EnsembraError::TrainingError(
                "no attempt completed a single training epoch".to_string(),
            )
        })?;

        Ok(Model::SingleNetwork(NetworkModel {
            info: ModelInfo {
                name: name.to_string(),
                task,
                output_names: default_output_names(train_data.target_width()),
                confidence: candidate.metric,
            },
            predictor: candidate.predictor,
            train_stat: candidate.train_stat,
            validation_stat: candidate.validation_stat,
        }))
    }

    fn check_data(
        &self,
        predictor: &PredictorKind,
        train_data: &Dataset,
        validation: Option<&Dataset>,
    ) -> Result<()> {
        if train_data.is_empty() {
            return Err(EnsembraError::DataError(
                "cannot train on an empty dataset".to_string(),
            ));
        }
        let expected = (predictor.input_count(), predictor.output_count());
        for data in std::iter::once(train_data).chain(validation) {
            if data.input_width() != expected.0 || data.target_width() != expected.1 {
                return Err(EnsembraError::ShapeError {
                    expected: format!("{}x{} samples", expected.0, expected.1),
                    actual: format!("{}x{} samples", data.input_width(), data.target_width()),
                });
            }
        }
        if validation.is_some_and(|v| v.is_empty()) {
            return Err(EnsembraError::DataError(
                "validation dataset is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a run with no held-out data has nothing left to learn
fn converged_without_validation(task: OutputTaskKind, train_stat: &ErrorStatistic) -> bool {
    match task {
        OutputTaskKind::Regression => train_stat.total_rms() < REGRESSION_STOP_RMSE,
        OutputTaskKind::Binary => train_stat.binary_accuracy() >= 1.0,
        OutputTaskKind::Categorical => train_stat.categorical_accuracy() >= 1.0,
    }
}

fn default_output_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("output-{}", i)).collect()
}
