//! Confidence metrics derived from error statistics
//!
//! A [`ConfidenceMetric`] condenses one (or two, when held-out validation
//! data is available) [`ErrorStatistic`]s into comparable trust scores: a
//! scalar cost, task accuracies and a per-output-feature confidence vector.
//! Blending with validation pools sums of squares and decision counts into
//! one weighted virtual sample pool; it never averages two already-computed
//! RMS values, which would be mathematically wrong.

use super::{DecisionCounts, ErrorStatistic, OutputTaskKind, RunningStat, EPSILON};
use crate::error::{EnsembraError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Scale applied to feature confidences of models trained without held-out
/// validation data, making validated models comparatively more attractive
/// during ensembling. A tunable compensation, not a bias correction.
pub const UNVALIDATED_PENALTY: f64 = 0.05;

/// Comparable trust scores for one finished model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceMetric {
    task: OutputTaskKind,
    /// RMS log-loss for decision tasks, RMSE for regression
    cost: f64,
    categorical_accuracy: f64,
    binary_accuracy: f64,
    feature_confidence: Vec<f64>,
    confidence_rms: f64,
    confidence_mean: f64,
    n_samples: usize,
}

/// RMS over a weighted pool of two sum-of-squares accumulators
fn pooled_rms(train: &RunningStat, validation: Option<(&RunningStat, f64)>) -> f64 {
    let (mut sum_sq, mut count) = (train.sum_sq, train.count as f64);
    if let Some((v, w)) = validation {
        sum_sq += w * v.sum_sq;
        count += w * v.count as f64;
    }
    if count == 0.0 {
        0.0
    } else {
        (sum_sq / count).sqrt()
    }
}

/// Weighted-pool ratio `numerator / denominator`, 0 when the pool is empty
fn pooled_ratio(train: (usize, usize), validation: Option<((usize, usize), f64)>) -> f64 {
    let (mut num, mut den) = (train.0 as f64, train.1 as f64);
    if let Some(((n, d), w)) = validation {
        num += w * n as f64;
        den += w * d as f64;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// F-score over a weighted pool of two decision-count sets
fn pooled_f_score(train: &DecisionCounts, validation: Option<(&DecisionCounts, f64)>) -> f64 {
    let (mut tp, mut fp, mut fn_) = (
        train.true_pos as f64,
        train.false_pos as f64,
        train.false_neg as f64,
    );
    if let Some((v, w)) = validation {
        tp += w * v.true_pos as f64;
        fp += w * v.false_pos as f64;
        fn_ += w * v.false_neg as f64;
    }
    let denom = 2.0 * tp + fp + fn_;
    if denom == 0.0 {
        0.0
    } else {
        2.0 * tp / denom
    }
}

fn summary(confidences: &[f64]) -> (f64, f64) {
    if confidences.is_empty() {
        return (0.0, 0.0);
    }
    let n = confidences.len() as f64;
    let mean = confidences.iter().sum::<f64>() / n;
    let rms = (confidences.iter().map(|c| c * c).sum::<f64>() / n).sqrt();
    (rms, mean)
}

impl ConfidenceMetric {
    /// Derive a metric from a training statistic alone.
    ///
    /// Feature confidences are scaled down by [`UNVALIDATED_PENALTY`].
    pub fn from_training(train: &ErrorStatistic) -> Self {
        let mut metric = Self::derive(train, None);
        for c in &mut metric.feature_confidence {
            *c *= 1.0 - UNVALIDATED_PENALTY;
        }
        let (rms, mean) = summary(&metric.feature_confidence);
        metric.confidence_rms = rms;
        metric.confidence_mean = mean;
        metric
    }

    /// Derive a metric from a training statistic blended with a validation
    /// statistic. The validation contribution is scaled by
    /// `coeff * (n_train / n_validation)`.
    pub fn from_validated(
        train: &ErrorStatistic,
        validation: &ErrorStatistic,
        coeff: f64,
    ) -> Result<Self> {
        if train.task_kind() != validation.task_kind()
            || train.feature_count() != validation.feature_count()
        {
            return Err(EnsembraError::ShapeError {
                expected: format!(
                    "{:?} statistic over {} features",
                    train.task_kind(),
                    train.feature_count()
                ),
                actual: format!(
                    "{:?} statistic over {} features",
                    validation.task_kind(),
                    validation.feature_count()
                ),
            });
        }
        if validation.n_samples() == 0 {
            return Err(EnsembraError::ConfigError(
                "validation statistic holds zero samples".to_string(),
            ));
        }
        if !(coeff > 0.0) {
            return Err(EnsembraError::InvalidParameter {
                name: "coeff".to_string(),
                value: coeff.to_string(),
                reason: "validation weight coefficient must be positive".to_string(),
            });
        }
        let weight = coeff * train.n_samples() as f64 / validation.n_samples() as f64;
        Ok(Self::derive(train, Some((validation, weight))))
    }

    fn derive(train: &ErrorStatistic, validation: Option<(&ErrorStatistic, f64)>) -> Self {
        let n_features = train.feature_count();
        let n_samples =
            train.n_samples() + validation.map_or(0, |(v, _)| v.n_samples());

        let (cost, categorical_accuracy, binary_accuracy, feature_confidence) =
            match train {
                ErrorStatistic::Regression(t) => {
                    let v = validation.map(|(v, w)| match v {
                        ErrorStatistic::Regression(v) => (v, w),
                        _ => unreachable!("variants checked by caller"),
                    });
                    let cost = pooled_rms(&t.total, v.map(|(v, w)| (&v.total, w)));
                    let confidences: Vec<f64> = (0..n_features)
                        .map(|i| {
                            let feature = &t.features[i];
                            let pooled =
                                pooled_rms(feature, v.map(|(v, w)| (&v.features[i], w)));
                            let count = feature.count
                                + v.map_or(0, |(v, _)| v.features[i].count);
                            if count == 0 {
                                0.0
                            } else {
                                1.0 / (EPSILON + pooled)
                            }
                        })
                        .collect();
                    (cost, 0.0, 0.0, confidences)
                }
                ErrorStatistic::Binary(t) => {
                    let v = validation.map(|(v, w)| match v {
                        ErrorStatistic::Binary(v) => (v, w),
                        _ => unreachable!("variants checked by caller"),
                    });
                    let cost = pooled_rms(&t.log_loss, v.map(|(v, w)| (&v.log_loss, w)));
                    let right = |d: &[DecisionCounts]| {
                        (
                            d.iter().map(DecisionCounts::right).sum::<usize>(),
                            d.iter().map(DecisionCounts::total).sum::<usize>(),
                        )
                    };
                    let accuracy = pooled_ratio(
                        right(&t.decisions),
                        v.map(|(v, w)| (right(&v.decisions), w)),
                    );
                    let confidences: Vec<f64> = (0..n_features)
                        .map(|i| {
                            pooled_f_score(
                                &t.decisions[i],
                                v.map(|(v, w)| (&v.decisions[i], w)),
                            )
                        })
                        .collect();
                    (cost, accuracy, accuracy, confidences)
                }
                ErrorStatistic::Categorical(t) => {
                    let v = validation.map(|(v, w)| match v {
                        ErrorStatistic::Categorical(v) => (v, w),
                        _ => unreachable!("variants checked by caller"),
                    });
                    let cost = pooled_rms(&t.log_loss, v.map(|(v, w)| (&v.log_loss, w)));
                    let categorical = pooled_ratio(
                        (t.n_samples - t.wrong, t.n_samples),
                        v.map(|(v, w)| ((v.n_samples - v.wrong, v.n_samples), w)),
                    );
                    let right = |d: &[DecisionCounts]| {
                        (
                            d.iter().map(DecisionCounts::right).sum::<usize>(),
                            d.iter().map(DecisionCounts::total).sum::<usize>(),
                        )
                    };
                    let binary = pooled_ratio(
                        right(&t.feature_decisions),
                        v.map(|(v, w)| (right(&v.feature_decisions), w)),
                    );
                    let confidences: Vec<f64> = (0..n_features)
                        .map(|i| {
                            pooled_f_score(
                                &t.class_decisions[i],
                                v.map(|(v, w)| (&v.class_decisions[i], w)),
                            )
                        })
                        .collect();
                    (cost, categorical, binary, confidences)
                }
            };

        let (confidence_rms, confidence_mean) = summary(&feature_confidence);
        Self {
            task: train.task_kind(),
            cost,
            categorical_accuracy,
            binary_accuracy,
            feature_confidence,
            confidence_rms,
            confidence_mean,
            n_samples,
        }
    }

    /// Combine child metrics by a sample-count-weighted average of every
    /// scalar field and every feature-confidence entry independently.
    pub fn merged(children: &[ConfidenceMetric]) -> Result<Self> {
        let first = children.first().ok_or_else(|| {
            EnsembraError::ConfigError("cannot merge zero confidence metrics".to_string())
        })?;
        for child in children {
            if child.task != first.task
                || child.feature_confidence.len() != first.feature_confidence.len()
            {
                return Err(EnsembraError::ShapeError {
                    expected: format!(
                        "{:?} metric over {} features",
                        first.task,
                        first.feature_confidence.len()
                    ),
                    actual: format!(
                        "{:?} metric over {} features",
                        child.task,
                        child.feature_confidence.len()
                    ),
                });
            }
        }

        let total: usize = children.iter().map(|c| c.n_samples).sum();
        // Zero-sample children degenerate to an equal-weight average.
        let weight = |c: &ConfidenceMetric| {
            if total == 0 {
                1.0 / children.len() as f64
            } else {
                c.n_samples as f64 / total as f64
            }
        };

        let mut cost = 0.0;
        let mut categorical_accuracy = 0.0;
        let mut binary_accuracy = 0.0;
        let mut feature_confidence = vec![0.0; first.feature_confidence.len()];
        for child in children {
            let w = weight(child);
            cost += w * child.cost;
            categorical_accuracy += w * child.categorical_accuracy;
            binary_accuracy += w * child.binary_accuracy;
            for (acc, &c) in feature_confidence.iter_mut().zip(&child.feature_confidence) {
                *acc += w * c;
            }
        }

        let (confidence_rms, confidence_mean) = summary(&feature_confidence);
        Ok(Self {
            task: first.task,
            cost,
            categorical_accuracy,
            binary_accuracy,
            feature_confidence,
            confidence_rms,
            confidence_mean,
            n_samples: total,
        })
    }

    /// Strict weak ordering over metrics of the same task kind.
    /// `Ordering::Greater` means `self` is the better metric.
    pub fn compare(&self, other: &ConfidenceMetric) -> Ordering {
        match self.task {
            OutputTaskKind::Categorical => self
                .categorical_accuracy
                .total_cmp(&other.categorical_accuracy)
                .then_with(|| self.binary_accuracy.total_cmp(&other.binary_accuracy))
                .then_with(|| self.tail_compare(other)),
            OutputTaskKind::Binary => self
                .binary_accuracy
                .total_cmp(&other.binary_accuracy)
                .then_with(|| self.tail_compare(other)),
            OutputTaskKind::Regression => self.tail_compare(other),
        }
    }

    fn tail_compare(&self, other: &ConfidenceMetric) -> Ordering {
        self.confidence_rms
            .total_cmp(&other.confidence_rms)
            .then_with(|| other.cost.total_cmp(&self.cost))
    }

    /// Task kind the metric was derived for
    pub fn task_kind(&self) -> OutputTaskKind {
        self.task
    }

    /// Scalar cost: RMS log-loss for decision tasks, RMSE for regression
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Fraction of correct classifications
    pub fn categorical_accuracy(&self) -> f64 {
        self.categorical_accuracy
    }

    /// Fraction of correct thresholded feature decisions
    pub fn binary_accuracy(&self) -> f64 {
        self.binary_accuracy
    }

    /// Per-output-feature confidence vector
    pub fn feature_confidence(&self) -> &[f64] {
        &self.feature_confidence
    }

    /// RMS of the feature-confidence vector
    pub fn confidence_rms(&self) -> f64 {
        self.confidence_rms
    }

    /// Mean of the feature-confidence vector
    pub fn confidence_mean(&self) -> f64 {
        self.confidence_mean
    }

    /// Number of samples that contributed to this metric
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn stat_from(task: OutputTaskKind, pairs: &[(&[f64], &[f64])]) -> ErrorStatistic {
        let n = pairs[0].0.len();
        let mut stat = ErrorStatistic::new(task, n);
        for (c, i) in pairs {
            stat.update(arr1(c).view(), arr1(i).view()).unwrap();
        }
        stat
    }

    #[test]
    fn test_unvalidated_penalty_applied_to_features_only() {
        let stat = stat_from(
            OutputTaskKind::Binary,
            &[(&[0.9], &[1.0]), (&[0.1], &[0.0])],
        );
        let metric = ConfidenceMetric::from_training(&stat);
        let raw = stat.feature_confidence(0);
        assert_abs_diff_eq!(
            metric.feature_confidence()[0],
            raw * (1.0 - UNVALIDATED_PENALTY),
            epsilon = 1e-12
        );
        // Scalar cost is read directly off the statistic.
        assert_abs_diff_eq!(metric.cost(), stat.log_loss_rms(), epsilon = 1e-12);
    }

    #[test]
    fn test_blended_cost_equals_pooled_rms() {
        // With coeff = 1 and equal sample counts the blend must equal the
        // RMS over the union of both sample pools.
        let train_pairs: Vec<(&[f64], &[f64])> =
            vec![(&[1.0], &[3.0]), (&[2.0], &[2.5])];
        let val_pairs: Vec<(&[f64], &[f64])> =
            vec![(&[0.0], &[1.0]), (&[4.0], &[4.5])];

        let train = stat_from(OutputTaskKind::Regression, &train_pairs);
        let val = stat_from(OutputTaskKind::Regression, &val_pairs);
        let metric = ConfidenceMetric::from_validated(&train, &val, 1.0).unwrap();

        let all: Vec<(&[f64], &[f64])> = train_pairs
            .iter()
            .chain(val_pairs.iter())
            .cloned()
            .collect();
        let pooled = stat_from(OutputTaskKind::Regression, &all);

        assert_abs_diff_eq!(metric.cost(), pooled.total_rms(), epsilon = 1e-12);
        // The naive average of the two RMS values differs; guard against
        // someone "simplifying" the blend back to it.
        let naive = (train.total_rms() + val.total_rms()) / 2.0;
        assert!((metric.cost() - naive).abs() > 1e-6);
    }

    #[test]
    fn test_validated_requires_matching_stats() {
        let train = stat_from(OutputTaskKind::Regression, &[(&[1.0], &[2.0])]);
        let val = stat_from(OutputTaskKind::Binary, &[(&[0.9], &[1.0])]);
        assert!(ConfidenceMetric::from_validated(&train, &val, 1.0).is_err());

        let val = stat_from(OutputTaskKind::Regression, &[(&[1.0], &[2.0])]);
        assert!(ConfidenceMetric::from_validated(&train, &val, 0.0).is_err());
    }

    #[test]
    fn test_compare_prefers_higher_accuracy() {
        let good = stat_from(
            OutputTaskKind::Binary,
            &[(&[0.9], &[1.0]), (&[0.1], &[0.0])],
        );
        let bad = stat_from(
            OutputTaskKind::Binary,
            &[(&[0.2], &[1.0]), (&[0.1], &[0.0])],
        );
        let a = ConfidenceMetric::from_training(&good);
        let b = ConfidenceMetric::from_training(&bad);
        assert_eq!(a.compare(&b), Ordering::Greater);
        assert_eq!(b.compare(&a), Ordering::Less);
        assert_eq!(a.compare(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_regression_compare_uses_cost_tail() {
        let tight = stat_from(OutputTaskKind::Regression, &[(&[1.0], &[1.1])]);
        let loose = stat_from(OutputTaskKind::Regression, &[(&[1.0], &[3.0])]);
        let a = ConfidenceMetric::from_training(&tight);
        let b = ConfidenceMetric::from_training(&loose);
        assert_eq!(a.compare(&b), Ordering::Greater);
    }

    #[test]
    fn test_merged_weights_by_sample_count() {
        let small = stat_from(OutputTaskKind::Regression, &[(&[1.0], &[2.0])]);
        let large = stat_from(
            OutputTaskKind::Regression,
            &[
                (&[1.0], &[1.0]),
                (&[2.0], &[2.0]),
                (&[3.0], &[3.0]),
            ],
        );
        let a = ConfidenceMetric::from_training(&small);
        let b = ConfidenceMetric::from_training(&large);
        let merged = ConfidenceMetric::merged(&[a.clone(), b.clone()]).unwrap();

        assert_eq!(merged.n_samples(), 4);
        let expected = 0.25 * a.cost() + 0.75 * b.cost();
        assert_abs_diff_eq!(merged.cost(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_merged_rejects_mismatched_children() {
        let a = ConfidenceMetric::from_training(&stat_from(
            OutputTaskKind::Regression,
            &[(&[1.0], &[2.0])],
        ));
        let b = ConfidenceMetric::from_training(&stat_from(
            OutputTaskKind::Binary,
            &[(&[0.9], &[1.0])],
        ));
        assert!(ConfidenceMetric::merged(&[a, b]).is_err());
        assert!(ConfidenceMetric::merged(&[]).is_err());
    }
}
