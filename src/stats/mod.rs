//! Error statistics over predictions
//!
//! Provides the task-specific accumulators that score a predictor against a
//! dataset:
//! - [`RegressionStat`] - absolute-error precision statistics
//! - [`BinaryStat`] - per-feature decision counts plus log-loss
//! - [`CategoricalStat`] - arg-max classification counts plus log-loss
//!
//! All three are carried behind the closed [`ErrorStatistic`] variant type.
//! `merge` is associative and order-independent, which is what allows
//! parallel workers to accumulate private partitions and fold them into one
//! aggregate at the end.

mod confidence;

pub use confidence::{ConfidenceMetric, UNVALIDATED_PENALTY};

use crate::error::{EnsembraError, Result};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Decision border separating "positive" from "negative" outputs
pub const DECISION_BORDER: f64 = 0.5;

/// Probabilities are clamped to `[EPSILON, 1 - EPSILON]` before taking logs
pub const EPSILON: f64 = 1e-8;

/// Kind of supervised task an output vector represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputTaskKind {
    /// Continuous outputs scored by absolute error
    Regression,
    /// Independent 0/1 decisions per output feature
    Binary,
    /// One-hot class outputs scored by arg-max
    Categorical,
}

impl OutputTaskKind {
    /// Whether the task produces decisions rather than continuous values
    pub fn is_classification(&self) -> bool {
        matches!(self, OutputTaskKind::Binary | OutputTaskKind::Categorical)
    }
}

/// Running statistic of a scalar stream: count, sum, sum of squares, min, max
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningStat {
    pub(crate) count: usize,
    pub(crate) sum: f64,
    pub(crate) sum_sq: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl Default for RunningStat {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStat {
    /// Empty statistic
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Record one value
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Fold another statistic into this one
    pub fn merge(&mut self, other: &RunningStat) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Number of recorded values
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of the recorded values, 0 for the empty statistic
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Root mean square of the recorded values, 0 for the empty statistic
    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    /// Smallest recorded value, if any
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest recorded value, if any
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// Right/wrong decision counts for one output feature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub(crate) true_pos: usize,
    pub(crate) false_pos: usize,
    pub(crate) false_neg: usize,
    pub(crate) true_neg: usize,
}

impl DecisionCounts {
    /// Record one thresholded decision against its ideal
    pub fn record(&mut self, predicted_positive: bool, ideal_positive: bool) {
        match (ideal_positive, predicted_positive) {
            (true, true) => self.true_pos += 1,
            (false, true) => self.false_pos += 1,
            (true, false) => self.false_neg += 1,
            (false, false) => self.true_neg += 1,
        }
    }

    /// Fold another count set into this one
    pub fn merge(&mut self, other: &DecisionCounts) {
        self.true_pos += other.true_pos;
        self.false_pos += other.false_pos;
        self.false_neg += other.false_neg;
        self.true_neg += other.true_neg;
    }

    /// Correct decisions
    pub fn right(&self) -> usize {
        self.true_pos + self.true_neg
    }

    /// Incorrect decisions
    pub fn wrong(&self) -> usize {
        self.false_pos + self.false_neg
    }

    /// Total decisions recorded
    pub fn total(&self) -> usize {
        self.right() + self.wrong()
    }

    /// Harmonic mean of precision and recall, 0 for the degenerate cases
    pub fn f_score(&self) -> f64 {
        let denom = 2 * self.true_pos + self.false_pos + self.false_neg;
        if denom == 0 {
            0.0
        } else {
            2.0 * self.true_pos as f64 / denom as f64
        }
    }
}

/// Precision statistics for a regression task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionStat {
    pub(crate) features: Vec<RunningStat>,
    pub(crate) total: RunningStat,
    pub(crate) n_samples: usize,
}

impl RegressionStat {
    fn new(n_features: usize) -> Self {
        Self {
            features: (0..n_features).map(|_| RunningStat::new()).collect(),
            total: RunningStat::new(),
            n_samples: 0,
        }
    }
}

/// Decision statistics for a binary task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryStat {
    pub(crate) errors: Vec<RunningStat>,
    pub(crate) total_error: RunningStat,
    pub(crate) decisions: Vec<DecisionCounts>,
    pub(crate) log_loss: RunningStat,
    pub(crate) n_samples: usize,
}

impl BinaryStat {
    fn new(n_features: usize) -> Self {
        Self {
            errors: (0..n_features).map(|_| RunningStat::new()).collect(),
            total_error: RunningStat::new(),
            decisions: (0..n_features).map(|_| DecisionCounts::default()).collect(),
            log_loss: RunningStat::new(),
            n_samples: 0,
        }
    }
}

/// Classification statistics for a categorical (one-hot) task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalStat {
    pub(crate) errors: Vec<RunningStat>,
    pub(crate) total_error: RunningStat,
    /// Thresholded per-feature decisions, the binary view of the task
    pub(crate) feature_decisions: Vec<DecisionCounts>,
    /// Arg-max attribution per class, used for feature confidence
    pub(crate) class_decisions: Vec<DecisionCounts>,
    pub(crate) log_loss: RunningStat,
    pub(crate) n_samples: usize,
    pub(crate) wrong: usize,
    /// Correct classifications whose winning probability fell below the border
    pub(crate) low_confidence_correct: usize,
}

impl CategoricalStat {
    fn new(n_features: usize) -> Self {
        Self {
            errors: (0..n_features).map(|_| RunningStat::new()).collect(),
            total_error: RunningStat::new(),
            feature_decisions: (0..n_features).map(|_| DecisionCounts::default()).collect(),
            class_decisions: (0..n_features).map(|_| DecisionCounts::default()).collect(),
            log_loss: RunningStat::new(),
            n_samples: 0,
            wrong: 0,
            low_confidence_correct: 0,
        }
    }
}

/// Task-specific accumulated prediction error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ErrorStatistic {
    Regression(RegressionStat),
    Binary(BinaryStat),
    Categorical(CategoricalStat),
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

/// Index of the arg-max entry, or `None` when more than one entry attains it
fn unique_argmax(values: ArrayView1<f64>) -> Option<usize> {
    let mut best_idx = 0;
    let mut best = f64::NEG_INFINITY;
    let mut ties = 0;
    for (idx, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            best_idx = idx;
            ties = 1;
        } else if v == best {
            ties += 1;
        }
    }
    (ties == 1).then_some(best_idx)
}

impl ErrorStatistic {
    /// Create an empty statistic for a task over `n_features` output features
    pub fn new(task: OutputTaskKind, n_features: usize) -> Self {
        match task {
            OutputTaskKind::Regression => ErrorStatistic::Regression(RegressionStat::new(n_features)),
            OutputTaskKind::Binary => ErrorStatistic::Binary(BinaryStat::new(n_features)),
            OutputTaskKind::Categorical => {
                ErrorStatistic::Categorical(CategoricalStat::new(n_features))
            }
        }
    }

    /// Task kind this statistic accumulates for
    pub fn task_kind(&self) -> OutputTaskKind {
        match self {
            ErrorStatistic::Regression(_) => OutputTaskKind::Regression,
            ErrorStatistic::Binary(_) => OutputTaskKind::Binary,
            ErrorStatistic::Categorical(_) => OutputTaskKind::Categorical,
        }
    }

    /// Number of output features
    pub fn feature_count(&self) -> usize {
        match self {
            ErrorStatistic::Regression(s) => s.features.len(),
            ErrorStatistic::Binary(s) => s.errors.len(),
            ErrorStatistic::Categorical(s) => s.errors.len(),
        }
    }

    /// Number of samples recorded so far
    pub fn n_samples(&self) -> usize {
        match self {
            ErrorStatistic::Regression(s) => s.n_samples,
            ErrorStatistic::Binary(s) => s.n_samples,
            ErrorStatistic::Categorical(s) => s.n_samples,
        }
    }

    fn check_widths(&self, computed: ArrayView1<f64>, ideal: ArrayView1<f64>) -> Result<()> {
        let n = self.feature_count();
        if computed.len() != n || ideal.len() != n {
            return Err(EnsembraError::ShapeError {
                expected: format!("{} output features", n),
                actual: format!("computed {}, ideal {}", computed.len(), ideal.len()),
            });
        }
        Ok(())
    }

    /// Record one sample's computed output against its ideal output
    pub fn update(&mut self, computed: ArrayView1<f64>, ideal: ArrayView1<f64>) -> Result<()> {
        self.check_widths(computed, ideal)?;
        match self {
            ErrorStatistic::Regression(s) => {
                for (idx, (c, i)) in computed.iter().zip(ideal.iter()).enumerate() {
                    let err = (i - c).abs();
                    s.features[idx].update(err);
                    s.total.update(err);
                }
                s.n_samples += 1;
            }
            ErrorStatistic::Binary(s) => {
                for (idx, (&c, &i)) in computed.iter().zip(ideal.iter()).enumerate() {
                    let err = (i - c).abs();
                    s.errors[idx].update(err);
                    s.total_error.update(err);

                    let predicted = c > DECISION_BORDER;
                    let expected = i > DECISION_BORDER;
                    s.decisions[idx].record(predicted, expected);

                    // Probability assigned to the direction the ideal points
                    let p = if expected { c } else { 1.0 - c };
                    s.log_loss.update(-clamp_probability(p).ln());
                }
                s.n_samples += 1;
            }
            ErrorStatistic::Categorical(s) => {
                for (idx, (&c, &i)) in computed.iter().zip(ideal.iter()).enumerate() {
                    let err = (i - c).abs();
                    s.errors[idx].update(err);
                    s.total_error.update(err);
                    s.feature_decisions[idx].record(c > DECISION_BORDER, i > DECISION_BORDER);
                }

                let true_class = unique_argmax(ideal).ok_or_else(|| {
                    EnsembraError::DataError(
                        "categorical ideal vector has no unique arg-max class".to_string(),
                    )
                })?;
                s.log_loss.update(-clamp_probability(computed[true_class]).ln());

                // A tie at the maximum counts as a wrong classification
                // regardless of which class the ideal names.
                match unique_argmax(computed) {
                    Some(predicted) if predicted == true_class => {
                        s.class_decisions[true_class].record(true, true);
                        if computed[predicted] < DECISION_BORDER {
                            s.low_confidence_correct += 1;
                        }
                    }
                    Some(predicted) => {
                        s.class_decisions[predicted].record(true, false);
                        s.class_decisions[true_class].record(false, true);
                        s.wrong += 1;
                    }
                    None => {
                        s.class_decisions[true_class].record(false, true);
                        s.wrong += 1;
                    }
                }
                s.n_samples += 1;
            }
        }
        Ok(())
    }

    /// Single-value update, valid only for one-feature statistics
    pub fn update_single(&mut self, computed: f64, ideal: f64) -> Result<()> {
        if self.feature_count() != 1 {
            return Err(EnsembraError::Unsupported(format!(
                "single-value update on a statistic with {} output features",
                self.feature_count()
            )));
        }
        let c = ndarray::arr1(&[computed]);
        let i = ndarray::arr1(&[ideal]);
        self.update(c.view(), i.view())
    }

    /// Combine a statistic accumulated over a disjoint sample set.
    ///
    /// Associative and order-independent: merging partitions yields the same
    /// aggregate as updating one instance with every sample.
    pub fn merge(&mut self, other: &ErrorStatistic) -> Result<()> {
        if self.task_kind() != other.task_kind() {
            return Err(EnsembraError::ShapeError {
                expected: format!("{:?} statistic", self.task_kind()),
                actual: format!("{:?} statistic", other.task_kind()),
            });
        }
        if self.feature_count() != other.feature_count() {
            return Err(EnsembraError::ShapeError {
                expected: format!("{} output features", self.feature_count()),
                actual: format!("{} output features", other.feature_count()),
            });
        }
        match (self, other) {
            (ErrorStatistic::Regression(a), ErrorStatistic::Regression(b)) => {
                for (fa, fb) in a.features.iter_mut().zip(b.features.iter()) {
                    fa.merge(fb);
                }
                a.total.merge(&b.total);
                a.n_samples += b.n_samples;
            }
            (ErrorStatistic::Binary(a), ErrorStatistic::Binary(b)) => {
                for (fa, fb) in a.errors.iter_mut().zip(b.errors.iter()) {
                    fa.merge(fb);
                }
                for (da, db) in a.decisions.iter_mut().zip(b.decisions.iter()) {
                    da.merge(db);
                }
                a.total_error.merge(&b.total_error);
                a.log_loss.merge(&b.log_loss);
                a.n_samples += b.n_samples;
            }
            (ErrorStatistic::Categorical(a), ErrorStatistic::Categorical(b)) => {
                for (fa, fb) in a.errors.iter_mut().zip(b.errors.iter()) {
                    fa.merge(fb);
                }
                for (da, db) in a.feature_decisions.iter_mut().zip(b.feature_decisions.iter()) {
                    da.merge(db);
                }
                for (da, db) in a.class_decisions.iter_mut().zip(b.class_decisions.iter()) {
                    da.merge(db);
                }
                a.total_error.merge(&b.total_error);
                a.log_loss.merge(&b.log_loss);
                a.n_samples += b.n_samples;
                a.wrong += b.wrong;
                a.low_confidence_correct += b.low_confidence_correct;
            }
            _ => unreachable!("task kinds checked above"),
        }
        Ok(())
    }

    /// Root mean square of all accumulated absolute errors
    pub fn total_rms(&self) -> f64 {
        match self {
            ErrorStatistic::Regression(s) => s.total.rms(),
            ErrorStatistic::Binary(s) => s.total_error.rms(),
            ErrorStatistic::Categorical(s) => s.total_error.rms(),
        }
    }

    /// Root mean square of the accumulated log-loss, 0 for regression
    pub fn log_loss_rms(&self) -> f64 {
        match self {
            ErrorStatistic::Regression(_) => 0.0,
            ErrorStatistic::Binary(s) => s.log_loss.rms(),
            ErrorStatistic::Categorical(s) => s.log_loss.rms(),
        }
    }

    /// Total wrong decisions (per-feature for binary, per-sample for categorical)
    pub fn wrong_decisions(&self) -> usize {
        match self {
            ErrorStatistic::Regression(_) => 0,
            ErrorStatistic::Binary(s) => s.decisions.iter().map(DecisionCounts::wrong).sum(),
            ErrorStatistic::Categorical(s) => s.wrong,
        }
    }

    /// Fraction of correct thresholded feature decisions, 0 for regression
    pub fn binary_accuracy(&self) -> f64 {
        let (right, total) = match self {
            ErrorStatistic::Regression(_) => return 0.0,
            ErrorStatistic::Binary(s) => (
                s.decisions.iter().map(DecisionCounts::right).sum::<usize>(),
                s.decisions.iter().map(DecisionCounts::total).sum::<usize>(),
            ),
            ErrorStatistic::Categorical(s) => (
                s.feature_decisions.iter().map(DecisionCounts::right).sum::<usize>(),
                s.feature_decisions.iter().map(DecisionCounts::total).sum::<usize>(),
            ),
        };
        if total == 0 {
            0.0
        } else {
            right as f64 / total as f64
        }
    }

    /// Fraction of correct classifications; for binary this equals binary accuracy
    pub fn categorical_accuracy(&self) -> f64 {
        match self {
            ErrorStatistic::Regression(_) => 0.0,
            ErrorStatistic::Binary(_) => self.binary_accuracy(),
            ErrorStatistic::Categorical(s) => {
                if s.n_samples == 0 {
                    0.0
                } else {
                    (s.n_samples - s.wrong) as f64 / s.n_samples as f64
                }
            }
        }
    }

    /// Correct classifications made with a winning probability below the border
    pub fn low_confidence_correct(&self) -> usize {
        match self {
            ErrorStatistic::Categorical(s) => s.low_confidence_correct,
            _ => 0,
        }
    }

    /// Deterministic "strictly better" comparison between statistics of the
    /// same variant. Ties are exact; no epsilon is applied, because equal
    /// code paths produce bitwise-equal aggregates.
    pub fn is_better(&self, other: &ErrorStatistic) -> bool {
        match (self, other) {
            (ErrorStatistic::Regression(_), ErrorStatistic::Regression(_)) => {
                self.total_rms() < other.total_rms()
            }
            (ErrorStatistic::Binary(_), ErrorStatistic::Binary(_)) => {
                let (a, b) = (self.wrong_decisions(), other.wrong_decisions());
                if a != b {
                    return a < b;
                }
                self.log_loss_rms() < other.log_loss_rms()
            }
            (ErrorStatistic::Categorical(_), ErrorStatistic::Categorical(_)) => {
                let (a, b) = (self.wrong_decisions(), other.wrong_decisions());
                if a != b {
                    return a < b;
                }
                let (a, b) = (self.low_confidence_correct(), other.low_confidence_correct());
                if a != b {
                    return a < b;
                }
                self.log_loss_rms() < other.log_loss_rms()
            }
            _ => false,
        }
    }

    /// Confidence in one output feature, finite and non-negative.
    ///
    /// Regression features use `1 / (epsilon + rmse)`; decision features use
    /// the F-score of their right/wrong counts. Zero-sample features yield 0.
    pub fn feature_confidence(&self, feature_idx: usize) -> f64 {
        match self {
            ErrorStatistic::Regression(s) => {
                let stat = &s.features[feature_idx];
                if stat.count() == 0 {
                    0.0
                } else {
                    1.0 / (EPSILON + stat.rms())
                }
            }
            ErrorStatistic::Binary(s) => s.decisions[feature_idx].f_score(),
            ErrorStatistic::Categorical(s) => s.class_decisions[feature_idx].f_score(),
        }
    }

    /// Confidence vector over all output features
    pub fn feature_confidences(&self) -> Vec<f64> {
        (0..self.feature_count())
            .map(|idx| self.feature_confidence(idx))
            .collect()
    }
}
