//! Weighted aggregation of member outputs
//!
//! Shared by every ensemble variant. Regression features take a
//! weight-normalized average. Decision features mix member probabilities in
//! logit space - linear averaging of probabilities biases the mixture
//! toward overconfident members and is deliberately avoided. Categorical
//! outputs are rescaled afterwards so the class probabilities sum to 1.

use crate::error::{EnsembraError, Result};
use crate::stats::{OutputTaskKind, EPSILON};
use ndarray::{Array1, Array2};

/// Mix predicted probabilities with normalized weights in logit space.
///
/// Equivalent to a weighted geometric mean of the odds; weights must sum
/// to 1. Inputs are clamped away from 0 and 1 before the logit.
pub fn mix_probabilities(probabilities: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(probabilities.len(), weights.len());
    let logit: f64 = probabilities
        .iter()
        .zip(weights)
        .map(|(&p, &w)| {
            let p = p.clamp(EPSILON, 1.0 - EPSILON);
            w * (p / (1.0 - p)).ln()
        })
        .sum();
    1.0 / (1.0 + (-logit).exp())
}

/// Combine member output vectors into one, weighting each output feature by
/// the per-member, per-feature weight matrix (members x features).
pub fn aggregate(
    task: OutputTaskKind,
    outputs: &[Array1<f64>],
    weights: &Array2<f64>,
) -> Result<Array1<f64>> {
    let n_members = outputs.len();
    if n_members == 0 {
        return Err(EnsembraError::ConfigError(
            "cannot aggregate zero member outputs".to_string(),
        ));
    }
    let n_features = outputs[0].len();
    if outputs.iter().any(|o| o.len() != n_features) {
        return Err(EnsembraError::ShapeError {
            expected: format!("{} output features per member", n_features),
            actual: "members with differing output widths".to_string(),
        });
    }
    if weights.nrows() != n_members || weights.ncols() != n_features {
        return Err(EnsembraError::ShapeError {
            expected: format!("{}x{} weight matrix", n_members, n_features),
            actual: format!("{}x{} weight matrix", weights.nrows(), weights.ncols()),
        });
    }

    let mut combined = Array1::zeros(n_features);
    for feature in 0..n_features {
        let raw: Vec<f64> = (0..n_members).map(|m| weights[[m, feature]]).collect();
        let total: f64 = raw.iter().sum();
        // A zero-weight column degenerates to an equal-weight mixture.
        let normalized: Vec<f64> = if total > 0.0 {
            raw.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / n_members as f64; n_members]
        };

        let member_values: Vec<f64> = outputs.iter().map(|o| o[feature]).collect();
        combined[feature] = match task {
            OutputTaskKind::Regression => member_values
                .iter()
                .zip(&normalized)
                .map(|(&v, &w)| w * v)
                .sum(),
            OutputTaskKind::Binary | OutputTaskKind::Categorical => {
                mix_probabilities(&member_values, &normalized)
            }
        };
    }

    if task == OutputTaskKind::Categorical {
        let total = combined.sum();
        if total > 0.0 {
            combined /= total;
        } else {
            combined.fill(1.0 / n_features as f64);
        }
    }

    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_regression_weighted_average() {
        let outputs = vec![arr1(&[1.0, 10.0]), arr1(&[3.0, 20.0])];
        let weights = arr2(&[[1.0, 1.0], [3.0, 3.0]]);
        let combined = aggregate(OutputTaskKind::Regression, &outputs, &weights).unwrap();
        assert_abs_diff_eq!(combined[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(combined[1], 17.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_weights_fall_back_to_equal_mix() {
        let outputs = vec![arr1(&[1.0]), arr1(&[3.0])];
        let weights = arr2(&[[0.0], [0.0]]);
        let combined = aggregate(OutputTaskKind::Regression, &outputs, &weights).unwrap();
        assert_abs_diff_eq!(combined[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_probability_mixing_is_not_linear_average() {
        let mixed = mix_probabilities(&[0.9, 0.5], &[0.5, 0.5]);
        assert!(mixed > 0.5 && mixed < 0.9);
        assert!((mixed - 0.7).abs() > 1e-3);
    }

    #[test]
    fn test_mixing_identity_for_single_member() {
        let mixed = mix_probabilities(&[0.73], &[1.0]);
        assert_abs_diff_eq!(mixed, 0.73, epsilon = 1e-9);
    }

    #[test]
    fn test_mixing_handles_extreme_probabilities() {
        let mixed = mix_probabilities(&[0.0, 1.0], &[0.5, 0.5]);
        assert!(mixed.is_finite());
        assert!((0.0..=1.0).contains(&mixed));
    }

    #[test]
    fn test_categorical_outputs_sum_to_one() {
        let outputs = vec![arr1(&[0.7, 0.2, 0.1]), arr1(&[0.3, 0.4, 0.3])];
        // Wildly different weight scales must not affect the normalization.
        let weights = arr2(&[[100.0, 100.0, 100.0], [0.001, 0.001, 0.001]]);
        let combined = aggregate(OutputTaskKind::Categorical, &outputs, &weights).unwrap();
        assert_abs_diff_eq!(combined.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mismatched_member_widths_fail() {
        let outputs = vec![arr1(&[0.5, 0.5]), arr1(&[0.5])];
        let weights = arr2(&[[1.0, 1.0], [1.0, 1.0]]);
        assert!(aggregate(OutputTaskKind::Binary, &outputs, &weights).is_err());
    }

    #[test]
    fn test_mismatched_weight_shape_fails() {
        let outputs = vec![arr1(&[0.5])];
        let weights = arr2(&[[1.0], [1.0]]);
        assert!(aggregate(OutputTaskKind::Binary, &outputs, &weights).is_err());
    }
}
