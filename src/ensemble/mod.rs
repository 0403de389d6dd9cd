//! Confidence-weighted ensemble construction
//!
//! Three builders produce composite models out of many training runs:
//! - [`KFoldBuilder`] - bagging over a fold split, every member validated
//!   on its own held-out fold
//! - [`StackingBuilder`] - stacked generalization with fold-wise held-out
//!   meta features
//! - [`HalvedStackBuilder`] - stacking over a two-way data split
//!
//! All variants combine member outputs through [`aggregate`].

pub mod aggregate;

mod kfold;
mod stacking;

pub use kfold::{KFoldBuilder, KFoldConfig};
pub use stacking::{
    meta_input_width, HalvedStackBuilder, HalvedStackConfig, StackingBuilder, StackingConfig,
};

pub(crate) use stacking::stack_meta_dataset;

/// Fold count implied by a hold-out ratio, never below two
pub(crate) fn n_folds_for_ratio(ratio: f64) -> usize {
    ((1.0 / ratio).round() as usize).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_count_from_ratio() {
        assert_eq!(n_folds_for_ratio(0.5), 2);
        assert_eq!(n_folds_for_ratio(0.25), 4);
        assert_eq!(n_folds_for_ratio(0.2), 5);
        assert_eq!(n_folds_for_ratio(0.1), 10);
    }
}
