//! Stacked generalization
//!
//! [`StackingBuilder`] trains a first layer of base predictors with a fold
//! split so each sample's meta feature comes from a model that never saw
//! that sample, then trains a meta predictor on those held-out
//! predictions. [`HalvedStackBuilder`] is the cheaper variant: bases learn
//! on one half of the data, the meta predictor on the other half's base
//! predictions. Both can route the original input features through to the
//! meta predictor.

use super::n_folds_for_ratio;
use crate::data::{fold_indices, Dataset, Sample};
use crate::error::{EnsembraError, Result};
use crate::model::{EnsembleModel, Model, ModelInfo, StackModel};
use crate::network::{PredictorKind, TrainablePredictor};
use crate::stats::ConfidenceMetric;
use crate::training::{TrainingConfig, TrainingController};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Meta-predictor input width for a stack layout
pub fn meta_input_width(
    n_bases: usize,
    target_width: usize,
    input_width: usize,
    route_input: bool,
) -> usize {
    n_bases * target_width + if route_input { input_width } else { 0 }
}

/// Stacked-generalization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingConfig {
    /// Fraction of the dataset held out per fold, in (0, 0.5]
    pub fold_ratio: f64,
    /// Append the original input features to the meta-predictor input
    pub route_input: bool,
    /// Seed for the initial shuffle
    pub seed: u64,
    /// Training budget for base fold models and the meta predictor
    pub training: TrainingConfig,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            fold_ratio: 0.25,
            route_input: false,
            seed: 42,
            training: TrainingConfig::default(),
        }
    }
}

impl StackingConfig {
    pub fn with_fold_ratio(mut self, fold_ratio: f64) -> Self {
        self.fold_ratio = fold_ratio;
        self
    }

    pub fn with_route_input(mut self, route_input: bool) -> Self {
        self.route_input = route_input;
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

/// Builds a stacked ensemble over fold-trained bases
#[derive(Debug, Clone)]
pub struct StackingBuilder {
    config: StackingConfig,
}

impl StackingBuilder {
    /// Create a builder, validating the configuration eagerly
    pub fn new(config: StackingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Number of folds implied by the configured ratio
    pub fn n_folds(&self) -> usize {
        n_folds_for_ratio(self.config.fold_ratio)
    }

    /// Train the base layer fold-wise, then the meta predictor on the
    /// bases' held-out predictions.
    pub fn build(
        &self,
        name: &str,
        base_prototypes: &[PredictorKind],
        meta_prototype: &PredictorKind,
        data: &Dataset,
    ) -> Result<Model> {
        check_stack_shapes(
            base_prototypes,
            meta_prototype,
            data,
            self.config.route_input,
        )?;
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
        let target_width = data.target_width();

        // Meta feature rows, one per shuffled sample, filled base by base.
        let meta_width = meta_input_width(
            base_prototypes.len(),
            target_width,
            data.input_width(),
            self.config.route_input,
        );
        let mut meta_rows = vec![vec![0.0; meta_width]; shuffled.len()];

        let mut bases = Vec::with_capacity(base_prototypes.len());
        for (base_idx, prototype) in base_prototypes.iter().enumerate() {
            let offset = base_idx * target_width;
            let mut fold_models = Vec::with_capacity(n_folds);
            let mut weights = Array2::zeros((n_folds, target_width));

            for (fold, holdout) in folds.iter().enumerate() {
                let train_idx: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != fold)
                    .flat_map(|(_, indices)| indices.iter().copied())
                    .collect();
                let train_set = shuffled.select(&train_idx)?;
                let val_set = shuffled.select(holdout)?;

                let training = self.config.training.clone().with_seed(
                    self.config
                        .training
                        .seed
                        .wrapping_add((base_idx * n_folds + fold) as u64),
                );
                let controller = TrainingController::new(training)?;
                let fold_model = controller.train(
                    &format!("{}-base-{}-fold-{}", name, base_idx, fold),
                    prototype.clone(),
                    &train_set,
                    Some(&val_set),
                )?;

                // Held-out predictions become this base's meta features.
                for &sample_idx in holdout {
                    let sample = &shuffled.samples()[sample_idx];
                    let output = fold_model.compute(sample.input.view())?;
                    let slot = &mut meta_rows[sample_idx][offset..offset + target_width];
                    for (dst, &v) in slot.iter_mut().zip(output.iter()) {
                        *dst = v;
                    }
                }
                for feature in 0..target_width {
                    weights[[fold, feature]] =
                        fold_model.confidence().feature_confidence()[feature];
                }
                fold_models.push(fold_model);
            }

            let confidence = ConfidenceMetric::merged(
                &fold_models
                    .iter()
                    .map(|m| m.confidence().clone())
                    .collect::<Vec<_>>(),
            )?;
            info!(base_idx, cost = confidence.cost(), "stack base trained");
            let output_names = fold_models[0].output_names().to_vec();
            bases.push(Model::CompositeEnsemble(EnsembleModel {
                info: ModelInfo {
                    name: format!("{}-base-{}", name, base_idx),
                    task: fold_models[0].task_kind(),
                    output_names,
                    confidence,
                },
                members: fold_models,
                weights,
            }));
        }

        if self.config.route_input {
            for (row, sample) in meta_rows.iter_mut().zip(shuffled.iter()) {
                let tail = row.len() - data.input_width();
                for (dst, &v) in row[tail..].iter_mut().zip(sample.input.iter()) {
                    *dst = v;
                }
            }
        }

        let meta_data = meta_dataset(&shuffled, meta_rows)?;
        let controller = TrainingController::new(self.config.training.clone())?;
        let meta = controller.train(
            &format!("{}-meta", name),
            meta_prototype.clone(),
            &meta_data,
            None,
        )?;

        Ok(Model::StackedEnsemble(StackModel {
            info: ModelInfo {
                name: name.to_string(),
                task: meta.task_kind(),
                output_names: meta.output_names().to_vec(),
                confidence: meta.confidence().clone(),
            },
            bases,
            meta: Box::new(meta),
            route_input: self.config.route_input,
        }))
    }
}

/// Halved-stack parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalvedStackConfig {
    /// Append the original input features to the meta-predictor input
    pub route_input: bool,
    /// Seed for the initial shuffle
    pub seed: u64,
    /// Training budget for bases and the meta predictor
    pub training: TrainingConfig,
}

impl Default for HalvedStackConfig {
    fn default() -> Self {
        Self {
            route_input: false,
            seed: 42,
            training: TrainingConfig::default(),
        }
    }
}

impl HalvedStackConfig {
    pub fn with_route_input(mut self, route_input: bool) -> Self {
        self.route_input = route_input;
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
        self.training.validate()
    }
}

/// Builds a stacked ensemble over a two-way data split: bases learn on the
/// first half, the meta predictor on the second half's base predictions
#[derive(Debug, Clone)]
pub struct HalvedStackBuilder {
    config: HalvedStackConfig,
}

impl HalvedStackBuilder {
    /// Create a builder, validating the configuration eagerly
    pub fn new(config: HalvedStackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn build(
        &self,
        name: &str,
        base_prototypes: &[PredictorKind],
        meta_prototype: &PredictorKind,
        data: &Dataset,
    ) -> Result<Model> {
        check_stack_shapes(
            base_prototypes,
            meta_prototype,
            data,
            self.config.route_input,
        )?;
        if data.len() < 2 {
            return Err(EnsembraError::DataError(
                "a halved stack needs at least two samples".to_string(),
            ));
        }

        let shuffled = data.shuffled(self.config.seed);
        let (base_half, meta_half) = shuffled.split(0.5)?;

        let mut bases = Vec::with_capacity(base_prototypes.len());
        for (base_idx, prototype) in base_prototypes.iter().enumerate() {
            let training = self.config.training.clone().with_seed(
                self.config.training.seed.wrapping_add(base_idx as u64),
            );
            let controller = TrainingController::new(training)?;
            let base = controller.train(
                &format!("{}-base-{}", name, base_idx),
                prototype.clone(),
                &base_half,
                None,
            )?;
            info!(base_idx, cost = base.confidence().cost(), "halved-stack base trained");
            bases.push(base);
        }

        let meta_data = stack_meta_dataset(&bases, &meta_half, self.config.route_input)?;
        let controller = TrainingController::new(self.config.training.clone())?;
        let meta = controller.train(
            &format!("{}-meta", name),
            meta_prototype.clone(),
            &meta_data,
            None,
        )?;

        Ok(Model::HalvedStackEnsemble(StackModel {
            info: ModelInfo {
                name: name.to_string(),
                task: meta.task_kind(),
                output_names: meta.output_names().to_vec(),
                confidence: meta.confidence().clone(),
            },
            bases,
            meta: Box::new(meta),
            route_input: self.config.route_input,
        }))
    }
}

/// Reject mismatched shapes and task kinds before any training starts
fn check_stack_shapes(
    base_prototypes: &[PredictorKind],
    meta_prototype: &PredictorKind,
    data: &Dataset,
    route_input: bool,
) -> Result<()> {
    let first = base_prototypes.first().ok_or_else(|| {
        EnsembraError::ConfigError("a stack needs at least one base predictor".to_string())
    })?;
    for base in base_prototypes {
        if base.task_kind() != first.task_kind()
            || base.output_count() != first.output_count()
        {
            return Err(EnsembraError::ConfigError(
                "stack bases must share one task kind and output width".to_string(),
            ));
        }
        if base.input_count() != data.input_width()
            || base.output_count() != data.target_width()
        {
            return Err(EnsembraError::ShapeError {
                expected: format!(
                    "{}x{} base predictor",
                    data.input_width(),
                    data.target_width()
                ),
                actual: format!("{}x{} base predictor", base.input_count(), base.output_count()),
            });
        }
    }
    if meta_prototype.task_kind() != first.task_kind() {
        return Err(EnsembraError::ConfigError(
            "meta predictor must share the bases' task kind".to_string(),
        ));
    }
    let expected_meta = meta_input_width(
        base_prototypes.len(),
        data.target_width(),
        data.input_width(),
        route_input,
    );
    if meta_prototype.input_count() != expected_meta
        || meta_prototype.output_count() != data.target_width()
    {
        return Err(EnsembraError::ShapeError {
            expected: format!("{}x{} meta predictor", expected_meta, data.target_width()),
            actual: format!(
                "{}x{} meta predictor",
                meta_prototype.input_count(),
                meta_prototype.output_count()
            ),
        });
    }
    Ok(())
}

/// Derive the meta predictor's dataset by running every base over `data`
pub(crate) fn stack_meta_dataset(
    bases: &[Model],
    data: &Dataset,
    route_input: bool,
) -> Result<Dataset> {
    let mut rows = Vec::with_capacity(data.len());
    for sample in data.iter() {
        let mut row = Vec::new();
        for base in bases {
            row.extend(base.compute(sample.input.view())?);
        }
        if route_input {
            row.extend(sample.input.iter().copied());
        }
        rows.push(row);
    }
    meta_dataset(data, rows)
}

/// Pair meta feature rows with the source dataset's ids and targets
fn meta_dataset(source: &Dataset, rows: Vec<Vec<f64>>) -> Result<Dataset> {
    let samples = source
        .iter()
        .zip(rows)
        .map(|(sample, row)| {
            Sample::new(
                sample.id.clone(),
                row,
                sample.target.to_vec(),
            )
        })
        .collect();
    Dataset::from_samples(samples)
}
