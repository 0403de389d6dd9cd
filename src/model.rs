//! Finished models
//!
//! [`Model`] is the closed set of everything training and ensembling can
//! produce. Keeping it a tagged enum instead of trait objects keeps the
//! whole tree serializable with serde and lets callers match on structure
//! when they need to. Ensembles own their members recursively, so a saved
//! model file is always self-contained.

use crate::ensemble::aggregate;
use crate::error::{EnsembraError, Result};
use crate::network::{PredictorKind, TrainablePredictor};
use crate::stats::{ConfidenceMetric, ErrorStatistic, OutputTaskKind};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Metadata shared by every model variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Human-readable model name
    pub name: String,
    /// Task kind of the output features
    pub task: OutputTaskKind,
    /// One name per output feature
    pub output_names: Vec<String>,
    /// Trust scores carried over from training
    pub confidence: ConfidenceMetric,
}

/// A single trained predictor with its training-time statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkModel {
    pub info: ModelInfo,
    pub predictor: PredictorKind,
    pub train_stat: ErrorStatistic,
    pub validation_stat: Option<ErrorStatistic>,
}

/// A flat ensemble: member outputs are combined with a per-member,
/// per-feature weight matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleModel {
    pub info: ModelInfo,
    pub members: Vec<Model>,
    /// Aggregation weights, members x output features
    pub weights: Array2<f64>,
}

/// A stacked ensemble: base outputs feed a meta model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackModel {
    pub info: ModelInfo,
    pub bases: Vec<Model>,
    pub meta: Box<Model>,
    /// Whether the original input vector is appended to the meta input
    pub route_input: bool,
}

/// Closed set of model structures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Model {
    /// One trained predictor
    SingleNetwork(NetworkModel),
    /// Bagged ensemble built from shuffled folds
    KFoldEnsemble(EnsembleModel),
    /// Fold models of one stacking base, aggregated as a unit
    CompositeEnsemble(EnsembleModel),
    /// Stacked generalization over fold-trained bases
    StackedEnsemble(StackModel),
    /// Stacked generalization over a two-way data split
    HalvedStackEnsemble(StackModel),
}

impl Model {
    /// Compute the output vector for one input vector
    pub fn compute(&self, input: ArrayView1<f64>) -> Result<Array1<f64>> {
        match self {
            Model::SingleNetwork(m) => {
                if input.len() != m.predictor.input_count() {
                    return Err(EnsembraError::ShapeError {
                        expected: format!("{} input features", m.predictor.input_count()),
                        actual: format!("{} input features", input.len()),
                    });
                }
                Ok(m.predictor.compute(input))
            }
            Model::KFoldEnsemble(m) | Model::CompositeEnsemble(m) => {
                let outputs: Vec<Array1<f64>> = m
                    .members
                    .iter()
                    .map(|member| member.compute(input))
                    .collect::<Result<_>>()?;
                aggregate::aggregate(m.info.task, &outputs, &m.weights)
            }
            Model::StackedEnsemble(m) | Model::HalvedStackEnsemble(m) => {
                let mut meta_input = Vec::new();
                for base in &m.bases {
                    meta_input.extend(base.compute(input)?);
                }
                if m.route_input {
                    meta_input.extend(input.iter().copied());
                }
                m.meta.compute(Array1::from(meta_input).view())
            }
        }
    }

    /// Shared metadata of the root model
    pub fn info(&self) -> &ModelInfo {
        match self {
            Model::SingleNetwork(m) => &m.info,
            Model::KFoldEnsemble(m) | Model::CompositeEnsemble(m) => &m.info,
            Model::StackedEnsemble(m) | Model::HalvedStackEnsemble(m) => &m.info,
        }
    }

    fn info_mut(&mut self) -> &mut ModelInfo {
        match self {
            Model::SingleNetwork(m) => &mut m.info,
            Model::KFoldEnsemble(m) | Model::CompositeEnsemble(m) => &mut m.info,
            Model::StackedEnsemble(m) | Model::HalvedStackEnsemble(m) => &mut m.info,
        }
    }

    /// Replace the root model's output feature names
    pub fn with_output_names(mut self, names: Vec<String>) -> Result<Self> {
        let expected = self.output_names().len();
        if names.len() != expected {
            return Err(EnsembraError::ShapeError {
                expected: format!("{} output names", expected),
                actual: format!("{} output names", names.len()),
            });
        }
        self.info_mut().output_names = names;
        Ok(self)
    }

    /// Human-readable model name
    pub fn name(&self) -> &str {
        &self.info().name
    }

    /// Task kind of the output features
    pub fn task_kind(&self) -> OutputTaskKind {
        self.info().task
    }

    /// One name per output feature
    pub fn output_names(&self) -> &[String] {
        &self.info().output_names
    }

    /// Trust scores carried over from training
    pub fn confidence(&self) -> &ConfidenceMetric {
        &self.info().confidence
    }

    /// Direct child models; empty for a single network. A stack's meta
    /// model is listed after its bases.
    pub fn children(&self) -> Vec<&Model> {
        match self {
            Model::SingleNetwork(_) => Vec::new(),
            Model::KFoldEnsemble(m) | Model::CompositeEnsemble(m) => {
                m.members.iter().collect()
            }
            Model::StackedEnsemble(m) | Model::HalvedStackEnsemble(m) => {
                let mut children: Vec<&Model> = m.bases.iter().collect();
                children.push(&m.meta);
                children
            }
        }
    }

    fn structure_label(&self) -> &'static str {
        match self {
            Model::SingleNetwork(_) => "network",
            Model::KFoldEnsemble(_) => "k-fold ensemble",
            Model::CompositeEnsemble(_) => "composite ensemble",
            Model::StackedEnsemble(_) => "stacked ensemble",
            Model::HalvedStackEnsemble(_) => "halved-stack ensemble",
        }
    }

    /// Render a recursive, indented summary of the model tree
    pub fn info_text(&self) -> String {
        let mut text = String::new();
        self.write_info(&mut text, 0);
        text
    }

    fn write_info(&self, text: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let confidence = self.confidence();
        let _ = writeln!(
            text,
            "{}{} [{}] task={:?} samples={} cost={:.6}",
            pad,
            self.name(),
            self.structure_label(),
            self.task_kind(),
            confidence.n_samples(),
            confidence.cost(),
        );
        if self.task_kind().is_classification() {
            let _ = writeln!(
                text,
                "{}  accuracy: categorical={:.4} binary={:.4}",
                pad,
                confidence.categorical_accuracy(),
                confidence.binary_accuracy(),
            );
        }
        if let Model::SingleNetwork(m) = self {
            for layer in m.predictor.layer_summary() {
                let _ = writeln!(
                    text,
                    "{}  layer {}x{}: mean={:.4} stddev={:.4} range=[{:.4}, {:.4}]",
                    pad,
                    layer.inputs,
                    layer.outputs,
                    layer.weight_mean,
                    layer.weight_stddev,
                    layer.weight_min,
                    layer.weight_max,
                );
            }
        }
        for child in self.children() {
            child.write_info(text, depth + 1);
        }
    }

    /// Serialize the model tree to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Deserialize a model tree from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MlpConfig, MlpNetwork};
    use crate::stats::ErrorStatistic;
    use ndarray::arr1;

    fn toy_network_model(name: &str, seed: u64) -> Model {
        let predictor = PredictorKind::Mlp(MlpNetwork::new(
            2,
            1,
            OutputTaskKind::Binary,
            MlpConfig {
                hidden_layers: vec![4],
                ..MlpConfig::default()
            },
            seed,
        ));
        let mut stat = ErrorStatistic::new(OutputTaskKind::Binary, 1);
        stat.update(arr1(&[0.8]).view(), arr1(&[1.0]).view()).unwrap();
        stat.update(arr1(&[0.2]).view(), arr1(&[0.0]).view()).unwrap();
        Model::SingleNetwork(NetworkModel {
            info: ModelInfo {
                name: name.to_string(),
                task: OutputTaskKind::Binary,
                output_names: vec!["accept".to_string()],
                confidence: ConfidenceMetric::from_training(&stat),
            },
            predictor,
            train_stat: stat,
            validation_stat: None,
        })
    }

    #[test]
    fn test_single_network_compute_checks_width() {
        let model = toy_network_model("net", 1);
        assert!(model.compute(arr1(&[0.1, 0.9]).view()).is_ok());
        assert!(model.compute(arr1(&[0.1]).view()).is_err());
    }

    #[test]
    fn test_ensemble_compute_aggregates_members() {
        let members = vec![toy_network_model("a", 1), toy_network_model("b", 2)];
        let confidence =
            ConfidenceMetric::merged(&[
                members[0].confidence().clone(),
                members[1].confidence().clone(),
            ])
            .unwrap();
        let model = Model::KFoldEnsemble(EnsembleModel {
            info: ModelInfo {
                name: "bag".to_string(),
                task: OutputTaskKind::Binary,
                output_names: vec!["accept".to_string()],
                confidence,
            },
            members,
            weights: Array2::from_elem((2, 1), 1.0),
        });

        let input = arr1(&[0.3, 0.7]);
        let output = model.compute(input.view()).unwrap();
        assert_eq!(output.len(), 1);
        assert!((0.0..=1.0).contains(&output[0]));
        assert_eq!(model.children().len(), 2);
    }

    #[test]
    fn test_info_text_covers_whole_tree() {
        let members = vec![toy_network_model("member-a", 1), toy_network_model("member-b", 2)];
        let confidence = members[0].confidence().clone();
        let model = Model::KFoldEnsemble(EnsembleModel {
            info: ModelInfo {
                name: "bag".to_string(),
                task: OutputTaskKind::Binary,
                output_names: vec!["accept".to_string()],
                confidence,
            },
            members,
            weights: Array2::from_elem((2, 1), 1.0),
        });
        let text = model.info_text();
        assert!(text.contains("bag"));
        assert!(text.contains("member-a"));
        assert!(text.contains("member-b"));
    }

    #[test]
    fn test_with_output_names_checks_width() {
        let model = toy_network_model("net", 1);
        let renamed = model
            .clone()
            .with_output_names(vec!["approve".to_string()])
            .unwrap();
        assert_eq!(renamed.output_names()[0], "approve");
        assert!(model
            .with_output_names(vec!["a".to_string(), "b".to_string()])
            .is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let model = toy_network_model("persisted", 11);
        let dir = std::env::temp_dir().join("ensembra-model-roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");

        model.save(&path).unwrap();
        let restored = Model::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.name(), model.name());
        let input = arr1(&[0.25, 0.75]);
        assert_eq!(
            restored.compute(input.view()).unwrap(),
            model.compute(input.view()).unwrap()
        );
    }
}
