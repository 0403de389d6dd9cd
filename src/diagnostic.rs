//! Two-phase diagnostic reporting
//!
//! A [`DiagnosticRecord`] tree mirrors a model tree with test-time error
//! statistics at every node. The tree is built with `add_child` and then
//! sealed with `finalize`, which works depth-first so a parent's
//! better-child set reflects each child's own already-finalized statistic.
//! Reading an unfinalized record is a programming error and fails with a
//! state error rather than reporting on a partially built tree.

use crate::data::Dataset;
use crate::ensemble::stack_meta_dataset;
use crate::error::{EnsembraError, Result};
use crate::evaluate;
use crate::model::Model;
use crate::stats::{ErrorStatistic, OutputTaskKind};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One node of a diagnostic tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    name: String,
    stat: ErrorStatistic,
    children: Vec<DiagnosticRecord>,
    better_children: Vec<usize>,
    finalized: bool,
}

impl DiagnosticRecord {
    /// Create an unfinalized record for one model's test statistic
    pub fn new(name: impl Into<String>, stat: ErrorStatistic) -> Self {
        Self {
            name: name.into(),
            stat,
            children: Vec::new(),
            better_children: Vec::new(),
            finalized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stat(&self) -> &ErrorStatistic {
        &self.stat
    }

    pub fn children(&self) -> &[DiagnosticRecord] {
        &self.children
    }

    /// Append a child record; rejected once the record is finalized
    pub fn add_child(&mut self, child: DiagnosticRecord) -> Result<()> {
        if self.finalized {
            return Err(EnsembraError::StateError(
                "cannot add a child to a finalized diagnostic record".to_string(),
            ));
        }
        self.children.push(child);
        Ok(())
    }

    /// Seal the tree depth-first, computing which children outperform this
    /// node. Idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        for child in &mut self.children {
            child.finalize();
        }
        self.better_children = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.stat.is_better(&self.stat))
            .map(|(idx, _)| idx)
            .collect();
        self.finalized = true;
    }

    /// Indices of children whose statistic beats this node's
    pub fn better_children(&self) -> Result<&[usize]> {
        self.check_finalized()?;
        Ok(&self.better_children)
    }

    /// Render the finalized tree as an indented report, flagging children
    /// that outperform their parent
    pub fn info_text(&self) -> Result<String> {
        self.check_finalized()?;
        let mut text = String::new();
        self.write_info(&mut text, 0, false);
        Ok(text)
    }

    fn check_finalized(&self) -> Result<()> {
        if !self.finalized {
            return Err(EnsembraError::StateError(
                "diagnostic record has not been finalized".to_string(),
            ));
        }
        Ok(())
    }

    fn write_info(&self, text: &mut String, depth: usize, beats_parent: bool) {
        let pad = "  ".repeat(depth);
        let marker = if beats_parent { " [beats parent]" } else { "" };
        let summary = match self.stat.task_kind() {
            OutputTaskKind::Regression => {
                format!("rmse={:.6}", self.stat.total_rms())
            }
            OutputTaskKind::Binary => format!(
                "accuracy={:.4} wrong={} log-loss={:.6}",
                self.stat.binary_accuracy(),
                self.stat.wrong_decisions(),
                self.stat.log_loss_rms()
            ),
            OutputTaskKind::Categorical => format!(
                "accuracy={:.4} wrong={} low-conf={} log-loss={:.6}",
                self.stat.categorical_accuracy(),
                self.stat.wrong_decisions(),
                self.stat.low_confidence_correct(),
                self.stat.log_loss_rms()
            ),
        };
        let _ = writeln!(
            text,
            "{}{}: samples={} {}{}",
            pad,
            self.name,
            self.stat.n_samples(),
            summary,
            marker
        );
        for (idx, child) in self.children.iter().enumerate() {
            child.write_info(text, depth + 1, self.better_children.contains(&idx));
        }
    }
}

/// Score a model tree against a testing dataset, producing a finalized
/// diagnostic tree with one record per model node.
pub fn diagnostic_test(model: &Model, data: &Dataset) -> Result<DiagnosticRecord> {
    let mut record = build_record(model, data)?;
    record.finalize();
    Ok(record)
}

fn build_record(model: &Model, data: &Dataset) -> Result<DiagnosticRecord> {
    let (stat, _) = evaluate::test(model, data)?;
    let mut record = DiagnosticRecord::new(model.name(), stat);
    match model {
        Model::SingleNetwork(_) => {}
        Model::KFoldEnsemble(m) | Model::CompositeEnsemble(m) => {
            for member in &m.members {
                record.add_child(build_record(member, data)?)?;
            }
        }
        Model::StackedEnsemble(m) | Model::HalvedStackEnsemble(m) => {
            for base in &m.bases {
                record.add_child(build_record(base, data)?)?;
            }
            // The meta predictor is scored on its own input space.
            let meta_data = stack_meta_dataset(&m.bases, data, m.route_input)?;
            record.add_child(build_record(&m.meta, &meta_data)?)?;
        }
    }
    Ok(record)
}
