//! Ensembra - supervised training control and confidence-weighted ensembles
//!
//! This crate turns trainable predictors and datasets into finished,
//! comparable models:
//! - [`training`] - multi-attempt, early-stopping training controller
//! - [`stats`] - error statistics and confidence metrics for scoring and
//!   comparing candidates
//! - [`ensemble`] - k-fold bagging, stacked generalization and
//!   probability-mixing aggregation
//! - [`diagnostic`] - two-phase diagnostic trees over finished models
//!
//! # Supporting modules
//! - [`data`] - samples, datasets, seeded shuffles and fold splits
//! - [`network`] - the trainable predictors driven by the controller
//! - [`evaluate`] - parallel error-statistic accumulation
//! - [`filter`] - per-feature range normalization
//! - [`model`] - the serializable model tree every builder produces

// Core error handling
pub mod error;

// Data plumbing
pub mod data;
pub mod filter;

// Scoring
pub mod evaluate;
pub mod stats;

// Predictors and models
pub mod model;
pub mod network;

// Training and composition
pub mod ensemble;
pub mod training;

// Reporting
pub mod diagnostic;

pub use error::{EnsembraError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{EnsembraError, Result};

    // Data
    pub use crate::data::{Dataset, Sample};
    pub use crate::filter::RangeFilter;

    // Scoring
    pub use crate::stats::{ConfidenceMetric, ErrorStatistic, OutputTaskKind};

    // Predictors
    pub use crate::network::{
        MlpConfig, MlpNetwork, PredictorKind, RandomProjectionConfig, RandomProjectionNetwork,
        TrainablePredictor,
    };

    // Training
    pub use crate::training::{ProgressUpdate, TrainingConfig, TrainingController};

    // Ensembles
    pub use crate::ensemble::{
        HalvedStackBuilder, HalvedStackConfig, KFoldBuilder, KFoldConfig, StackingBuilder,
        StackingConfig,
    };

    // Models and reporting
    pub use crate::diagnostic::{diagnostic_test, DiagnosticRecord};
    pub use crate::evaluate::test;
    pub use crate::model::{Model, ModelInfo};
}
