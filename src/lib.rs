//! Vitriol - hate and offensive speech classification experiments
//!
//! This crate drives binary text-classification experiments end to end:
//! - Loading, splitting, and persisting the labeled corpus
//! - Word, tweet-level, and optional contextual feature streams
//! - Three model families behind one adapter
//! - Single-split evaluation and the stratified k-fold protocol
//! - Run logs and prediction exports reconciled against the source data
//!
//! # Modules
//!
//! ## Pipeline
//! - [`data`] - Source records, split persistence, labeled examples
//! - [`features`] - Feature providers and the contextual vector cache
//! - [`models`] - Model families, training, evaluation metrics
//! - [`experiment`] - Fold planning, orchestration, reconciliation, run logs
//!
//! ## Surface
//! - [`cli`] - Command-line interface
//! - [`config`] - The experiment configuration and conf-file overrides

// Core error handling
pub mod error;

// Pipeline
pub mod data;
pub mod features;
pub mod models;
pub mod experiment;

// Surface
pub mod cli;
pub mod config;

pub use error::{Result, VitriolError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, VitriolError};

    // Configuration
    pub use crate::config::{ExperimentConfig, FileDefaults};

    // Data
    pub use crate::data::{
        label_proportions, load_source_records, Example, LabelProportions, LabeledText,
        SourceRecord, SplitStore,
    };

    // Features
    pub use crate::features::{
        attach_features, ContextualMode, FeatureProvider, FeatureSet, HashingProvider, WordTable,
    };

    // Models
    pub use crate::models::{
        ConfusionCounts, EvalReport, ExperimentModel, ModelFamily, ModelInputs, TrainSettings,
        TrainingHistory,
    };

    // Experiment protocol
    pub use crate::experiment::{
        dataset_stem, pooled, reconcile, write_export, BestFold, Experiment, ExportLine, FoldPlan,
        FoldPlanner, RunLog, RunLogger, RunSummary, SingleOutcome,
    };
}
