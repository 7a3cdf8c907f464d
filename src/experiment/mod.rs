//! The experiment layer: fold planning, orchestration, reconciliation,
//! and run logging.

pub mod folds;
pub mod orchestrator;
pub mod reconcile;
pub mod runlog;

pub use folds::{FoldPlan, FoldPlanner};
pub use orchestrator::{pooled, BestFold, Experiment, RunSummary, SingleOutcome};
pub use reconcile::{reconcile, write_export, ExportLine};
pub use runlog::{dataset_stem, RunLog, RunLogger};
