//! Run configuration.
//!
//! One [`ExperimentConfig`] is assembled at startup (defaults, then the
//! optional conf file, then CLI flags) and passed by reference everywhere
//! else. Nothing reads configuration ambiently after that point.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VitriolError};
use crate::models::{ModelFamily, TrainSettings};

/// Everything one invocation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Maximum training epochs per fit call.
    pub epochs: usize,

    /// Mini-batch size; 1 is a supported degenerate case.
    pub batch_size: usize,

    /// Fraction of the source dataset that goes to the training partition.
    pub train_ratio: f64,

    /// Fraction of each fit's rows carved out for internal validation.
    pub validation_split: f64,

    /// Epochs without validation-loss improvement before early stopping.
    pub patience: usize,

    /// Fold count for the k-fold protocol.
    pub folds: usize,

    /// Seed shared by the splitter, fold planner, and model initializers.
    pub seed: u64,

    /// Which model family the run trains.
    pub family: ModelFamily,

    /// Feed the contextual vector stream to the model.
    pub use_contextual: bool,

    /// Recompute contextual vectors instead of loading the cache.
    pub recompute_contextual: bool,

    /// Suppress the run log entirely.
    pub skip_logging: bool,

    /// Root directory for dated run logs.
    pub log_dir: PathBuf,

    /// Directory holding the persisted train/test partition files.
    pub split_dir: PathBuf,

    /// Directory holding the cached contextual vector files.
    pub contextual_cache_dir: PathBuf,

    /// Pretrained word-vector artifact.
    pub word_vectors_path: PathBuf,

    /// Saved model parameters, written by --save and read when not retraining.
    pub params_path: PathBuf,

    /// Directory for prediction export files.
    pub export_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: 16,
            train_ratio: 0.8,
            validation_split: 0.2,
            patience: 5,
            folds: 5,
            seed: 42,
            family: ModelFamily::BranchNetwork,
            use_contextual: false,
            recompute_contextual: false,
            skip_logging: false,
            log_dir: PathBuf::from("runs"),
            split_dir: PathBuf::from("splits"),
            contextual_cache_dir: PathBuf::from("cache"),
            word_vectors_path: PathBuf::from("models/word_vectors.json"),
            params_path: PathBuf::from("models/saved_params.json"),
            export_dir: PathBuf::from("exports"),
        }
    }
}

impl ExperimentConfig {
    /// Set the model family
    pub fn with_family(mut self, family: ModelFamily) -> Self {
        self.family = family;
        self
    }

    /// Set the fold count
    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    /// Set the shared seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the epoch cap
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the mini-batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable the contextual feature stream
    pub fn with_contextual(mut self, on: bool) -> Self {
        self.use_contextual = on;
        self
    }

    /// Rejects values no run could proceed with. Called once at startup,
    /// before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(VitriolError::ConfigError(
                "epochs must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(VitriolError::ConfigError(
                "batch size must be at least 1".to_string(),
            ));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(VitriolError::ConfigError(format!(
                "training set ratio must be inside (0, 1), got {}",
                self.train_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(VitriolError::ConfigError(format!(
                "validation split must be inside [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.folds < 2 {
            return Err(VitriolError::ConfigError(format!(
                "fold count must be at least 2, got {}",
                self.folds
            )));
        }
        Ok(())
    }

    pub fn train_settings(&self) -> TrainSettings {
        TrainSettings {
            epochs: self.epochs,
            batch_size: self.batch_size,
            validation_split: self.validation_split,
            patience: self.patience,
            seed: self.seed,
        }
    }

    /// Cache file for one partition's contextual vectors.
    pub fn contextual_cache_file(&self, partition: &str) -> PathBuf {
        self.contextual_cache_dir
            .join(format!("contextual_{partition}.txt"))
    }
}

/// Optional overrides read from a conf file, mirroring the keys a run
/// most often tunes between invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDefaults {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
}

impl FileDefaults {
    /// An absent file means "no overrides"; a file that exists but does
    /// not parse is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| {
            VitriolError::ConfigError(format!(
                "conf file {} is invalid: {}",
                path.display(),
                err
            ))
        })
    }

    pub fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
    }
}
