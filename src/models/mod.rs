//! Model families behind one uniform training and evaluation contract
//!
//! The experiment loop is model-agnostic: every family is wrapped in the
//! [`ExperimentModel`] enum and driven through the same
//! fit/evaluate/predict/save/load/reset surface.

pub mod baseline;
pub mod margin;
pub mod metrics;
pub mod network;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::Example;
use crate::error::{Result, VitriolError};

pub use baseline::BaselineClassifier;
pub use margin::MarginClassifier;
pub use metrics::{binary_cross_entropy, f_score, roc_auc, ConfusionCounts, EvalReport};
pub use network::BranchNetwork;

/// The three supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    /// Averaged word-embedding features into a single logistic unit.
    Baseline,
    /// One dense branch per feature source, joined into a sigmoid head.
    BranchNetwork,
    /// Linear-kernel margin classifier trained by SMO.
    MarginClassifier,
}

impl ModelFamily {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "baseline" => Ok(ModelFamily::Baseline),
            "multi-branch-network" => Ok(ModelFamily::BranchNetwork),
            "margin-classifier" => Ok(ModelFamily::MarginClassifier),
            other => Err(VitriolError::ConfigError(format!(
                "unknown model family: {} (expected baseline, multi-branch-network, or margin-classifier)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Baseline => "baseline",
            ModelFamily::BranchNetwork => "multi-branch-network",
            ModelFamily::MarginClassifier => "margin-classifier",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs shared by every family's fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainSettings {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of the training rows carved out for internal validation.
    /// Zero disables the carve-out and early stopping.
    pub validation_split: f64,
    /// Epochs without validation-loss improvement before stopping.
    pub patience: usize,
    pub seed: u64,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: 16,
            validation_split: 0.2,
            patience: 5,
            seed: 42,
        }
    }
}

/// Fixed-order feature matrices for one set of examples.
///
/// Rows are example-aligned across all matrices; `contextual` is present only
/// when the run uses contextual vectors.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub word: Array2<f64>,
    pub tweet: Array2<f64>,
    pub contextual: Option<Array2<f64>>,
}

impl ModelInputs {
    /// Materialize owned matrices from bundled examples.
    ///
    /// Contextual vectors must be present on all examples or on none.
    pub fn from_examples(examples: &[Example]) -> Result<Self> {
        if examples.is_empty() {
            return Err(VitriolError::DataError(
                "cannot build model inputs from zero examples".to_string(),
            ));
        }

        let word_dim = examples[0].word_vec.len();
        let tweet_dim = examples[0].tweet_vec.len();
        let has_contextual = examples[0].contextual_vec.is_some();

        let mut word = Array2::zeros((examples.len(), word_dim));
        let mut tweet = Array2::zeros((examples.len(), tweet_dim));
        let mut contextual = if has_contextual {
            let dim = examples[0].contextual_vec.as_ref().map(Vec::len).unwrap_or(0);
            Some(Array2::zeros((examples.len(), dim)))
        } else {
            None
        };

        for (row, example) in examples.iter().enumerate() {
            if example.word_vec.len() != word_dim || example.tweet_vec.len() != tweet_dim {
                return Err(VitriolError::ShapeError {
                    expected: format!("word dim {}, tweet dim {}", word_dim, tweet_dim),
                    actual: format!(
                        "word dim {}, tweet dim {} at row {}",
                        example.word_vec.len(),
                        example.tweet_vec.len(),
                        row
                    ),
                });
            }

            for (col, v) in example.word_vec.iter().enumerate() {
                word[[row, col]] = *v;
            }
            for (col, v) in example.tweet_vec.iter().enumerate() {
                tweet[[row, col]] = *v;
            }

            match (&mut contextual, &example.contextual_vec) {
                (Some(matrix), Some(vec)) => {
                    if vec.len() != matrix.ncols() {
                        return Err(VitriolError::ShapeError {
                            expected: format!("contextual dim {}", matrix.ncols()),
                            actual: format!("contextual dim {} at row {}", vec.len(), row),
                        });
                    }
                    for (col, v) in vec.iter().enumerate() {
                        matrix[[row, col]] = *v;
                    }
                }
                (None, None) => {}
                _ => {
                    return Err(VitriolError::DataError(format!(
                        "contextual vectors must be present on all examples or none (row {})",
                        row
                    )));
                }
            }
        }

        Ok(ModelInputs {
            word,
            tweet,
            contextual,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.word.nrows()
    }

    /// Copy the selected rows into a fresh `ModelInputs`, never a view.
    pub fn take_rows(&self, indices: &[usize]) -> ModelInputs {
        ModelInputs {
            word: gather_rows(&self.word, indices),
            tweet: gather_rows(&self.tweet, indices),
            contextual: self.contextual.as_ref().map(|m| gather_rows(m, indices)),
        }
    }

    /// All feature sources side by side (word, then tweet, then contextual).
    pub fn concatenated(&self) -> Result<Array2<f64>> {
        let joined = match &self.contextual {
            Some(ctx) => concatenate(
                Axis(1),
                &[self.word.view(), self.tweet.view(), ctx.view()],
            )?,
            None => concatenate(Axis(1), &[self.word.view(), self.tweet.view()])?,
        };
        Ok(joined)
    }
}

/// Row-gather by index into an owned matrix.
pub(crate) fn gather_rows(src: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros((indices.len(), src.ncols()));
    for (row, &i) in indices.iter().enumerate() {
        out.row_mut(row).assign(&src.row(i));
    }
    out
}

/// Element-gather by index into an owned vector.
pub(crate) fn gather_elems(src: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    Array1::from_iter(indices.iter().map(|&i| src[i]))
}

/// One epoch's metric snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Ordered per-epoch snapshots from one fit call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
    pub stopped_early: bool,
    /// Epoch whose parameters were restored, when early stopping tracked one.
    pub best_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn n_epochs(&self) -> usize {
        self.epochs.len()
    }
}

/// Uniform wrapper over the three families.
///
/// The orchestrator constructs a fresh value per fold and only ever talks to
/// this enum, never to a concrete family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExperimentModel {
    Baseline(BaselineClassifier),
    Network(BranchNetwork),
    Margin(MarginClassifier),
}

impl ExperimentModel {
    /// A fresh, untrained model of the given family.
    pub fn untrained(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Baseline => ExperimentModel::Baseline(BaselineClassifier::new()),
            ModelFamily::BranchNetwork => ExperimentModel::Network(BranchNetwork::new()),
            ModelFamily::MarginClassifier => ExperimentModel::Margin(MarginClassifier::new()),
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            ExperimentModel::Baseline(_) => ModelFamily::Baseline,
            ExperimentModel::Network(_) => ModelFamily::BranchNetwork,
            ExperimentModel::Margin(_) => ModelFamily::MarginClassifier,
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            ExperimentModel::Baseline(m) => m.is_fitted(),
            ExperimentModel::Network(m) => m.is_fitted(),
            ExperimentModel::Margin(m) => m.is_fitted(),
        }
    }

    /// Train on the given rows. Labels must be row-aligned with the inputs.
    pub fn fit(
        &mut self,
        inputs: &ModelInputs,
        labels: &Array1<f64>,
        settings: &TrainSettings,
    ) -> Result<TrainingHistory> {
        if inputs.n_rows() != labels.len() {
            return Err(VitriolError::ShapeError {
                expected: format!("{} labels", inputs.n_rows()),
                actual: format!("{} labels", labels.len()),
            });
        }

        match self {
            ExperimentModel::Baseline(m) => m.fit(inputs, labels, settings),
            ExperimentModel::Network(m) => m.fit(inputs, labels, settings),
            ExperimentModel::Margin(m) => m.fit(inputs, labels, settings),
        }
    }

    /// Score the given rows and compute the held-out metrics report.
    ///
    /// Loss applies to the probabilistic families, AUC to the network; the
    /// margin family reports the threshold metrics only.
    pub fn evaluate(&self, inputs: &ModelInputs, labels: &Array1<f64>) -> Result<EvalReport> {
        if inputs.n_rows() != labels.len() {
            return Err(VitriolError::ShapeError {
                expected: format!("{} labels", inputs.n_rows()),
                actual: format!("{} labels", labels.len()),
            });
        }

        let scores = self.predict(inputs)?;
        let (loss, with_auc) = match self {
            ExperimentModel::Baseline(_) => {
                (Some(binary_cross_entropy(&scores, labels)), false)
            }
            ExperimentModel::Network(_) => (Some(binary_cross_entropy(&scores, labels)), true),
            ExperimentModel::Margin(_) => (None, false),
        };

        Ok(EvalReport::from_scores(&scores, labels, loss, with_auc))
    }

    /// Per-row scalar scores in input order.
    pub fn predict(&self, inputs: &ModelInputs) -> Result<Array1<f64>> {
        match self {
            ExperimentModel::Baseline(m) => m.predict(inputs),
            ExperimentModel::Network(m) => m.predict(inputs),
            ExperimentModel::Margin(m) => m.predict(inputs),
        }
    }

    /// Drop all trained parameters, returning to the untrained condition.
    pub fn reset(&mut self) {
        match self {
            ExperimentModel::Baseline(m) => m.reset(),
            ExperimentModel::Network(m) => m.reset(),
            ExperimentModel::Margin(m) => m.reset(),
        }
    }

    /// Human-readable architecture description for the run log.
    pub fn summary(&self) -> String {
        match self {
            ExperimentModel::Baseline(m) => m.summary(),
            ExperimentModel::Network(m) => m.summary(),
            ExperimentModel::Margin(m) => m.summary(),
        }
    }

    /// Persist trained parameters as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if !self.is_fitted() {
            return Err(VitriolError::ModelNotFitted);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Restore a previously saved model.
    ///
    /// A missing file is a `MissingArtifact` (recoverable, "no saved model");
    /// a file that exists but fails to parse is a `CorruptArtifact`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VitriolError::MissingArtifact(format!(
                    "no saved model parameters at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw).map_err(|e| {
            VitriolError::CorruptArtifact(format!(
                "saved model parameters at {} are unreadable: {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(label: u8, word: Vec<f64>, tweet: Vec<f64>) -> Example {
        Example {
            text: format!("example {}", label),
            label,
            word_vec: word,
            tweet_vec: tweet,
            contextual_vec: None,
        }
    }

    #[test]
    fn test_family_parse_roundtrip() {
        for family in [
            ModelFamily::Baseline,
            ModelFamily::BranchNetwork,
            ModelFamily::MarginClassifier,
        ] {
            assert_eq!(ModelFamily::parse(family.as_str()).unwrap(), family);
        }
        assert!(ModelFamily::parse("transformer").is_err());
    }

    #[test]
    fn test_inputs_from_examples() {
        let examples = vec![
            example(1, vec![1.0, 2.0], vec![0.5]),
            example(0, vec![3.0, 4.0], vec![0.6]),
        ];
        let inputs = ModelInputs::from_examples(&examples).unwrap();

        assert_eq!(inputs.n_rows(), 2);
        assert_eq!(inputs.word.ncols(), 2);
        assert_eq!(inputs.tweet.ncols(), 1);
        assert!(inputs.contextual.is_none());
        assert_eq!(inputs.word[[1, 0]], 3.0);
    }

    #[test]
    fn test_inputs_reject_ragged_rows() {
        let examples = vec![
            example(1, vec![1.0, 2.0], vec![0.5]),
            example(0, vec![3.0], vec![0.6]),
        ];
        assert!(ModelInputs::from_examples(&examples).is_err());
    }

    #[test]
    fn test_inputs_reject_mixed_contextual() {
        let mut examples = vec![
            example(1, vec![1.0], vec![0.5]),
            example(0, vec![2.0], vec![0.6]),
        ];
        examples[0].contextual_vec = Some(vec![9.0]);
        assert!(ModelInputs::from_examples(&examples).is_err());
    }

    #[test]
    fn test_take_rows_copies() {
        let examples = vec![
            example(1, vec![1.0], vec![0.1]),
            example(0, vec![2.0], vec![0.2]),
            example(1, vec![3.0], vec![0.3]),
        ];
        let inputs = ModelInputs::from_examples(&examples).unwrap();
        let subset = inputs.take_rows(&[2, 0]);

        assert_eq!(subset.n_rows(), 2);
        assert_eq!(subset.word[[0, 0]], 3.0);
        assert_eq!(subset.word[[1, 0]], 1.0);
    }

    #[test]
    fn test_concatenated_width() {
        let mut examples = vec![
            example(1, vec![1.0, 2.0], vec![0.1, 0.2, 0.3]),
            example(0, vec![3.0, 4.0], vec![0.4, 0.5, 0.6]),
        ];
        for e in &mut examples {
            e.contextual_vec = Some(vec![7.0]);
        }
        let inputs = ModelInputs::from_examples(&examples).unwrap();
        let joined = inputs.concatenated().unwrap();

        assert_eq!(joined.ncols(), 6);
        assert_eq!(joined[[0, 5]], 7.0);
    }

    #[test]
    fn test_untrained_model_family() {
        let model = ExperimentModel::untrained(ModelFamily::MarginClassifier);
        assert_eq!(model.family(), ModelFamily::MarginClassifier);
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_load_missing_file_is_recoverable() {
        let err = ExperimentModel::load(Path::new("/nonexistent/params.json")).unwrap_err();
        assert!(matches!(err, VitriolError::MissingArtifact(_)));
        assert!(err.is_soft_abort());
    }
}
