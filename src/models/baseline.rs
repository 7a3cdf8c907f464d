//! Shallow baseline
//!
//! A single logistic unit over the averaged word-embedding vector. Slow to be
//! wrong, fast to train; the reference point the other families are measured
//! against.

use ndarray::{s, Array1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitriolError};

use super::metrics::binary_cross_entropy;
use super::{gather_elems, gather_rows, EpochRecord, ModelInputs, TrainSettings, TrainingHistory};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogisticParams {
    w: Array1<f64>,
    b: f64,
}

/// Averaged-embedding logistic baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineClassifier {
    learning_rate: f64,
    params: Option<LogisticParams>,
}

impl Default for BaselineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BaselineClassifier {
    pub fn new() -> Self {
        Self {
            learning_rate: 0.1,
            params: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn reset(&mut self) {
        self.params = None;
    }

    pub fn summary(&self) -> String {
        match &self.params {
            Some(p) => format!(
                "baseline\n  averaged word embeddings: {} -> 1 (sigmoid)",
                p.w.len()
            ),
            None => "baseline (untrained): logistic unit over averaged word embeddings"
                .to_string(),
        }
    }

    pub fn fit(
        &mut self,
        inputs: &ModelInputs,
        labels: &Array1<f64>,
        settings: &TrainSettings,
    ) -> Result<TrainingHistory> {
        let x = &inputs.word;
        let n_samples = labels.len();
        if settings.batch_size == 0 {
            return Err(VitriolError::InvalidParameter {
                name: "batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        self.params = Some(LogisticParams {
            w: Array1::zeros(x.ncols()),
            b: 0.0,
        });

        let val_size = (n_samples as f64 * settings.validation_split) as usize;
        let train_size = n_samples - val_size;
        if train_size == 0 {
            return Err(VitriolError::TrainingError(
                "validation carve-out leaves no training rows".to_string(),
            ));
        }

        let x_train = x.slice(s![..train_size, ..]).to_owned();
        let y_train = labels.slice(s![..train_size]).to_owned();
        let x_val = x.slice(s![train_size.., ..]).to_owned();
        let y_val = labels.slice(s![train_size..]).to_owned();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(settings.seed);

        let mut history = TrainingHistory::default();
        let mut best_val_loss = f64::INFINITY;
        let mut best_params: Option<LogisticParams> = None;
        let mut best_epoch = 0;
        let mut patience_counter = 0;

        for epoch in 1..=settings.epochs {
            let mut indices: Vec<usize> = (0..train_size).collect();
            indices.shuffle(&mut rng);

            for batch_start in (0..train_size).step_by(settings.batch_size) {
                let batch_end = (batch_start + settings.batch_size).min(train_size);
                let batch_indices = &indices[batch_start..batch_end];

                let x_batch = gather_rows(&x_train, batch_indices);
                let y_batch = gather_elems(&y_train, batch_indices);

                let params = self.params.as_mut().ok_or(VitriolError::ModelNotFitted)?;
                let scores = x_batch.dot(&params.w).mapv(|z| sigmoid(z + params.b));
                let residual = &scores - &y_batch;
                let n = y_batch.len() as f64;

                let grad_w = x_batch.t().dot(&residual) / n;
                let grad_b = residual.sum() / n;

                params.w = &params.w - &(grad_w * self.learning_rate);
                params.b -= grad_b * self.learning_rate;
            }

            let train_scores = self.score_matrix(&x_train)?;
            let loss = binary_cross_entropy(&train_scores, &y_train);
            let accuracy = fraction_correct(&train_scores, &y_train);

            if !loss.is_finite() {
                return Err(VitriolError::TrainingError(format!(
                    "loss diverged at epoch {}",
                    epoch
                )));
            }

            let (val_loss, val_accuracy) = if val_size > 0 {
                let val_scores = self.score_matrix(&x_val)?;
                (
                    Some(binary_cross_entropy(&val_scores, &y_val)),
                    Some(fraction_correct(&val_scores, &y_val)),
                )
            } else {
                (None, None)
            };

            history.epochs.push(EpochRecord {
                epoch,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
            });

            if let Some(vl) = val_loss {
                if vl < best_val_loss {
                    best_val_loss = vl;
                    best_params = self.params.clone();
                    best_epoch = epoch;
                    patience_counter = 0;
                } else {
                    patience_counter += 1;
                    if patience_counter >= settings.patience {
                        if let Some(best) = best_params.take() {
                            self.params = Some(best);
                            history.best_epoch = Some(best_epoch);
                        }
                        history.stopped_early = true;
                        break;
                    }
                }
            }
        }

        Ok(history)
    }

    pub fn predict(&self, inputs: &ModelInputs) -> Result<Array1<f64>> {
        let params = self.params.as_ref().ok_or(VitriolError::ModelNotFitted)?;
        if inputs.word.ncols() != params.w.len() {
            return Err(VitriolError::ShapeError {
                expected: format!("word dim {}", params.w.len()),
                actual: format!("word dim {}", inputs.word.ncols()),
            });
        }
        self.score_matrix(&inputs.word)
    }

    fn score_matrix(&self, x: &ndarray::Array2<f64>) -> Result<Array1<f64>> {
        let params = self.params.as_ref().ok_or(VitriolError::ModelNotFitted)?;
        Ok(x.dot(&params.w).mapv(|z| sigmoid(z + params.b)))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn fraction_correct(scores: &Array1<f64>, labels: &Array1<f64>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let correct = scores
        .iter()
        .zip(labels.iter())
        .filter(|(s, l)| (**s > 0.5) == (**l > 0.5))
        .count();
    correct as f64 / scores.len() as f64
}
