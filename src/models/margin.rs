//! Margin classifier
//!
//! A binary linear-kernel SVM trained with SMO (Sequential Minimal
//! Optimization) over the concatenated feature sources. With a linear kernel
//! the dual solution collapses into one explicit weight vector, so the
//! persisted state is just that vector and a bias. Scores are the signed
//! decision values squashed through a sigmoid so they are comparable with the
//! probabilistic families.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitriolError};

use super::{EpochRecord, ModelInputs, TrainSettings, TrainingHistory};

/// Cap on eager kernel matrix size to keep memory bounded.
const MAX_SMO_SAMPLES: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarginParams {
    w: Array1<f64>,
    bias: f64,
}

/// Linear-kernel margin classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginClassifier {
    c: f64,
    tol: f64,
    max_iter: usize,
    params: Option<MarginParams>,
}

impl Default for MarginClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MarginClassifier {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            tol: 1e-3,
            max_iter: 1000,
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
                "margin-classifier\n  linear kernel over {} concatenated features (C = {})",
                p.w.len(),
                self.c
            ),
            None => format!(
                "margin-classifier (untrained): linear kernel, C = {}",
                self.c
            ),
        }
    }

    pub fn fit(
        &mut self,
        inputs: &ModelInputs,
        labels: &Array1<f64>,
        settings: &TrainSettings,
    ) -> Result<TrainingHistory> {
        let x = inputs.concatenated()?;
        let n = x.nrows();

        if n > MAX_SMO_SAMPLES {
            return Err(VitriolError::TrainingError(format!(
                "{} samples exceed the {} sample cap for the kernel matrix",
                n, MAX_SMO_SAMPLES
            )));
        }

        let n_pos = labels.iter().filter(|l| **l > 0.5).count();
        if n_pos == 0 || n_pos == n {
            return Err(VitriolError::TrainingError(
                "margin classifier requires both classes in the training rows".to_string(),
            ));
        }

        let y_signed: Array1<f64> = labels.mapv(|v| if v > 0.5 { 1.0 } else { -1.0 });
        let (alphas, bias) = self.smo_train(&x, &y_signed, settings.seed)?;

        // Linear kernel: fold the dual solution into one primal weight vector.
        let coef = &alphas * &y_signed;
        let w = x.t().dot(&coef);
        self.params = Some(MarginParams { w, bias });

        // SMO is not epoch-structured; the history is one final snapshot.
        let decisions = self.decision_values(inputs)?;
        let hinge = mean_hinge_loss(&decisions, &y_signed);
        let correct = decisions
            .iter()
            .zip(labels.iter())
            .filter(|(d, l)| (**d >= 0.0) == (**l > 0.5))
            .count();

        Ok(TrainingHistory {
            epochs: vec![EpochRecord {
                epoch: 1,
                loss: hinge,
                accuracy: correct as f64 / n as f64,
                val_loss: None,
                val_accuracy: None,
            }],
            stopped_early: false,
            best_epoch: None,
        })
    }

    /// Sigmoid-squashed decision values.
    pub fn predict(&self, inputs: &ModelInputs) -> Result<Array1<f64>> {
        let decisions = self.decision_values(inputs)?;
        Ok(decisions.mapv(|d| 1.0 / (1.0 + (-d).exp())))
    }

    /// Raw signed distances to the separating hyperplane.
    pub fn decision_values(&self, inputs: &ModelInputs) -> Result<Array1<f64>> {
        let params = self.params.as_ref().ok_or(VitriolError::ModelNotFitted)?;
        let x = inputs.concatenated()?;

        if x.ncols() != params.w.len() {
            return Err(VitriolError::ShapeError {
                expected: format!("{} concatenated features", params.w.len()),
                actual: format!("{} concatenated features", x.ncols()),
            });
        }

        Ok(x.dot(&params.w) + params.bias)
    }

    /// Simplified SMO on the precomputed linear kernel matrix.
    fn smo_train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        seed: u64,
    ) -> Result<(Array1<f64>, f64)> {
        let n = x.nrows();
        let mut alphas = Array1::zeros(n);
        let mut bias = 0.0;

        let kernel_matrix = x.dot(&x.t());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.max_iter {
            let mut num_changed = 0;

            if n <= 1 {
                break;
            }

            for i in 0..n {
                let e_i = cached_decision(&kernel_matrix, &alphas, y, bias, i) - y[i];

                if (y[i] * e_i < -self.tol && alphas[i] < self.c)
                    || (y[i] * e_i > self.tol && alphas[i] > 0.0)
                {
                    let j = loop {
                        let j = rng.gen_range(0..n);
                        if j != i {
                            break j;
                        }
                    };

                    let e_j = cached_decision(&kernel_matrix, &alphas, y, bias, j) - y[j];

                    let alpha_i_old = alphas[i];
                    let alpha_j_old = alphas[j];

                    let (l, h) = if y[i] != y[j] {
                        (
                            (alphas[j] - alphas[i]).max(0.0),
                            (self.c + alphas[j] - alphas[i]).min(self.c),
                        )
                    } else {
                        (
                            (alphas[i] + alphas[j] - self.c).max(0.0),
                            (alphas[i] + alphas[j]).min(self.c),
                        )
                    };

                    if (l - h).abs() < 1e-10 {
                        continue;
                    }

                    let eta = 2.0 * kernel_matrix[[i, j]]
                        - kernel_matrix[[i, i]]
                        - kernel_matrix[[j, j]];
                    if eta >= 0.0 {
                        continue;
                    }

                    alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);

                    if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                        continue;
                    }

                    alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

                    let b1 = bias
                        - e_i
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, i]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[i, j]];
                    let b2 = bias
                        - e_j
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, j]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[j, j]];

                    bias = if alphas[i] > 0.0 && alphas[i] < self.c {
                        b1
                    } else if alphas[j] > 0.0 && alphas[j] < self.c {
                        b2
                    } else {
                        (b1 + b2) / 2.0
                    };

                    num_changed += 1;
                }
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        Ok((alphas, bias))
    }
}

fn cached_decision(
    k: &Array2<f64>,
    alphas: &Array1<f64>,
    y: &Array1<f64>,
    bias: f64,
    idx: usize,
) -> f64 {
    let mut sum = 0.0;
    for i in 0..alphas.len() {
        sum += alphas[i] * y[i] * k[[i, idx]];
    }
    sum + bias
}

fn mean_hinge_loss(decisions: &Array1<f64>, y_signed: &Array1<f64>) -> f64 {
    if decisions.is_empty() {
        return 0.0;
    }
    decisions
        .iter()
        .zip(y_signed.iter())
        .map(|(d, y)| (1.0 - y * d).max(0.0))
        .sum::<f64>()
        / decisions.len() as f64
}
