//! Multi-branch network
//!
//! One dense branch per feature source (word embeddings, tweet embeddings,
//! optional contextual vectors), concatenated into a joint hidden layer and a
//! single sigmoid output. Trained with mini-batch RMSprop on binary
//! cross-entropy, with an internal validation carve-out and early stopping
//! that restores the best-seen parameters.

use ndarray::{s, Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitriolError};

use super::metrics::binary_cross_entropy;
use super::{gather_elems, gather_rows, EpochRecord, ModelInputs, TrainSettings, TrainingHistory};

const RMS_DECAY: f64 = 0.9;
const RMS_EPSILON: f64 = 1e-8;

/// One dense layer's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    w: Array2<f64>,
    b: Array1<f64>,
}

impl Dense {
    fn zeros_like(other: &Dense) -> Self {
        Dense {
            w: Array2::zeros(other.w.raw_dim()),
            b: Array1::zeros(other.b.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkParams {
    /// One branch per feature source, in fixed order (word, tweet,
    /// contextual when present).
    branches: Vec<Dense>,
    joint: Dense,
    out: Dense,
    source_dims: Vec<usize>,
}

/// Intermediate values of one forward pass, kept for backpropagation.
struct ForwardPass {
    branch_z: Vec<Array2<f64>>,
    branch_h: Vec<Array2<f64>>,
    joint_z: Array2<f64>,
    joint_h: Array2<f64>,
    scores: Array1<f64>,
}

/// The multi-branch neural model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchNetwork {
    branch_units: usize,
    joint_units: usize,
    learning_rate: f64,
    params: Option<NetworkParams>,
}

impl Default for BranchNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchNetwork {
    pub fn new() -> Self {
        Self {
            branch_units: 64,
            joint_units: 32,
            learning_rate: 0.001,
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
            Some(p) => {
                let names = ["word", "tweet", "contextual"];
                let mut lines = vec!["multi-branch-network".to_string()];
                for (i, branch) in p.branches.iter().enumerate() {
                    lines.push(format!(
                        "  {} branch: {} -> {} (relu)",
                        names[i],
                        branch.w.nrows(),
                        branch.w.ncols()
                    ));
                }
                lines.push(format!(
                    "  joint: {} -> {} (relu)",
                    p.joint.w.nrows(),
                    p.joint.w.ncols()
                ));
                lines.push(format!("  output: {} -> 1 (sigmoid)", p.out.w.nrows()));
                lines.join("\n")
            }
            None => format!(
                "multi-branch-network (untrained): {} units per branch, {} joint units",
                self.branch_units, self.joint_units
            ),
        }
    }

    pub fn fit(
        &mut self,
        inputs: &ModelInputs,
        labels: &Array1<f64>,
        settings: &TrainSettings,
    ) -> Result<TrainingHistory> {
        let sources = source_matrices(inputs);
        let n_samples = labels.len();
        if settings.batch_size == 0 {
            return Err(VitriolError::InvalidParameter {
                name: "batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(settings.seed);
        self.params = Some(self.initialize(&sources, &mut rng));

        // Validation carve-out: the trailing fraction of the rows, matching
        // the usual validation_split convention.
        let val_size = (n_samples as f64 * settings.validation_split) as usize;
        let train_size = n_samples - val_size;
        if train_size == 0 {
            return Err(VitriolError::TrainingError(
                "validation carve-out leaves no training rows".to_string(),
            ));
        }

        let train_sources: Vec<Array2<f64>> = sources
            .iter()
            .map(|x| x.slice(s![..train_size, ..]).to_owned())
            .collect();
        let y_train = labels.slice(s![..train_size]).to_owned();
        let val_sources: Vec<Array2<f64>> = sources
            .iter()
            .map(|x| x.slice(s![train_size.., ..]).to_owned())
            .collect();
        let y_val = labels.slice(s![train_size..]).to_owned();

        let mut caches = {
            let p = self.params.as_ref().ok_or(VitriolError::ModelNotFitted)?;
            OptCaches::zeros_like(p)
        };

        let mut history = TrainingHistory::default();
        let mut best_val_loss = f64::INFINITY;
        let mut best_params: Option<NetworkParams> = None;
        let mut best_epoch = 0;
        let mut patience_counter = 0;

        for epoch in 1..=settings.epochs {
            let mut indices: Vec<usize> = (0..train_size).collect();
            indices.shuffle(&mut rng);

            for batch_start in (0..train_size).step_by(settings.batch_size) {
                let batch_end = (batch_start + settings.batch_size).min(train_size);
                let batch_indices = &indices[batch_start..batch_end];

                let x_batch: Vec<Array2<f64>> = train_sources
                    .iter()
                    .map(|x| gather_rows(x, batch_indices))
                    .collect();
                let y_batch = gather_elems(&y_train, batch_indices);

                let params = self.params.as_mut().ok_or(VitriolError::ModelNotFitted)?;
                let pass = forward(params, &x_batch);
                let grads = backward(params, &x_batch, &y_batch, &pass);
                apply_rmsprop(params, &mut caches, &grads, self.learning_rate);
            }

            let train_scores = self.score_sources(&train_sources)?;
            let loss = binary_cross_entropy(&train_scores, &y_train);
            let accuracy = threshold_accuracy(&train_scores, &y_train);

            if !loss.is_finite() {
                return Err(VitriolError::TrainingError(format!(
                    "loss diverged at epoch {}",
                    epoch
                )));
            }

            let (val_loss, val_accuracy) = if val_size > 0 {
                let val_scores = self.score_sources(&val_sources)?;
                (
                    Some(binary_cross_entropy(&val_scores, &y_val)),
                    Some(threshold_accuracy(&val_scores, &y_val)),
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
        let sources = source_matrices(inputs);

        if sources.len() != params.source_dims.len() {
            return Err(VitriolError::ShapeError {
                expected: format!("{} feature sources", params.source_dims.len()),
                actual: format!("{} feature sources", sources.len()),
            });
        }
        for (source, dim) in sources.iter().zip(params.source_dims.iter()) {
            if source.ncols() != *dim {
                return Err(VitriolError::ShapeError {
                    expected: format!("source dim {}", dim),
                    actual: format!("source dim {}", source.ncols()),
                });
            }
        }

        let owned: Vec<Array2<f64>> = sources.iter().map(|x| x.to_owned()).collect();
        Ok(forward(params, &owned).scores)
    }

    fn score_sources(&self, sources: &[Array2<f64>]) -> Result<Array1<f64>> {
        let params = self.params.as_ref().ok_or(VitriolError::ModelNotFitted)?;
        Ok(forward(params, sources).scores)
    }

    fn initialize(&self, sources: &[ndarray::ArrayView2<f64>], rng: &mut Xoshiro256PlusPlus) -> NetworkParams {
        let source_dims: Vec<usize> = sources.iter().map(|x| x.ncols()).collect();

        let branches: Vec<Dense> = source_dims
            .iter()
            .map(|&dim| xavier_dense(dim, self.branch_units, rng))
            .collect();
        let joint_in = self.branch_units * branches.len();
        let joint = xavier_dense(joint_in, self.joint_units, rng);
        let out = xavier_dense(self.joint_units, 1, rng);

        NetworkParams {
            branches,
            joint,
            out,
            source_dims,
        }
    }
}

/// The active feature sources for this run, in fixed order.
fn source_matrices(inputs: &ModelInputs) -> Vec<ndarray::ArrayView2<f64>> {
    let mut sources = vec![inputs.word.view(), inputs.tweet.view()];
    if let Some(ctx) = &inputs.contextual {
        sources.push(ctx.view());
    }
    sources
}

fn xavier_dense(n_in: usize, n_out: usize, rng: &mut Xoshiro256PlusPlus) -> Dense {
    let scale = (2.0 / (n_in + n_out) as f64).sqrt();
    let weights: Vec<f64> = (0..n_in * n_out)
        .map(|_| rng.gen::<f64>() * 2.0 * scale - scale)
        .collect();

    Dense {
        // Shape and length agree by construction.
        w: Array2::from_shape_vec((n_in, n_out), weights).unwrap(),
        b: Array1::zeros(n_out),
    }
}

fn relu(z: &Array2<f64>) -> Array2<f64> {
    z.mapv(|v| v.max(0.0))
}

fn relu_derivative(z: &Array2<f64>) -> Array2<f64> {
    z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn forward(params: &NetworkParams, sources: &[Array2<f64>]) -> ForwardPass {
    let mut branch_z = Vec::with_capacity(params.branches.len());
    let mut branch_h = Vec::with_capacity(params.branches.len());

    for (source, branch) in sources.iter().zip(params.branches.iter()) {
        let z = source.dot(&branch.w) + &branch.b;
        branch_h.push(relu(&z));
        branch_z.push(z);
    }

    let views: Vec<_> = branch_h.iter().map(|h| h.view()).collect();
    // Branch activations share a row count, so concatenation cannot fail.
    let h = ndarray::concatenate(Axis(1), &views).unwrap();

    let joint_z = h.dot(&params.joint.w) + &params.joint.b;
    let joint_h = relu(&joint_z);

    let logits = joint_h.dot(&params.out.w) + &params.out.b;
    let scores = logits.column(0).mapv(sigmoid);

    ForwardPass {
        branch_z,
        branch_h,
        joint_z,
        joint_h,
        scores,
    }
}

struct Gradients {
    branches: Vec<Dense>,
    joint: Dense,
    out: Dense,
}

/// Backpropagation of mean binary cross-entropy through the sigmoid head.
fn backward(
    params: &NetworkParams,
    sources: &[Array2<f64>],
    labels: &Array1<f64>,
    pass: &ForwardPass,
) -> Gradients {
    let n = labels.len() as f64;

    // d(loss)/d(logit) for sigmoid + cross-entropy collapses to (p - y) / n.
    let delta_out = ((&pass.scores - labels) / n).insert_axis(Axis(1));

    let grad_out = Dense {
        w: pass.joint_h.t().dot(&delta_out),
        b: delta_out.sum_axis(Axis(0)),
    };

    let delta_joint = delta_out.dot(&params.out.w.t()) * relu_derivative(&pass.joint_z);
    let views: Vec<_> = pass.branch_h.iter().map(|h| h.view()).collect();
    let h = ndarray::concatenate(Axis(1), &views).unwrap();

    let grad_joint = Dense {
        w: h.t().dot(&delta_joint),
        b: delta_joint.sum_axis(Axis(0)),
    };

    let delta_h = delta_joint.dot(&params.joint.w.t());

    let mut grad_branches = Vec::with_capacity(params.branches.len());
    let mut col = 0;
    for (i, branch) in params.branches.iter().enumerate() {
        let width = branch.w.ncols();
        let block = delta_h.slice(s![.., col..col + width]).to_owned();
        let delta_branch = block * relu_derivative(&pass.branch_z[i]);

        grad_branches.push(Dense {
            w: sources[i].t().dot(&delta_branch),
            b: delta_branch.sum_axis(Axis(0)),
        });
        col += width;
    }

    Gradients {
        branches: grad_branches,
        joint: grad_joint,
        out: grad_out,
    }
}

struct OptCaches {
    branches: Vec<Dense>,
    joint: Dense,
    out: Dense,
}

impl OptCaches {
    fn zeros_like(params: &NetworkParams) -> Self {
        OptCaches {
            branches: params.branches.iter().map(Dense::zeros_like).collect(),
            joint: Dense::zeros_like(&params.joint),
            out: Dense::zeros_like(&params.out),
        }
    }
}

fn rmsprop_layer(param: &mut Dense, cache: &mut Dense, grad: &Dense, lr: f64) {
    cache.w = &cache.w * RMS_DECAY + &grad.w.mapv(|g| g * g) * (1.0 - RMS_DECAY);
    cache.b = &cache.b * RMS_DECAY + &grad.b.mapv(|g| g * g) * (1.0 - RMS_DECAY);

    let denom_w = cache.w.mapv(|c| c.sqrt() + RMS_EPSILON);
    let denom_b = cache.b.mapv(|c| c.sqrt() + RMS_EPSILON);

    param.w = &param.w - &(&grad.w / &denom_w * lr);
    param.b = &param.b - &(&grad.b / &denom_b * lr);
}

fn apply_rmsprop(params: &mut NetworkParams, caches: &mut OptCaches, grads: &Gradients, lr: f64) {
    for i in 0..params.branches.len() {
        rmsprop_layer(
            &mut params.branches[i],
            &mut caches.branches[i],
            &grads.branches[i],
            lr,
        );
    }
    rmsprop_layer(&mut params.joint, &mut caches.joint, &grads.joint, lr);
    rmsprop_layer(&mut params.out, &mut caches.out, &grads.out, lr);
}

fn threshold_accuracy(scores: &Array1<f64>, labels: &Array1<f64>) -> f64 {
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
