//! Evaluation metrics for binary classifiers

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Raw confusion counts at the 0.5 decision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_pos: usize,
    pub false_pos: usize,
    pub true_neg: usize,
    pub false_neg: usize,
}

impl ConfusionCounts {
    /// Count confusion cells from scalar scores against 0/1 labels.
    pub fn from_scores(scores: &Array1<f64>, labels: &Array1<f64>) -> Self {
        let mut counts = ConfusionCounts {
            true_pos: 0,
            false_pos: 0,
            true_neg: 0,
            false_neg: 0,
        };

        for (score, label) in scores.iter().zip(labels.iter()) {
            let predicted = *score > 0.5;
            let actual = *label > 0.5;

            match (actual, predicted) {
                (true, true) => counts.true_pos += 1,
                (false, true) => counts.false_pos += 1,
                (false, false) => counts.true_neg += 1,
                (true, false) => counts.false_neg += 1,
            }
        }

        counts
    }

    pub fn total(&self) -> usize {
        self.true_pos + self.false_pos + self.true_neg + self.false_neg
    }
}

/// F-score as the harmonic mean of precision and recall.
///
/// When precision + recall = 0 the harmonic mean is undefined; this returns
/// an explicit 0.0 sentinel so the value is comparable and loggable.
pub fn f_score(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Rank-based ROC AUC (Mann-Whitney with midranks for tied scores).
///
/// Returns `None` when the labels contain only one class, since the area is
/// undefined without both a positive and a negative population.
pub fn roc_auc(scores: &Array1<f64>, labels: &Array1<f64>) -> Option<f64> {
    let n = scores.len();
    let n_pos = labels.iter().filter(|l| **l > 0.5).count();
    let n_neg = n - n_pos;

    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        scores[*a]
            .partial_cmp(&scores[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Midranks: tied scores share the average of their rank range.
    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = midrank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(ranks.iter())
        .filter(|(l, _)| **l > 0.5)
        .map(|(_, r)| *r)
        .sum();

    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Mean binary cross-entropy of scalar scores against 0/1 labels.
pub fn binary_cross_entropy(scores: &Array1<f64>, labels: &Array1<f64>) -> f64 {
    let n = scores.len();
    if n == 0 {
        return 0.0;
    }

    let total: f64 = scores
        .iter()
        .zip(labels.iter())
        .map(|(s, l)| {
            let p = s.clamp(1e-12, 1.0 - 1e-12);
            -(l * p.ln() + (1.0 - l) * (1.0 - p).ln())
        })
        .sum();

    total / n as f64
}

/// One evaluation over a held-out set.
///
/// `loss` and `auc` are populated only for model families where they apply;
/// the remaining fields are always present. Works for a single example
/// (batch size 1) without special cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub loss: Option<f64>,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub auc: Option<f64>,
    pub confusion: ConfusionCounts,
}

impl EvalReport {
    /// Build a report from scalar scores and 0/1 labels.
    ///
    /// `with_auc` requests the ROC area; a degenerate single-class set falls
    /// back to 0.5 (chance level) so fold rows keep a uniform width.
    pub fn from_scores(
        scores: &Array1<f64>,
        labels: &Array1<f64>,
        loss: Option<f64>,
        with_auc: bool,
    ) -> Self {
        let confusion = ConfusionCounts::from_scores(scores, labels);
        let total = confusion.total();

        let accuracy = if total > 0 {
            (confusion.true_pos + confusion.true_neg) as f64 / total as f64
        } else {
            0.0
        };

        let precision = if confusion.true_pos + confusion.false_pos > 0 {
            confusion.true_pos as f64 / (confusion.true_pos + confusion.false_pos) as f64
        } else {
            0.0
        };

        let recall = if confusion.true_pos + confusion.false_neg > 0 {
            confusion.true_pos as f64 / (confusion.true_pos + confusion.false_neg) as f64
        } else {
            0.0
        };

        let auc = if with_auc {
            Some(roc_auc(scores, labels).unwrap_or(0.5))
        } else {
            None
        };

        EvalReport {
            loss,
            accuracy,
            precision,
            recall,
            auc,
            confusion,
        }
    }

    /// Derived F-score with the 0.0 sentinel for the undefined case.
    pub fn f_score(&self) -> f64 {
        f_score(self.precision, self.recall)
    }

    /// Column labels for this report, in fixed order. Width is 4 to 6
    /// depending on whether loss and AUC apply.
    pub fn metric_labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::with_capacity(6);
        if self.loss.is_some() {
            labels.push("loss");
        }
        labels.push("accuracy");
        labels.push("precision");
        labels.push("recall");
        if self.auc.is_some() {
            labels.push("auc");
        }
        labels.push("f_score");
        labels
    }

    /// Values matching [`metric_labels`](Self::metric_labels), in the same
    /// order.
    pub fn metric_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(6);
        if let Some(loss) = self.loss {
            row.push(loss);
        }
        row.push(self.accuracy);
        row.push(self.precision);
        row.push(self.recall);
        if let Some(auc) = self.auc {
            row.push(auc);
        }
        row.push(self.f_score());
        row
    }
}
