//! Dataset records and the persisted train/test split

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load_source_records, SplitStore};

/// Raw class value meaning "neither hateful nor offensive".
pub const NEITHER_CLASS: i64 = 2;

/// One row of the raw dataset TSV: identifier, the three annotator-count
/// columns, the majority class, and the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: i64,
    pub hate_count: i64,
    pub offensive_count: i64,
    pub neither_count: i64,
    pub class: i64,
    pub text: String,
}

impl SourceRecord {
    /// Collapse the three-way class into the binary task label:
    /// hate or offensive = 1, neither = 0.
    pub fn binary_label(&self) -> u8 {
        if self.class == NEITHER_CLASS {
            0
        } else {
            1
        }
    }
}

/// One text with its binary label, as stored in the persisted split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledText {
    pub text: String,
    pub label: u8,
}

/// One fully assembled instance.
///
/// Bundling the per-example fields in a single record makes index alignment
/// across texts, labels, and the feature vectors structural: a slice of
/// examples cannot drift out of lockstep.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub text: String,
    pub label: u8,
    pub word_vec: Vec<f64>,
    pub tweet_vec: Vec<f64>,
    pub contextual_vec: Option<Vec<f64>>,
}

impl Example {
    pub fn is_positive(&self) -> bool {
        self.label == 1
    }
}

/// Positive-label proportions over the two partitions and their union.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelProportions {
    pub train: f64,
    pub test: f64,
    pub combined: f64,
}

/// Fraction of positive labels in the training partition, the test
/// partition, and the combined pool.
pub fn label_proportions(train_labels: &[u8], test_labels: &[u8]) -> LabelProportions {
    let train_pos = train_labels.iter().filter(|l| **l == 1).count();
    let test_pos = test_labels.iter().filter(|l| **l == 1).count();

    let ratio = |pos: usize, total: usize| {
        if total > 0 {
            pos as f64 / total as f64
        } else {
            0.0
        }
    };

    LabelProportions {
        train: ratio(train_pos, train_labels.len()),
        test: ratio(test_pos, test_labels.len()),
        combined: ratio(
            train_pos + test_pos,
            train_labels.len() + test_labels.len(),
        ),
    }
}
