//! Feature extraction for labeled posts.
//!
//! A [`FeatureProvider`] turns a list of raw texts into aligned word,
//! tweet-level, and optionally contextual vector streams. The streams are
//! zipped back onto the records as [`Example`]s so that every later
//! shuffle or fold assembly moves all per-example fields together.

pub mod cache;
pub mod hashing;

pub use hashing::{HashingProvider, WordTable};

use std::path::PathBuf;

use crate::data::{Example, LabeledText};
use crate::error::{Result, VitriolError};

/// How the contextual stream should be produced for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextualMode {
    /// Leave the contextual stream out entirely.
    Skip,
    /// Compute the vectors and overwrite the cache file.
    Recompute { cache: PathBuf },
    /// Load previously cached vectors, failing when the cache is absent.
    FromCache { cache: PathBuf },
}

/// Aligned per-example feature rows for one list of texts.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub word: Vec<Vec<f64>>,
    pub tweet: Vec<Vec<f64>>,
    pub contextual: Option<Vec<Vec<f64>>>,
}

impl FeatureSet {
    pub fn n_rows(&self) -> usize {
        self.word.len()
    }
}

/// Source of per-example feature vectors.
pub trait FeatureProvider {
    /// Produces the word, tweet, and optional contextual vectors for
    /// `texts`, one row per text, in input order.
    fn embeddings_for(&self, texts: &[String], contextual: &ContextualMode) -> Result<FeatureSet>;
}

/// Zips feature rows back onto the records they were computed from.
pub fn attach_features(records: &[LabeledText], features: FeatureSet) -> Result<Vec<Example>> {
    if features.word.len() != records.len() || features.tweet.len() != records.len() {
        return Err(VitriolError::DataError(format!(
            "feature rows do not line up with the records: {} records, {} word rows, {} tweet rows",
            records.len(),
            features.word.len(),
            features.tweet.len()
        )));
    }
    if let Some(ctx) = &features.contextual {
        if ctx.len() != records.len() {
            return Err(VitriolError::DataError(format!(
                "contextual rows do not line up with the records: {} records, {} contextual rows",
                records.len(),
                ctx.len()
            )));
        }
    }

    let mut examples = Vec::with_capacity(records.len());
    let words = features.word.into_iter();
    let tweets = features.tweet.into_iter();
    for ((record, word_vec), tweet_vec) in records.iter().zip(words).zip(tweets) {
        examples.push(Example {
            text: record.text.clone(),
            label: record.label,
            word_vec,
            tweet_vec,
            contextual_vec: None,
        });
    }
    if let Some(rows) = features.contextual {
        for (example, row) in examples.iter_mut().zip(rows) {
            example.contextual_vec = Some(row);
        }
    }
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<LabeledText> {
        vec![
            LabeledText {
                text: "first post".to_string(),
                label: 1,
            },
            LabeledText {
                text: "second post".to_string(),
                label: 0,
            },
        ]
    }

    #[test]
    fn test_attach_features_bundles_rows() {
        let features = FeatureSet {
            word: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            tweet: vec![vec![0.5], vec![0.6]],
            contextual: None,
        };

        let examples = attach_features(&records(), features).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].text, "first post");
        assert_eq!(examples[0].label, 1);
        assert_eq!(examples[0].word_vec, vec![1.0, 2.0]);
        assert_eq!(examples[1].tweet_vec, vec![0.6]);
        assert!(examples[0].contextual_vec.is_none());
    }

    #[test]
    fn test_attach_features_carries_contextual_rows() {
        let features = FeatureSet {
            word: vec![vec![1.0], vec![2.0]],
            tweet: vec![vec![0.1], vec![0.2]],
            contextual: Some(vec![vec![9.0, 9.0], vec![8.0, 8.0]]),
        };

        let examples = attach_features(&records(), features).unwrap();
        assert_eq!(examples[0].contextual_vec, Some(vec![9.0, 9.0]));
        assert_eq!(examples[1].contextual_vec, Some(vec![8.0, 8.0]));
    }

    #[test]
    fn test_attach_features_rejects_misaligned_rows() {
        let features = FeatureSet {
            word: vec![vec![1.0]],
            tweet: vec![vec![0.1]],
            contextual: None,
        };

        let result = attach_features(&records(), features);
        assert!(matches!(result, Err(VitriolError::DataError(_))));
    }
}
