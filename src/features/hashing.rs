//! Deterministic hashed text features.
//!
//! Word vectors come from a pretrained lookup table; tokens missing from
//! the table fall back to a vector seeded from the token hash, so unseen
//! words still land on a stable embedding. Tweet-level and contextual
//! vectors are hashed projections computed on the fly.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{cache, ContextualMode, FeatureProvider, FeatureSet};
use crate::error::{Result, VitriolError};

/// Pretrained word vectors, persisted as a JSON artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTable {
    pub dim: usize,
    pub vectors: HashMap<String, Vec<f64>>,
}

impl WordTable {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VitriolError::MissingArtifact(format!(
                    "no pretrained word vectors at {}",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let table: WordTable = serde_json::from_str(&raw).map_err(|err| {
            VitriolError::CorruptArtifact(format!(
                "pretrained word vectors at {} are unreadable: {}",
                path.display(),
                err
            ))
        })?;

        if table.dim == 0 {
            return Err(VitriolError::CorruptArtifact(format!(
                "pretrained word vectors at {} declare a zero dimension",
                path.display()
            )));
        }
        for (token, vector) in &table.vectors {
            if vector.len() != table.dim {
                return Err(VitriolError::CorruptArtifact(format!(
                    "pretrained word vectors at {} have {} values for token {:?}, expected {}",
                    path.display(),
                    vector.len(),
                    token,
                    table.dim
                )));
            }
        }

        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| VitriolError::SerializationError(err.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Feature provider backed by a pretrained word table plus hashed
/// projections for the tweet-level and contextual streams.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    table: WordTable,
    tweet_dim: usize,
    contextual_dim: usize,
}

impl HashingProvider {
    pub fn new(table: WordTable) -> Self {
        Self {
            table,
            tweet_dim: 32,
            contextual_dim: 32,
        }
    }

    pub fn from_artifact(path: &Path) -> Result<Self> {
        let table = WordTable::load(path)?;
        info!(
            tokens = table.vectors.len(),
            dim = table.dim,
            "loaded pretrained word vectors"
        );
        Ok(Self::new(table))
    }

    pub fn with_tweet_dim(mut self, dim: usize) -> Self {
        self.tweet_dim = dim.max(1);
        self
    }

    pub fn with_contextual_dim(mut self, dim: usize) -> Self {
        self.contextual_dim = dim.max(1);
        self
    }

    pub fn word_dim(&self) -> usize {
        self.table.dim
    }

    /// Mean of the per-token vectors, with hashed fallbacks for tokens
    /// the table does not cover. Texts without tokens map to zeros.
    fn word_vector(&self, text: &str) -> Vec<f64> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; self.table.dim];
        }

        let mut acc = vec![0.0; self.table.dim];
        for token in &tokens {
            match self.table.vectors.get(token.as_str()) {
                Some(vector) => {
                    for (slot, value) in acc.iter_mut().zip(vector) {
                        *slot += value;
                    }
                }
                None => {
                    let fallback = hashed_fallback(token, self.table.dim);
                    for (slot, value) in acc.iter_mut().zip(&fallback) {
                        *slot += value;
                    }
                }
            }
        }

        let n = tokens.len() as f64;
        for slot in &mut acc {
            *slot /= n;
        }
        acc
    }

    /// Character n-gram counts hashed into a fixed-width row.
    fn tweet_vector(&self, text: &str) -> Vec<f64> {
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        let mut row = vec![0.0; self.tweet_dim];

        for n in 3..=5 {
            if chars.len() < n {
                break;
            }
            for window in chars.windows(n) {
                let gram: String = window.iter().collect();
                let idx = (hash_term(&gram) as usize) % self.tweet_dim;
                row[idx] += 1.0;
            }
        }

        l2_normalize(&mut row);
        row
    }

    /// Order-sensitive hashed projection: the token position folds into
    /// the bucket index, so reordered tokens land in different slots.
    fn contextual_vector(&self, text: &str) -> Vec<f64> {
        let tokens = tokenize(text);
        let mut row = vec![0.0; self.contextual_dim];

        for (pos, token) in tokens.iter().enumerate() {
            let mixed = hash_term(token).wrapping_add((pos as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
            let idx = (mixed as usize) % self.contextual_dim;
            row[idx] += 1.0 / (1.0 + pos as f64);
        }

        l2_normalize(&mut row);
        row
    }
}

impl FeatureProvider for HashingProvider {
    fn embeddings_for(&self, texts: &[String], contextual: &ContextualMode) -> Result<FeatureSet> {
        let word = texts.iter().map(|t| self.word_vector(t)).collect();
        let tweet = texts.iter().map(|t| self.tweet_vector(t)).collect();

        let contextual = match contextual {
            ContextualMode::Skip => None,
            ContextualMode::Recompute { cache } => {
                let rows: Vec<Vec<f64>> = texts.iter().map(|t| self.contextual_vector(t)).collect();
                cache::save_matrix(cache, &rows)?;
                info!(rows = rows.len(), cache = %cache.display(), "recomputed contextual vectors");
                Some(rows)
            }
            ContextualMode::FromCache { cache } => {
                let rows = cache::load_matrix(cache)?;
                if rows.len() != texts.len() {
                    return Err(VitriolError::CorruptArtifact(format!(
                        "cached contextual vectors at {} cover {} rows, expected {}; run with --recompute-contextual",
                        cache.display(),
                        rows.len(),
                        texts.len()
                    )));
                }
                Some(rows)
            }
        };

        Ok(FeatureSet {
            word,
            tweet,
            contextual,
        })
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn hash_term(term: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in term.bytes() {
        hash = ((hash << 5).wrapping_add(hash)).wrapping_add(byte as u64);
    }
    hash
}

/// Stable pseudo-embedding for tokens missing from the table.
fn hashed_fallback(token: &str, dim: usize) -> Vec<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(hash_term(token));
    let bound = 1.0 / dim as f64;
    (0..dim).map(|_| rng.gen_range(-bound..bound)).collect()
}

fn l2_normalize(row: &mut [f64]) {
    let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in row.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_table() -> WordTable {
        let mut vectors = HashMap::new();
        vectors.insert("good".to_string(), vec![1.0, 0.0]);
        vectors.insert("bad".to_string(), vec![0.0, 1.0]);
        WordTable { dim: 2, vectors }
    }

    #[test]
    fn test_word_vector_averages_table_entries() {
        let provider = HashingProvider::new(small_table());
        let vector = provider.word_vector("good bad");
        assert!((vector[0] - 0.5).abs() < 1e-12);
        assert!((vector[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_word_vector_empty_text_is_zero() {
        let provider = HashingProvider::new(small_table());
        assert_eq!(provider.word_vector("!!!"), vec![0.0, 0.0]);
    }

    #[test]
    fn test_oov_fallback_is_stable() {
        let a = hashed_fallback("zzyzx", 8);
        let b = hashed_fallback("zzyzx", 8);
        assert_eq!(a, b);
        assert!(a.iter().any(|v| *v != 0.0));
        assert_ne!(a, hashed_fallback("xyzzy", 8));
    }

    #[test]
    fn test_contextual_vector_is_order_sensitive() {
        let provider = HashingProvider::new(small_table());
        let forward = provider.contextual_vector("you are terrible");
        let reversed = provider.contextual_vector("terrible are you");
        assert_ne!(forward, reversed);
    }

    #[test]
    fn test_embeddings_for_skip_has_no_contextual_stream() {
        let provider = HashingProvider::new(small_table());
        let texts = vec!["good day".to_string(), "bad day".to_string()];

        let features = provider.embeddings_for(&texts, &ContextualMode::Skip).unwrap();
        assert_eq!(features.n_rows(), 2);
        assert_eq!(features.word[0].len(), 2);
        assert_eq!(features.tweet[0].len(), 32);
        assert!(features.contextual.is_none());
    }

    #[test]
    fn test_recompute_then_cache_roundtrip() {
        let dir = tempdir().unwrap();
        let cache_file = dir.path().join("ctx_train.txt");
        let provider = HashingProvider::new(small_table());
        let texts = vec!["good good".to_string(), "so bad".to_string()];

        let recomputed = provider
            .embeddings_for(&texts, &ContextualMode::Recompute { cache: cache_file.clone() })
            .unwrap();
        let cached = provider
            .embeddings_for(&texts, &ContextualMode::FromCache { cache: cache_file })
            .unwrap();

        let lhs = recomputed.contextual.unwrap();
        let rhs = cached.contextual.unwrap();
        assert_eq!(lhs.len(), rhs.len());
        for (a, b) in lhs.iter().zip(&rhs) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_missing_cache_is_a_missing_artifact() {
        let dir = tempdir().unwrap();
        let provider = HashingProvider::new(small_table());
        let texts = vec!["good".to_string()];

        let result = provider.embeddings_for(
            &texts,
            &ContextualMode::FromCache {
                cache: dir.path().join("absent.txt"),
            },
        );
        assert!(matches!(result, Err(VitriolError::MissingArtifact(_))));
    }

    #[test]
    fn test_stale_cache_row_count_is_rejected() {
        let dir = tempdir().unwrap();
        let cache_file = dir.path().join("ctx.txt");
        let provider = HashingProvider::new(small_table());

        let one = vec!["good".to_string()];
        provider
            .embeddings_for(&one, &ContextualMode::Recompute { cache: cache_file.clone() })
            .unwrap();

        let two = vec!["good".to_string(), "bad".to_string()];
        let result = provider.embeddings_for(&two, &ContextualMode::FromCache { cache: cache_file });
        assert!(matches!(result, Err(VitriolError::CorruptArtifact(_))));
    }

    #[test]
    fn test_word_table_missing_and_corrupt_artifacts() {
        let dir = tempdir().unwrap();

        let missing = WordTable::load(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(VitriolError::MissingArtifact(_))));

        let garbled = dir.path().join("garbled.json");
        fs::write(&garbled, "not json at all").unwrap();
        let corrupt = WordTable::load(&garbled);
        assert!(matches!(corrupt, Err(VitriolError::CorruptArtifact(_))));
    }

    #[test]
    fn test_word_table_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.json");

        let table = small_table();
        table.save(&path).unwrap();
        let reloaded = WordTable::load(&path).unwrap();

        assert_eq!(reloaded.dim, 2);
        assert_eq!(reloaded.vectors.get("good"), Some(&vec![1.0, 0.0]));
    }
}
