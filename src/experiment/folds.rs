//! Stratified fold assembly.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, VitriolError};

/// One fold: the pool rows a fresh model trains on and the disjoint rows
/// held out for that fold's validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldPlan {
    pub fold_idx: usize,
    pub train_indices: Vec<usize>,
    pub validation_indices: Vec<usize>,
}

/// Seeded stratified k-fold splitter over binary labels.
#[derive(Debug, Clone)]
pub struct FoldPlanner {
    n_folds: usize,
    seed: u64,
}

impl FoldPlanner {
    pub fn new(n_folds: usize, seed: u64) -> Self {
        Self { n_folds, seed }
    }

    /// Splits `labels` into `n_folds` disjoint validation sets whose
    /// positive proportion tracks the pool's. Every index lands in exactly
    /// one validation set.
    pub fn stratified(&self, labels: &[u8]) -> Result<Vec<FoldPlan>> {
        if self.n_folds < 2 {
            return Err(VitriolError::ConfigError(format!(
                "fold count must be at least 2, got {}",
                self.n_folds
            )));
        }
        if labels.len() < self.n_folds {
            return Err(VitriolError::ConfigError(format!(
                "{} examples cannot fill {} folds",
                labels.len(),
                self.n_folds
            )));
        }

        // BTreeMap so classes are visited in a fixed order regardless of
        // label layout; one shared rng then shuffles them reproducibly.
        let mut class_indices: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            class_indices.entry(label).or_default().push(idx);
        }

        let positives = class_indices.get(&1).map_or(0, Vec::len);
        let negatives = class_indices.get(&0).map_or(0, Vec::len);
        if positives < self.n_folds {
            return Err(VitriolError::ConfigError(format!(
                "{} positive examples cannot fill {} stratified folds",
                positives, self.n_folds
            )));
        }
        if negatives < self.n_folds {
            return Err(VitriolError::ConfigError(format!(
                "{} negative examples cannot fill {} stratified folds",
                negatives, self.n_folds
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        for indices in class_indices.values_mut() {
            indices.shuffle(&mut rng);
        }

        // Deal each class round-robin so validation sets stay balanced.
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.n_folds];
        for indices in class_indices.values() {
            for (i, &idx) in indices.iter().enumerate() {
                buckets[i % self.n_folds].push(idx);
            }
        }

        let mut plans = Vec::with_capacity(self.n_folds);
        for fold_idx in 0..self.n_folds {
            let mut validation_indices = buckets[fold_idx].clone();
            let mut train_indices: Vec<usize> = buckets
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, bucket)| bucket.iter().copied())
                .collect();

            // Sorted so downstream gathers walk the pool in order.
            validation_indices.sort_unstable();
            train_indices.sort_unstable();

            plans.push(FoldPlan {
                fold_idx,
                train_indices,
                validation_indices,
            });
        }

        Ok(plans)
    }
}
