//! Experiment orchestration: single-split runs and the stratified k-fold
//! protocol.
//!
//! The orchestrator owns the per-fold results table and the best-fold slot.
//! Each fold trains a fresh model from the untrained condition; a fold
//! replaces the retained best only when its F-score strictly exceeds the
//! best seen so far, so the earliest fold wins ties. Any fold whose fit or
//! evaluate fails aborts the whole run: partial cross-validation tables are
//! not comparable to complete ones and are never reported.

use ndarray::Array1;
use tracing::{info, warn};

use super::folds::FoldPlanner;
use crate::config::ExperimentConfig;
use crate::data::Example;
use crate::error::Result;
use crate::models::{ConfusionCounts, EvalReport, ExperimentModel, ModelInputs, TrainingHistory};

/// Everything retained from the winning fold.
#[derive(Debug, Clone)]
pub struct BestFold {
    pub fold_idx: usize,
    pub f_score: f64,
    pub model: ExperimentModel,
    pub inputs: ModelInputs,
    pub labels: Array1<f64>,
    pub confusion: ConfusionCounts,
    pub texts: Vec<String>,
    pub history: TrainingHistory,
    /// Scores from re-running predict on the retained validation inputs,
    /// parallel to `texts`. Filled after the fold loop completes.
    pub scores: Vec<f64>,
}

/// Aggregate outcome of one k-fold run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub metric_names: Vec<&'static str>,
    /// One row per fold, in fold order, columns matching `metric_names`.
    pub fold_rows: Vec<Vec<f64>>,
    /// Column-wise arithmetic means over `fold_rows`.
    pub means: Vec<f64>,
    /// Absent when no fold beat the initial F-score of zero.
    pub best: Option<BestFold>,
}

/// Outcome of a single train/test pass.
#[derive(Debug, Clone)]
pub struct SingleOutcome {
    pub model: ExperimentModel,
    pub report: EvalReport,
    pub f_score: f64,
    /// Present only when this invocation actually fitted the model.
    pub history: Option<TrainingHistory>,
}

/// The combined pool the k-fold protocol partitions: training rows first,
/// then test rows, each example carrying its own aligned fields.
pub fn pooled(train: &[Example], test: &[Example]) -> Vec<Example> {
    let mut pool = Vec::with_capacity(train.len() + test.len());
    pool.extend_from_slice(train);
    pool.extend_from_slice(test);
    pool
}

/// Drives training and evaluation against one configuration.
pub struct Experiment<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> Experiment<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Fit (unless the model arrives already trained) and evaluate once on
    /// the held-out test partition.
    pub fn run_single(
        &self,
        mut model: ExperimentModel,
        train: &[Example],
        test: &[Example],
    ) -> Result<SingleOutcome> {
        let history = if model.is_fitted() {
            info!("model arrived trained; skipping fit");
            None
        } else {
            let train_inputs = ModelInputs::from_examples(train)?;
            let train_labels = labels_array(train);
            Some(model.fit(&train_inputs, &train_labels, &self.config.train_settings())?)
        };

        let test_inputs = ModelInputs::from_examples(test)?;
        let test_labels = labels_array(test);
        let report = model.evaluate(&test_inputs, &test_labels)?;
        let f_score = report.f_score();

        info!(
            family = %model.family(),
            accuracy = report.accuracy,
            f_score,
            "single-split evaluation complete"
        );

        Ok(SingleOutcome {
            model,
            report,
            f_score,
            history,
        })
    }

    /// The k-fold protocol over a combined pool.
    ///
    /// Folds run strictly in partition order, one model at a time. Fold
    /// slices are gathered copies of the pool rows, never views, so the
    /// pool stays read-only for the whole loop.
    pub fn run_kfold(&self, pool: &[Example]) -> Result<RunSummary> {
        let labels: Vec<u8> = pool.iter().map(|e| e.label).collect();
        let planner = FoldPlanner::new(self.config.folds, self.config.seed);
        let plans = planner.stratified(&labels)?;

        let settings = self.config.train_settings();
        let mut metric_names: Vec<&'static str> = Vec::new();
        let mut fold_rows: Vec<Vec<f64>> = Vec::with_capacity(plans.len());
        let mut best: Option<BestFold> = None;
        let mut best_f = 0.0;

        for plan in &plans {
            let train_examples = gather_examples(pool, &plan.train_indices);
            let val_examples = gather_examples(pool, &plan.validation_indices);

            let train_inputs = ModelInputs::from_examples(&train_examples)?;
            let train_labels = labels_array(&train_examples);
            let val_inputs = ModelInputs::from_examples(&val_examples)?;
            let val_labels = labels_array(&val_examples);

            let mut model = ExperimentModel::untrained(self.config.family);
            let history = model.fit(&train_inputs, &train_labels, &settings)?;
            let report = model.evaluate(&val_inputs, &val_labels)?;

            if metric_names.is_empty() {
                metric_names = report.metric_labels();
            }
            let f = report.f_score();
            info!(
                fold = plan.fold_idx,
                accuracy = report.accuracy,
                f_score = f,
                "fold evaluated"
            );
            fold_rows.push(report.metric_row());

            if f > best_f {
                best_f = f;
                if let Some(mut displaced) = best.take() {
                    displaced.model.reset();
                }
                best = Some(BestFold {
                    fold_idx: plan.fold_idx,
                    f_score: f,
                    model,
                    inputs: val_inputs,
                    labels: val_labels,
                    confusion: report.confusion,
                    texts: val_examples.iter().map(|e| e.text.clone()).collect(),
                    history,
                    scores: Vec::new(),
                });
            } else {
                model.reset();
            }
        }

        let means = column_means(&fold_rows);

        match &mut best {
            Some(best) => {
                let scores = best.model.predict(&best.inputs)?;
                best.scores = scores.to_vec();
                info!(
                    fold = best.fold_idx,
                    f_score = best.f_score,
                    "best fold retained"
                );
            }
            None => {
                warn!("no fold exceeded an F-score of zero; nothing retained for export");
            }
        }

        Ok(RunSummary {
            metric_names,
            fold_rows,
            means,
            best,
        })
    }
}

fn gather_examples(pool: &[Example], indices: &[usize]) -> Vec<Example> {
    indices.iter().map(|&idx| pool[idx].clone()).collect()
}

fn labels_array(examples: &[Example]) -> Array1<f64> {
    Array1::from_iter(examples.iter().map(|e| e.label as f64))
}

fn column_means(rows: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let mut means = vec![0.0; first.len()];
    for row in rows {
        for (slot, value) in means.iter_mut().zip(row) {
            *slot += value;
        }
    }
    for slot in &mut means {
        *slot /= rows.len() as f64;
    }
    means
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelFamily;

    fn example(label: u8, word: Vec<f64>, text: &str) -> Example {
        Example {
            text: text.to_string(),
            label,
            word_vec: word,
            tweet_vec: vec![0.0],
            contextual_vec: None,
        }
    }

    /// Two well-separated clusters the baseline family learns reliably.
    fn separable_pool() -> Vec<Example> {
        let mut pool = Vec::new();
        for i in 0..6 {
            let offset = i as f64 * 0.1;
            pool.push(example(
                1,
                vec![3.0 + offset, 3.0 - offset],
                &format!("angry post {i}"),
            ));
            pool.push(example(
                0,
                vec![-3.0 - offset, -3.0 + offset],
                &format!("calm post {i}"),
            ));
        }
        pool
    }

    fn test_config(family: ModelFamily) -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.family = family;
        config.folds = 2;
        config.epochs = 60;
        config.batch_size = 4;
        config.validation_split = 0.2;
        config.seed = 7;
        config
    }

    #[test]
    fn test_pooled_preserves_partition_order() {
        let train = vec![example(1, vec![1.0], "a"), example(0, vec![2.0], "b")];
        let test = vec![example(1, vec![3.0], "c")];

        let pool = pooled(&train, &test);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].text, "a");
        assert_eq!(pool[2].text, "c");
    }

    #[test]
    fn test_kfold_learns_separable_data_and_keeps_first_tied_fold() {
        let pool = separable_pool();
        let config = test_config(ModelFamily::Baseline);
        let summary = Experiment::new(&config).run_kfold(&pool).unwrap();

        assert_eq!(summary.fold_rows.len(), 2);
        assert_eq!(
            summary.metric_names,
            vec!["loss", "accuracy", "precision", "recall", "f_score"]
        );

        let best = summary.best.expect("a fold should win");
        // Both folds separate the clusters perfectly, so the strict-greater
        // rule keeps the first one.
        assert_eq!(best.fold_idx, 0);
        assert!((best.f_score - 1.0).abs() < 1e-9);
        assert_eq!(best.scores.len(), best.texts.len());
        assert_eq!(best.labels.len(), best.texts.len());
    }

    #[test]
    fn test_means_are_columnwise_arithmetic_means() {
        let pool = separable_pool();
        let config = test_config(ModelFamily::Baseline);
        let summary = Experiment::new(&config).run_kfold(&pool).unwrap();

        for (col, mean) in summary.means.iter().enumerate() {
            let expected: f64 = summary.fold_rows.iter().map(|row| row[col]).sum::<f64>()
                / summary.fold_rows.len() as f64;
            assert!((mean - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_identical_seed_reproduces_the_fold_table() {
        let pool = separable_pool();
        let config = test_config(ModelFamily::Baseline);

        let first = Experiment::new(&config).run_kfold(&pool).unwrap();
        let second = Experiment::new(&config).run_kfold(&pool).unwrap();
        assert_eq!(first.fold_rows, second.fold_rows);
    }

    #[test]
    fn test_featureless_pool_retains_no_best_fold() {
        // Zero features leave only the bias, which settles on the negative
        // prior: every validation positive is missed and F stays 0.0.
        let mut pool = Vec::new();
        for i in 0..2 {
            pool.push(example(1, vec![0.0, 0.0], &format!("pos {i}")));
        }
        for i in 0..8 {
            pool.push(example(0, vec![0.0, 0.0], &format!("neg {i}")));
        }

        let config = test_config(ModelFamily::Baseline);
        let summary = Experiment::new(&config).run_kfold(&pool).unwrap();

        assert!(summary.best.is_none());
        for row in &summary.fold_rows {
            let f = row.last().unwrap();
            assert_eq!(*f, 0.0);
        }
    }

    #[test]
    fn test_fold_fit_failure_aborts_the_run() {
        let pool = separable_pool();
        let mut config = test_config(ModelFamily::BranchNetwork);
        config.batch_size = 0;

        let result = Experiment::new(&config).run_kfold(&pool);
        assert!(result.is_err());
    }

    #[test]
    fn test_single_split_fits_when_untrained_and_skips_when_loaded() {
        let pool = separable_pool();
        let (train, test) = pool.split_at(8);
        let config = test_config(ModelFamily::Baseline);
        let experiment = Experiment::new(&config);

        let model = ExperimentModel::untrained(ModelFamily::Baseline);
        let fitted = experiment.run_single(model, train, test).unwrap();
        assert!(fitted.history.is_some());
        assert!(fitted.report.accuracy > 0.75);

        let reused = experiment.run_single(fitted.model, train, test).unwrap();
        assert!(reused.history.is_none());
        assert!((reused.f_score - fitted.f_score).abs() < 1e-12);
    }
}
