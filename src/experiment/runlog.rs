//! Timestamped run logs.
//!
//! Each run writes one plain-text file under `<log_dir>/<MM-DD-YYYY>/`,
//! named after the dataset stem plus the unix time, recording the dataset,
//! split sizes, label proportions, model summary, metrics, and the
//! training history.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use tracing::info;

use crate::data::LabelProportions;
use crate::error::Result;
use crate::models::{ConfusionCounts, TrainingHistory};

/// The dataset file name without directories or extension; log and export
/// file names start with it.
pub fn dataset_stem(dataset: &Path) -> String {
    dataset
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("dataset")
        .to_string()
}

/// Creates run-log files under a dated directory.
#[derive(Debug, Clone)]
pub struct RunLogger {
    log_dir: PathBuf,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn create(&self, dataset: &Path) -> Result<RunLog> {
        let day_dir = self.log_dir.join(Local::now().format("%m-%d-%Y").to_string());
        fs::create_dir_all(&day_dir)?;

        let path = day_dir.join(format!("{}{}", dataset_stem(dataset), Utc::now().timestamp()));
        let file = File::create(&path)?;
        info!(path = %path.display(), "opened run log");

        Ok(RunLog { file, path })
    }
}

/// One open run-log file. Sections are appended in call order.
#[derive(Debug)]
pub struct RunLog {
    file: File,
    pub path: PathBuf,
}

impl RunLog {
    pub fn dataset_header(
        &mut self,
        dataset: &Path,
        train_size: usize,
        test_size: usize,
    ) -> Result<()> {
        writeln!(self.file, "Using dataset: {}", dataset.display())?;
        writeln!(self.file, "Training dataset size: {train_size}")?;
        writeln!(self.file, "Test dataset size: {test_size}")?;
        Ok(())
    }

    pub fn label_proportions(&mut self, proportions: &LabelProportions) -> Result<()> {
        writeln!(self.file, "\n###### Positive label proportion ######\n")?;
        writeln!(self.file, "For training dataset: {}", proportions.train)?;
        writeln!(self.file, "For test dataset: {}", proportions.test)?;
        writeln!(self.file, "For combined dataset: {}", proportions.combined)?;
        Ok(())
    }

    pub fn model_summary(&mut self, summary: &str) -> Result<()> {
        writeln!(self.file, "\n###### Model Summary ######\n")?;
        writeln!(self.file, "{summary}")?;
        Ok(())
    }

    /// Single-split evaluation results, one metric per line.
    pub fn test_results(&mut self, names: &[&str], row: &[f64]) -> Result<()> {
        writeln!(self.file, "\n###### Test results ######\n")?;
        for (i, (name, value)) in names.iter().zip(row).enumerate() {
            let separator = if i + 1 < row.len() { "," } else { "" };
            writeln!(self.file, "Test {}: {}{}", display_name(name), value, separator)?;
        }
        Ok(())
    }

    /// The per-fold metrics table with its column-wise means.
    pub fn fold_table(&mut self, names: &[&str], rows: &[Vec<f64>], means: &[f64]) -> Result<()> {
        writeln!(self.file, "\n###### Cross-validation results ######\n")?;
        writeln!(self.file, "Columns: {}", names.join(", "))?;
        for (fold_idx, row) in rows.iter().enumerate() {
            writeln!(self.file, "Fold {}: {}", fold_idx + 1, join_values(row))?;
        }
        writeln!(self.file, "Mean: {}", join_values(means))?;
        Ok(())
    }

    pub fn best_fold(
        &mut self,
        fold_idx: usize,
        f_score: f64,
        confusion: &ConfusionCounts,
    ) -> Result<()> {
        writeln!(self.file, "\n###### Best fold ######\n")?;
        writeln!(self.file, "Fold {} with F-Score {}", fold_idx + 1, f_score)?;
        writeln!(self.file, "True positives: {}", confusion.true_pos)?;
        writeln!(self.file, "False positives: {}", confusion.false_pos)?;
        writeln!(self.file, "True negatives: {}", confusion.true_neg)?;
        writeln!(self.file, "False negatives: {}", confusion.false_neg)?;
        Ok(())
    }

    pub fn metrics_history(&mut self, history: &TrainingHistory) -> Result<()> {
        writeln!(
            self.file,
            "\n###### Metrics history for {} epochs: ######\n",
            history.n_epochs()
        )?;
        for record in &history.epochs {
            write!(self.file, "Epoch {}: ", record.epoch)?;
            write!(self.file, "loss: {}, ", record.loss)?;
            write!(self.file, "accuracy: {}, ", record.accuracy)?;
            if let Some(val_loss) = record.val_loss {
                write!(self.file, "val_loss: {val_loss}, ")?;
            }
            if let Some(val_accuracy) = record.val_accuracy {
                write!(self.file, "val_accuracy: {val_accuracy}, ")?;
            }
            writeln!(self.file)?;
        }
        if history.stopped_early {
            if let Some(best_epoch) = history.best_epoch {
                writeln!(
                    self.file,
                    "\nStopped early; restored parameters from epoch {best_epoch}"
                )?;
            }
        }
        Ok(())
    }
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_name(label: &str) -> &str {
    match label {
        "loss" => "Loss",
        "accuracy" => "Accuracy",
        "precision" => "Precision",
        "recall" => "Recall",
        "auc" => "AUC",
        "f_score" => "F-Score",
        other => other,
    }
}
