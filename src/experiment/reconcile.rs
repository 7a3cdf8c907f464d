//! Prediction reconciliation and audit export.
//!
//! After a k-fold run, the best fold's held-out predictions are mapped back
//! to the original source records by exact text match. Records whose text
//! never appeared in the winning fold's validation set simply produce no
//! line; most of the dataset lives in other folds.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::data::SourceRecord;
use crate::error::{Result, VitriolError};

/// One audit line: source identifier, the three annotator-count fields,
/// the predicted score, and the matched text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLine {
    pub id: i64,
    pub hate_count: i64,
    pub offensive_count: i64,
    pub neither_count: i64,
    pub score: f64,
    pub text: String,
}

impl ExportLine {
    pub fn render(&self) -> String {
        format!(
            "{} || {} || {} || {} || {} || {}",
            self.id, self.hate_count, self.offensive_count, self.neither_count, self.score, self.text
        )
    }
}

/// Attributes each source record with the prediction of its text's first
/// occurrence in the validation sequence.
///
/// Records with an empty text field or with no exact match are skipped
/// silently. When a text occurs more than once in the validation sequence,
/// the earliest occurrence's score wins.
pub fn reconcile(
    records: &[SourceRecord],
    validation_texts: &[String],
    scores: &[f64],
) -> Result<Vec<ExportLine>> {
    if validation_texts.len() != scores.len() {
        return Err(VitriolError::DataError(format!(
            "validation texts and scores are misaligned: {} texts, {} scores",
            validation_texts.len(),
            scores.len()
        )));
    }

    let mut first_occurrence: HashMap<&str, usize> = HashMap::new();
    for (idx, text) in validation_texts.iter().enumerate() {
        first_occurrence.entry(text.as_str()).or_insert(idx);
    }

    let mut lines = Vec::new();
    for record in records {
        if record.text.is_empty() {
            continue;
        }
        if let Some(&idx) = first_occurrence.get(record.text.as_str()) {
            lines.push(ExportLine {
                id: record.id,
                hate_count: record.hate_count,
                offensive_count: record.offensive_count,
                neither_count: record.neither_count,
                score: scores[idx],
                text: record.text.clone(),
            });
        }
    }

    info!(
        matched = lines.len(),
        records = records.len(),
        "reconciled predictions against source records"
    );
    Ok(lines)
}

/// Writes the export lines to `<dir>/<stem>_predictions_<unix-seconds>`.
pub fn write_export(dir: &Path, dataset_stem: &str, lines: &[ExportLine]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "{}_predictions_{}",
        dataset_stem,
        Utc::now().timestamp()
    ));

    let mut out = String::new();
    for line in lines {
        out.push_str(&line.render());
        out.push('\n');
    }
    fs::write(&path, out)?;

    info!(path = %path.display(), lines = lines.len(), "wrote prediction export");
    Ok(path)
}
