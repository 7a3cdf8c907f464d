//! Flat-file persistence for computed feature matrices.
//!
//! Rows are written as whitespace-separated numbers, one example per
//! line, so a cache file can be inspected or diffed by hand.

use std::fs;
use std::path::Path;

use crate::error::{Result, VitriolError};

pub fn save_matrix(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = String::new();
    for row in rows {
        let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&fields.join(" "));
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

pub fn load_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(VitriolError::MissingArtifact(format!(
                "no cached contextual vectors at {}; run with --recompute-contextual",
                path.display()
            )));
        }
        Err(err) => return Err(err.into()),
    };

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let mut row = Vec::new();
        for field in line.split_whitespace() {
            let value: f64 = field.parse().map_err(|_| {
                VitriolError::CorruptArtifact(format!(
                    "cached contextual vectors at {} have a malformed value on line {}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            row.push(value);
        }

        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(VitriolError::CorruptArtifact(format!(
                    "cached contextual vectors at {} have {} values on line {}, expected {}",
                    path.display(),
                    row.len(),
                    line_no + 1,
                    first.len()
                )));
            }
        }
        rows.push(row);
    }

    Ok(rows)
}
