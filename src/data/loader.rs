//! TSV loading and split persistence

use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::{Result, VitriolError};

use super::{LabeledText, SourceRecord};

const TRAIN_FILE: &str = "train.tsv";
const TEST_FILE: &str = "test.tsv";

/// Load the raw dataset rows from a tab-separated file with a header.
///
/// Expected columns: `id`, `hate_speech`, `offensive_language`, `neither`,
/// `class`, `tweet`.
pub fn load_source_records(path: &Path) -> Result<Vec<SourceRecord>> {
    let file = File::open(path).map_err(|e| {
        VitriolError::DataError(format!("cannot open dataset {}: {}", path.display(), e))
    })?;

    let parse_opts = CsvParseOptions::default().with_separator(b'\t');
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .with_parse_options(parse_opts)
        .into_reader_with_file_handle(file)
        .finish()?;

    let ids = int_column(&df, "id")?;
    let hate = int_column(&df, "hate_speech")?;
    let offensive = int_column(&df, "offensive_language")?;
    let neither = int_column(&df, "neither")?;
    let class = int_column(&df, "class")?;
    let tweets = df.column("tweet")?.str()?.clone();

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let text = tweets.get(i).ok_or_else(|| {
            VitriolError::DataError(format!("row {}: missing tweet text", i))
        })?;

        records.push(SourceRecord {
            id: get_int(&ids, i, "id")?,
            hate_count: get_int(&hate, i, "hate_speech")?,
            offensive_count: get_int(&offensive, i, "offensive_language")?,
            neither_count: get_int(&neither, i, "neither")?,
            class: get_int(&class, i, "class")?,
            text: text.to_string(),
        });
    }

    info!(rows = records.len(), path = %path.display(), "loaded dataset");
    Ok(records)
}

fn int_column(df: &DataFrame, name: &str) -> Result<Int64Chunked> {
    let column = df.column(name).map_err(|_| {
        VitriolError::DataError(format!("dataset is missing the '{}' column", name))
    })?;
    Ok(column.cast(&DataType::Int64)?.i64()?.clone())
}

fn get_int(column: &Int64Chunked, row: usize, name: &str) -> Result<i64> {
    column.get(row).ok_or_else(|| {
        VitriolError::DataError(format!("row {}: missing '{}' value", row, name))
    })
}

/// Persisted train/test split, stored as two labeled TSV files under one
/// directory. Splitting once and reloading keeps repeated runs comparable;
/// `resplit` regenerates both files.
#[derive(Debug, Clone)]
pub struct SplitStore {
    dir: PathBuf,
}

impl SplitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Regenerate the persisted split from the raw dataset file.
    ///
    /// The shuffle is seeded, so the same source, ratio, and seed always
    /// produce the same partition.
    pub fn resplit(
        &self,
        source: &Path,
        ratio: f64,
        seed: u64,
    ) -> Result<(Vec<LabeledText>, Vec<LabeledText>)> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(VitriolError::InvalidParameter {
                name: "training_set_ratio".to_string(),
                value: ratio.to_string(),
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }

        let records = load_source_records(source)?;
        let mut order: Vec<usize> = (0..records.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let train_size = (records.len() as f64 * ratio) as usize;
        if train_size == 0 || train_size == records.len() {
            return Err(VitriolError::DataError(format!(
                "split of {} rows at ratio {} leaves an empty partition",
                records.len(),
                ratio
            )));
        }

        let to_labeled = |i: &usize| LabeledText {
            text: records[*i].text.clone(),
            label: records[*i].binary_label(),
        };
        let train: Vec<LabeledText> = order[..train_size].iter().map(to_labeled).collect();
        let test: Vec<LabeledText> = order[train_size..].iter().map(to_labeled).collect();

        std::fs::create_dir_all(&self.dir)?;
        write_partition(&self.dir.join(TRAIN_FILE), &train)?;
        write_partition(&self.dir.join(TEST_FILE), &test)?;

        info!(
            train = train.len(),
            test = test.len(),
            dir = %self.dir.display(),
            "persisted new split"
        );
        Ok((train, test))
    }

    /// Load the persisted split.
    ///
    /// A missing partition file means no split has been generated yet; that
    /// is a soft-abort condition, not a crash.
    pub fn load_split(&self) -> Result<(Vec<LabeledText>, Vec<LabeledText>)> {
        let train_path = self.dir.join(TRAIN_FILE);
        let test_path = self.dir.join(TEST_FILE);

        if !train_path.exists() || !test_path.exists() {
            return Err(VitriolError::MissingArtifact(format!(
                "no persisted split under {}; run with --resplit first",
                self.dir.display()
            )));
        }

        Ok((read_partition(&train_path)?, read_partition(&test_path)?))
    }
}

fn write_partition(path: &Path, rows: &[LabeledText]) -> Result<()> {
    let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
    let labels: Vec<i64> = rows.iter().map(|r| r.label as i64).collect();

    let mut df = DataFrame::new(vec![
        Column::new("text".into(), texts),
        Column::new("label".into(), labels),
    ])?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .with_separator(b'\t')
        .finish(&mut df)?;
    Ok(())
}

fn read_partition(path: &Path) -> Result<Vec<LabeledText>> {
    let file = File::open(path)?;

    let parse_opts = CsvParseOptions::default().with_separator(b'\t');
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(parse_opts)
        .into_reader_with_file_handle(file)
        .finish()?;

    let texts = df.column("text")?.str()?.clone();
    let labels = df.column("label")?.cast(&DataType::Int64)?.i64()?.clone();

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let text = texts.get(i).ok_or_else(|| {
            VitriolError::DataError(format!("{}: row {} has no text", path.display(), i))
        })?;
        let label = labels.get(i).ok_or_else(|| {
            VitriolError::DataError(format!("{}: row {} has no label", path.display(), i))
        })?;

        rows.push(LabeledText {
            text: text.to_string(),
            label: if label == 1 { 1 } else { 0 },
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn create_test_tsv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "id\thate_speech\toffensive_language\tneither\tclass\ttweet").unwrap();
        writeln!(file, "1\t3\t0\t0\t0\tfirst hateful post").unwrap();
        writeln!(file, "2\t0\t3\t0\t1\tsecond offensive post").unwrap();
        writeln!(file, "3\t0\t0\t3\t2\tthird harmless post").unwrap();
        writeln!(file, "4\t0\t0\t3\t2\tfourth harmless post").unwrap();
        writeln!(file, "5\t2\t1\t0\t0\tfifth hateful post").unwrap();
        writeln!(file, "6\t0\t0\t3\t2\tsixth harmless post").unwrap();
        file
    }

    #[test]
    fn test_load_source_records() {
        let file = create_test_tsv();
        let records = load_source_records(file.path()).unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].binary_label(), 1);
        assert_eq!(records[2].binary_label(), 0);
        assert_eq!(records[1].text, "second offensive post");
    }

    #[test]
    fn test_resplit_and_reload() {
        let file = create_test_tsv();
        let dir = tempdir().unwrap();
        let store = SplitStore::new(dir.path());

        let (train, test) = store.resplit(file.path(), 0.5, 9).unwrap();
        assert_eq!(train.len() + test.len(), 6);
        assert!(!train.is_empty() && !test.is_empty());

        let (train2, test2) = store.load_split().unwrap();
        assert_eq!(train, train2);
        assert_eq!(test, test2);
    }

    #[test]
    fn test_resplit_is_seeded() {
        let file = create_test_tsv();
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();

        let (train_a, _) = SplitStore::new(dir_a.path())
            .resplit(file.path(), 0.5, 11)
            .unwrap();
        let (train_b, _) = SplitStore::new(dir_b.path())
            .resplit(file.path(), 0.5, 11)
            .unwrap();

        assert_eq!(train_a, train_b);
    }

    #[test]
    fn test_load_split_missing_is_soft_abort() {
        let dir = tempdir().unwrap();
        let store = SplitStore::new(dir.path().join("never_written"));
        let err = store.load_split().unwrap_err();

        assert!(matches!(err, VitriolError::MissingArtifact(_)));
    }

    #[test]
    fn test_resplit_rejects_bad_ratio() {
        let file = create_test_tsv();
        let dir = tempdir().unwrap();
        let store = SplitStore::new(dir.path());

        assert!(store.resplit(file.path(), 0.0, 1).is_err());
        assert!(store.resplit(file.path(), 1.0, 1).is_err());
    }
}
