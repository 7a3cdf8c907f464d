//! Command-line driver.
//!
//! One invocation runs one experiment: split (or reload) the dataset,
//! attach features, then either a single train/test pass or the k-fold
//! protocol, with the run log and prediction export on the side.

use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{ExperimentConfig, FileDefaults};
use crate::data::{label_proportions, load_source_records, LabeledText, SplitStore};
use crate::error::VitriolError;
use crate::experiment::{
    dataset_stem, pooled, reconcile, write_export, Experiment, RunLogger, RunSummary,
};
use crate::features::{attach_features, ContextualMode, FeatureProvider, HashingProvider};
use crate::models::{ExperimentModel, ModelFamily};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn metric_line(name: &str, value: f64) {
    println!(
        "  {:<16} {}",
        muted(name),
        format!("{value:.4}").white().bold()
    );
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vitriol")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Experiment driver for hate and offensive speech classification")]
#[command(long_about = None)]
pub struct Cli {
    /// Source dataset TSV.
    pub dataset: PathBuf,

    /// Fraction of the dataset assigned to the training partition.
    pub ratio: f64,

    /// Regenerate the persisted train/test split before running.
    #[arg(long)]
    pub resplit: bool,

    /// Train from scratch instead of loading saved parameters.
    #[arg(long)]
    pub retrain: bool,

    /// Persist the trained parameters after the run.
    #[arg(long)]
    pub save: bool,

    /// Feed the contextual vector stream to the model.
    #[arg(long)]
    pub use_contextual: bool,

    /// Recompute contextual vectors instead of loading the cache.
    #[arg(long)]
    pub recompute_contextual: bool,

    /// Do not write a run log.
    #[arg(long)]
    pub skip_logging: bool,

    /// Run the k-fold protocol with this many folds instead of one split.
    #[arg(long)]
    pub folds: Option<usize>,

    /// Model family (baseline, multi-branch-network, margin-classifier).
    #[arg(long, default_value = "multi-branch-network")]
    pub model: String,

    /// Conf file with epoch and batch-size overrides.
    #[arg(long, default_value = "conf.json")]
    pub config: PathBuf,

    /// Seed for splitting, fold planning, and parameter initialization.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// Defaults, then the conf file, then the flags.
    fn build_config(&self) -> crate::error::Result<ExperimentConfig> {
        let mut config = ExperimentConfig::default();
        FileDefaults::load(&self.config)?.apply(&mut config);

        config.train_ratio = self.ratio;
        config.family = ModelFamily::parse(&self.model)?;
        config.use_contextual = self.use_contextual;
        config.recompute_contextual = self.recompute_contextual;
        config.skip_logging = self.skip_logging;
        if let Some(folds) = self.folds {
            config.folds = folds;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        config.validate()?;
        Ok(config)
    }
}

// ─── Driver ────────────────────────────────────────────────────────────────────

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.build_config()?;

    match execute(&cli, &config) {
        Ok(()) => Ok(()),
        // Missing or unusable artifacts end the run cleanly, not as a crash.
        Err(err) if err.is_soft_abort() => {
            println!("{err}");
            println!("Aborting...");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn execute(cli: &Cli, config: &ExperimentConfig) -> crate::error::Result<()> {
    section("Dataset");

    let store = SplitStore::new(&config.split_dir);
    let (train_records, test_records) = if cli.resplit {
        step_run("Regenerating split");
        let start = Instant::now();
        let split = store.resplit(&cli.dataset, config.train_ratio, config.seed)?;
        step_done(&format!(
            "{} train / {} test in {:?}",
            split.0.len(),
            split.1.len(),
            start.elapsed()
        ));
        split
    } else {
        let split = store.load_split()?;
        step_ok(&format!(
            "Loaded persisted split: {} train / {} test",
            split.0.len(),
            split.1.len()
        ));
        split
    };

    let provider = match HashingProvider::from_artifact(&config.word_vectors_path) {
        Ok(provider) => provider,
        Err(err) if err.is_soft_abort() => {
            println!("{err}");
            println!("Couldn't find a saved model, aborting...");
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    step_run("Attaching features");
    let start = Instant::now();
    let train_examples = featurize(&provider, &train_records, config, "train")?;
    let test_examples = featurize(&provider, &test_records, config, "test")?;
    step_done(&format!(
        "word dim {} in {:?}",
        provider.word_dim(),
        start.elapsed()
    ));

    let proportions = label_proportions(&labels_of(&train_records), &labels_of(&test_records));

    let experiment = Experiment::new(config);

    match cli.folds {
        Some(_) => run_kfold_mode(
            cli,
            config,
            &experiment,
            &train_examples,
            &test_examples,
            proportions,
        ),
        None => run_single_mode(
            cli,
            config,
            &experiment,
            &train_examples,
            &test_examples,
            proportions,
        ),
    }
}

fn run_single_mode(
    cli: &Cli,
    config: &ExperimentConfig,
    experiment: &Experiment<'_>,
    train: &[crate::data::Example],
    test: &[crate::data::Example],
    proportions: crate::data::LabelProportions,
) -> crate::error::Result<()> {
    let model = if cli.retrain {
        ExperimentModel::untrained(config.family)
    } else {
        match ExperimentModel::load(&config.params_path) {
            Ok(model) => model,
            Err(err @ VitriolError::MissingArtifact(_)) => {
                println!("{err}");
                println!("Couldn't find saved model parameters, aborting...");
                return Ok(());
            }
            Err(err @ VitriolError::CorruptArtifact(_)) => {
                println!("{err}");
                println!("Saved model parameters are unreadable, aborting...");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    };

    section(&format!("Training ({})", config.family));
    step_run("Fitting and evaluating");
    let start = Instant::now();
    let outcome = experiment.run_single(model, train, test)?;
    step_done(&format!("{:?}", start.elapsed()));

    section("Results");
    let names = outcome.report.metric_labels();
    let row = outcome.report.metric_row();
    for (name, value) in names.iter().zip(&row) {
        metric_line(name, *value);
    }

    if !config.skip_logging {
        let mut log = RunLogger::new(&config.log_dir).create(&cli.dataset)?;
        log.dataset_header(&cli.dataset, train.len(), test.len())?;
        log.label_proportions(&proportions)?;
        log.model_summary(&outcome.model.summary())?;
        log.test_results(&names, &row)?;
        if let Some(history) = &outcome.history {
            log.metrics_history(history)?;
        }
        step_ok(&format!("Run log: {}", log.path.display()));
    }

    if cli.save {
        outcome.model.save(&config.params_path)?;
        step_ok(&format!(
            "Saved parameters to {}",
            config.params_path.display()
        ));
    }

    Ok(())
}

fn run_kfold_mode(
    cli: &Cli,
    config: &ExperimentConfig,
    experiment: &Experiment<'_>,
    train: &[crate::data::Example],
    test: &[crate::data::Example],
    proportions: crate::data::LabelProportions,
) -> crate::error::Result<()> {
    section(&format!(
        "Cross-validation ({}, {} folds)",
        config.family, config.folds
    ));

    let pool = pooled(train, test);
    step_run(&format!(
        "Running {} folds over {} examples",
        config.folds,
        pool.len()
    ));
    let start = Instant::now();
    let summary = experiment.run_kfold(&pool)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_fold_table(&summary);

    match &summary.best {
        Some(best) => {
            println!();
            println!(
                "  {} fold {} {} {:.4}",
                ok("best"),
                (best.fold_idx + 1).to_string().white().bold(),
                muted("f-score:"),
                best.f_score
            );

            let records = load_source_records(&cli.dataset)?;
            let lines = reconcile(&records, &best.texts, &best.scores)?;
            let export_path = write_export(&config.export_dir, &dataset_stem(&cli.dataset), &lines)?;
            step_ok(&format!(
                "Exported {} predictions to {}",
                lines.len(),
                export_path.display()
            ));

            if cli.save {
                best.model.save(&config.params_path)?;
                step_ok(&format!(
                    "Saved parameters to {}",
                    config.params_path.display()
                ));
            }
        }
        None => {
            println!();
            println!(
                "  {}",
                "No fold produced a nonzero F-score; skipping export".yellow()
            );
        }
    }

    if !config.skip_logging {
        let mut log = RunLogger::new(&config.log_dir).create(&cli.dataset)?;
        log.dataset_header(&cli.dataset, train.len(), test.len())?;
        log.label_proportions(&proportions)?;
        if let Some(best) = &summary.best {
            log.model_summary(&best.model.summary())?;
        }
        log.fold_table(&summary.metric_names, &summary.fold_rows, &summary.means)?;
        if let Some(best) = &summary.best {
            log.best_fold(best.fold_idx, best.f_score, &best.confusion)?;
            log.metrics_history(&best.history)?;
        }
        step_ok(&format!("Run log: {}", log.path.display()));
    }

    Ok(())
}

fn print_fold_table(summary: &RunSummary) {
    println!();
    print!("  {:<8}", muted("Fold"));
    for name in &summary.metric_names {
        print!(" {:>10}", muted(name));
    }
    println!();
    println!(
        "  {}",
        dim(&"─".repeat(8 + 11 * summary.metric_names.len()))
    );

    for (fold_idx, row) in summary.fold_rows.iter().enumerate() {
        print!("  {:<8}", fold_idx + 1);
        for value in row {
            print!(" {value:>10.4}");
        }
        println!();
    }

    println!(
        "  {}",
        dim(&"─".repeat(8 + 11 * summary.metric_names.len()))
    );
    print!("  {:<8}", muted("mean"));
    for value in &summary.means {
        print!(" {}", format!("{value:>10.4}").white().bold());
    }
    println!();
}

fn featurize(
    provider: &HashingProvider,
    records: &[LabeledText],
    config: &ExperimentConfig,
    partition: &str,
) -> crate::error::Result<Vec<crate::data::Example>> {
    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let mode = contextual_mode(config, partition);
    let features = provider.embeddings_for(&texts, &mode)?;
    attach_features(records, features)
}

fn contextual_mode(config: &ExperimentConfig, partition: &str) -> ContextualMode {
    if !config.use_contextual {
        ContextualMode::Skip
    } else if config.recompute_contextual {
        ContextualMode::Recompute {
            cache: config.contextual_cache_file(partition),
        }
    } else {
        ContextualMode::FromCache {
            cache: config.contextual_cache_file(partition),
        }
    }
}

fn labels_of(records: &[LabeledText]) -> Vec<u8> {
    records.iter().map(|r| r.label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec!["vitriol", "data/labeled.tsv", "0.8"]
    }

    #[test]
    fn test_flags_parse_independently() {
        let mut args = base_args();
        args.extend(["--resplit", "--retrain", "--skip-logging", "--folds", "10"]);
        let cli = Cli::parse_from(args);

        assert!(cli.resplit);
        assert!(cli.retrain);
        assert!(!cli.save);
        assert!(cli.skip_logging);
        assert_eq!(cli.folds, Some(10));
        assert!((cli.ratio - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_config_reflects_flags() {
        let mut args = base_args();
        args.extend(["--model", "baseline", "--seed", "9", "--use-contextual"]);
        let cli = Cli::parse_from(args);
        let config = cli.build_config().unwrap();

        assert_eq!(config.family, ModelFamily::Baseline);
        assert_eq!(config.seed, 9);
        assert!(config.use_contextual);
        assert!((config.train_ratio - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_family_is_rejected() {
        let mut args = base_args();
        args.extend(["--model", "transformer"]);
        let cli = Cli::parse_from(args);
        assert!(cli.build_config().is_err());
    }

    #[test]
    fn test_contextual_mode_follows_the_flags() {
        let mut config = ExperimentConfig::default();
        assert_eq!(contextual_mode(&config, "train"), ContextualMode::Skip);

        config.use_contextual = true;
        let mode = contextual_mode(&config, "train");
        assert!(matches!(mode, ContextualMode::FromCache { .. }));

        config.recompute_contextual = true;
        let mode = contextual_mode(&config, "test");
        match mode {
            ContextualMode::Recompute { cache } => {
                assert!(cache.ends_with("contextual_test.txt"));
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }
}
