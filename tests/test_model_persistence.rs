//! Integration test: model parameter persistence across all families

use std::collections::HashMap;

use ndarray::Array1;
use tempfile::tempdir;

use vitriol::data::LabeledText;
use vitriol::error::VitriolError;
use vitriol::features::{attach_features, ContextualMode, FeatureProvider, HashingProvider, WordTable};
use vitriol::models::{ExperimentModel, ModelFamily, ModelInputs, TrainSettings};

fn word_table() -> WordTable {
    let mut vectors = HashMap::new();
    vectors.insert("vile".to_string(), vec![3.0, -3.0]);
    vectors.insert("scum".to_string(), vec![3.1, -2.9]);
    vectors.insert("sunny".to_string(), vec![-3.0, 3.0]);
    vectors.insert("kitten".to_string(), vec![-3.1, 2.9]);
    WordTable { dim: 2, vectors }
}

fn fitted_inputs() -> (ModelInputs, Array1<f64>) {
    let mut records = Vec::new();
    for i in 0..6 {
        records.push(LabeledText {
            text: format!("vile scum post {i}"),
            label: 1,
        });
        records.push(LabeledText {
            text: format!("sunny kitten post {i}"),
            label: 0,
        });
    }

    let provider = HashingProvider::new(word_table());
    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let features = provider
        .embeddings_for(&texts, &ContextualMode::Skip)
        .unwrap();
    let examples = attach_features(&records, features).unwrap();

    let labels = Array1::from_iter(examples.iter().map(|e| e.label as f64));
    let inputs = ModelInputs::from_examples(&examples).unwrap();
    (inputs, labels)
}

fn settings() -> TrainSettings {
    TrainSettings {
        epochs: 40,
        batch_size: 4,
        validation_split: 0.2,
        patience: 5,
        seed: 7,
    }
}

// ============================================================================
// Save/load roundtrip
// ============================================================================

#[test]
fn test_save_load_roundtrip_preserves_predictions() {
    let (inputs, labels) = fitted_inputs();
    let dir = tempdir().unwrap();

    for family in [
        ModelFamily::Baseline,
        ModelFamily::BranchNetwork,
        ModelFamily::MarginClassifier,
    ] {
        let path = dir.path().join(format!("{family}.json"));

        let mut model = ExperimentModel::untrained(family);
        model.fit(&inputs, &labels, &settings()).unwrap();
        let before = model.predict(&inputs).unwrap();

        model.save(&path).unwrap();
        let reloaded = ExperimentModel::load(&path).unwrap();
        assert_eq!(reloaded.family(), family);
        assert!(reloaded.is_fitted());

        let after = reloaded.predict(&inputs).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!(
                (a - b).abs() < 1e-12,
                "{family}: prediction drift after reload"
            );
        }
    }
}

#[test]
fn test_save_creates_parent_directories() {
    let (inputs, labels) = fitted_inputs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("nested").join("params.json");

    let mut model = ExperimentModel::untrained(ModelFamily::Baseline);
    model.fit(&inputs, &labels, &settings()).unwrap();
    model.save(&path).unwrap();

    assert!(path.exists());
}

#[test]
fn test_unfitted_model_cannot_be_saved() {
    let dir = tempdir().unwrap();
    let model = ExperimentModel::untrained(ModelFamily::Baseline);

    let err = model.save(&dir.path().join("params.json")).unwrap_err();
    assert!(matches!(err, VitriolError::ModelNotFitted));
}

#[test]
fn test_reset_after_reload_drops_parameters() {
    let (inputs, labels) = fitted_inputs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("params.json");

    let mut model = ExperimentModel::untrained(ModelFamily::Baseline);
    model.fit(&inputs, &labels, &settings()).unwrap();
    model.save(&path).unwrap();

    let mut reloaded = ExperimentModel::load(&path).unwrap();
    reloaded.reset();
    assert!(!reloaded.is_fitted());
    assert!(reloaded.predict(&inputs).is_err());
}

// ============================================================================
// Artifact failure modes
// ============================================================================

#[test]
fn test_missing_parameters_are_a_soft_abort() {
    let dir = tempdir().unwrap();
    let err = ExperimentModel::load(&dir.path().join("absent.json")).unwrap_err();

    assert!(matches!(err, VitriolError::MissingArtifact(_)));
    assert!(err.is_soft_abort());
}

#[test]
fn test_unreadable_parameters_are_reported_distinctly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mangled.json");
    std::fs::write(&path, "{ \"Baseline\": 12 ").unwrap();

    let err = ExperimentModel::load(&path).unwrap_err();
    assert!(matches!(err, VitriolError::CorruptArtifact(_)));
    assert!(err.is_soft_abort());
}
