//! End-to-end scenarios over the public pipeline.

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fairhire_ml::artifacts::{CLASSIFIER_FILE, LoadedArtifacts, SCALER_FILE};
use fairhire_ml::config::FairnessConfig;
use fairhire_ml::data::split::stratified_split;
use fairhire_ml::data::{LabeledDataset, ProtectedAttribute, ProtectedValues, TrainingTable};
use fairhire_ml::fairness::FairnessMetricResult;
use fairhire_ml::fairness::metrics::mean_difference;
use fairhire_ml::features::encoder::CategoricalInput;
use fairhire_ml::features::{FEATURE_WIDTH, FeatureRecord, RawRecord};
use fairhire_ml::mitigation::TrainingStatus;
use fairhire_ml::pipeline::{self, prepare};
use fairhire_ml::{TrainedClassifier, audit, mitigate};

const HEADER: &str = "Age,Gender,EducationLevel,ExperienceYears,PreviousCompanies,DistanceFromCompany,InterviewScore,SkillScore,PersonalityScore,RecruitmentStrategy,HiringDecision";

/// Recruitment table whose label tracks interview and skill scores.
fn recruitment_csv(rows: usize) -> String {
    let mut csv = String::from(HEADER);
    for i in 0..rows {
        let hired = usize::from(i % 5 < 2);
        let gender = (i / 2) % 2;
        let age = 22 + (i * 13) % 35;
        let score = 20 + i % 17 + if hired == 1 { 50 } else { 0 };
        let experience = if i % 11 == 0 { String::new() } else { (i % 15).to_string() };
        csv.push_str(&format!(
            "\n{age},{gender},{},{experience},{},{}.25,{score},{score},{},{},{hired}",
            1 + i % 4,
            i % 6,
            i % 50,
            30 + (i * 3) % 60,
            1 + i % 3,
        ));
    }
    csv
}

fn small_config(seed: u64) -> FairnessConfig {
    let mut config = FairnessConfig::default();
    config.debias.num_epochs = 8;
    config.debias.hidden_units = 16;
    config.debias.batch_size = 32;
    config.debias.learning_rate = 0.01;
    config.debias.seed = Some(seed);
    config
}

/// Candidate who differs from the others only by gender. Everyone is 30, so
/// the age groups never split and the age score stays at its 0.0 fallback.
fn candidate(gender: &str) -> RawRecord {
    RawRecord {
        age: Some(30.0),
        experience_years: Some(4.0),
        previous_companies: Some(2.0),
        distance_from_company: Some(12.5),
        interview_score: Some(60.0),
        skill_score: Some(55.0),
        personality_score: Some(70.0),
        gender: Some(CategoricalInput::from(gender)),
        recruitment_strategy: Some(CategoricalInput::from("Referral")),
        education_level: Some(CategoricalInput::from("Bachelor's")),
    }
}

/// Baseline artifacts written to and read back from `dir`.
fn saved_artifacts(dir: &TempDir) -> LoadedArtifacts {
    let table = TrainingTable::from_reader(recruitment_csv(60).as_bytes()).unwrap();
    let config = small_config(9);
    let prepared = prepare(&table, &config).unwrap();
    let (model, _) = pipeline::train_baseline(&prepared.split.train, &config).unwrap();
    LoadedArtifacts::new(prepared.scaler, model).save(dir.path()).unwrap();
    LoadedArtifacts::load(dir.path()).unwrap()
}

#[test]
fn independent_gender_is_not_biased() {
    let dir = TempDir::new().unwrap();
    let artifacts = saved_artifacts(&dir);

    // Both genders hired at exactly 30%.
    let (records, labels): (Vec<_>, Vec<_>) = (0..200)
        .map(|i| {
            let gender = if i % 2 == 0 { "Male" } else { "Female" };
            (candidate(gender), u8::from((i / 2) % 10 < 3))
        })
        .unzip();
    let result =
        pipeline::evaluate_batch(&artifacts, &records, &labels, &FairnessConfig::default()).unwrap();

    assert_eq!(result.rows, 200);
    assert!(result.mean_difference_gender.abs() < 0.01, "md = {}", result.mean_difference_gender);
    assert!(!result.bias_detected);
}

#[test]
fn fully_separated_groups_are_biased() {
    let dir = TempDir::new().unwrap();
    let artifacts = saved_artifacts(&dir);

    // Every woman rejected, every man hired.
    let (records, labels): (Vec<_>, Vec<_>) = (0..20)
        .map(|i| if i < 10 { (candidate("Female"), 0) } else { (candidate("Male"), 1) })
        .unzip();
    let result =
        pipeline::evaluate_batch(&artifacts, &records, &labels, &FairnessConfig::default()).unwrap();

    assert_eq!(result.mean_difference_gender, -1.0);
    assert!(result.bias_detected);
}

/// Hiring that favors men through a proxy feature.
///
/// Feature 0 is merit, feature 1 mirrors gender exactly, and the label adds
/// a gender bonus plus noise the features cannot see.
fn gender_dependent(rows: usize, seed: u64) -> LabeledDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(rows);
    let mut labels = Vec::with_capacity(rows);
    let mut protected = Vec::with_capacity(rows);
    for i in 0..rows {
        let gender = u8::from(i % 2 == 0);
        let proxy = if gender == 1 { 1.0 } else { -1.0 };
        let merit: f64 = rng.gen_range(-1.0..1.0);
        let noise: f64 = rng.gen_range(-0.5..0.5);
        let mut values = [0.0; FEATURE_WIDTH];
        values[0] = merit;
        values[1] = proxy;
        features.push(FeatureRecord::from_values(values));
        labels.push(u8::from(merit + 0.6 * proxy + noise > 0.0));
        protected.push(ProtectedValues {
            gender,
            age_above_40: u8::from(i % 3 == 0),
        });
    }
    LabeledDataset::new(features, labels, protected, None).unwrap()
}

fn gender_md(metrics: &[FairnessMetricResult]) -> f64 {
    metrics
        .iter()
        .find(|m| m.attribute == ProtectedAttribute::Gender)
        .map(|m| m.mean_difference)
        .unwrap()
}

#[test]
fn debiasing_shrinks_gender_gap() {
    let data = gender_dependent(2000, 7);
    let split = stratified_split(&data, 0.3, 7).unwrap();
    let mut config = FairnessConfig::default();
    config.debias.seed = Some(7);

    let (baseline, _) = pipeline::train_baseline(&split.train, &config).unwrap();
    let baseline_md = gender_md(&audit(&baseline, &split.test).unwrap().fairness);
    assert!(baseline_md < -0.3, "baseline md = {baseline_md}");

    config.debias.adversary_loss_weight = 0.1;
    let mild = gender_md(&mitigate(&split.train, &split.test, &config).unwrap().post_mitigation_metrics);
    config.debias.adversary_loss_weight = 1.0;
    let strong = gender_md(&mitigate(&split.train, &split.test, &config).unwrap().post_mitigation_metrics);

    assert!(mild.abs() < baseline_md.abs(), "baseline {baseline_md}, lambda 0.1 {mild}");
    assert!(strong.abs() < mild.abs(), "lambda 0.1 {mild}, lambda 1.0 {strong}");
}

#[test]
fn csv_to_mitigation_end_to_end() {
    let table = TrainingTable::from_reader(recruitment_csv(150).as_bytes()).unwrap();
    assert!(table.imputed_cells > 0);

    let config = small_config(7);
    let prepared = prepare(&table, &config).unwrap();
    assert_eq!(prepared.split.train.len() + prepared.split.test.len(), 150);

    let outcome = mitigate(&prepared.split.train, &prepared.split.test, &config).unwrap();
    assert_eq!(outcome.reweighed_dataset.labels(), prepared.split.train.labels());
    assert_eq!(outcome.post_mitigation_metrics.len(), 2);
    for m in &outcome.post_mitigation_metrics {
        assert!((-1.0..=1.0).contains(&m.mean_difference));
        assert!((-1.0..=1.0).contains(&m.equal_opportunity_difference));
    }
    assert_eq!(outcome.training_report.metrics.epochs_completed, 8);
    assert_eq!(outcome.classification.support, prepared.split.test.len());
    assert!(outcome.debiased_model.debiased);
}

#[test]
fn seeded_mitigation_is_deterministic() {
    let table = TrainingTable::from_reader(recruitment_csv(80).as_bytes()).unwrap();
    let config = small_config(42);
    let prepared = prepare(&table, &config).unwrap();

    let a = mitigate(&prepared.split.train, &prepared.split.test, &config).unwrap();
    let b = mitigate(&prepared.split.train, &prepared.split.test, &config).unwrap();
    assert_eq!(a.debiased_model, b.debiased_model);
    assert_eq!(
        a.debiased_model.predict(&prepared.split.test).unwrap().labels(),
        b.debiased_model.predict(&prepared.split.test).unwrap().labels()
    );
    assert_eq!(a.training_report.metrics.loss_history, b.training_report.metrics.loss_history);
}

#[test]
fn cancelled_mitigation_reports_cancelled() {
    let table = TrainingTable::from_reader(recruitment_csv(60).as_bytes()).unwrap();
    let config = small_config(1);
    let prepared = prepare(&table, &config).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let outcome =
        pipeline::mitigate_with(&prepared.split.train, &prepared.split.test, &config, Some(token))
            .unwrap();
    assert_eq!(outcome.training_report.status, TrainingStatus::Cancelled);
}

#[test]
fn artifacts_round_trip_byte_identical() {
    let table = TrainingTable::from_reader(recruitment_csv(60).as_bytes()).unwrap();
    let config = small_config(3);
    let prepared = prepare(&table, &config).unwrap();
    let (model, _) = pipeline::train_baseline(&prepared.split.train, &config).unwrap();

    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    LoadedArtifacts::new(prepared.scaler.clone(), model).save(first.path()).unwrap();
    let loaded = LoadedArtifacts::load(first.path()).unwrap();
    loaded.save(second.path()).unwrap();

    for file in [SCALER_FILE, CLASSIFIER_FILE] {
        let a = std::fs::read(first.path().join(file)).unwrap();
        let b = std::fs::read(second.path().join(file)).unwrap();
        assert!(a == b, "{file} changed across a round trip");
    }

    // Loaded artifacts predict exactly like the originals.
    let report = audit(&loaded.model, &prepared.split.test).unwrap();
    let predicted = loaded.model.predict_dataset(&prepared.split.test).unwrap();
    assert_eq!(report.classification.support, predicted.len());
}

#[test]
fn evaluate_with_trained_artifacts() {
    let table = TrainingTable::from_reader(recruitment_csv(60).as_bytes()).unwrap();
    let config = small_config(5);
    let prepared = prepare(&table, &config).unwrap();
    let (model, _) = pipeline::train_baseline(&prepared.split.train, &config).unwrap();
    let artifacts = LoadedArtifacts::new(prepared.scaler, model);

    let batch = pipeline::evaluate_batch(&artifacts, &table.records, &table.labels, &config).unwrap();
    assert_eq!(batch.rows, 60);
    // Gender score compares labels with their reweighed copy, which keeps labels.
    let truth = table.encode(&artifacts.scaler, 40.0).unwrap();
    let expected = mean_difference(&truth, &truth, ProtectedAttribute::Gender).unwrap();
    assert!((batch.mean_difference_gender - expected).abs() < 1e-12);

    let single = pipeline::evaluate(&artifacts, &table.records[0], table.labels[0], &config).unwrap();
    assert_eq!(single.mean_difference_gender, 0.0);
    assert_eq!(single.mean_difference_age, 0.0);
}
