//! End-to-end entry points: evaluate, audit, train and mitigate.

use crate::artifacts::LoadedArtifacts;
use crate::classifier::TrainedClassifier;
use crate::config::FairnessConfig;
use crate::data::dataset::{LabeledDataset, ProtectedAttribute};
use crate::data::source::TrainingTable;
use crate::data::split::{TrainTestSplit, stratified_split};
use crate::error::FairnessError;
use crate::fairness::decision::{BiasDecision, BiasReport, clamp_nan, decide};
use crate::fairness::metrics::{FairnessMetricResult, evaluate_all, mean_difference};
use crate::features::encoder::{FeatureEncoder, RawRecord};
use crate::features::scaler::StandardScaler;
use crate::features::schema::FEATURE_WIDTH;
use crate::mitigation::adversarial::{AdversarialDebiaser, DebiasedModel, TrainingReport};
use crate::mitigation::reweighing::{Reweighed, Reweigher};
use crate::training::metrics::ClassificationMetrics;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Encode raw rows with the artifact scaler into a ground-truth dataset.
fn ground_truth(
    artifacts: &LoadedArtifacts,
    records: &[RawRecord],
    labels: &[u8],
    config: &FairnessConfig,
) -> Result<LabeledDataset, FairnessError> {
    if records.len() != labels.len() {
        return Err(FairnessError::Alignment {
            expected: records.len(),
            actual: labels.len(),
        });
    }
    let encoder = FeatureEncoder::new(&artifacts.scaler, config.decision.age_threshold);
    let encoded = records
        .iter()
        .map(|r| encoder.encode(r))
        .collect::<Result<Vec<_>, _>>()?;
    LabeledDataset::from_encoded(encoded, labels.to_vec())
}

/// Gender score: ground truth against its gender-reweighed copy.
/// Age score: ground truth against the classifier's predictions.
fn scores(
    artifacts: &LoadedArtifacts,
    dataset: &LabeledDataset,
) -> Result<(f64, f64, LabeledDataset), FairnessError> {
    let Reweighed { dataset: reweighed, .. } =
        Reweigher::new(ProtectedAttribute::Gender).fit_transform(dataset)?;
    let gender = mean_difference(dataset, &reweighed, ProtectedAttribute::Gender)?;

    artifacts.model.classifier.validate(FEATURE_WIDTH)?;
    let predicted = artifacts.model.predict(dataset)?;
    let age = mean_difference(dataset, &predicted, ProtectedAttribute::AgeAbove40)?;
    Ok((gender, age, predicted))
}

/// Score one candidate record against its hiring decision.
pub fn evaluate(
    artifacts: &LoadedArtifacts,
    record: &RawRecord,
    hiring_decision: u8,
    config: &FairnessConfig,
) -> Result<BiasReport, FairnessError> {
    if hiring_decision > 1 {
        return Err(FairnessError::invalid_input(format!(
            "hiring decision must be 0 or 1, got {hiring_decision}"
        )));
    }
    let dataset = ground_truth(artifacts, std::slice::from_ref(record), &[hiring_decision], config)?;
    let (gender, age, predicted) = scores(artifacts, &dataset)?;
    let predicted_decision = predicted.labels().first().copied().unwrap_or_default();
    Ok(BiasDecision::new(config.decision.threshold).report(gender, age, predicted_decision))
}

/// Result of scoring many rows at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvaluation {
    pub rows: usize,
    pub mean_difference_gender: f64,
    pub mean_difference_age: f64,
    pub predicted_decisions: Vec<u8>,
    pub bias_detected: bool,
}

/// [`evaluate`] over a batch of records with their hiring decisions.
pub fn evaluate_batch(
    artifacts: &LoadedArtifacts,
    records: &[RawRecord],
    labels: &[u8],
    config: &FairnessConfig,
) -> Result<BatchEvaluation, FairnessError> {
    if records.is_empty() {
        return Err(FairnessError::invalid_input("no records to evaluate"));
    }
    let dataset = ground_truth(artifacts, records, labels, config)?;
    let (gender, age, predicted) = scores(artifacts, &dataset)?;
    let (gender, age) = (clamp_nan(gender), clamp_nan(age));
    Ok(BatchEvaluation {
        rows: dataset.len(),
        mean_difference_gender: gender,
        mean_difference_age: age,
        predicted_decisions: predicted.labels().to_vec(),
        bias_detected: decide(gender, age, config.decision.threshold),
    })
}

/// Fairness and accuracy of a classifier on a labeled dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub fairness: Vec<FairnessMetricResult>,
    pub classification: ClassificationMetrics,
}

impl AuditReport {
    pub fn metric(&self, attribute: ProtectedAttribute) -> Option<&FairnessMetricResult> {
        self.fairness.iter().find(|m| m.attribute == attribute)
    }

    pub fn bias_detected(&self, threshold: f64) -> bool {
        let md = |a| self.metric(a).map_or(0.0, |m| m.mean_difference);
        decide(
            md(ProtectedAttribute::Gender),
            md(ProtectedAttribute::AgeAbove40),
            threshold,
        )
    }
}

pub fn audit<C: TrainedClassifier + ?Sized>(
    classifier: &C,
    dataset: &LabeledDataset,
) -> Result<AuditReport, FairnessError> {
    let predicted = classifier.predict_dataset(dataset)?;
    Ok(AuditReport {
        fairness: evaluate_all(dataset, &predicted)?,
        classification: ClassificationMetrics::compute(dataset.labels(), predicted.labels())?,
    })
}

/// A training table encoded with a freshly fitted scaler and split.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub scaler: StandardScaler,
    pub split: TrainTestSplit,
}

/// Fit the scaler on the whole table, encode it, then split stratified by label.
pub fn prepare(table: &TrainingTable, config: &FairnessConfig) -> Result<PreparedData, FairnessError> {
    let scaler = table.fit_scaler()?;
    let dataset = table.encode(&scaler, config.decision.age_threshold)?;
    let split = stratified_split(&dataset, config.data.test_size, config.data.split_seed)?;
    info!(
        rows = dataset.len(),
        train = split.train.len(),
        test = split.test.len(),
        base_rate = dataset.base_rate(),
        "Prepared training data"
    );
    Ok(PreparedData { scaler, split })
}

/// Train the predictor alone, without reweighing or the adversary.
pub fn train_baseline(
    train: &LabeledDataset,
    config: &FairnessConfig,
) -> Result<(DebiasedModel, TrainingReport), FairnessError> {
    let mut debias = config.debias.clone();
    debias.debias = false;
    AdversarialDebiaser::new(debias).fit(train)
}

/// Everything produced by one mitigation run.
#[derive(Debug, Clone)]
pub struct MitigationOutcome {
    pub reweighed_dataset: LabeledDataset,
    pub debiased_model: DebiasedModel,
    pub post_mitigation_metrics: Vec<FairnessMetricResult>,
    pub training_report: TrainingReport,
    pub classification: ClassificationMetrics,
}

/// Reweigh `train` on gender, fit the debiaser on it and evaluate on `test`.
pub fn mitigate(
    train: &LabeledDataset,
    test: &LabeledDataset,
    config: &FairnessConfig,
) -> Result<MitigationOutcome, FairnessError> {
    mitigate_with(train, test, config, None)
}

/// [`mitigate`] with a cancellation token checked between epochs.
pub fn mitigate_with(
    train: &LabeledDataset,
    test: &LabeledDataset,
    config: &FairnessConfig,
    cancel: Option<CancellationToken>,
) -> Result<MitigationOutcome, FairnessError> {
    let attribute = ProtectedAttribute::Gender;
    let reweighed = Reweigher::new(attribute).fit_transform(train)?;
    info!(
        attribute = %attribute,
        weights = ?reweighed.cells.map(|c| c.weight),
        "Reweighed training data"
    );

    let mut debiaser = AdversarialDebiaser::new(config.debias.clone()).with_attribute(attribute);
    if let Some(token) = cancel {
        debiaser = debiaser.with_cancellation(token);
    }
    let (model, training_report) = debiaser.fit(&reweighed.dataset)?;

    let predicted = model.predict(test)?;
    let post_mitigation_metrics = evaluate_all(test, &predicted)?;
    let classification = ClassificationMetrics::compute(test.labels(), predicted.labels())?;
    for m in &post_mitigation_metrics {
        info!(
            attribute = %m.attribute,
            mean_difference = m.mean_difference,
            equal_opportunity_difference = m.equal_opportunity_difference,
            "Post-mitigation fairness"
        );
    }

    Ok(MitigationOutcome {
        reweighed_dataset: reweighed.dataset,
        debiased_model: model,
        post_mitigation_metrics,
        training_report,
        classification,
    })
}
