//! Group-fairness metrics over row-aligned ground-truth and prediction datasets.
//!
//! All differences are `unprivileged − privileged`: 0 means parity, negative
//! means the unprivileged group receives the favorable outcome less often.
//! An empty group yields exactly 0.0 rather than NaN.

use crate::data::dataset::{GroupPartition, LabeledDataset, ProtectedAttribute};
use crate::error::{DegenerateGroupWarning, FairnessError};
use serde::{Deserialize, Serialize};

/// Favorable outcome label.
pub const FAVORABLE: u8 = 1;

/// Fairness metrics for one protected attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessMetricResult {
    pub attribute: ProtectedAttribute,
    pub mean_difference: f64,
    pub equal_opportunity_difference: f64,
    pub privileged_group: u8,
    pub unprivileged_group: u8,
    pub privileged_rows: usize,
    pub unprivileged_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<DegenerateGroupWarning>,
}

fn check_alignment(ground_truth: &LabeledDataset, predicted: &LabeledDataset) -> Result<(), FairnessError> {
    if ground_truth.len() != predicted.len() {
        return Err(FairnessError::Alignment {
            expected: ground_truth.len(),
            actual: predicted.len(),
        });
    }
    Ok(())
}

/// Share of `rows` whose predicted label is favorable. `None` when `rows` is empty.
fn favorable_rate(predicted: &[u8], rows: impl Iterator<Item = usize>) -> Option<f64> {
    let (mut hits, mut total) = (0usize, 0usize);
    for i in rows {
        total += 1;
        if predicted[i] == FAVORABLE {
            hits += 1;
        }
    }
    (total > 0).then(|| hits as f64 / total as f64)
}

fn difference(unprivileged: Option<f64>, privileged: Option<f64>) -> f64 {
    match (unprivileged, privileged) {
        (Some(u), Some(p)) => {
            let d = u - p;
            if d.is_finite() { d } else { 0.0 }
        }
        _ => 0.0,
    }
}

fn degenerate_warning(partition: &GroupPartition) -> Option<DegenerateGroupWarning> {
    partition.is_degenerate().then(|| {
        tracing::info!(
            attribute = %partition.attribute,
            privileged = partition.privileged.len(),
            unprivileged = partition.unprivileged.len(),
            "Empty protected group, metric falls back to 0.0"
        );
        DegenerateGroupWarning {
            attribute: partition.attribute.name().to_string(),
            privileged_rows: partition.privileged.len(),
            unprivileged_rows: partition.unprivileged.len(),
        }
    })
}

/// Statistical parity difference of the predicted labels.
///
/// Groups come from the ground-truth dataset's protected columns.
pub fn mean_difference(
    ground_truth: &LabeledDataset,
    predicted: &LabeledDataset,
    attribute: ProtectedAttribute,
) -> Result<f64, FairnessError> {
    check_alignment(ground_truth, predicted)?;
    let partition = ground_truth.partition(attribute);
    degenerate_warning(&partition);
    Ok(mean_difference_for(&partition, predicted.labels()))
}

fn mean_difference_for(partition: &GroupPartition, predicted: &[u8]) -> f64 {
    difference(
        favorable_rate(predicted, partition.unprivileged.iter().copied()),
        favorable_rate(predicted, partition.privileged.iter().copied()),
    )
}

/// True-positive-rate difference among rows whose ground truth is favorable.
pub fn equal_opportunity_difference(
    ground_truth: &LabeledDataset,
    predicted: &LabeledDataset,
    attribute: ProtectedAttribute,
) -> Result<f64, FairnessError> {
    check_alignment(ground_truth, predicted)?;
    let partition = ground_truth.partition(attribute);
    degenerate_warning(&partition);
    Ok(equal_opportunity_for(&partition, ground_truth.labels(), predicted.labels()))
}

fn equal_opportunity_for(partition: &GroupPartition, truth: &[u8], predicted: &[u8]) -> f64 {
    let positives = |rows: &[usize]| {
        rows.iter()
            .copied()
            .filter(|i| truth[*i] == FAVORABLE)
            .collect::<Vec<_>>()
    };
    let unpriv = positives(&partition.unprivileged);
    let priv_ = positives(&partition.privileged);
    difference(
        favorable_rate(predicted, unpriv.into_iter()),
        favorable_rate(predicted, priv_.into_iter()),
    )
}

/// Both metrics for one attribute, computed over a single partition pass.
pub fn evaluate_attribute(
    ground_truth: &LabeledDataset,
    predicted: &LabeledDataset,
    attribute: ProtectedAttribute,
) -> Result<FairnessMetricResult, FairnessError> {
    check_alignment(ground_truth, predicted)?;
    let partition = ground_truth.partition(attribute);
    let degenerate = degenerate_warning(&partition);
    let privileged_group = attribute.privileged_value();
    Ok(FairnessMetricResult {
        attribute,
        mean_difference: mean_difference_for(&partition, predicted.labels()),
        equal_opportunity_difference: equal_opportunity_for(
            &partition,
            ground_truth.labels(),
            predicted.labels(),
        ),
        privileged_group,
        unprivileged_group: 1 - privileged_group,
        privileged_rows: partition.privileged.len(),
        unprivileged_rows: partition.unprivileged.len(),
        degenerate,
    })
}

/// Metrics for every protected attribute.
pub fn evaluate_all(
    ground_truth: &LabeledDataset,
    predicted: &LabeledDataset,
) -> Result<Vec<FairnessMetricResult>, FairnessError> {
    ProtectedAttribute::ALL
        .iter()
        .map(|a| evaluate_attribute(ground_truth, predicted, *a))
        .collect()
}
