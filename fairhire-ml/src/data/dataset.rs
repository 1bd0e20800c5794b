//! Labeled dataset with protected-attribute columns and group partitions.

use crate::error::FairnessError;
use crate::features::encoder::EncodedRecord;
use crate::features::schema::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The two recognized protected attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectedAttribute {
    Gender,
    AgeAbove40,
}

impl ProtectedAttribute {
    pub const ALL: [ProtectedAttribute; 2] = [Self::Gender, Self::AgeAbove40];

    /// Value marking the privileged group.
    pub fn privileged_value(self) -> u8 {
        match self {
            Self::Gender => 1,
            Self::AgeAbove40 => 0,
        }
    }

    pub fn is_privileged(self, value: u8) -> bool {
        value == self.privileged_value()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gender => "gender",
            Self::AgeAbove40 => "age_above_40",
        }
    }
}

impl std::fmt::Display for ProtectedAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Protected-attribute indicators of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtectedValues {
    pub gender: u8,
    pub age_above_40: u8,
}

impl ProtectedValues {
    pub fn get(&self, attribute: ProtectedAttribute) -> u8 {
        match attribute {
            ProtectedAttribute::Gender => self.gender,
            ProtectedAttribute::AgeAbove40 => self.age_above_40,
        }
    }
}

/// Row indices of the two groups of a protected attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPartition {
    pub attribute: ProtectedAttribute,
    pub privileged: Vec<usize>,
    pub unprivileged: Vec<usize>,
}

impl GroupPartition {
    pub fn is_degenerate(&self) -> bool {
        self.privileged.is_empty() || self.unprivileged.is_empty()
    }
}

/// Immutable rows of (features, label, weight, protected values).
///
/// Features and protected values are shared between derived datasets;
/// transformations return new datasets with the same row order.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    features: Arc<Vec<FeatureRecord>>,
    protected: Arc<Vec<ProtectedValues>>,
    labels: Vec<u8>,
    weights: Vec<f64>,
}

impl LabeledDataset {
    /// Build a dataset. Weights default to 1.0 when `None`.
    pub fn new(
        features: Vec<FeatureRecord>,
        labels: Vec<u8>,
        protected: Vec<ProtectedValues>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, FairnessError> {
        let n = features.len();
        if labels.len() != n || protected.len() != n {
            return Err(FairnessError::dataset(format!(
                "row count mismatch: {n} feature rows, {} labels, {} protected rows",
                labels.len(),
                protected.len()
            )));
        }
        validate_labels(&labels)?;
        let weights = match weights {
            Some(w) => {
                validate_weights(&w, n)?;
                w
            }
            None => vec![1.0; n],
        };
        Ok(Self {
            features: Arc::new(features),
            protected: Arc::new(protected),
            labels,
            weights,
        })
    }

    /// Build a dataset from encoder output.
    pub fn from_encoded(records: Vec<EncodedRecord>, labels: Vec<u8>) -> Result<Self, FairnessError> {
        let (features, protected) = records
            .into_iter()
            .map(|r| (r.features, r.protected))
            .unzip();
        Self::new(features, labels, protected, None)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> &[FeatureRecord] {
        &self.features
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn protected(&self) -> &[ProtectedValues] {
        &self.protected
    }

    pub fn protected_column(&self, attribute: ProtectedAttribute) -> impl Iterator<Item = u8> + '_ {
        self.protected.iter().map(move |p| p.get(attribute))
    }

    /// Same rows and labels, new instance weights.
    pub fn with_weights(&self, weights: Vec<f64>) -> Result<Self, FairnessError> {
        validate_weights(&weights, self.len())?;
        Ok(Self {
            features: Arc::clone(&self.features),
            protected: Arc::clone(&self.protected),
            labels: self.labels.clone(),
            weights,
        })
    }

    /// Same rows and weights, new labels (e.g. a prediction dataset).
    pub fn with_labels(&self, labels: Vec<u8>) -> Result<Self, FairnessError> {
        if labels.len() != self.len() {
            return Err(FairnessError::Alignment {
                expected: self.len(),
                actual: labels.len(),
            });
        }
        validate_labels(&labels)?;
        Ok(Self {
            features: Arc::clone(&self.features),
            protected: Arc::clone(&self.protected),
            labels,
            weights: self.weights.clone(),
        })
    }

    /// Rows at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, FairnessError> {
        if let Some(bad) = indices.iter().find(|i| **i >= self.len()) {
            return Err(FairnessError::dataset(format!(
                "row index {bad} out of range for {} rows",
                self.len()
            )));
        }
        Ok(Self {
            features: Arc::new(indices.iter().map(|i| self.features[*i].clone()).collect()),
            protected: Arc::new(indices.iter().map(|i| self.protected[*i]).collect()),
            labels: indices.iter().map(|i| self.labels[*i]).collect(),
            weights: indices.iter().map(|i| self.weights[*i]).collect(),
        })
    }

    /// Split rows by the attribute's privileged value. Single pass.
    pub fn partition(&self, attribute: ProtectedAttribute) -> GroupPartition {
        let mut privileged = Vec::new();
        let mut unprivileged = Vec::new();
        for (i, p) in self.protected.iter().enumerate() {
            if attribute.is_privileged(p.get(attribute)) {
                privileged.push(i);
            } else {
                unprivileged.push(i);
            }
        }
        GroupPartition {
            attribute,
            privileged,
            unprivileged,
        }
    }

    /// Fraction of rows with label 1.
    pub fn base_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|l| **l == 1).count() as f64 / self.len() as f64
    }
}

fn validate_labels(labels: &[u8]) -> Result<(), FairnessError> {
    if let Some((i, l)) = labels.iter().enumerate().find(|(_, l)| **l > 1) {
        return Err(FairnessError::dataset(format!(
            "label at row {i} must be 0 or 1, got {l}"
        )));
    }
    Ok(())
}

fn validate_weights(weights: &[f64], n: usize) -> Result<(), FairnessError> {
    if weights.len() != n {
        return Err(FairnessError::dataset(format!(
            "expected {n} weights, got {}",
            weights.len()
        )));
    }
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w <= 0.0)
    {
        return Err(FairnessError::dataset(format!(
            "weight at row {i} must be finite and > 0, got {w}"
        )));
    }
    Ok(())
}
