//! The classifier capability consumed by evaluation.

use crate::data::dataset::LabeledDataset;
use crate::error::FairnessError;
use crate::features::schema::FeatureRecord;

/// Decision threshold on `predict_proba`.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// A trained binary classifier over [`FeatureRecord`]s.
///
/// Implementations are read-only after training and shared across threads.
pub trait TrainedClassifier: Send + Sync {
    /// Probability of the favorable label.
    fn predict_proba(&self, record: &FeatureRecord) -> f64;

    fn predict(&self, record: &FeatureRecord) -> u8 {
        u8::from(self.predict_proba(record) > DECISION_THRESHOLD)
    }

    /// Prediction dataset: same rows as `dataset`, labels replaced.
    fn predict_dataset(&self, dataset: &LabeledDataset) -> Result<LabeledDataset, FairnessError> {
        let labels = dataset.features().iter().map(|r| self.predict(r)).collect();
        dataset.with_labels(labels)
    }
}
