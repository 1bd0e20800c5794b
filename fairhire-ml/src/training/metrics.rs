//! Training and classification metrics.

use crate::error::FairnessError;
use serde::{Deserialize, Serialize};

/// Per-epoch loss history of a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    /// Adversary loss per epoch; empty when training without the adversary.
    pub adversary_loss_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    /// Record an epoch. Returns `true` if it set a new best loss.
    pub fn record_epoch(&mut self, loss: f64, adversary_loss: Option<f64>) -> bool {
        self.loss_history.push(loss);
        if let Some(al) = adversary_loss {
            self.adversary_loss_history.push(al);
        }
        self.epochs_completed += 1;

        let improved = loss.is_finite() && self.best_loss.is_none_or(|best| loss < best);
        if improved {
            self.best_loss = Some(loss);
            self.best_epoch = Some(self.epochs_completed);
        }
        improved
    }

    pub fn last_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

/// Binary classification report against ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],
    pub support: usize,
}

impl ClassificationMetrics {
    /// Compare predicted labels with ground truth. Undefined ratios are 0.0.
    pub fn compute(truth: &[u8], predicted: &[u8]) -> Result<Self, FairnessError> {
        if truth.len() != predicted.len() {
            return Err(FairnessError::Alignment {
                expected: truth.len(),
                actual: predicted.len(),
            });
        }
        let mut cm = [[0usize; 2]; 2];
        for (t, p) in truth.iter().zip(predicted) {
            cm[usize::from(*t).min(1)][usize::from(*p).min(1)] += 1;
        }
        let [[tn, fp], [fn_, tp]] = cm;
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Ok(Self {
            accuracy: ratio(tp + tn, truth.len()),
            precision,
            recall,
            f1_score,
            confusion_matrix: cm,
            support: truth.len(),
        })
    }
}
