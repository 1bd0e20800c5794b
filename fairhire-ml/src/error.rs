//! Error types for the fairhire-ml crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for fairness evaluation and mitigation.
#[derive(Debug, Error)]
pub enum FairnessError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Alignment error: ground truth has {expected} rows, predictions have {actual}")]
    Alignment { expected: usize, actual: usize },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Training cancelled after {epochs} epochs")]
    Cancelled { epochs: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FairnessError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// A required input field was absent.
    pub fn missing_field(field: &str) -> Self {
        Self::Schema(format!("required field '{field}' is missing"))
    }
}

pub type Result<T> = std::result::Result<T, FairnessError>;

/// A protected-attribute partition was empty; the metric fell back to 0.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegenerateGroupWarning {
    pub attribute: String,
    pub privileged_rows: usize,
    pub unprivileged_rows: usize,
}

/// Adversarial training stopped improving but was allowed to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    /// Epoch (1-based) at which the stall was detected.
    pub epoch: usize,
    pub best_epoch: usize,
    pub best_loss: f64,
    pub patience: usize,
}

impl std::fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "loss did not improve for {} epochs (best {:.6} at epoch {}, stalled at epoch {})",
            self.patience, self.best_loss, self.best_epoch, self.epoch
        )
    }
}
