//! Training support: epoch metrics, callbacks and seeds.

pub mod callbacks;
pub mod metrics;
pub mod reproducibility;

pub use callbacks::{AnomalyDetectionCallback, CallbackAction, ConvergenceCallback, TrainingCallback};
pub use metrics::{ClassificationMetrics, TrainingMetrics};
pub use reproducibility::SeedManager;
