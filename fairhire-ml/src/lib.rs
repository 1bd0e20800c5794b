//! # fairhire-ml: bias evaluation and mitigation for hiring classifiers
//!
//! Encodes candidate records against a versioned feature schema, measures
//! group fairness across the gender and age-above-40 attributes, reweighs
//! training data and trains an adversarially debiased predictor.
//!
//! Data flow:
//! raw record → [`FeatureEncoder`] → [`LabeledDataset`] →
//! {group metrics, [`Reweigher`] → [`AdversarialDebiaser`]} → [`BiasReport`].

// Foundation
pub mod config;
pub mod error;

// Inputs
pub mod data;
pub mod features;

// Metrics and verdict
pub mod classifier;
pub mod fairness;

// Mitigation and training support
pub mod mitigation;
pub mod training;

// Persistence and entry points
pub mod artifacts;
pub mod pipeline;

// Re-exports
pub use artifacts::{ArtifactStore, LoadedArtifacts};
pub use classifier::TrainedClassifier;
pub use config::{FairnessConfig, load_config};
pub use data::{LabeledDataset, ProtectedAttribute, TrainingTable};
pub use error::{ConvergenceWarning, DegenerateGroupWarning, FairnessError};
pub use fairness::{BiasDecision, BiasReport, FairnessMetricResult};
pub use features::{FeatureEncoder, FeatureRecord, RawRecord, StandardScaler};
pub use mitigation::{AdversarialDebiaser, DebiasedModel, Reweigher, TrainingReport};
pub use pipeline::{audit, evaluate, evaluate_batch, mitigate, train_baseline};
