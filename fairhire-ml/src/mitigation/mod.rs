//! Bias mitigation: pre-processing reweighing and in-processing adversarial debiasing.

pub mod adversarial;
pub mod network;
pub mod optim;
pub mod reweighing;

pub use adversarial::{
    AdversarialDebiaser, AdversarialGradientStep, Batch, DebiasedModel, StepLosses, TrainStep,
    TrainingReport, TrainingStatus,
};
pub use network::{Adversary, MlpClassifier};
pub use optim::{Adam, ExponentialDecay};
pub use reweighing::{CellWeight, Reweighed, Reweigher};
