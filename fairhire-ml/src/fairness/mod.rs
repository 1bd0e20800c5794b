//! Group-fairness metrics and the bias verdict.

pub mod decision;
pub mod metrics;

pub use decision::{BiasDecision, BiasReport, decide};
pub use metrics::{
    FairnessMetricResult, equal_opportunity_difference, evaluate_all, evaluate_attribute,
    mean_difference,
};
