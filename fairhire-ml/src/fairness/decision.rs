//! Bias verdict over the gender and age mean differences.

use serde::{Deserialize, Serialize};

/// NaN scores are treated as 0.0 before comparison.
pub fn clamp_nan(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score }
}

/// `true` when either absolute mean difference exceeds `threshold`.
pub fn decide(mean_difference_gender: f64, mean_difference_age: f64, threshold: f64) -> bool {
    clamp_nan(mean_difference_gender).abs() > threshold
        || clamp_nan(mean_difference_age).abs() > threshold
}

/// Threshold-carrying verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasDecision {
    pub threshold: f64,
}

impl Default for BiasDecision {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

impl BiasDecision {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Clamp the scores and package them with the verdict.
    pub fn report(
        &self,
        mean_difference_gender: f64,
        mean_difference_age: f64,
        predicted_decision: u8,
    ) -> BiasReport {
        let gender = clamp_nan(mean_difference_gender);
        let age = clamp_nan(mean_difference_age);
        BiasReport {
            mean_difference_gender: gender,
            mean_difference_age: age,
            predicted_decision,
            bias_detected: decide(gender, age, self.threshold),
        }
    }
}

/// Packaged evaluation result handed to the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub mean_difference_gender: f64,
    pub mean_difference_age: f64,
    pub predicted_decision: u8,
    pub bias_detected: bool,
}
