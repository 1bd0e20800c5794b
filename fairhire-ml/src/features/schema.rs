//! Published feature schema.
//!
//! Field order here is the column order of every [`FeatureRecord`] and of the
//! classifier's input layer. Changing it requires bumping [`SCHEMA_VERSION`].

use serde::{Deserialize, Serialize};

/// Version of the feature layout. Persisted artifacts record it.
pub const SCHEMA_VERSION: u32 = 1;

/// Continuous fields, standardized before use.
pub const CONTINUOUS_FIELDS: [&str; 7] = [
    "Age",
    "ExperienceYears",
    "PreviousCompanies",
    "DistanceFromCompany",
    "InterviewScore",
    "SkillScore",
    "PersonalityScore",
];

/// Education levels with an indicator column. Level 1 is the dropped reference.
pub const EDUCATION_LEVELS: [u8; 3] = [2, 3, 4];

/// Full feature layout.
pub const FEATURE_NAMES: [&str; FEATURE_WIDTH] = [
    "Age",
    "ExperienceYears",
    "PreviousCompanies",
    "DistanceFromCompany",
    "InterviewScore",
    "SkillScore",
    "PersonalityScore",
    "Gender",
    "RecruitmentStrategy",
    "EducationLevel_2",
    "EducationLevel_3",
    "EducationLevel_4",
];

pub const FEATURE_WIDTH: usize = 12;
pub const GENDER_INDEX: usize = 7;
pub const STRATEGY_INDEX: usize = 8;
pub const EDUCATION_OFFSET: usize = 9;

/// Column holding the binary hiring decision in training tables.
pub const LABEL_FIELD: &str = "HiringDecision";

/// A fixed-order numeric feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    values: [f64; FEATURE_WIDTH],
}

impl FeatureRecord {
    pub fn from_values(values: [f64; FEATURE_WIDTH]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64; FEATURE_WIDTH] {
        &self.values
    }

    pub fn continuous(&self) -> &[f64] {
        &self.values[..CONTINUOUS_FIELDS.len()]
    }

    pub fn gender_code(&self) -> f64 {
        self.values[GENDER_INDEX]
    }

    pub fn strategy_code(&self) -> f64 {
        self.values[STRATEGY_INDEX]
    }

    pub fn education_indicators(&self) -> &[f64] {
        &self.values[EDUCATION_OFFSET..]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_consistent() {
        assert_eq!(&FEATURE_NAMES[..CONTINUOUS_FIELDS.len()], &CONTINUOUS_FIELDS);
        assert_eq!(FEATURE_NAMES[GENDER_INDEX], "Gender");
        assert_eq!(FEATURE_NAMES[STRATEGY_INDEX], "RecruitmentStrategy");
        assert_eq!(
            FEATURE_WIDTH - EDUCATION_OFFSET,
            EDUCATION_LEVELS.len(),
            "one indicator per non-reference education level"
        );
    }

    #[test]
    fn test_get_by_name() {
        let mut values = [0.0; FEATURE_WIDTH];
        values[STRATEGY_INDEX] = 3.0;
        let record = FeatureRecord::from_values(values);
        assert_eq!(record.get("RecruitmentStrategy"), Some(3.0));
        assert_eq!(record.get("Salary"), None);
    }
}
