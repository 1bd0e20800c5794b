//! Raw candidate record → [`FeatureRecord`] encoding.

use crate::data::dataset::ProtectedValues;
use crate::error::FairnessError;
use crate::features::scaler::StandardScaler;
use crate::features::schema::{
    CONTINUOUS_FIELDS, EDUCATION_LEVELS, EDUCATION_OFFSET, FEATURE_WIDTH, FeatureRecord,
    GENDER_INDEX, STRATEGY_INDEX,
};
use serde::{Deserialize, Serialize};

/// Code used for a gender outside the known table.
pub const UNKNOWN_GENDER: f64 = -1.0;
/// Code used for a recruitment strategy outside the known table.
pub const UNKNOWN_STRATEGY: f64 = 0.0;
/// Reference education level (no indicator column).
pub const BASELINE_EDUCATION: u8 = 1;

/// A categorical input that may arrive as a label or as an already-encoded code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoricalInput {
    Code(f64),
    Label(String),
}

impl From<&str> for CategoricalInput {
    fn from(s: &str) -> Self {
        Self::Label(s.to_string())
    }
}

impl From<f64> for CategoricalInput {
    fn from(v: f64) -> Self {
        Self::Code(v)
    }
}

/// A raw candidate or employee record, as received from a caller.
///
/// Field names follow the recruitment table columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRecord {
    pub age: Option<f64>,
    pub experience_years: Option<f64>,
    pub previous_companies: Option<f64>,
    pub distance_from_company: Option<f64>,
    pub interview_score: Option<f64>,
    pub skill_score: Option<f64>,
    pub personality_score: Option<f64>,
    pub gender: Option<CategoricalInput>,
    pub recruitment_strategy: Option<CategoricalInput>,
    pub education_level: Option<CategoricalInput>,
}

impl RawRecord {
    /// Continuous fields in schema order, failing on the first absent one.
    pub fn continuous(&self) -> Result<[f64; CONTINUOUS_FIELDS.len()], FairnessError> {
        let fields = [
            self.age,
            self.experience_years,
            self.previous_companies,
            self.distance_from_company,
            self.interview_score,
            self.skill_score,
            self.personality_score,
        ];
        let mut out = [0.0; CONTINUOUS_FIELDS.len()];
        for (i, (value, name)) in fields.iter().zip(CONTINUOUS_FIELDS).enumerate() {
            match value {
                Some(v) if v.is_finite() => out[i] = *v,
                Some(v) => {
                    return Err(FairnessError::schema(format!(
                        "field '{name}' must be finite, got {v}"
                    )));
                }
                None => return Err(FairnessError::missing_field(name)),
            }
        }
        Ok(out)
    }
}

/// Gender table: Male→1, Female→0, anything else →−1.
pub fn encode_gender(input: &CategoricalInput) -> f64 {
    match input {
        CategoricalInput::Label(label) => match label.trim() {
            "Male" => 1.0,
            "Female" => 0.0,
            _ => UNKNOWN_GENDER,
        },
        CategoricalInput::Code(code) if *code == 0.0 || *code == 1.0 => *code,
        CategoricalInput::Code(_) => UNKNOWN_GENDER,
    }
}

/// Strategy table: Standard→1, Internal→2, Recommendation→3, unknown→0.
pub fn encode_strategy(input: &CategoricalInput) -> f64 {
    match input {
        CategoricalInput::Label(label) => match label.trim() {
            "Standard" => 1.0,
            "Internal" => 2.0,
            "Recommendation" => 3.0,
            _ => UNKNOWN_STRATEGY,
        },
        CategoricalInput::Code(code) if [1.0, 2.0, 3.0].contains(code) => *code,
        CategoricalInput::Code(_) => UNKNOWN_STRATEGY,
    }
}

/// Education level code. Degree labels map onto the numeric levels; any
/// other label is the baseline level.
pub fn education_level(input: &CategoricalInput) -> Option<u8> {
    match input {
        CategoricalInput::Label(label) => Some(match label.trim() {
            "Bachelor's" => 2,
            "Master's" => 3,
            "PhD" => 4,
            _ => BASELINE_EDUCATION,
        }),
        CategoricalInput::Code(code) if code.fract() == 0.0 && (0.0..=255.0).contains(code) => {
            Some(*code as u8)
        }
        CategoricalInput::Code(_) => None,
    }
}

/// One-hot indicators for the non-reference levels. Unseen levels are all zero.
pub fn encode_education(input: &CategoricalInput) -> [f64; EDUCATION_LEVELS.len()] {
    let mut out = [0.0; EDUCATION_LEVELS.len()];
    if let Some(level) = education_level(input)
        && let Some(i) = EDUCATION_LEVELS.iter().position(|l| *l == level)
    {
        out[i] = 1.0;
    }
    out
}

/// An encoded record together with its derived protected attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRecord {
    pub features: FeatureRecord,
    pub protected: ProtectedValues,
}

/// Encodes raw records with a fixed scaler.
#[derive(Debug, Clone)]
pub struct FeatureEncoder<'a> {
    scaler: &'a StandardScaler,
    age_threshold: f64,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(scaler: &'a StandardScaler, age_threshold: f64) -> Self {
        Self {
            scaler,
            age_threshold,
        }
    }

    pub fn encode(&self, record: &RawRecord) -> Result<EncodedRecord, FairnessError> {
        let raw = record.continuous()?;
        let gender = record
            .gender
            .as_ref()
            .ok_or_else(|| FairnessError::missing_field("Gender"))?;
        let strategy = record
            .recruitment_strategy
            .as_ref()
            .ok_or_else(|| FairnessError::missing_field("RecruitmentStrategy"))?;
        let education = record
            .education_level
            .as_ref()
            .ok_or_else(|| FairnessError::missing_field("EducationLevel"))?;

        let gender_code = encode_gender(gender);
        let scaled = self.scaler.transform(&raw);

        let mut values = [0.0; FEATURE_WIDTH];
        values[..CONTINUOUS_FIELDS.len()].copy_from_slice(&scaled);
        values[GENDER_INDEX] = gender_code;
        values[STRATEGY_INDEX] = encode_strategy(strategy);
        values[EDUCATION_OFFSET..].copy_from_slice(&encode_education(education));

        // Age bracket comes from the raw age, before scaling.
        let protected = ProtectedValues {
            gender: u8::from(gender_code == 1.0),
            age_above_40: u8::from(raw[0] > self.age_threshold),
        };

        Ok(EncodedRecord {
            features: FeatureRecord::from_values(values),
            protected,
        })
    }
}
