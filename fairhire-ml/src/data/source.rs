//! Recruitment table loading.
//!
//! The table is validated against the feature schema on read: every schema
//! column must be present in the header, categorical cells and the label must
//! be filled, and blank continuous cells are imputed with the column median.

use crate::data::dataset::LabeledDataset;
use crate::error::FairnessError;
use crate::features::encoder::{CategoricalInput, FeatureEncoder, RawRecord};
use crate::features::scaler::StandardScaler;
use crate::features::schema::{CONTINUOUS_FIELDS, LABEL_FIELD};
use std::io::Read;
use std::path::Path;

const CATEGORICAL_FIELDS: [&str; 3] = ["Gender", "RecruitmentStrategy", "EducationLevel"];

/// Raw training rows with their hiring decisions.
#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    pub records: Vec<RawRecord>,
    pub labels: Vec<u8>,
    /// Number of continuous cells filled by median imputation.
    pub imputed_cells: usize,
}

impl TrainingTable {
    pub fn from_path(path: &Path) -> Result<Self, FairnessError> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = table.len(),
            imputed = table.imputed_cells,
            "Loaded recruitment table"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FairnessError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let column = |name: &str| -> Result<usize, FairnessError> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| FairnessError::schema(format!("column '{name}' is missing")))
        };

        let continuous_idx = CONTINUOUS_FIELDS
            .iter()
            .map(|f| column(f))
            .collect::<Result<Vec<_>, _>>()?;
        let categorical_idx = CATEGORICAL_FIELDS
            .iter()
            .map(|f| column(f))
            .collect::<Result<Vec<_>, _>>()?;
        let label_idx = column(LABEL_FIELD)?;

        let mut continuous: Vec<[Option<f64>; CONTINUOUS_FIELDS.len()]> = Vec::new();
        let mut categorical: Vec<[CategoricalInput; 3]> = Vec::new();
        let mut labels = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            let mut values = [None; CONTINUOUS_FIELDS.len()];
            for (slot, (idx, name)) in values.iter_mut().zip(continuous_idx.iter().zip(CONTINUOUS_FIELDS)) {
                let text = cell(*idx);
                if text.is_empty() {
                    continue;
                }
                let v: f64 = text.parse().map_err(|_| {
                    FairnessError::schema(format!("row {row}: '{name}' is not numeric: {text}"))
                })?;
                *slot = Some(v);
            }

            let mut cats = Vec::with_capacity(3);
            for (idx, name) in categorical_idx.iter().zip(CATEGORICAL_FIELDS) {
                let text = cell(*idx);
                if text.is_empty() {
                    return Err(FairnessError::schema(format!("row {row}: '{name}' is empty")));
                }
                cats.push(match text.parse::<f64>() {
                    Ok(code) => CategoricalInput::Code(code),
                    Err(_) => CategoricalInput::Label(text.to_string()),
                });
            }

            let label = match cell(label_idx) {
                "0" | "0.0" => 0,
                "1" | "1.0" => 1,
                other => {
                    return Err(FairnessError::schema(format!(
                        "row {row}: '{LABEL_FIELD}' must be 0 or 1, got '{other}'"
                    )));
                }
            };

            continuous.push(values);
            let [gender, strategy, education]: [CategoricalInput; 3] = cats
                .try_into()
                .map_err(|_| FairnessError::schema("categorical column count"))?;
            categorical.push([gender, strategy, education]);
            labels.push(label);
        }

        let medians = column_medians(&continuous);
        let mut imputed_cells = 0;
        let records = continuous
            .into_iter()
            .zip(categorical)
            .map(|(values, [gender, strategy, education])| {
                let mut filled = [0.0; CONTINUOUS_FIELDS.len()];
                for i in 0..filled.len() {
                    filled[i] = match values[i] {
                        Some(v) => v,
                        None => {
                            imputed_cells += 1;
                            medians[i]
                        }
                    };
                }
                RawRecord {
                    age: Some(filled[0]),
                    experience_years: Some(filled[1]),
                    previous_companies: Some(filled[2]),
                    distance_from_company: Some(filled[3]),
                    interview_score: Some(filled[4]),
                    skill_score: Some(filled[5]),
                    personality_score: Some(filled[6]),
                    gender: Some(gender),
                    recruitment_strategy: Some(strategy),
                    education_level: Some(education),
                }
            })
            .collect();

        if imputed_cells > 0 {
            tracing::info!(imputed_cells, "Imputed blank continuous cells with column medians");
        }

        Ok(Self {
            records,
            labels,
            imputed_cells,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fit scaler parameters on this table's continuous fields.
    pub fn fit_scaler(&self) -> Result<StandardScaler, FairnessError> {
        let rows = self
            .records
            .iter()
            .map(RawRecord::continuous)
            .collect::<Result<Vec<_>, _>>()?;
        StandardScaler::fit(&rows)
    }

    /// Encode every row with the given scaler.
    pub fn encode(
        &self,
        scaler: &StandardScaler,
        age_threshold: f64,
    ) -> Result<LabeledDataset, FairnessError> {
        let encoder = FeatureEncoder::new(scaler, age_threshold);
        let encoded = self
            .records
            .iter()
            .map(|r| encoder.encode(r))
            .collect::<Result<Vec<_>, _>>()?;
        LabeledDataset::from_encoded(encoded, self.labels.clone())
    }
}

/// Median of each column over the present values. All-blank columns yield 0.0.
fn column_medians<const W: usize>(rows: &[[Option<f64>; W]]) -> [f64; W] {
    let mut out = [0.0; W];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut present: Vec<f64> = rows.iter().filter_map(|r| r[i]).collect();
        if present.is_empty() {
            continue;
        }
        present.sort_by(|a, b| a.total_cmp(b));
        let mid = present.len() / 2;
        *slot = if present.len() % 2 == 0 {
            (present[mid - 1] + present[mid]) / 2.0
        } else {
            present[mid]
        };
    }
    out
}
