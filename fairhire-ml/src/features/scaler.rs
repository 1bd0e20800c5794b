//! Standardization of the continuous feature fields.

use crate::error::FairnessError;
use crate::features::schema::CONTINUOUS_FIELDS;
use serde::{Deserialize, Serialize};

const WIDTH: usize = CONTINUOUS_FIELDS.len();

/// Per-field (mean, standard deviation) parameters.
///
/// Fit once on the training table and reused verbatim at inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; WIDTH],
    pub scale: [f64; WIDTH],
}

impl StandardScaler {
    /// Identity parameters: mean 0, scale 1.
    pub fn identity() -> Self {
        Self {
            mean: [0.0; WIDTH],
            scale: [1.0; WIDTH],
        }
    }

    /// Fit population mean and standard deviation per field.
    ///
    /// Zero-variance fields get scale 1.0 so transforms stay finite.
    pub fn fit(rows: &[[f64; WIDTH]]) -> Result<Self, FairnessError> {
        if rows.is_empty() {
            return Err(FairnessError::dataset("cannot fit scaler on an empty table"));
        }
        let n = rows.len() as f64;
        let mut mean = [0.0; WIDTH];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut scale = [0.0; WIDTH];
        for row in rows {
            for i in 0..WIDTH {
                let d = row[i] - mean[i];
                scale[i] += d * d;
            }
        }
        for s in &mut scale {
            *s = (*s / n).sqrt();
            if !s.is_finite() || *s == 0.0 {
                *s = 1.0;
            }
        }

        if mean.iter().any(|m| !m.is_finite()) {
            return Err(FairnessError::dataset(
                "scaler fit produced a non-finite mean",
            ));
        }

        tracing::debug!(rows = rows.len(), "Fitted standard scaler");
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, raw: &[f64; WIDTH]) -> [f64; WIDTH] {
        let mut out = [0.0; WIDTH];
        for i in 0..WIDTH {
            out[i] = (raw[i] - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn inverse_transform(&self, scaled: &[f64; WIDTH]) -> [f64; WIDTH] {
        let mut out = [0.0; WIDTH];
        for i in 0..WIDTH {
            out[i] = scaled[i] * self.scale[i] + self.mean[i];
        }
        out
    }
}
