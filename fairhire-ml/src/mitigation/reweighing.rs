//! Reweighing: instance weights that make the protected attribute and the
//! label statistically independent in the training data.

use crate::data::dataset::{LabeledDataset, ProtectedAttribute};
use crate::error::FairnessError;
use serde::{Deserialize, Serialize};

/// Weight applied to one (attribute value, label) cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellWeight {
    pub attribute_value: u8,
    pub label: u8,
    pub observed: usize,
    pub expected: f64,
    pub weight: f64,
}

/// Output of a reweighing pass.
#[derive(Debug, Clone)]
pub struct Reweighed {
    pub dataset: LabeledDataset,
    pub cells: [CellWeight; 4],
}

/// Reweighs on one protected attribute.
#[derive(Debug, Clone, Copy)]
pub struct Reweigher {
    pub attribute: ProtectedAttribute,
}

impl Reweigher {
    pub fn new(attribute: ProtectedAttribute) -> Self {
        Self { attribute }
    }

    /// Cell weights for `dataset`: expected count under independence over
    /// observed count. Empty cells keep weight 1.0.
    pub fn cell_weights(&self, dataset: &LabeledDataset) -> [CellWeight; 4] {
        let mut observed = [[0usize; 2]; 2];
        for (a, l) in dataset.protected_column(self.attribute).zip(dataset.labels()) {
            observed[usize::from(a.min(1))][usize::from(*l)] += 1;
        }
        let n = dataset.len() as f64;
        let attr_count = [observed[0][0] + observed[0][1], observed[1][0] + observed[1][1]];
        let label_count = [observed[0][0] + observed[1][0], observed[0][1] + observed[1][1]];

        let cell = |a: usize, l: usize| {
            let obs = observed[a][l];
            let expected = if n > 0.0 {
                attr_count[a] as f64 * label_count[l] as f64 / n
            } else {
                0.0
            };
            let weight = if obs == 0 { 1.0 } else { expected / obs as f64 };
            CellWeight {
                attribute_value: a as u8,
                label: l as u8,
                observed: obs,
                expected,
                weight,
            }
        };
        [cell(0, 0), cell(0, 1), cell(1, 0), cell(1, 1)]
    }

    /// New dataset with the same rows and labels and reweighed instance weights.
    pub fn fit_transform(&self, dataset: &LabeledDataset) -> Result<Reweighed, FairnessError> {
        let cells = self.cell_weights(dataset);
        let weights = dataset
            .protected_column(self.attribute)
            .zip(dataset.labels())
            .map(|(a, l)| cells[usize::from(a.min(1)) * 2 + usize::from(*l)].weight)
            .collect();

        for c in &cells {
            tracing::debug!(
                attribute = %self.attribute,
                value = c.attribute_value,
                label = c.label,
                observed = c.observed,
                weight = c.weight,
                "Reweighing cell"
            );
        }

        Ok(Reweighed {
            dataset: dataset.with_weights(weights)?,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::test_support::dataset_from;

    fn weighted_cell_count(ds: &LabeledDataset, attribute: ProtectedAttribute, a: u8, l: u8) -> f64 {
        ds.protected_column(attribute)
            .zip(ds.labels())
            .zip(ds.weights())
            .filter(|((av, lv), _)| *av == a && **lv == l)
            .map(|(_, w)| *w)
            .sum()
    }

    #[test]
    fn test_weighted_counts_match_independence() {
        let ds = dataset_from(&[
            (1, 0, 1),
            (1, 0, 1),
            (1, 0, 1),
            (1, 0, 0),
            (0, 0, 1),
            (0, 0, 0),
            (0, 0, 0),
            (0, 0, 0),
            (0, 0, 0),
        ]);
        let out = Reweigher::new(ProtectedAttribute::Gender).fit_transform(&ds).unwrap();
        for c in out.cells {
            let weighted = weighted_cell_count(
                &out.dataset,
                ProtectedAttribute::Gender,
                c.attribute_value,
                c.label,
            );
            assert!((weighted - c.expected).abs() < 1e-9, "cell {c:?}");
        }
        assert_eq!(out.dataset.labels(), ds.labels());
    }

    #[test]
    fn test_known_weights() {
        // n=4: gender=1 rows all hired, gender=0 rows: one hired, one not.
        let ds = dataset_from(&[(1, 0, 1), (1, 0, 1), (0, 0, 1), (0, 0, 0)]);
        let cells = Reweigher::new(ProtectedAttribute::Gender).cell_weights(&ds);
        // (g=1, y=1): expected 2*3/4 = 1.5, observed 2.
        assert!((cells[3].weight - 0.75).abs() < 1e-12);
        // (g=0, y=1): expected 2*3/4 = 1.5, observed 1.
        assert!((cells[1].weight - 1.5).abs() < 1e-12);
        // (g=1, y=0): empty cell keeps 1.0.
        assert_eq!(cells[2].observed, 0);
        assert_eq!(cells[2].weight, 1.0);
    }

    #[test]
    fn test_independent_data_keeps_unit_weights() {
        let ds = dataset_from(&[(1, 0, 1), (1, 0, 0), (0, 0, 1), (0, 0, 0)]);
        let out = Reweigher::new(ProtectedAttribute::Gender).fit_transform(&ds).unwrap();
        assert!(out.dataset.weights().iter().all(|w| (*w - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_age_attribute() {
        let ds = dataset_from(&[(0, 1, 0), (0, 1, 0), (0, 0, 1), (0, 0, 0)]);
        let out = Reweigher::new(ProtectedAttribute::AgeAbove40).fit_transform(&ds).unwrap();
        assert!(out.dataset.weights().iter().all(|w| w.is_finite() && *w > 0.0));
    }
}
