//! Seeded, label-stratified train/test split.

use crate::data::dataset::LabeledDataset;
use crate::error::FairnessError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Train and test partitions of one dataset.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: LabeledDataset,
    pub test: LabeledDataset,
}

/// Split with per-label proportional sampling so both sides keep the base rate.
///
/// Each side keeps ascending row order.
pub fn stratified_split(
    dataset: &LabeledDataset,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit, FairnessError> {
    if !(0.0..1.0).contains(&test_size) {
        return Err(FairnessError::invalid_input(format!(
            "test_size must be in [0, 1), got {test_size}"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(dataset.len());
    let mut test = Vec::new();

    for label in [0u8, 1] {
        let mut rows: Vec<usize> = dataset
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == label)
            .map(|(i, _)| i)
            .collect();
        rows.shuffle(&mut rng);
        let n_test = (rows.len() as f64 * test_size).round() as usize;
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    tracing::debug!(train = train.len(), test = test.len(), seed, "Stratified split");

    Ok(TrainTestSplit {
        train: dataset.subset(&train)?,
        test: dataset.subset(&test)?,
    })
}
