//! Labeled datasets, table loading and splitting.

pub mod dataset;
pub mod source;
pub mod split;

pub use dataset::{GroupPartition, LabeledDataset, ProtectedAttribute, ProtectedValues};
pub use source::TrainingTable;
pub use split::{TrainTestSplit, stratified_split};
