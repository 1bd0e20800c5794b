//! Feature schema, encoding and scaling.

pub mod encoder;
pub mod scaler;
pub mod schema;

pub use encoder::{CategoricalInput, EncodedRecord, FeatureEncoder, RawRecord};
pub use scaler::StandardScaler;
pub use schema::{FEATURE_NAMES, FEATURE_WIDTH, FeatureRecord, SCHEMA_VERSION};
