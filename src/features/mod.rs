//! Feature extraction
//!
//! Team aggregation, the fixed column schema, and persisted normalization.

pub mod aggregate;
pub mod scaler;
pub mod schema;
pub mod transform;

pub use aggregate::aggregate;
pub use scaler::MinMaxScaler;
pub use schema::{FeatureVector, TeamFeatures, COLUMNS};
pub use transform::{FeatureTransformer, ScalerHandle};
