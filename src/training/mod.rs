//! Model training
//!
//! Bootstrap fit from a historical dataset, warm-start retraining on
//! verified outcomes, and evaluation metrics.

pub mod bootstrap;
pub mod incremental;
pub mod metrics;
pub mod outcomes;

pub use bootstrap::{train_initial, BootstrapReport};
pub use incremental::{IncrementalTrainer, TickOutcome, TrainerState};
pub use metrics::Metrics;
pub use outcomes::{resolve_pending, ResolveReport};
