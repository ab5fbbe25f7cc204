//! Classifier and artifact storage
//!
//! - `Classifier`: fit / predict / predict_proba capability
//! - `LogisticClassifier`: burn implementation of it
//! - `ArtifactRegistry`: versioned scaler and classifier blobs

pub mod classifier;
pub mod logistic;
pub mod store;

pub use classifier::{Classifier, ClassifierArtifact};
pub use logistic::LogisticClassifier;
pub use store::{ArtifactKind, ArtifactRegistry, ArtifactStore, FileArtifactStore, MemoryArtifactStore};
