//! Classifier capability and its persisted form

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::store::{ArtifactKind, ArtifactStore};
use crate::{Result, DIRE_WIN, RADIANT_WIN};

/// Binary outcome classifier over named feature columns
pub trait Classifier: Clone + Serialize + DeserializeOwned {
    /// Columns the classifier was built for, in input order
    fn columns(&self) -> &[String];

    /// Continue training from the current parameters
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8], epochs: usize) -> Result<()>;

    /// `[P(class 0), P(class 1)]` per row
    fn predict_proba(&self, x: &[Vec<f32>]) -> Result<Vec<[f32; 2]>>;

    fn predict(&self, x: &[Vec<f32>]) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| if p[1] > 0.5 { RADIANT_WIN } else { DIRE_WIN })
            .collect())
    }
}

/// Classifier blob plus the training state persisted with it.
///
/// Saving one of these is how a retrain commits: parameters and cursor move
/// together or not at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: Classifier")]
pub struct ClassifierArtifact<C: Classifier> {
    pub classifier: C,
    /// Scaler version the classifier was trained against
    pub scaler_version: u64,
    /// Last history row id consumed
    pub cursor: i64,
    pub trained_rows: usize,
}

impl<C: Classifier> ClassifierArtifact<C> {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Latest stored classifier with its version
    pub fn load_latest(store: &dyn ArtifactStore) -> Result<Option<(u64, Self)>> {
        match store.load_latest(ArtifactKind::Classifier)? {
            Some((version, bytes)) => Ok(Some((version, Self::decode(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Store as the next version; returns that version
    pub fn save_next(&self, store: &dyn ArtifactStore) -> Result<u64> {
        let version = store
            .latest_version(ArtifactKind::Classifier)?
            .map_or(1, |v| v + 1);
        store.save(ArtifactKind::Classifier, version, &self.encode()?)?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::store::MemoryArtifactStore;
    use crate::model::LogisticClassifier;

    #[test]
    fn test_artifact_versions_increment() {
        let store = MemoryArtifactStore::new();
        assert!(ClassifierArtifact::<LogisticClassifier>::load_latest(&store)
            .unwrap()
            .is_none());

        let mut artifact = ClassifierArtifact {
            classifier: LogisticClassifier::new(vec!["x".to_string()], 0.1),
            scaler_version: 1,
            cursor: 0,
            trained_rows: 10,
        };
        assert_eq!(artifact.save_next(&store).unwrap(), 1);
        artifact.cursor = 5;
        assert_eq!(artifact.save_next(&store).unwrap(), 2);

        let (version, latest) = ClassifierArtifact::<LogisticClassifier>::load_latest(&store)
            .unwrap()
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(latest.cursor, 5);
        assert_eq!(latest.classifier, artifact.classifier);
    }
}
