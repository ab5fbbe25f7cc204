//! Match to scaled feature vector
//!
//! Cold start: with no scaler artifact, `scale_batch` fits one from the batch
//! and persists it as version 1. Serving: `transform` only ever loads and
//! applies the persisted scaler. An explicit refit over an existing scaler
//! fails with `ScalerStateConflict`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::aggregate::aggregate;
use super::scaler::MinMaxScaler;
use super::schema::FeatureVector;
use crate::data::entities::Match;
use crate::model::store::{ArtifactKind, ArtifactRegistry, ArtifactStore};
use crate::{DotaError, Result};

/// A loaded scaler and the version it was stored under
#[derive(Debug, Clone)]
pub struct ScalerHandle {
    pub version: u64,
    pub scaler: Arc<MinMaxScaler>,
}

impl ScalerHandle {
    pub fn apply(&self, raw: &FeatureVector) -> Result<FeatureVector> {
        self.scaler.transform(raw)
    }
}

/// Aggregate a match and scale it
pub fn transform(m: &Match, scaler: &ScalerHandle) -> Result<FeatureVector> {
    scaler.apply(&aggregate(m))
}

pub struct FeatureTransformer {
    registry: ArtifactRegistry,
    cache: Mutex<HashMap<u64, Arc<MinMaxScaler>>>,
}

impl FeatureTransformer {
    pub fn new(registry: ArtifactRegistry) -> Self {
        FeatureTransformer {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    pub fn aggregate(&self, m: &Match) -> FeatureVector {
        aggregate(m)
    }

    /// Load a scaler version from `store`, consulting the cache first
    pub(crate) fn load_from(&self, store: &dyn ArtifactStore, version: u64) -> Result<ScalerHandle> {
        if let Some(scaler) = self.cache.lock().get(&version) {
            return Ok(ScalerHandle {
                version,
                scaler: scaler.clone(),
            });
        }
        let scaler = Arc::new(MinMaxScaler::from_bytes(
            &store.load(ArtifactKind::Scaler, version)?,
        )?);
        self.cache.lock().insert(version, scaler.clone());
        log::debug!("Loaded scaler v{}", version);
        Ok(ScalerHandle { version, scaler })
    }

    pub fn handle(&self, version: u64) -> Result<ScalerHandle> {
        self.registry.read(|store| self.load_from(store, version))
    }

    /// Latest persisted scaler; `NoScaler` before the first fit
    pub fn serving_handle(&self) -> Result<ScalerHandle> {
        self.registry.read(|store| self.latest_in(store))
    }

    pub(crate) fn latest_in(&self, store: &dyn ArtifactStore) -> Result<ScalerHandle> {
        match store.latest_version(ArtifactKind::Scaler)? {
            Some(version) => self.load_from(store, version),
            None => Err(DotaError::NoScaler),
        }
    }

    fn persist(&self, store: &dyn ArtifactStore, scaler: MinMaxScaler) -> Result<ScalerHandle> {
        let version = 1;
        store.save(ArtifactKind::Scaler, version, &scaler.to_bytes()?)?;
        let scaler = Arc::new(scaler);
        self.cache.lock().insert(version, scaler.clone());
        log::info!("Fitted and persisted scaler v{}", version);
        Ok(ScalerHandle { version, scaler })
    }

    /// Explicit fit. Refuses to replace an existing scaler.
    pub fn fit_scaler(&self, batch: &[FeatureVector]) -> Result<ScalerHandle> {
        self.registry.exclusive(|store| {
            if let Some(version) = store.latest_version(ArtifactKind::Scaler)? {
                return Err(DotaError::ScalerStateConflict { version });
            }
            self.persist(store, MinMaxScaler::fit(batch)?)
        })
    }

    /// Scale unscaled vectors, fitting the scaler from them only if none exists yet
    pub fn scale_batch(&self, raw: &[FeatureVector]) -> Result<(ScalerHandle, Vec<FeatureVector>)> {
        self.registry.exclusive(|store| self.scale_batch_in(store, raw))
    }

    /// `scale_batch` for callers already inside the exclusive scope
    pub(crate) fn scale_batch_in(
        &self,
        store: &dyn ArtifactStore,
        raw: &[FeatureVector],
    ) -> Result<(ScalerHandle, Vec<FeatureVector>)> {
        let handle = match store.latest_version(ArtifactKind::Scaler)? {
            Some(version) => self.load_from(store, version)?,
            None => self.persist(store, MinMaxScaler::fit(raw)?)?,
        };
        let scaled = raw
            .iter()
            .map(|fv| handle.apply(fv))
            .collect::<Result<Vec<_>>>()?;
        Ok((handle, scaled))
    }

    pub fn transform_batch(&self, matches: &[Match]) -> Result<(ScalerHandle, Vec<FeatureVector>)> {
        let raw: Vec<FeatureVector> = matches.iter().map(aggregate).collect();
        self.scale_batch(&raw)
    }

    /// Serving path for one match
    pub fn transform(&self, m: &Match) -> Result<FeatureVector> {
        transform(m, &self.serving_handle()?)
    }
}
