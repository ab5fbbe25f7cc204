//! Warm-start retraining on verified outcomes
//!
//! The trainer walks `Idle -> BatchReady -> Retraining -> Persisted -> Idle`.
//! A batch is only retrained when exactly `batch_size` unconsumed rows are
//! available. The retrained classifier and the advanced cursor are stored as
//! one classifier artifact, so a failure anywhere leaves both untouched.

use std::fmt;
use std::marker::PhantomData;

use crate::data::database::OutcomeStore;
use crate::features::schema::{check_columns, column_names};
use crate::model::{ArtifactRegistry, ArtifactStore, Classifier, ClassifierArtifact};
use crate::{DotaError, Result, TrainingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Idle,
    /// Unconsumed rows fetched after `cursor`
    BatchReady { cursor: i64, rows: usize },
    Retraining { cursor: i64, rows: usize },
    Persisted { cursor: i64, version: u64 },
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerState::Idle => write!(f, "idle"),
            TrainerState::BatchReady { cursor, rows } => {
                write!(f, "batch ready ({} rows after {})", rows, cursor)
            }
            TrainerState::Retraining { cursor, rows } => {
                write!(f, "retraining ({} rows after {})", rows, cursor)
            }
            TrainerState::Persisted { cursor, version } => {
                write!(f, "persisted v{} (cursor {})", version, cursor)
            }
        }
    }
}

/// Result of one trainer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not enough verified rows yet
    Waiting { available: usize },
    Retrained { rows: usize, cursor: i64, version: u64 },
}

pub struct IncrementalTrainer<C: Classifier> {
    registry: ArtifactRegistry,
    batch_size: usize,
    epochs: usize,
    state: TrainerState,
    _classifier: PhantomData<C>,
}

impl<C: Classifier> IncrementalTrainer<C> {
    pub fn new(registry: ArtifactRegistry, batch_size: usize, epochs: usize) -> Self {
        IncrementalTrainer {
            registry,
            batch_size: batch_size.max(1),
            epochs,
            state: TrainerState::Idle,
            _classifier: PhantomData,
        }
    }

    pub fn from_config(registry: ArtifactRegistry, config: &TrainingConfig) -> Self {
        Self::new(registry, config.batch_size, config.warm_start_epochs)
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn transition(&mut self, next: TrainerState) {
        log::debug!("Trainer: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Check for a full batch of verified outcomes and retrain on it.
    ///
    /// Errors are logged and returned; the trainer is back in `Idle` either way.
    pub fn tick(&mut self, outcomes: &dyn OutcomeStore) -> Result<TickOutcome> {
        let registry = self.registry.clone();
        let result = registry.exclusive(|artifacts| self.run(artifacts, outcomes));
        if let Err(e) = &result {
            log::error!("Retrain aborted in state '{}': {}", self.state, e);
        }
        self.transition(TrainerState::Idle);
        result
    }

    fn run(
        &mut self,
        artifacts: &dyn ArtifactStore,
        outcomes: &dyn OutcomeStore,
    ) -> Result<TickOutcome> {
        let (_, current) = ClassifierArtifact::<C>::load_latest(artifacts)?.ok_or(DotaError::NoModel)?;
        let batch = outcomes.query_unconsumed(current.cursor, self.batch_size)?;
        self.transition(TrainerState::BatchReady {
            cursor: current.cursor,
            rows: batch.len(),
        });

        // Partial batches stay unconsumed
        if batch.len() != self.batch_size {
            log::info!(
                "{} of {} verified outcomes available, waiting",
                batch.len(),
                self.batch_size
            );
            return Ok(TickOutcome::Waiting {
                available: batch.len(),
            });
        }

        self.transition(TrainerState::Retraining {
            cursor: current.cursor,
            rows: batch.len(),
        });
        check_columns(&column_names(), current.classifier.columns())?;

        let x: Vec<Vec<f32>> = batch.iter().map(|r| r.features.to_vec()).collect();
        let y = batch
            .iter()
            .map(|r| {
                r.actual_result
                    .ok_or_else(|| DotaError::Model(format!("History row {} has no outcome", r.id)))
            })
            .collect::<Result<Vec<u8>>>()?;

        let mut classifier = current.classifier.clone();
        classifier.fit(&x, &y, self.epochs)?;

        let cursor = batch.last().map_or(current.cursor, |r| r.id);
        let next = ClassifierArtifact {
            classifier,
            scaler_version: current.scaler_version,
            cursor,
            trained_rows: current.trained_rows + batch.len(),
        };
        let version = next.save_next(artifacts)?;
        self.transition(TrainerState::Persisted { cursor, version });
        log::info!(
            "Retrained on {} outcomes: classifier v{}, cursor {}",
            batch.len(),
            version,
            cursor
        );

        Ok(TickOutcome::Retrained {
            rows: batch.len(),
            cursor,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::database::{Database, HistoryRecord};
    use crate::features::{FeatureTransformer, FeatureVector};
    use crate::model::{ArtifactKind, LogisticClassifier};
    use crate::training::bootstrap::{fixtures, train_initial};
    use crate::MatchId;

    fn bootstrapped() -> FeatureTransformer {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        let config = TrainingConfig {
            initial_epochs: 50,
            ..crate::Config::default().training
        };
        train_initial(
            &transformer,
            fixtures::separable_dataset(20),
            LogisticClassifier::new(column_names(), 0.5),
            &config,
        )
        .unwrap();
        transformer
    }

    /// Record `n` predictions and resolve the first `resolved` of them
    fn record(db: &Database, transformer: &FeatureTransformer, n: i64, resolved: i64) {
        let scaler = transformer.serving_handle().unwrap();
        for i in 1..=n {
            let edge = if i % 2 == 0 { 0.6 } else { -0.6 };
            let snapshot = scaler.apply(&fixtures::raw_vector(edge)).unwrap();
            db.insert_if_absent(MatchId(1000 + i), 1, &snapshot).unwrap();
            if i <= resolved {
                db.update_outcome(MatchId(1000 + i), u8::from(i % 2 == 0))
                    .unwrap();
            }
        }
    }

    fn latest(transformer: &FeatureTransformer) -> (u64, ClassifierArtifact<LogisticClassifier>) {
        transformer
            .registry()
            .read(|store| ClassifierArtifact::<LogisticClassifier>::load_latest(store))
            .unwrap()
            .unwrap()
    }

    fn trainer(transformer: &FeatureTransformer) -> IncrementalTrainer<LogisticClassifier> {
        IncrementalTrainer::new(transformer.registry().clone(), 5, 10)
    }

    #[test]
    fn test_partial_batch_waits() {
        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        record(&db, &transformer, 6, 4);

        let mut trainer = trainer(&transformer);
        assert_eq!(
            trainer.tick(&db).unwrap(),
            TickOutcome::Waiting { available: 4 }
        );
        assert_eq!(trainer.state(), TrainerState::Idle);

        let (version, artifact) = latest(&transformer);
        assert_eq!(version, 1);
        assert_eq!(artifact.cursor, 0);
    }

    #[test]
    fn test_full_batch_retrains_once() {
        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        record(&db, &transformer, 6, 5);
        let (_, before) = latest(&transformer);

        let mut trainer = trainer(&transformer);
        assert_eq!(
            trainer.tick(&db).unwrap(),
            TickOutcome::Retrained {
                rows: 5,
                cursor: 5,
                version: 2
            }
        );

        let (version, after) = latest(&transformer);
        assert_eq!(version, 2);
        assert_eq!(after.cursor, 5);
        assert_eq!(after.scaler_version, before.scaler_version);
        assert_eq!(after.trained_rows, before.trained_rows + 5);
        assert_ne!(after.classifier, before.classifier);

        // The consumed rows are not seen again
        assert_eq!(
            trainer.tick(&db).unwrap(),
            TickOutcome::Waiting { available: 0 }
        );
    }

    #[test]
    fn test_requires_trained_classifier() {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        let db = Database::in_memory().unwrap();
        let mut trainer = trainer(&transformer);
        assert!(matches!(trainer.tick(&db), Err(DotaError::NoModel)));
        assert_eq!(trainer.state(), TrainerState::Idle);
    }

    #[test]
    fn test_mismatched_classifier_leaves_artifacts_untouched() {
        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        record(&db, &transformer, 5, 5);

        // A classifier built for other columns becomes the latest
        transformer
            .registry()
            .exclusive(|store| {
                ClassifierArtifact {
                    classifier: LogisticClassifier::new(vec!["x".to_string()], 0.1),
                    scaler_version: 1,
                    cursor: 0,
                    trained_rows: 0,
                }
                .save_next(store)
            })
            .unwrap();

        let mut trainer = trainer(&transformer);
        assert!(matches!(
            trainer.tick(&db),
            Err(DotaError::FeatureMismatch { .. })
        ));
        assert_eq!(trainer.state(), TrainerState::Idle);

        let versions = transformer
            .registry()
            .read(|store| store.latest_version(ArtifactKind::Classifier))
            .unwrap();
        assert_eq!(versions, Some(2));
        assert_eq!(latest(&transformer).1.cursor, 0);
    }

    struct UnreachableStore;

    impl OutcomeStore for UnreachableStore {
        fn insert_if_absent(&self, match_id: MatchId, _: u8, _: &FeatureVector) -> Result<bool> {
            Err(DotaError::persistence(Some(match_id), "unreachable"))
        }

        fn update_outcome(&self, match_id: MatchId, _: u8) -> Result<bool> {
            Err(DotaError::persistence(Some(match_id), "unreachable"))
        }

        fn query_unconsumed(&self, _: i64, _: usize) -> Result<Vec<HistoryRecord>> {
            Err(DotaError::persistence(None, "unreachable"))
        }
    }

    #[test]
    fn test_store_failure_is_returned() {
        let transformer = bootstrapped();
        let mut trainer = trainer(&transformer);
        assert!(matches!(
            trainer.tick(&UnreachableStore),
            Err(DotaError::PersistenceFailure { .. })
        ));
        assert_eq!(latest(&transformer).0, 1);
    }
}
