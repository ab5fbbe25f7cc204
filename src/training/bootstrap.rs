//! Initial classifier fit from a historical dataset
//!
//! Runs as one exclusive artifact cycle: fit or load the scaler, train on the
//! head of the dataset, evaluate on the held-out tail, and store the result
//! as the next classifier version.

use super::metrics::Metrics;
use crate::data::dataset::MatchDataset;
use crate::features::schema::{check_columns, column_names};
use crate::features::FeatureTransformer;
use crate::model::{Classifier, ClassifierArtifact};
use crate::{DotaError, Result, TrainingConfig};

#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub version: u64,
    pub scaler_version: u64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_metrics: Metrics,
    pub test_metrics: Metrics,
}

/// Fit `classifier` on `dataset` and persist it
pub fn train_initial<C: Classifier>(
    transformer: &FeatureTransformer,
    dataset: MatchDataset,
    mut classifier: C,
    config: &TrainingConfig,
) -> Result<BootstrapReport> {
    if dataset.is_empty() {
        return Err(DotaError::Model("Dataset is empty".to_string()));
    }
    check_columns(&column_names(), classifier.columns())?;

    let (train, test) = dataset.split(config.test_fraction);
    if train.is_empty() {
        return Err(DotaError::Model(format!(
            "test_fraction {} leaves no training rows",
            config.test_fraction
        )));
    }
    log::info!("Bootstrap: {} train rows, {} test rows", train.len(), test.len());

    transformer.registry().exclusive(|store| {
        // The scaler is fit from training rows only
        let (scaler, train_x) = transformer.scale_batch_in(store, &train.features())?;
        let train_x: Vec<Vec<f32>> = train_x.iter().map(|fv| fv.to_vec()).collect();
        let test_x: Vec<Vec<f32>> = test
            .features()
            .iter()
            .map(|fv| scaler.apply(fv).map(|s| s.to_vec()))
            .collect::<Result<_>>()?;
        let train_y = train.labels();
        let test_y = test.labels();

        classifier.fit(&train_x, &train_y, config.initial_epochs)?;

        let train_metrics = Metrics::evaluate(&classifier.predict_proba(&train_x)?, &train_y);
        let test_metrics = Metrics::evaluate(&classifier.predict_proba(&test_x)?, &test_y);
        log::info!("Train: {}", train_metrics);
        if !test.is_empty() {
            log::info!("Test:  {}", test_metrics);
        }

        // A later bootstrap keeps the incremental cursor where it was
        let cursor = ClassifierArtifact::<C>::load_latest(store)?
            .map(|(_, prev)| prev.cursor)
            .unwrap_or(0);
        let artifact = ClassifierArtifact {
            classifier,
            scaler_version: scaler.version,
            cursor,
            trained_rows: train.len(),
        };
        let version = artifact.save_next(store)?;
        log::info!(
            "Saved classifier v{} (scaler v{}, cursor {})",
            version,
            scaler.version,
            cursor
        );

        Ok(BootstrapReport {
            version,
            scaler_version: scaler.version,
            train_rows: train.len(),
            test_rows: test.len(),
            train_metrics,
            test_metrics,
        })
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactKind, ArtifactRegistry, LogisticClassifier};

    fn config() -> TrainingConfig {
        TrainingConfig {
            learning_rate: 0.5,
            initial_epochs: 200,
            ..crate::Config::default().training
        }
    }

    fn classifier() -> LogisticClassifier {
        LogisticClassifier::new(column_names(), 0.5)
    }

    #[test]
    fn test_bootstrap_persists_scaler_and_classifier() {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        let report = train_initial(
            &transformer,
            fixtures::separable_dataset(40),
            classifier(),
            &config(),
        )
        .unwrap();

        assert_eq!(report.version, 1);
        assert_eq!(report.scaler_version, 1);
        assert_eq!(report.train_rows, 32);
        assert_eq!(report.test_rows, 8);
        assert!(report.test_metrics.accuracy() > 0.99);

        let (version, artifact) = transformer
            .registry()
            .read(|store| ClassifierArtifact::<LogisticClassifier>::load_latest(store))
            .unwrap()
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(artifact.cursor, 0);
        assert_eq!(artifact.scaler_version, 1);
    }

    #[test]
    fn test_second_bootstrap_reuses_scaler_and_cursor() {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        train_initial(&transformer, fixtures::separable_dataset(20), classifier(), &config())
            .unwrap();
        let report = train_initial(&transformer, fixtures::separable_dataset(30), classifier(), &config())
            .unwrap();

        assert_eq!(report.version, 2);
        assert_eq!(report.scaler_version, 1);
        let scalers = transformer
            .registry()
            .read(|store| store.latest_version(ArtifactKind::Scaler))
            .unwrap();
        assert_eq!(scalers, Some(1));
    }

    #[test]
    fn test_bootstrap_rejects_foreign_columns() {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        let foreign = LogisticClassifier::new(vec!["x".to_string()], 0.1);
        assert!(matches!(
            train_initial(&transformer, fixtures::separable_dataset(10), foreign, &config()),
            Err(DotaError::FeatureMismatch { .. })
        ));
        // Nothing persisted
        assert_eq!(
            transformer
                .registry()
                .read(|store| store.latest_version(ArtifactKind::Scaler))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        assert!(train_initial(
            &transformer,
            MatchDataset::default(),
            classifier(),
            &config()
        )
        .is_err());
    }
}
