//! Model inference for predictions

use std::collections::BTreeMap;

use crate::data::entities::Match;
use crate::features::schema::{check_columns, column_names};
use crate::features::transform::transform;
use crate::features::{FeatureTransformer, FeatureVector, ScalerHandle};
use crate::model::{Classifier, ClassifierArtifact};
use crate::{DotaError, Prediction, Result};

/// Classifier paired with the scaler it was trained against
pub struct Predictor<C: Classifier> {
    classifier: C,
    scaler: ScalerHandle,
    version: u64,
}

impl<C: Classifier> Predictor<C> {
    pub fn new(classifier: C, scaler: ScalerHandle, version: u64) -> Self {
        Predictor {
            classifier,
            scaler,
            version,
        }
    }

    /// Load the latest classifier and its scaler in one read scope
    pub fn load(transformer: &FeatureTransformer) -> Result<Self> {
        transformer.registry().read(|store| {
            let (version, artifact) =
                ClassifierArtifact::<C>::load_latest(store)?.ok_or(DotaError::NoModel)?;
            let scaler = transformer.latest_in(store)?;
            if artifact.scaler_version != scaler.version {
                return Err(DotaError::Model(format!(
                    "Classifier v{} was trained against scaler v{}, but v{} is stored",
                    version, artifact.scaler_version, scaler.version
                )));
            }
            log::debug!("Loaded classifier v{} (scaler v{})", version, scaler.version);
            Ok(Predictor::new(artifact.classifier, scaler, version))
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn scaler(&self) -> &ScalerHandle {
        &self.scaler
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Predict from an already scaled feature vector
    pub fn predict_for(&self, features: &FeatureVector) -> Result<Prediction> {
        check_columns(self.classifier.columns(), &column_names())?;
        let probabilities = self
            .classifier
            .predict_proba(&[features.to_vec()])?
            .into_iter()
            .next()
            .ok_or_else(|| DotaError::Model("Classifier returned no probabilities".to_string()))?;
        Ok(Prediction::from_probabilities(probabilities))
    }

    /// Predict from a scaled column map; the key set must equal the trained columns
    pub fn predict_named(&self, features: &BTreeMap<String, f32>) -> Result<Prediction> {
        self.predict_for(&FeatureVector::from_named(features)?)
    }

    /// Scale a built match and predict it. Returns the scaled snapshot as well.
    pub fn predict_match(&self, m: &Match) -> Result<(FeatureVector, Prediction)> {
        let scaled = transform(m, &self.scaler)?;
        let prediction = self.predict_for(&scaled)?;
        Ok((scaled, prediction))
    }
}

/// Format a prediction for display
pub fn format_prediction(pred: &Prediction, radiant_name: &str, dire_name: &str) -> String {
    let (winner, win_prob) = if pred.label == crate::RADIANT_WIN {
        (radiant_name, pred.radiant_win_prob())
    } else {
        (dire_name, 1.0 - pred.radiant_win_prob())
    };

    format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {} (Radiant) vs {} (Dire)
├─────────────────────────────────────────────────┤
│  Predicted winner: {} {:.1}%
│  Confidence:       {}
└─────────────────────────────────────────────────┘
"#,
        radiant_name,
        dire_name,
        winner,
        win_prob * 100.0,
        pred.confidence()
    )
}
