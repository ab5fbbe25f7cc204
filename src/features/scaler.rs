//! Persisted min-max normalization

use serde::{Deserialize, Serialize};

use super::schema::{check_columns, column_names, FeatureVector};
use crate::{DotaError, Result};

/// Per-column bounds fit once from a reference batch.
///
/// Transform maps `min..max` onto `0..1`. A zero-range column is divided by
/// one. Values outside the fit range pass through unclipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub columns: Vec<String>,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl MinMaxScaler {
    pub fn fit(batch: &[FeatureVector]) -> Result<Self> {
        if batch.is_empty() {
            return Err(DotaError::Model(
                "Cannot fit scaler on an empty batch".to_string(),
            ));
        }

        let mut min = vec![f32::INFINITY; FeatureVector::DIM];
        let mut max = vec![f32::NEG_INFINITY; FeatureVector::DIM];
        for fv in batch {
            for (i, v) in fv.to_array().into_iter().enumerate() {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
            }
        }

        Ok(MinMaxScaler {
            columns: column_names(),
            min,
            max,
        })
    }

    /// Fails with `FeatureMismatch` if fit on a different schema
    pub fn ensure_schema(&self) -> Result<()> {
        check_columns(&column_names(), &self.columns)?;
        if self.min.len() != self.columns.len() || self.max.len() != self.columns.len() {
            return Err(DotaError::Parse(format!(
                "Scaler bounds have {}/{} entries for {} columns",
                self.min.len(),
                self.max.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    fn scale(&self, i: usize, v: f32) -> f32 {
        let range = self.max[i] - self.min[i];
        let range = if range == 0.0 { 1.0 } else { range };
        (v - self.min[i]) / range
    }

    pub fn transform(&self, fv: &FeatureVector) -> Result<FeatureVector> {
        self.ensure_schema()?;
        let mut out = fv.to_array();
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.scale(i, *v);
        }
        Ok(FeatureVector::from_array(&out))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let scaler: MinMaxScaler = serde_json::from_slice(bytes)?;
        scaler.ensure_schema()?;
        Ok(scaler)
    }
}
