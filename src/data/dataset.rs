//! Historical training set
//!
//! Rows hold unscaled aggregates keyed by column name, so a dataset file
//! stays readable and is checked against the schema on load.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::entities::Match;
use crate::features::{aggregate, FeatureVector};
use crate::{DotaError, MatchId, Result};

/// One labelled match, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub match_id: MatchId,
    pub radiant_win: bool,
    pub features: BTreeMap<String, f32>,
}

impl DatasetRow {
    /// None if the match has no outcome yet
    pub fn from_match(m: &Match) -> Option<Self> {
        Some(DatasetRow {
            match_id: m.id,
            radiant_win: m.radiant_win?,
            features: aggregate(m).to_named(),
        })
    }
}

/// Labelled training sample
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSample {
    pub match_id: MatchId,
    pub features: FeatureVector,
    pub label: u8,
}

impl TryFrom<&DatasetRow> for MatchSample {
    type Error = DotaError;

    fn try_from(row: &DatasetRow) -> Result<Self> {
        Ok(MatchSample {
            match_id: row.match_id,
            features: FeatureVector::from_named(&row.features)?,
            label: if row.radiant_win {
                crate::RADIANT_WIN
            } else {
                crate::DIRE_WIN
            },
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchDataset {
    samples: Vec<MatchSample>,
}

impl MatchDataset {
    pub fn from_samples(samples: Vec<MatchSample>) -> Self {
        MatchDataset { samples }
    }

    pub fn from_rows(rows: &[DatasetRow]) -> Result<Self> {
        let samples = rows
            .iter()
            .map(MatchSample::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(MatchDataset { samples })
    }

    /// Load a JSON-lines file; blank lines are skipped
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_rows(&read_rows(path)?)
    }

    /// Get the number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[MatchSample] {
        &self.samples
    }

    /// Split keeping order: the last `test_fraction` of rows is held out
    pub fn split(self, test_fraction: f64) -> (Self, Self) {
        let test_len = (self.samples.len() as f64 * test_fraction.clamp(0.0, 1.0)).round() as usize;
        let split_idx = self.samples.len() - test_len;
        let mut train = self.samples;
        let test = train.split_off(split_idx);
        (
            MatchDataset { samples: train },
            MatchDataset { samples: test },
        )
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.samples.iter().map(|s| s.features).collect()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

impl Dataset<MatchSample> for MatchDataset {
    fn get(&self, index: usize) -> Option<MatchSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

pub fn write_rows<P: AsRef<Path>>(path: P, rows: &[DatasetRow]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<DatasetRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line)
            .map_err(|e| DotaError::Parse(format!("Dataset line {}: {}", n + 1, e)))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::entities::fixtures;

    fn rows(n: i64) -> Vec<DatasetRow> {
        (0..n)
            .map(|i| {
                let m = fixtures::sample_match(i, [i as f64; 5], [1.0; 5]).with_outcome(Some(i % 2 == 0));
                DatasetRow::from_match(&m).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_unresolved_match_has_no_row() {
        let m = fixtures::sample_match(1, [1.0; 5], [1.0; 5]);
        assert!(DatasetRow::from_match(&m).is_none());
    }

    #[test]
    fn test_jsonl_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league.jsonl");
        let original = rows(4);
        write_rows(&path, &original).unwrap();

        assert_eq!(read_rows(&path).unwrap(), original);
        let dataset = MatchDataset::load(&path).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.get(2).unwrap().features.radiant.avg_kills, 2.0);
        assert_eq!(dataset.labels(), vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_split_holds_out_tail() {
        let dataset = MatchDataset::from_rows(&rows(10)).unwrap();
        let (train, test) = dataset.split(0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(test.samples()[0].match_id, MatchId(8));
    }

    #[test]
    fn test_foreign_columns_are_rejected() {
        let mut row = rows(1).remove(0);
        row.features.insert("radiant_team_id".to_string(), 3.0);
        assert!(matches!(
            MatchDataset::from_rows(&[row]),
            Err(DotaError::FeatureMismatch { .. })
        ));
    }
}
