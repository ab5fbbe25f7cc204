//! Fixed feature schema
//!
//! Column names and order are defined here once. Nothing downstream infers
//! them from map or payload key order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DotaError, Result, Side};

/// Per-team aggregate features, in column order
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamFeatures {
    pub avg_hero_winrate: f32,
    pub avg_kills: f32,
    pub avg_deaths: f32,
    pub avg_assists: f32,
    pub avg_gpm: f32,
    pub avg_xpm: f32,
    pub avg_net_worth: f32,
    pub avg_player_level: f32,
    pub avg_hero_damage: f32,
    pub avg_roshans_killed: f32,
    pub avg_last_hits: f32,
    pub avg_denies: f32,
    pub sum_obs: f32,
    pub sum_sen: f32,
    pub avg_teamfight_participation: f32,
    pub kda: f32,
}

impl TeamFeatures {
    pub const DIM: usize = 16;

    pub const FIELDS: [&'static str; Self::DIM] = [
        "avg_hero_winrate",
        "avg_kills",
        "avg_deaths",
        "avg_assists",
        "avg_gpm",
        "avg_xpm",
        "avg_net_worth",
        "avg_player_level",
        "avg_hero_damage",
        "avg_roshans_killed",
        "avg_last_hits",
        "avg_denies",
        "sum_obs",
        "sum_sen",
        "avg_teamfight_participation",
        "kda",
    ];

    pub fn to_array(&self) -> [f32; Self::DIM] {
        [
            self.avg_hero_winrate,
            self.avg_kills,
            self.avg_deaths,
            self.avg_assists,
            self.avg_gpm,
            self.avg_xpm,
            self.avg_net_worth,
            self.avg_player_level,
            self.avg_hero_damage,
            self.avg_roshans_killed,
            self.avg_last_hits,
            self.avg_denies,
            self.sum_obs,
            self.sum_sen,
            self.avg_teamfight_participation,
            self.kda,
        ]
    }

    pub fn from_array(v: &[f32; Self::DIM]) -> Self {
        TeamFeatures {
            avg_hero_winrate: v[0],
            avg_kills: v[1],
            avg_deaths: v[2],
            avg_assists: v[3],
            avg_gpm: v[4],
            avg_xpm: v[5],
            avg_net_worth: v[6],
            avg_player_level: v[7],
            avg_hero_damage: v[8],
            avg_roshans_killed: v[9],
            avg_last_hits: v[10],
            avg_denies: v[11],
            sum_obs: v[12],
            sum_sen: v[13],
            avg_teamfight_participation: v[14],
            kda: v[15],
        }
    }
}

/// Column names: every radiant field, then every dire field
pub const COLUMNS: [&str; FeatureVector::DIM] = [
    "radiant_avg_hero_winrate",
    "radiant_avg_kills",
    "radiant_avg_deaths",
    "radiant_avg_assists",
    "radiant_avg_gpm",
    "radiant_avg_xpm",
    "radiant_avg_net_worth",
    "radiant_avg_player_level",
    "radiant_avg_hero_damage",
    "radiant_avg_roshans_killed",
    "radiant_avg_last_hits",
    "radiant_avg_denies",
    "radiant_sum_obs",
    "radiant_sum_sen",
    "radiant_avg_teamfight_participation",
    "radiant_kda",
    "dire_avg_hero_winrate",
    "dire_avg_kills",
    "dire_avg_deaths",
    "dire_avg_assists",
    "dire_avg_gpm",
    "dire_avg_xpm",
    "dire_avg_net_worth",
    "dire_avg_player_level",
    "dire_avg_hero_damage",
    "dire_avg_roshans_killed",
    "dire_avg_last_hits",
    "dire_avg_denies",
    "dire_sum_obs",
    "dire_sum_sen",
    "dire_avg_teamfight_participation",
    "dire_kda",
];

/// Owned copy of the column list, as stored in artifacts
pub fn column_names() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Ordered comparison of a column list against the expected one
pub fn check_columns(expected: &[String], actual: &[String]) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(DotaError::FeatureMismatch {
        missing: expected
            .iter()
            .filter(|c| !actual.contains(*c))
            .cloned()
            .collect(),
        unexpected: actual
            .iter()
            .filter(|c| !expected.contains(*c))
            .cloned()
            .collect(),
    })
}

/// Feature vector of one match
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureVector {
    pub radiant: TeamFeatures,
    pub dire: TeamFeatures,
}

impl FeatureVector {
    pub const DIM: usize = 2 * TeamFeatures::DIM;

    pub fn team(&self, side: Side) -> &TeamFeatures {
        match side {
            Side::Radiant => &self.radiant,
            Side::Dire => &self.dire,
        }
    }

    pub fn to_array(&self) -> [f32; Self::DIM] {
        let mut out = [0.0; Self::DIM];
        out[..TeamFeatures::DIM].copy_from_slice(&self.radiant.to_array());
        out[TeamFeatures::DIM..].copy_from_slice(&self.dire.to_array());
        out
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.to_array().to_vec()
    }

    pub fn from_array(v: &[f32; Self::DIM]) -> Self {
        let mut radiant = [0.0; TeamFeatures::DIM];
        let mut dire = [0.0; TeamFeatures::DIM];
        radiant.copy_from_slice(&v[..TeamFeatures::DIM]);
        dire.copy_from_slice(&v[TeamFeatures::DIM..]);
        FeatureVector {
            radiant: TeamFeatures::from_array(&radiant),
            dire: TeamFeatures::from_array(&dire),
        }
    }

    pub fn from_slice(v: &[f32]) -> Result<Self> {
        let arr: [f32; Self::DIM] = v.try_into().map_err(|_| {
            DotaError::Parse(format!(
                "Expected {} feature values, got {}",
                Self::DIM,
                v.len()
            ))
        })?;
        Ok(Self::from_array(&arr))
    }

    /// Column-to-value map, used for snapshots
    pub fn to_named(&self) -> BTreeMap<String, f32> {
        COLUMNS
            .iter()
            .zip(self.to_array())
            .map(|(c, v)| (c.to_string(), v))
            .collect()
    }

    /// Rebuild from a column map. The key set must equal the schema exactly.
    pub fn from_named(named: &BTreeMap<String, f32>) -> Result<Self> {
        let missing: Vec<String> = COLUMNS
            .iter()
            .filter(|c| !named.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        let unexpected: Vec<String> = named
            .keys()
            .filter(|k| !COLUMNS.contains(&k.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(DotaError::FeatureMismatch {
                missing,
                unexpected,
            });
        }

        let mut values = [0.0; Self::DIM];
        for (slot, column) in values.iter_mut().zip(COLUMNS) {
            *slot = named[column];
        }
        Ok(Self::from_array(&values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureVector {
        let values: Vec<f32> = (0..FeatureVector::DIM).map(|i| i as f32 * 1.5).collect();
        FeatureVector::from_slice(&values).unwrap()
    }

    #[test]
    fn test_columns_follow_field_order() {
        for (i, field) in TeamFeatures::FIELDS.iter().enumerate() {
            assert_eq!(COLUMNS[i], format!("radiant_{}", field));
            assert_eq!(COLUMNS[i + TeamFeatures::DIM], format!("dire_{}", field));
        }
    }

    #[test]
    fn test_array_layout() {
        let fv = sample();
        assert_eq!(fv.radiant.avg_hero_winrate, 0.0);
        assert_eq!(fv.radiant.kda, 22.5);
        assert_eq!(fv.dire.avg_hero_winrate, 24.0);
        assert_eq!(fv.to_vec().len(), 32);
    }

    #[test]
    fn test_named_order_independent_of_insertion() {
        let fv = sample();
        let mut reversed = BTreeMap::new();
        for (k, v) in fv.to_named().into_iter().rev() {
            reversed.insert(k, v);
        }
        assert_eq!(FeatureVector::from_named(&reversed).unwrap(), fv);
    }

    #[test]
    fn test_from_named_reports_mismatch() {
        let mut named = sample().to_named();
        named.remove("dire_kda");
        named.insert("radiant_hero_id".to_string(), 12.0);

        match FeatureVector::from_named(&named) {
            Err(DotaError::FeatureMismatch {
                missing,
                unexpected,
            }) => {
                assert_eq!(missing, vec!["dire_kda".to_string()]);
                assert_eq!(unexpected, vec!["radiant_hero_id".to_string()]);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_check_columns_rejects_reorder() {
        let expected = column_names();
        let mut swapped = expected.clone();
        swapped.swap(0, 1);
        assert!(check_columns(&expected, &expected).is_ok());
        assert!(matches!(
            check_columns(&expected, &swapped),
            Err(DotaError::FeatureMismatch { .. })
        ));
    }
}
