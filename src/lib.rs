//! Dota 2 pro match outcome prediction
//!
//! Turns raw match telemetry into a fixed-schema feature vector, predicts the
//! winner with a persisted classifier, and keeps that classifier current as
//! verified outcomes arrive.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::data::builder::StatsMode;

/// Unique identifier for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub i64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hero identifier. Zero means the pick has not been made yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeroId(pub i64);

impl HeroId {
    pub fn is_picked(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for HeroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hero({})", self.0)
    }
}

/// Player account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self.0)
    }
}

/// The two opposing sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Radiant,
    Dire,
}

impl Side {
    pub fn opponent(&self) -> Side {
        match self {
            Side::Radiant => Side::Dire,
            Side::Dire => Side::Radiant,
        }
    }

    /// Column prefix used by the feature schema
    pub fn prefix(&self) -> &'static str {
        match self {
            Side::Radiant => "radiant",
            Side::Dire => "dire",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Radiant => write!(f, "Radiant"),
            Side::Dire => write!(f, "Dire"),
        }
    }
}

/// Class label for a radiant victory
pub const RADIANT_WIN: u8 = 1;
/// Class label for a dire victory
pub const DIRE_WIN: u8 = 0;

/// Model prediction output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class (1 = radiant wins)
    pub label: u8,
    /// [P(dire wins), P(radiant wins)]
    pub probabilities: [f32; 2],
}

impl Prediction {
    /// Label is radiant only when its probability is strictly above one half
    pub fn from_probabilities(probabilities: [f32; 2]) -> Self {
        Prediction {
            label: if probabilities[1] > 0.5 { RADIANT_WIN } else { DIRE_WIN },
            probabilities,
        }
    }

    pub fn radiant_win_prob(&self) -> f32 {
        self.probabilities[1]
    }

    pub fn predicted_winner(&self) -> Side {
        if self.label == RADIANT_WIN {
            Side::Radiant
        } else {
            Side::Dire
        }
    }

    pub fn confidence(&self) -> ConfidenceLevel {
        let margin = (self.probabilities[1] - 0.5).abs();
        if margin >= 0.25 {
            ConfidenceLevel::High
        } else if margin >= 0.1 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Confidence level from the distance between the winning probability and a coin flip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::High => write!(f, "High"),
            ConfidenceLevel::Medium => write!(f, "Medium"),
            ConfidenceLevel::Low => write!(f, "Low"),
        }
    }
}

fn match_suffix(match_id: &Option<MatchId>) -> String {
    match match_id {
        Some(id) => format!(" for match {}", id),
        None => String::new(),
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum DotaError {
    #[error("Fetch of {resource} exhausted after {attempts} attempts")]
    FetchExhausted { resource: String, attempts: u32 },

    #[error("Blocking fetch of {resource} cancelled after {attempts} attempts")]
    FetchBlocking { resource: String, attempts: u32 },

    #[error("Match {match_id} has invalid roster size: radiant {radiant}, dire {dire} (need 5 each)")]
    InvalidRosterSize {
        match_id: MatchId,
        radiant: usize,
        dire: usize,
    },

    #[error("Match {match_id} has an unresolved hero pick")]
    UnresolvedPick { match_id: MatchId },

    #[error("No usable samples for player {account} on hero {hero}")]
    NoSamples { account: AccountId, hero: HeroId },

    #[error("Feature columns do not match trained columns: missing {missing:?}, unexpected {unexpected:?}")]
    FeatureMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Scaler version {version} already exists; refusing to refit")]
    ScalerStateConflict { version: u64 },

    #[error("Persistence failure{}: {message}", match_suffix(.match_id))]
    PersistenceFailure {
        match_id: Option<MatchId>,
        message: String,
    },

    #[error("Artifact {kind} version {version} already exists")]
    ArtifactConflict { kind: String, version: u64 },

    #[error("Upstream returned HTTP {status} for {resource}")]
    Upstream { status: u16, resource: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model not trained - run `dotaml train` first")]
    NoModel,

    #[error("No scaler fitted - run `dotaml train` first")]
    NoScaler,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DotaError {
    /// Wrap a storage error with the match it concerned
    pub fn persistence(match_id: Option<MatchId>, err: impl fmt::Display) -> Self {
        DotaError::PersistenceFailure {
            match_id,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DotaError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fetch: FetchConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub opendota_url: String,
    pub steam_url: String,
    pub opendota_key: Option<String>,
    pub steam_api_key: Option<String>,
    pub timeout_secs: u64,
    /// Attempts per historical sample before it is dropped
    pub bounded_attempts: u32,
    pub retry_delay_ms: u64,
    pub blocking_delay_ms: u64,
    /// Recent matches averaged per player
    pub recent_matches: usize,
    pub stats_mode: StatsMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Verified outcomes required before an incremental retrain
    pub batch_size: usize,
    pub learning_rate: f64,
    pub warm_start_epochs: usize,
    pub initial_epochs: usize,
    /// Fraction of the bootstrap dataset held out for evaluation
    pub test_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub artifacts_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fetch: FetchConfig {
                opendota_url: "https://api.opendota.com/api".to_string(),
                steam_url: "https://api.steampowered.com".to_string(),
                opendota_key: None,
                steam_api_key: None,
                timeout_secs: 30,
                bounded_attempts: 5,
                retry_delay_ms: 2000,
                blocking_delay_ms: 2000,
                recent_matches: 10,
                stats_mode: StatsMode::RecentAverage,
            },
            training: TrainingConfig {
                batch_size: 5,
                learning_rate: 0.1,
                warm_start_epochs: 50,
                initial_epochs: 500,
                test_fraction: 0.2,
            },
            data: DataConfig {
                database_path: "data/history.db".to_string(),
                artifacts_dir: "model".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DotaError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| DotaError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DotaError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// API keys from the environment take precedence over the file
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENDOTA_KEY") {
            self.fetch.opendota_key = Some(key);
        }
        if let Ok(key) = std::env::var("STEAM_API_KEY") {
            self.fetch.steam_api_key = Some(key);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.fetch.bounded_attempts, 5);
        assert_eq!(parsed.fetch.retry_delay_ms, 2000);
        assert_eq!(parsed.training.batch_size, 5);
        assert_eq!(parsed.fetch.stats_mode, StatsMode::RecentAverage);
    }

    #[test]
    fn test_prediction_winner_and_confidence() {
        let p = Prediction {
            label: RADIANT_WIN,
            probabilities: [0.2, 0.8],
        };
        assert_eq!(p.predicted_winner(), Side::Radiant);
        assert_eq!(p.confidence(), ConfidenceLevel::High);

        let p = Prediction {
            label: DIRE_WIN,
            probabilities: [0.55, 0.45],
        };
        assert_eq!(p.predicted_winner(), Side::Dire);
        assert_eq!(p.confidence(), ConfidenceLevel::Low);
    }

    #[test]
    fn test_persistence_error_mentions_match() {
        let err = DotaError::persistence(Some(MatchId(42)), "disk full");
        assert_eq!(err.to_string(), "Persistence failure for match 42: disk full");
    }
}
