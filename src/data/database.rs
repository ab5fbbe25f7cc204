//! SQLite prediction history
//!
//! One row per predicted match: the model's call, the verified outcome once
//! known, and the feature snapshot the prediction was made from.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::features::FeatureVector;
use crate::{DotaError, MatchId, Result};

/// One row of the history table
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub match_id: MatchId,
    pub model_prediction: u8,
    pub actual_result: Option<u8>,
    pub timestamp: DateTime<Utc>,
    pub features: FeatureVector,
}

/// Persistence of predictions and verified outcomes
pub trait OutcomeStore {
    /// Record a prediction; returns false if the match was already recorded
    fn insert_if_absent(
        &self,
        match_id: MatchId,
        prediction: u8,
        snapshot: &FeatureVector,
    ) -> Result<bool>;

    /// Patch the verified outcome; returns false if the match is unknown
    fn update_outcome(&self, match_id: MatchId, actual_result: u8) -> Result<bool>;

    /// Resolved rows with `id > cursor`, ascending, at most `limit`
    fn query_unconsumed(&self, cursor: i64, limit: usize) -> Result<Vec<HistoryRecord>>;
}

fn failure(match_id: Option<MatchId>) -> impl Fn(rusqlite::Error) -> DotaError {
    move |e| DotaError::persistence(match_id, e)
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(failure(None))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(failure(None))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id INTEGER NOT NULL UNIQUE,
                model_prediction INTEGER NOT NULL,
                actual_result INTEGER NULL,
                timestamp TEXT NOT NULL,
                features TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_pending ON history(actual_result);
            "#,
            )
            .map_err(failure(None))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<(HistoryRecord, String)> {
        let timestamp: String = row.get(4)?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;
        let features: String = row.get(5)?;
        Ok((
            HistoryRecord {
                id: row.get(0)?,
                match_id: MatchId(row.get(1)?),
                model_prediction: row.get(2)?,
                actual_result: row.get(3)?,
                timestamp,
                features: FeatureVector::default(),
            },
            features,
        ))
    }

    /// Attach the decoded snapshot; a snapshot from another schema is an error
    fn with_snapshot((mut record, features): (HistoryRecord, String)) -> Result<HistoryRecord> {
        let named: BTreeMap<String, f32> = serde_json::from_str(&features)?;
        record.features = FeatureVector::from_named(&named)?;
        Ok(record)
    }

    pub fn get(&self, match_id: MatchId) -> Result<Option<HistoryRecord>> {
        self.conn
            .query_row(
                "SELECT id, match_id, model_prediction, actual_result, timestamp, features
                 FROM history WHERE match_id = ?1",
                params![match_id.0],
                Self::row_to_record,
            )
            .optional()
            .map_err(failure(Some(match_id)))?
            .map(Self::with_snapshot)
            .transpose()
    }

    /// Matches still waiting for a verified outcome, oldest first
    pub fn pending_outcomes(&self) -> Result<Vec<MatchId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT match_id FROM history WHERE actual_result IS NULL ORDER BY id")
            .map_err(failure(None))?;
        let ids = stmt
            .query_map([], |row| Ok(MatchId(row.get(0)?)))
            .map_err(failure(None))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(failure(None))?;
        Ok(ids)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                        COUNT(actual_result),
                        COALESCE(SUM(CASE WHEN actual_result = model_prediction THEN 1 ELSE 0 END), 0),
                        MAX(id)
                 FROM history",
                [],
                |row| {
                    let total: i64 = row.get(0)?;
                    let resolved: i64 = row.get(1)?;
                    let correct: i64 = row.get(2)?;
                    Ok(HistoryStats {
                        total: total as usize,
                        resolved: resolved as usize,
                        correct: correct as usize,
                        last_id: row.get(3)?,
                    })
                },
            )
            .map_err(failure(None))
    }
}

impl OutcomeStore for Database {
    fn insert_if_absent(
        &self,
        match_id: MatchId,
        prediction: u8,
        snapshot: &FeatureVector,
    ) -> Result<bool> {
        let features = serde_json::to_string(&snapshot.to_named())?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO history (match_id, model_prediction, actual_result, timestamp, features)
                 VALUES (?1, ?2, NULL, ?3, ?4)",
                params![match_id.0, prediction, Utc::now().to_rfc3339(), features],
            )
            .map_err(failure(Some(match_id)))?;
        if inserted == 0 {
            log::debug!("Match {} already recorded", match_id);
        }
        Ok(inserted > 0)
    }

    fn update_outcome(&self, match_id: MatchId, actual_result: u8) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE history SET actual_result = ?1 WHERE match_id = ?2",
                params![actual_result, match_id.0],
            )
            .map_err(failure(Some(match_id)))?;
        if updated == 0 {
            log::warn!("No prediction recorded for match {}; outcome ignored", match_id);
        }
        Ok(updated > 0)
    }

    fn query_unconsumed(&self, cursor: i64, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, match_id, model_prediction, actual_result, timestamp, features
                 FROM history
                 WHERE id > ?1 AND actual_result IS NOT NULL
                 ORDER BY id ASC
                 LIMIT ?2",
            )
            .map_err(failure(None))?;
        let rows = stmt
            .query_map(params![cursor, limit as i64], Self::row_to_record)
            .map_err(failure(None))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(failure(None))?;
        rows.into_iter().map(Self::with_snapshot).collect()
    }
}

/// History table summary
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub total: usize,
    pub resolved: usize,
    /// Resolved rows the model called correctly
    pub correct: usize,
    pub last_id: Option<i64>,
}

impl HistoryStats {
    pub fn pending(&self) -> usize {
        self.total - self.resolved
    }

    pub fn accuracy(&self) -> Option<f64> {
        if self.resolved == 0 {
            None
        } else {
            Some(self.correct as f64 / self.resolved as f64)
        }
    }
}
