//! Telemetry ingestion and storage
//!
//! Upstream fetching with retry policies, raw match entities, league
//! ingestion, and the SQLite prediction history.

pub mod builder;
pub mod database;
pub mod dataset;
pub mod entities;
pub mod fetcher;
pub mod ingest;
pub mod telemetry;

pub use builder::{EntityBuilder, StatsMode};
pub use database::{Database, HistoryRecord, OutcomeStore};
pub use dataset::{DatasetRow, MatchDataset};
pub use entities::{Hero, Match, Player, PlayerStats, Team, Tournament};
pub use fetcher::{CancelToken, Fetcher, RetryPolicy};
pub use telemetry::{OpenDotaClient, Resource, TelemetrySource};
