//! Live league predictions
//!
//! Fetches the league games in progress, predicts each one, and records the
//! prediction with its feature snapshot. One match failing never stops the
//! rest of the run.

use serde::Serialize;

use super::inference::Predictor;
use crate::data::builder::EntityBuilder;
use crate::data::database::OutcomeStore;
use crate::data::entities::{Match, MatchRoster, Tournament};
use crate::model::Classifier;
use crate::{DotaError, MatchId, Prediction, Result, Side};

/// Mean counter-pick win rate of each side's heroes against the other side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CounterPickEdge {
    pub radiant: Option<f64>,
    pub dire: Option<f64>,
}

impl CounterPickEdge {
    pub fn of(m: &Match) -> Self {
        CounterPickEdge {
            radiant: m.counter_pick_edge(Side::Radiant),
            dire: m.counter_pick_edge(Side::Dire),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LivePrediction {
    pub match_id: MatchId,
    pub league_name: String,
    pub radiant_name: String,
    pub dire_name: String,
    pub prediction: Prediction,
    /// Fewest historical samples behind any player's stats
    pub min_samples: usize,
    /// Present when counter picks were requested
    pub counter_pick_edge: Option<CounterPickEdge>,
    /// False when the match had already been recorded by an earlier run
    pub recorded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LiveReport {
    pub predictions: Vec<LivePrediction>,
    /// Matches with an incomplete roster or unpicked heroes
    pub skipped: Vec<MatchId>,
    pub failed: Vec<MatchId>,
    /// The run stopped early on cancellation
    pub cancelled: bool,
}

pub struct LiveService<'a, C: Classifier> {
    builder: &'a EntityBuilder,
    predictor: &'a Predictor<C>,
    store: &'a dyn OutcomeStore,
    counter_picks: bool,
}

impl<'a, C: Classifier> LiveService<'a, C> {
    pub fn new(
        builder: &'a EntityBuilder,
        predictor: &'a Predictor<C>,
        store: &'a dyn OutcomeStore,
    ) -> Self {
        LiveService {
            builder,
            predictor,
            store,
            counter_picks: false,
        }
    }

    /// Fetch hero matchups for every predicted match
    pub fn with_counter_picks(mut self, enabled: bool) -> Self {
        self.counter_picks = enabled;
        self
    }

    /// Predict every live league game
    pub fn run(&self) -> Result<LiveReport> {
        let tournaments = self.builder.live_tournaments()?;
        log::info!("{} tournaments live", tournaments.len());
        Ok(self.predict_tournaments(&tournaments))
    }

    pub fn predict_tournaments(&self, tournaments: &[Tournament]) -> LiveReport {
        let cancel = self.builder.fetcher().cancel_token();
        let mut report = LiveReport::default();
        'tournaments: for tournament in tournaments {
            log::info!(
                "{}: {} live matches",
                tournament.name,
                tournament.matches.len()
            );
            for roster in &tournament.matches {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'tournaments;
                }
                match self.predict_roster(tournament, roster) {
                    Ok(prediction) => report.predictions.push(prediction),
                    Err(e @ (DotaError::InvalidRosterSize { .. } | DotaError::UnresolvedPick { .. })) => {
                        log::info!("Skipping match {}: {}", roster.match_id, e);
                        report.skipped.push(roster.match_id);
                    }
                    Err(e) => {
                        log::warn!("Prediction for match {} failed: {}", roster.match_id, e);
                        report.failed.push(roster.match_id);
                    }
                }
            }
        }
        report
    }

    fn predict_roster(&self, tournament: &Tournament, roster: &MatchRoster) -> Result<LivePrediction> {
        let mut m = self.builder.build_match(roster)?;
        let (snapshot, prediction) = self.predictor.predict_match(&m)?;
        let recorded = self
            .store
            .insert_if_absent(m.id, prediction.label, &snapshot)?;
        log::debug!(
            "Match {}: P(radiant) = {:.3}, recorded = {}",
            m.id,
            prediction.radiant_win_prob(),
            recorded
        );

        let counter_pick_edge = if self.counter_picks {
            self.builder.populate_counter_picks(&mut m)?;
            Some(CounterPickEdge::of(&m))
        } else {
            None
        };

        Ok(LivePrediction {
            match_id: m.id,
            league_name: tournament.name.clone(),
            radiant_name: m.radiant.name.clone(),
            dire_name: m.dire.name.clone(),
            prediction,
            min_samples: m.min_samples(),
            counter_pick_edge,
            recorded,
        })
    }
}
