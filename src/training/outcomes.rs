//! Verified outcome resolution
//!
//! Looks up every recorded prediction that still lacks a result, patches in
//! the winner once the upstream reports one, then gives the incremental
//! trainer one chance to consume the new rows.

use super::incremental::{IncrementalTrainer, TickOutcome};
use crate::data::builder::EntityBuilder;
use crate::data::database::{Database, OutcomeStore};
use crate::model::Classifier;
use crate::{MatchId, Result, DIRE_WIN, RADIANT_WIN};

#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub resolved: Vec<MatchId>,
    /// Matches still without a result upstream, or whose lookup failed
    pub pending: Vec<MatchId>,
    pub tick: Option<TickOutcome>,
    pub retrain_failed: bool,
}

/// Resolve pending outcomes, then tick the trainer if anything changed.
///
/// A storage failure aborts the run with the offending match id; upstream
/// failures and cancellation leave matches pending for the next run.
pub fn resolve_pending<C: Classifier>(
    builder: &EntityBuilder,
    db: &Database,
    trainer: &mut IncrementalTrainer<C>,
) -> Result<ResolveReport> {
    let pending = db.pending_outcomes()?;
    log::info!("{} predictions awaiting outcome", pending.len());

    let cancel = builder.fetcher().cancel_token();
    let mut report = ResolveReport::default();
    for id in pending {
        if cancel.is_cancelled() {
            report.pending.push(id);
            continue;
        }
        let radiant_win = match builder.try_match_roster(id) {
            Ok(roster) => roster.radiant_win,
            Err(e) => {
                log::warn!("Match {}: lookup failed, keeping it pending: {}", id, e);
                None
            }
        };
        match radiant_win {
            Some(won) => {
                let result = if won { RADIANT_WIN } else { DIRE_WIN };
                if db.update_outcome(id, result)? {
                    log::info!(
                        "Match {}: {} won",
                        id,
                        if won { "Radiant" } else { "Dire" }
                    );
                    report.resolved.push(id);
                }
            }
            None => report.pending.push(id),
        }
    }

    if !report.resolved.is_empty() {
        match trainer.tick(db) {
            Ok(outcome) => report.tick = Some(outcome),
            // Already logged by the trainer; the outcomes themselves are committed
            Err(_) => report.retrain_failed = true,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::builder::{fixtures, StatsMode};
    use crate::data::fetcher::{Fetcher, Sleeper};
    use crate::data::telemetry::testing::ScriptedSource;
    use crate::data::telemetry::Resource;
    use crate::features::schema::column_names;
    use crate::features::FeatureTransformer;
    use crate::model::{ArtifactRegistry, LogisticClassifier};
    use crate::training::bootstrap::{self, train_initial};
    use std::sync::Arc;

    fn builder(source: Arc<ScriptedSource>) -> EntityBuilder {
        let sleeper: Sleeper = Arc::new(|_| {});
        let fetcher =
            Fetcher::from_config(source, &crate::Config::default().fetch).with_sleeper(sleeper);
        EntityBuilder::new(fetcher, StatsMode::MatchPayload, 5)
    }

    fn bootstrapped() -> FeatureTransformer {
        let transformer = FeatureTransformer::new(ArtifactRegistry::in_memory());
        train_initial(
            &transformer,
            bootstrap::fixtures::separable_dataset(20),
            LogisticClassifier::new(column_names(), 0.5),
            &crate::Config::default().training,
        )
        .unwrap();
        transformer
    }

    fn predict(db: &Database, transformer: &FeatureTransformer, ids: &[i64]) {
        let scaler = transformer.serving_handle().unwrap();
        let snapshot = scaler
            .apply(&bootstrap::fixtures::raw_vector(0.7))
            .unwrap();
        for id in ids {
            db.insert_if_absent(MatchId(*id), RADIANT_WIN, &snapshot)
                .unwrap();
        }
    }

    #[test]
    fn test_resolves_finished_matches_and_retrains() {
        let source = Arc::new(fixtures::scripted_with_heroes());
        fixtures::respond_details(&source, 1, [3.0; 5], Some(true));
        fixtures::respond_details(&source, 2, [3.0; 5], None);
        fixtures::respond_details(&source, 4, [3.0; 5], Some(false));
        // Match 3 is unknown upstream

        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        predict(&db, &transformer, &[1, 2, 3, 4]);
        let mut trainer =
            IncrementalTrainer::<LogisticClassifier>::new(transformer.registry().clone(), 2, 5);

        let report = resolve_pending(&builder(source), &db, &mut trainer).unwrap();
        assert_eq!(report.resolved, vec![MatchId(1), MatchId(4)]);
        assert_eq!(report.pending, vec![MatchId(2), MatchId(3)]);
        assert!(!report.retrain_failed);
        assert_eq!(
            report.tick,
            Some(TickOutcome::Retrained {
                rows: 2,
                cursor: 4,
                version: 2
            })
        );

        assert_eq!(db.get(MatchId(1)).unwrap().unwrap().actual_result, Some(RADIANT_WIN));
        assert_eq!(db.get(MatchId(4)).unwrap().unwrap().actual_result, Some(DIRE_WIN));
        assert_eq!(db.pending_outcomes().unwrap(), vec![MatchId(2), MatchId(3)]);
    }

    #[test]
    fn test_nothing_resolved_skips_trainer() {
        let source = Arc::new(fixtures::scripted_with_heroes());
        fixtures::respond_details(&source, 9, [3.0; 5], None);

        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        predict(&db, &transformer, &[9]);
        let mut trainer =
            IncrementalTrainer::<LogisticClassifier>::new(transformer.registry().clone(), 1, 5);

        let report = resolve_pending(&builder(source), &db, &mut trainer).unwrap();
        assert!(report.resolved.is_empty());
        assert_eq!(report.tick, None);
    }

    #[test]
    fn test_cancelled_run_leaves_matches_pending() {
        let source = Arc::new(fixtures::scripted_with_heroes());
        fixtures::respond_details(&source, 1, [3.0; 5], Some(true));

        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        predict(&db, &transformer, &[1]);
        let mut trainer =
            IncrementalTrainer::<LogisticClassifier>::new(transformer.registry().clone(), 1, 5);
        let builder = builder(source.clone());
        builder.fetcher().cancel_token().cancel();

        let report = resolve_pending(&builder, &db, &mut trainer).unwrap();
        assert!(report.resolved.is_empty());
        assert_eq!(report.pending, vec![MatchId(1)]);
        assert_eq!(report.tick, None);
        assert_eq!(source.calls_to(&Resource::MatchDetails(MatchId(1))), 0);
    }

    #[test]
    fn test_trainer_failure_keeps_outcomes() {
        let source = Arc::new(fixtures::scripted_with_heroes());
        fixtures::respond_details(&source, 1, [3.0; 5], Some(true));

        // No classifier was ever trained
        let transformer = bootstrapped();
        let db = Database::in_memory().unwrap();
        predict(&db, &transformer, &[1]);
        let mut trainer =
            IncrementalTrainer::<LogisticClassifier>::new(ArtifactRegistry::in_memory(), 1, 5);

        let report = resolve_pending(&builder(source), &db, &mut trainer).unwrap();
        assert_eq!(report.resolved, vec![MatchId(1)]);
        assert!(report.retrain_failed);
        assert!(db.pending_outcomes().unwrap().is_empty());
    }
}
