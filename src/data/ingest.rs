//! League ingestion
//!
//! Walks a league's finished matches and turns each valid one into a
//! labelled dataset row. Malformed matches are skipped, and cancellation is
//! checked between matches so rows already built stay usable.

use super::builder::EntityBuilder;
use super::dataset::DatasetRow;
use super::telemetry::{decode, LeagueMatchPayload, LeaguePayload, Resource};
use crate::{DotaError, MatchId, Result};

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub rows: Vec<DatasetRow>,
    pub skipped: usize,
    pub cancelled: bool,
}

enum Step {
    Row(DatasetRow),
    Skip,
    Cancelled,
}

fn ingest_one(builder: &EntityBuilder, listed: &LeagueMatchPayload) -> Step {
    let id = MatchId(listed.match_id);
    let roster = match builder.try_match_roster(id) {
        Ok(roster) => roster,
        Err(e) => {
            log::warn!("Skipping match {}: {}", id, e);
            return Step::Skip;
        }
    };

    let built = builder
        .build_match(&roster)
        .map(|m| m.with_outcome(roster.radiant_win.or(listed.radiant_win)));
    match built {
        Ok(m) => match DatasetRow::from_match(&m) {
            Some(row) => Step::Row(row),
            None => {
                log::info!("Skipping match {}: no outcome", id);
                Step::Skip
            }
        },
        Err(e @ (DotaError::InvalidRosterSize { .. } | DotaError::UnresolvedPick { .. })) => {
            log::info!("Skipping match {}: {}", id, e);
            Step::Skip
        }
        Err(DotaError::FetchBlocking { .. }) if builder.fetcher().cancel_token().is_cancelled() => {
            Step::Cancelled
        }
        Err(e) => {
            log::warn!("Skipping match {}: {}", id, e);
            Step::Skip
        }
    }
}

/// Known leagues, restricted to `tiers` unless it is empty
pub fn list_leagues(builder: &EntityBuilder, tiers: &[String]) -> Result<Vec<LeaguePayload>> {
    let leagues: Vec<LeaguePayload> = decode(builder.fetcher().fetch_blocking(&Resource::Leagues)?)?;
    Ok(leagues
        .into_iter()
        .filter(|l| {
            tiers.is_empty()
                || l.tier
                    .as_deref()
                    .is_some_and(|t| tiers.iter().any(|wanted| wanted.eq_ignore_ascii_case(t)))
        })
        .collect())
}

/// Build dataset rows for every finished match of a league
pub fn ingest_league(builder: &EntityBuilder, league_id: i64) -> Result<IngestReport> {
    let cancel = builder.fetcher().cancel_token().clone();
    let listed: Vec<LeagueMatchPayload> =
        decode(builder.fetcher().fetch_blocking(&Resource::LeagueMatches(league_id))?)?;
    log::info!("League {}: {} matches listed", league_id, listed.len());

    let mut report = IngestReport::default();
    for (i, entry) in listed.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        match ingest_one(builder, entry) {
            Step::Row(row) => report.rows.push(row),
            Step::Skip => report.skipped += 1,
            Step::Cancelled => {
                report.cancelled = true;
                break;
            }
        }
        if (i + 1) % 10 == 0 {
            log::info!("Processed {}/{} matches", i + 1, listed.len());
        }
    }

    log::info!(
        "League {}: {} rows, {} skipped{}",
        league_id,
        report.rows.len(),
        report.skipped,
        if report.cancelled { ", cancelled" } else { "" }
    );
    Ok(report)
}
