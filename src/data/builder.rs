//! Raw entity builder
//!
//! Resolves rosters into validated `Match` objects: hero lookups, player
//! statistics under the configured mode, and the 5-per-side admission check.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::entities::{
    group_by_league, Hero, Match, MatchRoster, Player, PlayerStats, RosterSlot, StatAccumulator,
    Team, Tournament,
};
use super::fetcher::Fetcher;
use super::telemetry::{
    decode, HeroMatchupPayload, HeroStatPayload, LiveGamePayload, LiveGamesEnvelope,
    MatchDetailsPayload, MatchPlayerIdentity, RecentMatchPayload, Resource, TotalsFieldPayload,
};
use crate::{AccountId, DotaError, FetchConfig, HeroId, MatchId, Result, Side};

/// Where player statistics come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMode {
    /// The match's own player entries; slots without stats fall back to `RecentAverage`
    MatchPayload,
    /// Running average over the player's recent matches on the same hero
    #[default]
    RecentAverage,
    /// Upstream per-hero totals divided by sample count
    Totals,
}

pub struct EntityBuilder {
    fetcher: Fetcher,
    mode: StatsMode,
    recent_matches: usize,
    heroes: Mutex<Option<Arc<Vec<HeroStatPayload>>>>,
}

impl EntityBuilder {
    pub fn new(fetcher: Fetcher, mode: StatsMode, recent_matches: usize) -> Self {
        EntityBuilder {
            fetcher,
            mode,
            recent_matches,
            heroes: Mutex::new(None),
        }
    }

    pub fn from_config(fetcher: Fetcher, config: &FetchConfig) -> Self {
        Self::new(fetcher, config.stats_mode, config.recent_matches)
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn mode(&self) -> StatsMode {
        self.mode
    }

    // ==================== Heroes ====================

    fn hero_stats(&self) -> Result<Arc<Vec<HeroStatPayload>>> {
        if let Some(cached) = self.heroes.lock().as_ref() {
            return Ok(cached.clone());
        }
        // Fetched outside the lock; a concurrent miss costs one extra request
        let stats: Vec<HeroStatPayload> = decode(self.fetcher.fetch_blocking(&Resource::HeroStats)?)?;
        let stats = Arc::new(stats);
        *self.heroes.lock() = Some(stats.clone());
        log::debug!("Cached stats for {} heroes", stats.len());
        Ok(stats)
    }

    pub fn hero(&self, id: HeroId) -> Result<Hero> {
        Ok(Hero::from_stats(id, &self.hero_stats()?))
    }

    /// Hero with win rates against `opponents`; an unreachable matchup list leaves them empty
    pub fn hero_with_counter_picks(&self, id: HeroId, opponents: &[HeroId]) -> Result<Hero> {
        let hero = self.hero(id)?;
        match self
            .fetcher
            .fetch_bounded(&Resource::HeroMatchups(id))
            .and_then(decode::<Vec<HeroMatchupPayload>>)
        {
            Ok(matchups) => Ok(hero.with_counter_picks(&matchups, opponents)),
            Err(e) => {
                log::warn!("No matchups for {}: {}", id, e);
                Ok(hero)
            }
        }
    }

    /// Fill each hero's counter picks against the opposing side
    pub fn populate_counter_picks(&self, m: &mut Match) -> Result<()> {
        for side in [Side::Radiant, Side::Dire] {
            let opponents = m.team(side.opponent()).hero_ids();
            for player in m.team_mut(side).players.iter_mut() {
                player.hero = self.hero_with_counter_picks(player.hero.id, &opponents)?;
            }
        }
        Ok(())
    }

    // ==================== Players ====================

    /// Resolve one roster slot of `match_id` into a player under the configured mode
    pub fn player(&self, match_id: MatchId, slot: &RosterSlot) -> Result<Player> {
        let hero = self.hero(slot.hero_id)?;
        let (stats, samples) = match (self.mode, slot.stats) {
            (StatsMode::MatchPayload, Some(stats)) => (stats, 1),
            (StatsMode::Totals, _) => self.totals(slot.account_id, slot.hero_id)?,
            (StatsMode::MatchPayload, None) => {
                log::warn!(
                    "Match {}: no stats for {} in the payload, using recent average",
                    match_id,
                    slot.account_id
                );
                self.recent_average(slot.account_id, slot.hero_id)?
            }
            (StatsMode::RecentAverage, _) => self.recent_average(slot.account_id, slot.hero_id)?,
        };

        Ok(Player {
            account_id: slot.account_id,
            name: slot.name.clone(),
            side: slot.side,
            hero,
            stats,
            samples,
        })
    }

    /// Average over recent matches on the hero. Samples that cannot be
    /// fetched or decoded are dropped from the denominator; fails with
    /// `NoSamples` when none is left.
    pub fn recent_average(&self, account: AccountId, hero: HeroId) -> Result<(PlayerStats, usize)> {
        let listing = Resource::PlayerRecentMatches {
            account,
            hero,
            limit: self.recent_matches,
        };
        let recent: Vec<RecentMatchPayload> =
            match self.fetcher.fetch_bounded(&listing).and_then(decode) {
                Ok(recent) => recent,
                Err(e) => {
                    log::warn!("No recent matches for {}: {}", account, e);
                    Vec::new()
                }
            };

        let mut acc = StatAccumulator::new();
        for sample in recent.iter().take(self.recent_matches) {
            match self.sample_stats(MatchId(sample.match_id), account) {
                Ok(Some(stats)) => acc.push(&stats),
                Ok(None) => {
                    log::debug!("{} missing from match {}", account, sample.match_id);
                    acc.drop_sample();
                }
                Err(e) => {
                    log::warn!("Dropping sample {} for {}: {}", sample.match_id, account, e);
                    acc.drop_sample();
                }
            }
        }

        if acc.dropped() > 0 {
            log::info!(
                "{}: averaged {} samples, dropped {}",
                account,
                acc.samples(),
                acc.dropped()
            );
        }
        match acc.mean() {
            Some(mean) => Ok((mean, acc.samples())),
            None => Err(DotaError::NoSamples { account, hero }),
        }
    }

    /// One player's line from a historical match
    fn sample_stats(&self, match_id: MatchId, account: AccountId) -> Result<Option<PlayerStats>> {
        let details: MatchDetailsPayload =
            decode(self.fetcher.fetch_bounded(&Resource::MatchDetails(match_id))?)?;
        for entry in details.players {
            let identity: MatchPlayerIdentity = decode(entry.clone())?;
            if identity.account_id == Some(account.0) {
                return Ok(Some(decode(entry)?));
            }
        }
        Ok(None)
    }

    /// Authoritative per-hero totals; blocks until the upstream answers
    pub fn totals(&self, account: AccountId, hero: HeroId) -> Result<(PlayerStats, usize)> {
        let resource = Resource::PlayerTotals {
            account,
            hero,
            limit: self.recent_matches,
        };
        let fields: Vec<TotalsFieldPayload> = decode(self.fetcher.fetch_blocking(&resource)?)?;

        let mut stats = PlayerStats::default();
        let mut samples = 0usize;
        for field in &fields {
            let value = if field.n > 0.0 { field.sum / field.n } else { 0.0 };
            if stats.set_field(&field.field, value) {
                samples = samples.max(field.n as usize);
            }
        }
        if samples == 0 {
            return Err(DotaError::NoSamples { account, hero });
        }
        Ok((stats, samples))
    }

    // ==================== Matches ====================

    /// Validate a roster and resolve it into a match
    pub fn build_match(&self, roster: &MatchRoster) -> Result<Match> {
        roster.validate()?;

        let mut radiant = Team::new(&roster.radiant_name, roster.radiant_id, Side::Radiant);
        let mut dire = Team::new(&roster.dire_name, roster.dire_id, Side::Dire);
        for slot in &roster.slots {
            let player = self.player(roster.match_id, slot)?;
            match slot.side {
                Side::Radiant => radiant.add_player(player),
                Side::Dire => dire.add_player(player),
            }
        }

        Ok(Match::new(roster.match_id, roster.league_id, radiant, dire)?
            .with_outcome(roster.radiant_win))
    }

    /// Live league games grouped by tournament. Games that fail to decode or
    /// miss a team are skipped.
    pub fn live_tournaments(&self) -> Result<Vec<Tournament>> {
        let envelope: LiveGamesEnvelope =
            decode(self.fetcher.fetch_blocking(&Resource::LiveLeagueGames)?)?;

        let rosters = envelope
            .result
            .games
            .into_iter()
            .filter_map(|raw| {
                let game: LiveGamePayload = match decode(raw) {
                    Ok(game) => game,
                    Err(e) => {
                        log::warn!("Skipping malformed live game: {}", e);
                        return None;
                    }
                };
                let roster = MatchRoster::from_live_game(&game);
                if roster.is_none() {
                    log::debug!("Skipping live game {}: team missing", game.match_id);
                }
                roster
            })
            .collect();
        Ok(group_by_league(rosters))
    }

    /// Roster of a finished match; blocks until the upstream answers
    pub fn match_roster(&self, id: MatchId) -> Result<MatchRoster> {
        let details: MatchDetailsPayload =
            decode(self.fetcher.fetch_blocking(&Resource::MatchDetails(id))?)?;
        Ok(MatchRoster::from_details(&details))
    }

    /// Roster of a finished match under the bounded policy
    pub fn try_match_roster(&self, id: MatchId) -> Result<MatchRoster> {
        let details: MatchDetailsPayload =
            decode(self.fetcher.fetch_bounded(&Resource::MatchDetails(id))?)?;
        Ok(MatchRoster::from_details(&details))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    use crate::data::telemetry::testing::ScriptedSource;
    use crate::data::telemetry::Resource;
    use crate::MatchId;

    pub fn hero_stats() -> Value {
        let heroes: Vec<Value> = (1..=20)
            .map(|id| {
                json!({
                    "id": id,
                    "localized_name": format!("Hero {}", id),
                    "pro_win": 50 + id,
                    "pro_pick": 100,
                })
            })
            .collect();
        json!(heroes)
    }

    pub fn player_entry(account: i64, hero: i64, radiant: bool, kills: f64) -> Value {
        json!({
            "account_id": account,
            "personaname": format!("player{}", account),
            "hero_id": hero,
            "isRadiant": radiant,
            "kills": kills, "deaths": 2.0, "assists": 6.0,
            "gold_per_min": 520.0, "xp_per_min": 610.0, "net_worth": 18000.0,
            "obs_placed": 4.0, "sen_placed": 3.0, "roshans_killed": 1.0,
            "last_hits": 210.0, "denies": 12.0, "level": 22.0,
            "hero_damage": 21000.0, "tower_damage": 3000.0, "hero_healing": 0.0,
            "teamfight_participation": 0.7,
        })
    }

    /// Details payload with players 1-5 radiant and 6-10 dire
    pub fn match_details(id: i64, radiant_kills: [f64; 5], radiant_win: Option<bool>) -> Value {
        let mut players = Vec::new();
        for (i, kills) in radiant_kills.iter().enumerate() {
            players.push(player_entry(i as i64 + 1, i as i64 + 1, true, *kills));
        }
        for i in 5..10 {
            players.push(player_entry(i as i64 + 1, i as i64 + 1, false, 3.0));
        }
        json!({
            "match_id": id,
            "leagueid": 15728,
            "radiant_win": radiant_win,
            "radiant_name": "Team Spirit",
            "radiant_team_id": 7119388,
            "dire_name": "Team Falcons",
            "dire_team_id": 9247354,
            "players": players,
        })
    }

    pub fn scripted_with_heroes() -> ScriptedSource {
        let source = ScriptedSource::new();
        source.respond(Resource::HeroStats, hero_stats());
        source
    }

    pub fn respond_details(source: &ScriptedSource, id: i64, kills: [f64; 5], win: Option<bool>) {
        source.respond(
            Resource::MatchDetails(MatchId(id)),
            match_details(id, kills, win),
        );
    }
}
