//! Raw match entities
//!
//! Heroes, players, teams and matches live only for one ingestion or
//! prediction job and are discarded once features are extracted.

use serde::{Deserialize, Serialize};

use super::telemetry::{
    HeroMatchupPayload, HeroStatPayload, LiveGamePayload, MatchDetailsPayload, MatchPlayerIdentity,
};
use crate::{AccountId, DotaError, HeroId, MatchId, Result, Side};

/// Players per side
pub const ROSTER_SIZE: usize = 5;

/// Win rate of a hero against one opposing hero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterPick {
    pub against: HeroId,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hero {
    pub id: HeroId,
    pub name: String,
    /// Pro-scene win rate
    pub win_rate: f64,
    /// Populated on demand
    pub counter_picks: Vec<CounterPick>,
}

impl Hero {
    pub fn unknown(id: HeroId) -> Self {
        Hero {
            id,
            name: "Unknown Hero".to_string(),
            win_rate: 0.0,
            counter_picks: Vec::new(),
        }
    }

    /// Look the hero up in the heroStats listing
    pub fn from_stats(id: HeroId, stats: &[HeroStatPayload]) -> Self {
        match stats.iter().find(|h| h.id == id.0) {
            Some(h) => {
                let picks = h.pro_pick.unwrap_or(0);
                let wins = h.pro_win.unwrap_or(0);
                Hero {
                    id,
                    name: h.localized_name.clone(),
                    win_rate: if picks > 0 {
                        wins as f64 / picks as f64
                    } else {
                        0.0
                    },
                    counter_picks: Vec::new(),
                }
            }
            None => Self::unknown(id),
        }
    }

    /// Attach win rates against the given opposing heroes
    pub fn with_counter_picks(mut self, matchups: &[HeroMatchupPayload], opponents: &[HeroId]) -> Self {
        self.counter_picks = opponents
            .iter()
            .filter_map(|opp| {
                matchups.iter().find(|m| m.hero_id == opp.0).map(|m| CounterPick {
                    against: *opp,
                    win_rate: if m.games_played > 0 {
                        m.wins as f64 / m.games_played as f64
                    } else {
                        0.0
                    },
                })
            })
            .collect();
        self
    }

    pub fn counter_pick_win_rate(&self, against: HeroId) -> Option<f64> {
        self.counter_picks
            .iter()
            .find(|c| c.against == against)
            .map(|c| c.win_rate)
    }
}

/// Per-sample player statistics, one named field per stat
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub kills: f64,
    pub deaths: f64,
    pub assists: f64,
    pub gold_per_min: f64,
    pub xp_per_min: f64,
    pub net_worth: f64,
    pub obs_placed: f64,
    pub sen_placed: f64,
    pub roshans_killed: f64,
    pub last_hits: f64,
    pub denies: f64,
    pub level: f64,
    pub hero_damage: f64,
    pub tower_damage: f64,
    pub hero_healing: f64,
    pub teamfight_participation: f64,
}

impl PlayerStats {
    /// Field-wise sum
    pub fn accumulate(&mut self, other: &PlayerStats) {
        self.kills += other.kills;
        self.deaths += other.deaths;
        self.assists += other.assists;
        self.gold_per_min += other.gold_per_min;
        self.xp_per_min += other.xp_per_min;
        self.net_worth += other.net_worth;
        self.obs_placed += other.obs_placed;
        self.sen_placed += other.sen_placed;
        self.roshans_killed += other.roshans_killed;
        self.last_hits += other.last_hits;
        self.denies += other.denies;
        self.level += other.level;
        self.hero_damage += other.hero_damage;
        self.tower_damage += other.tower_damage;
        self.hero_healing += other.hero_healing;
        self.teamfight_participation += other.teamfight_participation;
    }

    /// Field-wise division
    pub fn divided_by(&self, n: f64) -> PlayerStats {
        PlayerStats {
            kills: self.kills / n,
            deaths: self.deaths / n,
            assists: self.assists / n,
            gold_per_min: self.gold_per_min / n,
            xp_per_min: self.xp_per_min / n,
            net_worth: self.net_worth / n,
            obs_placed: self.obs_placed / n,
            sen_placed: self.sen_placed / n,
            roshans_killed: self.roshans_killed / n,
            last_hits: self.last_hits / n,
            denies: self.denies / n,
            level: self.level / n,
            hero_damage: self.hero_damage / n,
            tower_damage: self.tower_damage / n,
            hero_healing: self.hero_healing / n,
            teamfight_participation: self.teamfight_participation / n,
        }
    }

    /// Set a field by its upstream name; unknown names are ignored
    pub fn set_field(&mut self, field: &str, value: f64) -> bool {
        let slot = match field {
            "kills" => &mut self.kills,
            "deaths" => &mut self.deaths,
            "assists" => &mut self.assists,
            "gold_per_min" => &mut self.gold_per_min,
            "xp_per_min" => &mut self.xp_per_min,
            "net_worth" => &mut self.net_worth,
            "obs_placed" => &mut self.obs_placed,
            "sen_placed" => &mut self.sen_placed,
            "roshans_killed" => &mut self.roshans_killed,
            "last_hits" => &mut self.last_hits,
            "denies" => &mut self.denies,
            "level" => &mut self.level,
            "hero_damage" => &mut self.hero_damage,
            "tower_damage" => &mut self.tower_damage,
            "hero_healing" => &mut self.hero_healing,
            "teamfight_participation" => &mut self.teamfight_participation,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Running average over per-match samples.
///
/// A dropped sample is excluded from the denominator; it never resets the
/// running count.
#[derive(Debug, Clone, Default)]
pub struct StatAccumulator {
    totals: PlayerStats,
    samples: usize,
    dropped: usize,
}

impl StatAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: &PlayerStats) {
        self.totals.accumulate(sample);
        self.samples += 1;
    }

    pub fn drop_sample(&mut self) {
        self.dropped += 1;
    }

    /// Samples counted in the average
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn mean(&self) -> Option<PlayerStats> {
        if self.samples == 0 {
            None
        } else {
            Some(self.totals.divided_by(self.samples as f64))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub account_id: AccountId,
    pub name: String,
    pub side: Side,
    pub hero: Hero,
    pub stats: PlayerStats,
    /// Samples behind `stats`
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub id: i64,
    pub side: Side,
    pub players: Vec<Player>,
}

impl Team {
    pub fn new(name: impl Into<String>, id: i64, side: Side) -> Self {
        Team {
            name: name.into(),
            id,
            side,
            players: Vec::with_capacity(ROSTER_SIZE),
        }
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.push(player);
    }

    pub fn is_complete(&self) -> bool {
        self.players.len() == ROSTER_SIZE
    }

    pub fn hero_ids(&self) -> Vec<HeroId> {
        self.players.iter().map(|p| p.hero.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub league_id: i64,
    pub radiant: Team,
    pub dire: Team,
    /// Unknown until the match resolves
    pub radiant_win: Option<bool>,
}

impl Match {
    /// Assemble a match; both teams must be complete
    pub fn new(id: MatchId, league_id: i64, radiant: Team, dire: Team) -> Result<Self> {
        if !radiant.is_complete() || !dire.is_complete() {
            return Err(DotaError::InvalidRosterSize {
                match_id: id,
                radiant: radiant.players.len(),
                dire: dire.players.len(),
            });
        }
        Ok(Match {
            id,
            league_id,
            radiant,
            dire,
            radiant_win: None,
        })
    }

    pub fn with_outcome(mut self, radiant_win: Option<bool>) -> Self {
        self.radiant_win = radiant_win;
        self
    }

    pub fn team(&self, side: Side) -> &Team {
        match side {
            Side::Radiant => &self.radiant,
            Side::Dire => &self.dire,
        }
    }

    pub fn team_mut(&mut self, side: Side) -> &mut Team {
        match side {
            Side::Radiant => &mut self.radiant,
            Side::Dire => &mut self.dire,
        }
    }

    /// Mean counter-pick win rate of `side`'s heroes against the opposing
    /// heroes, over the pairs that have matchup data
    pub fn counter_pick_edge(&self, side: Side) -> Option<f64> {
        let opponents = self.team(side.opponent()).hero_ids();
        let rates: Vec<f64> = self
            .team(side)
            .players
            .iter()
            .flat_map(|p| {
                opponents
                    .iter()
                    .filter_map(move |opp| p.hero.counter_pick_win_rate(*opp))
            })
            .collect();
        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        }
    }

    /// Fewest samples behind any player's stats
    pub fn min_samples(&self) -> usize {
        self.radiant
            .players
            .iter()
            .chain(&self.dire.players)
            .map(|p| p.samples)
            .min()
            .unwrap_or(0)
    }

    /// Class label, if the outcome is known
    pub fn label(&self) -> Option<u8> {
        self.radiant_win
            .map(|w| if w { crate::RADIANT_WIN } else { crate::DIRE_WIN })
    }
}

/// One active roster slot of a payload, before player stats are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct RosterSlot {
    pub account_id: AccountId,
    pub name: String,
    pub hero_id: HeroId,
    pub side: Side,
    /// Stats carried by the payload itself (match details only)
    pub stats: Option<PlayerStats>,
}

/// Team and player identity read from a payload
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRoster {
    pub match_id: MatchId,
    pub league_id: i64,
    pub league_name: String,
    pub radiant_name: String,
    pub radiant_id: i64,
    pub dire_name: String,
    pub dire_id: i64,
    pub slots: Vec<RosterSlot>,
    pub radiant_win: Option<bool>,
}

impl MatchRoster {
    /// Roster of a live league game; `None` when either team is missing
    pub fn from_live_game(game: &LiveGamePayload) -> Option<Self> {
        let radiant = game.radiant_team.as_ref()?;
        let dire = game.dire_team.as_ref()?;

        let slots = game
            .players
            .iter()
            .filter_map(|p| {
                let side = match p.team {
                    Some(0) => Side::Radiant,
                    Some(1) => Side::Dire,
                    _ => return None,
                };
                Some(RosterSlot {
                    account_id: AccountId(p.account_id?),
                    name: p.name.clone().unwrap_or_else(|| "Unknown".to_string()),
                    hero_id: HeroId(p.hero_id),
                    side,
                    stats: None,
                })
            })
            .collect();

        Some(MatchRoster {
            match_id: MatchId(game.match_id),
            league_id: game.league_id,
            league_name: game
                .league_name
                .clone()
                .unwrap_or_else(|| "Unknown Tournament".to_string()),
            radiant_name: radiant.team_name.clone().unwrap_or_else(|| "Unknown".to_string()),
            radiant_id: radiant.team_id.unwrap_or(0),
            dire_name: dire.team_name.clone().unwrap_or_else(|| "Unknown".to_string()),
            dire_id: dire.team_id.unwrap_or(0),
            slots,
            radiant_win: None,
        })
    }

    /// Roster of a match details payload, including per-player stats
    pub fn from_details(details: &MatchDetailsPayload) -> Self {
        let slots = details
            .players
            .iter()
            .filter_map(|entry| {
                let identity: MatchPlayerIdentity = serde_json::from_value(entry.clone()).ok()?;
                let stats = serde_json::from_value::<PlayerStats>(entry.clone()).ok();
                Some(RosterSlot {
                    account_id: AccountId(identity.account_id.unwrap_or(0)),
                    name: identity.display_name(),
                    hero_id: HeroId(identity.hero_id),
                    side: if identity.radiant() {
                        Side::Radiant
                    } else {
                        Side::Dire
                    },
                    stats,
                })
            })
            .collect();

        MatchRoster {
            match_id: MatchId(details.match_id),
            league_id: details.leagueid.unwrap_or(0),
            league_name: "Unknown Tournament".to_string(),
            radiant_name: details.radiant_name.clone().unwrap_or_else(|| "Radiant".to_string()),
            radiant_id: details.radiant_team_id.unwrap_or(0),
            dire_name: details.dire_name.clone().unwrap_or_else(|| "Dire".to_string()),
            dire_id: details.dire_team_id.unwrap_or(0),
            slots,
            radiant_win: details.radiant_win,
        }
    }

    pub fn side_slots(&self, side: Side) -> impl Iterator<Item = &RosterSlot> {
        self.slots.iter().filter(move |s| s.side == side)
    }

    /// Admission check: five slots per side and every hero picked
    pub fn validate(&self) -> Result<()> {
        let radiant = self.side_slots(Side::Radiant).count();
        let dire = self.side_slots(Side::Dire).count();
        if radiant != ROSTER_SIZE || dire != ROSTER_SIZE {
            return Err(DotaError::InvalidRosterSize {
                match_id: self.match_id,
                radiant,
                dire,
            });
        }
        if self.slots.iter().any(|s| !s.hero_id.is_picked()) {
            return Err(DotaError::UnresolvedPick {
                match_id: self.match_id,
            });
        }
        Ok(())
    }
}

/// Live matches grouped by league
#[derive(Debug, Clone)]
pub struct Tournament {
    pub league_id: i64,
    pub name: String,
    pub matches: Vec<MatchRoster>,
}

/// Group rosters by league, keeping first-seen order
pub fn group_by_league(rosters: Vec<MatchRoster>) -> Vec<Tournament> {
    let mut tournaments: Vec<Tournament> = Vec::new();
    for roster in rosters {
        match tournaments.iter_mut().find(|t| t.league_id == roster.league_id) {
            Some(t) => t.matches.push(roster),
            None => tournaments.push(Tournament {
                league_id: roster.league_id,
                name: roster.league_name.clone(),
                matches: vec![roster],
            }),
        }
    }
    tournaments
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn stats(kills: f64, deaths: f64, assists: f64) -> PlayerStats {
        PlayerStats {
            kills,
            deaths,
            assists,
            gold_per_min: 500.0,
            xp_per_min: 450.0,
            net_worth: 12000.0,
            obs_placed: 3.0,
            sen_placed: 2.0,
            roshans_killed: 0.0,
            last_hits: 150.0,
            denies: 10.0,
            level: 20.0,
            hero_damage: 15000.0,
            tower_damage: 2000.0,
            hero_healing: 500.0,
            teamfight_participation: 0.6,
        }
    }

    pub fn player(account: i64, side: Side, hero_win_rate: f64, stats: PlayerStats) -> Player {
        Player {
            account_id: AccountId(account),
            name: format!("Player{}", account),
            side,
            hero: Hero {
                id: HeroId(account),
                name: format!("Hero{}", account),
                win_rate: hero_win_rate,
                counter_picks: Vec::new(),
            },
            stats,
            samples: 1,
        }
    }

    pub fn team(side: Side, kills: [f64; 5]) -> Team {
        let mut team = Team::new(format!("{} Team", side), 100, side);
        let offset = if side == Side::Radiant { 0 } else { 10 };
        for (i, k) in kills.iter().enumerate() {
            team.add_player(player(
                offset + i as i64 + 1,
                side,
                0.5,
                stats(*k, 2.0, 5.0),
            ));
        }
        team
    }

    pub fn sample_match(id: i64, radiant_kills: [f64; 5], dire_kills: [f64; 5]) -> Match {
        Match::new(
            MatchId(id),
            1,
            team(Side::Radiant, radiant_kills),
            team(Side::Dire, dire_kills),
        )
        .unwrap()
    }
}
