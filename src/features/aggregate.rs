//! Team aggregation
//!
//! Reduces the five players of each side to one `TeamFeatures` record.
//! Identity (names, account, hero, match and team ids) never reaches the
//! output.

use crate::data::entities::{Match, PlayerStats, Team};

use super::schema::{FeatureVector, TeamFeatures};

/// (avg_kills + avg_assists) / max(avg_deaths, 1)
pub fn kda(avg_kills: f32, avg_assists: f32, avg_deaths: f32) -> f32 {
    (avg_kills + avg_assists) / avg_deaths.max(1.0)
}

fn mean_of(team: &Team, stat: impl Fn(&PlayerStats) -> f64) -> f32 {
    if team.players.is_empty() {
        return 0.0;
    }
    let total: f64 = team.players.iter().map(|p| stat(&p.stats)).sum();
    (total / team.players.len() as f64) as f32
}

fn sum_of(team: &Team, stat: impl Fn(&PlayerStats) -> f64) -> f32 {
    team.players.iter().map(|p| stat(&p.stats)).sum::<f64>() as f32
}

pub fn team_features(team: &Team) -> TeamFeatures {
    let avg_hero_winrate = if team.players.is_empty() {
        0.0
    } else {
        (team.players.iter().map(|p| p.hero.win_rate).sum::<f64>() / team.players.len() as f64)
            as f32
    };
    let avg_kills = mean_of(team, |s| s.kills);
    let avg_deaths = mean_of(team, |s| s.deaths);
    let avg_assists = mean_of(team, |s| s.assists);

    TeamFeatures {
        avg_hero_winrate,
        avg_kills,
        avg_deaths,
        avg_assists,
        avg_gpm: mean_of(team, |s| s.gold_per_min),
        avg_xpm: mean_of(team, |s| s.xp_per_min),
        avg_net_worth: mean_of(team, |s| s.net_worth),
        avg_player_level: mean_of(team, |s| s.level),
        avg_hero_damage: mean_of(team, |s| s.hero_damage),
        avg_roshans_killed: mean_of(team, |s| s.roshans_killed),
        avg_last_hits: mean_of(team, |s| s.last_hits),
        avg_denies: mean_of(team, |s| s.denies),
        sum_obs: sum_of(team, |s| s.obs_placed),
        sum_sen: sum_of(team, |s| s.sen_placed),
        avg_teamfight_participation: mean_of(team, |s| s.teamfight_participation),
        kda: kda(avg_kills, avg_assists, avg_deaths),
    }
}

/// Unscaled feature vector of a match
pub fn aggregate(m: &Match) -> FeatureVector {
    FeatureVector {
        radiant: team_features(&m.radiant),
        dire: team_features(&m.dire),
    }
}
