//! Upstream telemetry source
//!
//! OpenDota serves hero, player and match statistics; live league games come
//! from the Steam Web API.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::{AccountId, DotaError, FetchConfig, HeroId, MatchId, Result};

/// A single upstream endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    HeroStats,
    HeroMatchups(HeroId),
    PlayerRecentMatches {
        account: AccountId,
        hero: HeroId,
        limit: usize,
    },
    PlayerTotals {
        account: AccountId,
        hero: HeroId,
        limit: usize,
    },
    MatchDetails(MatchId),
    LeagueMatches(i64),
    Leagues,
    LiveLeagueGames,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::HeroStats => write!(f, "heroStats"),
            Resource::HeroMatchups(hero) => write!(f, "heroes/{}/matchups", hero.0),
            Resource::PlayerRecentMatches { account, hero, .. } => {
                write!(f, "players/{}/matches?hero_id={}", account.0, hero.0)
            }
            Resource::PlayerTotals { account, hero, .. } => {
                write!(f, "players/{}/totals?hero_id={}", account.0, hero.0)
            }
            Resource::MatchDetails(id) => write!(f, "matches/{}", id.0),
            Resource::LeagueMatches(league) => write!(f, "leagues/{}/matches", league),
            Resource::Leagues => write!(f, "leagues"),
            Resource::LiveLeagueGames => write!(f, "GetLiveLeagueGames"),
        }
    }
}

/// Read-only access to raw telemetry payloads
pub trait TelemetrySource: Send + Sync {
    fn get(&self, resource: &Resource) -> Result<Value>;
}

/// HTTP client for OpenDota and the Steam Web API
pub struct OpenDotaClient {
    client: reqwest::blocking::Client,
    opendota_url: String,
    steam_url: String,
    opendota_key: Option<String>,
    steam_api_key: Option<String>,
}

impl OpenDotaClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("dotaml/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenDotaClient {
            client,
            opendota_url: config.opendota_url.trim_end_matches('/').to_string(),
            steam_url: config.steam_url.trim_end_matches('/').to_string(),
            opendota_key: config.opendota_key.clone(),
            steam_api_key: config.steam_api_key.clone(),
        })
    }

    /// URL and query parameters for a resource
    fn request_parts(&self, resource: &Resource) -> (String, Vec<(&'static str, String)>) {
        let mut query = Vec::new();
        let url = match resource {
            Resource::LiveLeagueGames => {
                if let Some(key) = &self.steam_api_key {
                    query.push(("key", key.clone()));
                }
                return (
                    format!("{}/IDOTA2Match_570/GetLiveLeagueGames/v1/", self.steam_url),
                    query,
                );
            }
            Resource::HeroStats => format!("{}/heroStats", self.opendota_url),
            Resource::HeroMatchups(hero) => {
                format!("{}/heroes/{}/matchups", self.opendota_url, hero.0)
            }
            Resource::PlayerRecentMatches {
                account,
                hero,
                limit,
            } => {
                query.push(("hero_id", hero.0.to_string()));
                query.push(("limit", limit.to_string()));
                format!("{}/players/{}/matches", self.opendota_url, account.0)
            }
            Resource::PlayerTotals {
                account,
                hero,
                limit,
            } => {
                query.push(("hero_id", hero.0.to_string()));
                query.push(("limit", limit.to_string()));
                format!("{}/players/{}/totals", self.opendota_url, account.0)
            }
            Resource::MatchDetails(id) => format!("{}/matches/{}", self.opendota_url, id.0),
            Resource::LeagueMatches(league) => {
                format!("{}/leagues/{}/matches", self.opendota_url, league)
            }
            Resource::Leagues => format!("{}/leagues", self.opendota_url),
        };
        if let Some(key) = &self.opendota_key {
            query.push(("api_key", key.clone()));
        }
        (url, query)
    }
}

impl TelemetrySource for OpenDotaClient {
    fn get(&self, resource: &Resource) -> Result<Value> {
        let (url, query) = self.request_parts(resource);
        log::debug!("Fetching {}", resource);

        let response = self.client.get(&url).query(&query).send()?;
        if !response.status().is_success() {
            return Err(DotaError::Upstream {
                status: response.status().as_u16(),
                resource: resource.to_string(),
            });
        }
        Ok(response.json()?)
    }
}

/// Decode a payload into a typed structure
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

// ==================== Payloads ====================

#[derive(Debug, Clone, Deserialize)]
pub struct HeroStatPayload {
    pub id: i64,
    pub localized_name: String,
    #[serde(default)]
    pub pro_win: Option<u64>,
    #[serde(default)]
    pub pro_pick: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeroMatchupPayload {
    pub hero_id: i64,
    pub games_played: u64,
    pub wins: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentMatchPayload {
    pub match_id: i64,
}

/// One aggregated field from the player totals endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TotalsFieldPayload {
    pub field: String,
    pub n: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchDetailsPayload {
    pub match_id: i64,
    #[serde(default)]
    pub leagueid: Option<i64>,
    #[serde(default)]
    pub radiant_win: Option<bool>,
    #[serde(default)]
    pub radiant_name: Option<String>,
    #[serde(default)]
    pub radiant_team_id: Option<i64>,
    #[serde(default)]
    pub dire_name: Option<String>,
    #[serde(default)]
    pub dire_team_id: Option<i64>,
    /// Raw player entries; per-player stats are decoded separately
    #[serde(default)]
    pub players: Vec<Value>,
}

/// Identity fields of a player entry in a match details payload
#[derive(Debug, Clone, Deserialize)]
pub struct MatchPlayerIdentity {
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub personaname: Option<String>,
    #[serde(default)]
    pub hero_id: i64,
    #[serde(rename = "isRadiant", default)]
    pub is_radiant: Option<bool>,
    #[serde(default)]
    pub player_slot: Option<u32>,
}

impl MatchPlayerIdentity {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.personaname.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Radiant occupies player slots 0-127
    pub fn radiant(&self) -> bool {
        match (self.is_radiant, self.player_slot) {
            (Some(flag), _) => flag,
            (None, Some(slot)) => slot < 128,
            (None, None) => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueMatchPayload {
    pub match_id: i64,
    #[serde(default)]
    pub radiant_win: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaguePayload {
    pub leagueid: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveGamesEnvelope {
    #[serde(default)]
    pub result: LiveGamesResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveGamesResult {
    /// Decoded one game at a time so a malformed game only loses itself
    #[serde(default)]
    pub games: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveGamePayload {
    pub match_id: i64,
    #[serde(default)]
    pub league_id: i64,
    #[serde(default)]
    pub league_name: Option<String>,
    #[serde(default)]
    pub radiant_team: Option<LiveTeamPayload>,
    #[serde(default)]
    pub dire_team: Option<LiveTeamPayload>,
    #[serde(default)]
    pub players: Vec<LivePlayerPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveTeamPayload {
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivePlayerPayload {
    /// Absent or null for some caster and observer slots
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hero_id: i64,
    /// 0 = radiant, 1 = dire, anything else is a caster or observer slot
    #[serde(default)]
    pub team: Option<i64>,
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parts_use_keys_per_api() {
        let mut config = crate::Config::default().fetch;
        config.opendota_key = Some("od".to_string());
        config.steam_api_key = Some("steam".to_string());
        let client = OpenDotaClient::new(&config).unwrap();

        let (url, query) = client.request_parts(&Resource::LiveLeagueGames);
        assert!(url.ends_with("/IDOTA2Match_570/GetLiveLeagueGames/v1/"));
        assert_eq!(query, vec![("key", "steam".to_string())]);

        let (url, query) = client.request_parts(&Resource::PlayerTotals {
            account: AccountId(7),
            hero: HeroId(1),
            limit: 30,
        });
        assert_eq!(url, "https://api.opendota.com/api/players/7/totals");
        assert!(query.contains(&("hero_id", "1".to_string())));
        assert!(query.contains(&("api_key", "od".to_string())));
    }

    #[test]
    fn test_player_identity_side() {
        let by_flag: MatchPlayerIdentity =
            decode(json!({"account_id": 1, "hero_id": 5, "isRadiant": false})).unwrap();
        assert!(!by_flag.radiant());

        let by_slot: MatchPlayerIdentity =
            decode(json!({"account_id": 1, "hero_id": 5, "player_slot": 3, "personaname": "x"}))
                .unwrap();
        assert!(by_slot.radiant());
        assert_eq!(by_slot.display_name(), "x");
    }

    #[test]
    fn test_live_games_envelope_tolerates_missing_fields() {
        let envelope: LiveGamesEnvelope = decode(json!({"result": {}})).unwrap();
        assert!(envelope.result.games.is_empty());
    }
}
