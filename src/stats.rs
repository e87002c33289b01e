//! Per-player stats derived from stored match details.

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::Value;

use crate::model::MatchDetail;
use crate::store::{get_strings, Accumulator, Collection, Query, Sort, Stage, Store};
use crate::Result;

/// One player's line in one match.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlayerMatchStats {
    /// `<puuid>:<match_id>`.
    pub key: String,
    /// Match ID.
    pub match_id: String,
    /// Index among the match's participants.
    pub player_index: usize,
    /// Player.
    pub puuid: String,
    /// Kills.
    pub kills: u32,
    /// Deaths.
    pub deaths: u32,
    /// Assists.
    pub assists: u32,
    /// Champion name.
    pub champion_name: String,
    /// Champion ID.
    pub champion_id: i32,
    /// Lane or role, may be empty.
    pub team_position: String,
    /// Won.
    pub win: bool,
}

impl PlayerMatchStats {
    /// `puuid`'s row in `detail`, or `None` (logged) if they are not in it or the row is bad.
    pub fn from_detail(detail: &MatchDetail, puuid: &str) -> Option<Self> {
        let player_index = detail.participant_index(puuid)?;
        let participant = match detail.participant(player_index) {
            Ok(participant) => participant,
            Err(e) => {
                log::warn!("Skipping `{}` in match `{}`: {}.", puuid, detail.match_id(), e);
                return None;
            }
        };
        Some(Self {
            key: format!("{}:{}", puuid, detail.match_id()),
            match_id: detail.match_id().to_owned(),
            player_index,
            puuid: puuid.to_owned(),
            kills: participant.kills,
            deaths: participant.deaths,
            assists: participant.assists,
            champion_name: participant.champion_name,
            champion_id: participant.champion_id,
            team_position: participant.team_position,
            win: participant.win,
        })
    }
}

/// Averages over all of a player's stored matches.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlayerSummary {
    /// Player.
    #[serde(rename = "_id")]
    pub puuid: String,
    /// Mean kills.
    pub average_kills: f64,
    /// Mean deaths.
    pub average_deaths: f64,
    /// Mean assists.
    pub average_assists: f64,
    /// Matches counted.
    pub match_count: usize,
    /// Fraction of matches won, `0.0` to `1.0`.
    pub average_win_rate: f64,
}

/// Rebuild every stored player's match history, most recent match first.
/// Returns the number of rows written.
///
/// Reads the stored details once and buckets rows by player, so the cost does not grow with
/// the number of players.
pub async fn update_player_match_history(store: &impl Store) -> Result<usize> {
    let puuids = get_strings(store, Collection::PlayerIds, None, "puuid").await?;
    let mut histories = puuids
        .iter()
        .map(|puuid| (puuid.as_str(), Vec::new()))
        .collect::<HashMap<_, Vec<PlayerMatchStats>>>();

    let query = Query::all()
        .sort(Sort::desc("info.gameEndTimestamp"))
        .project(["metadata", "info.gameEndTimestamp", "info.participants"]);
    let payloads: Vec<Value> = store.get(Collection::MatchDetails, &query).await?;
    for payload in payloads {
        let detail = match MatchDetail::from_payload(payload) {
            Ok(detail) => detail,
            Err(e) => {
                log::warn!("Skipping stored match: {}.", e);
                continue;
            }
        };
        for puuid in &detail.metadata.participants {
            if let Some(history) = histories.get_mut(puuid.as_str()) {
                history.extend(PlayerMatchStats::from_detail(&detail, puuid));
            }
        }
    }

    let rows = puuids
        .iter()
        .unique()
        .flat_map(|puuid| histories.remove(puuid.as_str()).unwrap_or_default())
        .collect::<Vec<_>>();
    store.replace_all(Collection::PlayerMatchStats, &rows).await?;
    log::info!(
        "Stored {} match history rows for {} players.",
        rows.len(),
        puuids.len()
    );
    Ok(rows.len())
}

/// Rebuild the per-player summaries from the match history. Returns the summaries written.
pub async fn update_player_summaries(store: &impl Store) -> Result<Vec<PlayerSummary>> {
    let pipeline = [Stage::Group {
        by: "puuid".to_owned(),
        accumulators: vec![
            ("average_kills".to_owned(), Accumulator::Avg("kills".to_owned())),
            ("average_deaths".to_owned(), Accumulator::Avg("deaths".to_owned())),
            ("average_assists".to_owned(), Accumulator::Avg("assists".to_owned())),
            ("match_count".to_owned(), Accumulator::Count),
            ("average_win_rate".to_owned(), Accumulator::Avg("win".to_owned())),
        ],
    }];
    let summaries: Vec<PlayerSummary> = store
        .get_aggregate(Collection::PlayerMatchStats, &pipeline)
        .await?;
    store
        .replace_all(Collection::PlayerSummaries, &summaries)
        .await?;
    log::info!("Stored {} player summaries.", summaries.len());
    Ok(summaries)
}
