//! Records stored by the pipeline. Field names match the stored documents.

use serde::Deserialize;
use serde_json::Value;
use web_time::SystemTime;

use crate::store::query::lookup;
use crate::{Error, Result};

/// Participants in every match the pipeline ingests (ranked 5v5).
pub const PARTICIPANTS_PER_MATCH: usize = 10;

/// Current time as unix epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::UNIX_EPOCH
        .elapsed()
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// One of the three apex ladder tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApexTier {
    /// Top 300.
    Challenger,
    /// Next 700.
    Grandmaster,
    /// Everyone else above diamond.
    Master,
}
impl ApexTier {
    /// Fetch and merge order. Equal league points keep this order.
    pub const ALL: [Self; 3] = [Self::Challenger, Self::Grandmaster, Self::Master];
}

/// A ranked ladder entry, tagged with its tier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LadderEntry {
    /// Source tier.
    pub tier: ApexTier,
    /// Encrypted summoner ID.
    pub summoner_id: String,
    /// League points.
    pub league_points: u32,
    /// Ranked wins this season.
    pub wins: u32,
    /// Ranked losses this season.
    pub losses: u32,
}
impl LadderEntry {
    /// Wins plus losses.
    pub fn total_games(&self) -> u32 {
        self.wins + self.losses
    }

    /// Win percentage, `0.0` with no games played.
    pub fn win_rate(&self) -> f64 {
        match self.total_games() {
            0 => 0.0,
            total => 100.0 * self.wins as f64 / total as f64,
        }
    }
}

/// A [`LadderEntry`] as appended to the ladder history.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LadderHistoryEntry {
    /// The entry.
    #[serde(flatten)]
    pub entry: LadderEntry,
    /// [`LadderEntry::total_games`].
    pub total_games: u32,
    /// [`LadderEntry::win_rate`].
    pub win_rate: f64,
    /// Fetch time (unix epoch milliseconds).
    pub fetched_at: i64,
}
impl LadderHistoryEntry {
    /// Stamp `entry` with `fetched_at`.
    pub fn new(entry: LadderEntry, fetched_at: i64) -> Self {
        Self {
            total_games: entry.total_games(),
            win_rate: entry.win_rate(),
            entry,
            fetched_at,
        }
    }
}

/// Durable identifiers for a player, written once when first seen.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    /// Encrypted summoner ID (unique key).
    pub summoner_id: String,
    /// Riot PUUID (player universally unique ID).
    pub puuid: String,
    /// Encrypted account ID.
    pub account_id: String,
    /// Profile icon.
    pub profile_icon_id: i32,
    /// Riot ID game username (`game_name#tag_line`).
    pub game_name: Option<String>,
    /// Riot ID tag line (`game_name#tag_line`).
    pub tag_line: Option<String>,
    /// Last summoner change (unix epoch milliseconds).
    pub revision_date: i64,
}

/// A known match.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MatchId {
    /// Match-v5 ID, e.g. `NA1_5018289177`.
    pub match_id: String,
    /// When the pipeline first saw it (unix epoch milliseconds).
    pub discovered_at: i64,
}

/// Checkpoint: the match's detail has been fetched and stored.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessedMarker {
    /// FK [`MatchId::match_id`].
    pub match_id: String,
    /// `true` once the detail was stored. `false` for a match whose payload was rejected,
    /// which is then no longer fetched.
    pub processed_with_api_call: bool,
}
impl ProcessedMarker {
    /// Marker for a stored match.
    pub fn processed(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            processed_with_api_call: true,
        }
    }

    /// Marker for a match whose payload was rejected.
    pub fn rejected(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            processed_with_api_call: false,
        }
    }
}

/// The `metadata` block of a match-v5 payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    /// Match ID.
    pub match_id: String,
    /// Participant PUUIDs, in participant order.
    pub participants: Vec<String>,
}

/// Per-participant fields the derived stats consume.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Player.
    pub puuid: String,
    /// Kills.
    pub kills: u32,
    /// Deaths.
    pub deaths: u32,
    /// Assists.
    pub assists: u32,
    /// Champion name, e.g. `MonkeyKing`.
    pub champion_name: String,
    /// Champion ID.
    pub champion_id: i32,
    /// `TOP`, `JUNGLE`, `MIDDLE`, `BOTTOM`, `UTILITY`, or empty.
    pub team_position: String,
    /// If this participant's team won.
    pub win: bool,
}

/// A match-v5 payload, validated at the ingestion boundary.
///
/// Only the metadata is checked eagerly; participant rows are parsed on demand so one odd row
/// does not reject the whole match. The full payload is kept as-is for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDetail {
    /// Parsed `metadata`.
    pub metadata: MatchMetadata,
    /// `info.gameEndTimestamp`, absent on old payloads.
    pub game_end_timestamp: Option<i64>,
    /// The raw payload.
    pub payload: Value,
}

impl MatchDetail {
    /// Validate a raw payload.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let metadata: MatchMetadata = lookup(&payload, "metadata")
            .ok_or_else(|| Error::DataShape("match payload has no `metadata`".into()))
            .and_then(|metadata| Ok(MatchMetadata::deserialize(metadata)?))?;
        if PARTICIPANTS_PER_MATCH != metadata.participants.len() {
            return Err(Error::DataShape(format!(
                "match `{}` has {} participants, expected {}",
                metadata.match_id,
                metadata.participants.len(),
                PARTICIPANTS_PER_MATCH
            )));
        }
        let info_participants = lookup(&payload, "info.participants")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if PARTICIPANTS_PER_MATCH != info_participants {
            return Err(Error::DataShape(format!(
                "match `{}` has {} participant rows, expected {}",
                metadata.match_id, info_participants, PARTICIPANTS_PER_MATCH
            )));
        }
        let game_end_timestamp = lookup(&payload, "info.gameEndTimestamp").and_then(Value::as_i64);
        Ok(Self {
            metadata,
            game_end_timestamp,
            payload,
        })
    }

    /// Match ID.
    pub fn match_id(&self) -> &str {
        &self.metadata.match_id
    }

    /// Index of `puuid` among the participants.
    pub fn participant_index(&self, puuid: &str) -> Option<usize> {
        self.metadata.participants.iter().position(|p| p == puuid)
    }

    /// Parse participant row `index`.
    pub fn participant(&self, index: usize) -> Result<Participant> {
        let row = lookup(&self.payload, "info.participants")
            .and_then(|rows| rows.get(index))
            .ok_or_else(|| {
                Error::DataShape(format!(
                    "match `{}` has no participant {}",
                    self.match_id(),
                    index
                ))
            })?;
        Ok(Participant::deserialize(row)?)
    }
}
