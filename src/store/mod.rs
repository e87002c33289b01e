//! Narrow document-store interface the pipeline persists through.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

mod memory;
pub mod query;

pub use memory::MemStore;
pub use query::{Accumulator, Filter, Order, Query, Sort, Stage};

/// The collections the pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Latest merged apex ladder. Replaced wholesale each run.
    Ladder,
    /// Every ladder entry ever fetched, stamped with its fetch time.
    LadderHistory,
    /// [`crate::model::PlayerIdentity`], append only.
    PlayerIds,
    /// [`crate::model::MatchId`], replaced wholesale each run.
    MatchIds,
    /// [`crate::model::ProcessedMarker`] checkpoints.
    ProcessedMatchIds,
    /// Raw match-v5 payloads.
    MatchDetails,
    /// [`crate::stats::PlayerMatchStats`].
    PlayerMatchStats,
    /// [`crate::stats::PlayerSummary`].
    PlayerSummaries,
}

impl Collection {
    /// All collections.
    pub const ALL: [Self; 8] = [
        Self::Ladder,
        Self::LadderHistory,
        Self::PlayerIds,
        Self::MatchIds,
        Self::ProcessedMatchIds,
        Self::MatchDetails,
        Self::PlayerMatchStats,
        Self::PlayerSummaries,
    ];

    /// Storage name (table or collection).
    pub fn name(self) -> &'static str {
        match self {
            Self::Ladder => "league",
            Self::LadderHistory => "league_history",
            Self::PlayerIds => "player_ids",
            Self::MatchIds => "match_id",
            Self::ProcessedMatchIds => "processed_match_id",
            Self::MatchDetails => "match_detail",
            Self::PlayerMatchStats => "player_matches_stats",
            Self::PlayerSummaries => "player_summarized_stats",
        }
    }

    /// Path of the unique key, if documents are keyed. Inserts into keyed collections upsert.
    pub fn key_path(self) -> Option<&'static str> {
        match self {
            Self::Ladder | Self::LadderHistory => None,
            Self::PlayerIds => Some("summonerId"),
            Self::MatchIds | Self::ProcessedMatchIds => Some("match_id"),
            Self::MatchDetails => Some("metadata.matchId"),
            Self::PlayerMatchStats => Some("key"),
            Self::PlayerSummaries => Some("_id"),
        }
    }

    /// Extract the key from a document. `Ok(None)` for unkeyed collections.
    pub fn key_of(self, doc: &Value) -> Result<Option<String>> {
        let Some(path) = self.key_path() else {
            return Ok(None);
        };
        match query::lookup(doc, path) {
            Some(Value::String(key)) => Ok(Some(key.clone())),
            Some(Value::Null) | None => Err(Error::Persistence(format!(
                "document for `{}` is missing key `{}`",
                self.name(),
                path
            ))),
            Some(other) => Ok(Some(other.to_string())),
        }
    }
}

/// Document store. Single threaded, writes are visible to the next read.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Find documents.
    async fn get<T: DeserializeOwned>(&self, collection: Collection, query: &Query)
        -> Result<Vec<T>>;

    /// Run a multi-stage aggregation.
    async fn get_aggregate<T: DeserializeOwned>(
        &self,
        collection: Collection,
        pipeline: &[Stage],
    ) -> Result<Vec<T>>;

    /// Insert documents, upserting by key in keyed collections. Returns how many were written.
    async fn insert<T: Serialize>(&self, collection: Collection, docs: &[T]) -> Result<usize>;

    /// Atomically replace the whole collection with `docs`.
    async fn replace_all<T: Serialize>(&self, collection: Collection, docs: &[T]) -> Result<()>;

    /// Delete matching documents. Returns how many were deleted.
    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64>;
}

/// Serialize documents for storage.
pub fn to_documents<T: Serialize>(docs: &[T]) -> Result<Vec<Value>> {
    docs.iter()
        .map(|doc| serde_json::to_value(doc).map_err(|e| Error::Persistence(e.to_string())))
        .collect()
}

/// Deserialize stored documents.
pub fn from_documents<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(Error::from))
        .collect()
}

/// Project a single string field out of every document, skipping documents without it.
pub async fn get_strings(
    store: &impl Store,
    collection: Collection,
    filter: Option<Filter>,
    path: &str,
) -> Result<Vec<String>> {
    let query = Query {
        filter,
        projection: Some(vec![path.to_owned()]),
        ..Query::all()
    };
    let docs: Vec<Value> = store.get(collection, &query).await?;
    Ok(docs
        .iter()
        .filter_map(|doc| query::lookup(doc, path)?.as_str().map(str::to_owned))
        .collect())
}
