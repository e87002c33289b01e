//! Apex ladder retrieval.

use std::cmp::Reverse;

use riven::models::league_v4::LeagueItem;

use crate::backoff::BackoffExecutor;
use crate::config::PipelineConfig;
use crate::model::{now_millis, ApexTier, LadderEntry, LadderHistoryEntry};
use crate::rate_gate::Sleeper;
use crate::riot::Upstream;
use crate::store::{Collection, Store};
use crate::{Error, Result};

/// Convert one upstream item. `None` if it carries no summoner ID.
fn ladder_entry(tier: ApexTier, item: LeagueItem) -> Result<Option<LadderEntry>> {
    let Some(summoner_id) = item.summoner_id else {
        return Ok(None);
    };
    let count = |name: &str, n: i32| {
        u32::try_from(n).map_err(|_| {
            Error::DataShape(format!("summoner `{}` has negative {}: {}", summoner_id, name, n))
        })
    };
    Ok(Some(LadderEntry {
        tier,
        league_points: count("league points", item.league_points)?,
        wins: count("wins", item.wins)?,
        losses: count("losses", item.losses)?,
        summoner_id,
    }))
}

/// Fetches the three apex tiers and merges them into one ranked list.
pub struct LadderFetcher<'a, U, Sl> {
    upstream: &'a U,
    executor: BackoffExecutor<Sl>,
    queue: String,
}

impl<'a, U: Upstream, Sl: Sleeper> LadderFetcher<'a, U, Sl> {
    /// Create.
    pub fn new(upstream: &'a U, config: &PipelineConfig, sleeper: Sl) -> Self {
        Self {
            upstream,
            executor: BackoffExecutor::new(config.backoff(), sleeper),
            queue: config.ladder_queue.clone(),
        }
    }

    /// All apex entries sorted by league points, highest first. Ties keep tier order, then
    /// upstream order. Any tier failing fails the whole fetch; partial ladders are never returned.
    pub async fn fetch(&self) -> Result<Vec<LadderEntry>> {
        let mut merged = Vec::new();
        for tier in ApexTier::ALL {
            let label = format!("league-v4 {:?} {}", tier, self.queue);
            let list = self
                .executor
                .execute(&label, || self.upstream.league_by_tier(tier, &self.queue))
                .await?;
            log::info!("Fetched {} {:?} entries.", list.entries.len(), tier);
            for item in list.entries {
                match ladder_entry(tier, item)? {
                    Some(entry) => merged.push(entry),
                    None => log::warn!("Skipping a {:?} entry without a summoner ID.", tier),
                }
            }
        }
        merged.sort_by_key(|entry| Reverse(entry.league_points));
        Ok(merged)
    }

    /// [`Self::fetch`], then replace the ladder snapshot and append to the ladder history.
    pub async fn fetch_and_store(&self, store: &impl Store) -> Result<Vec<LadderEntry>> {
        let ladder = self.fetch().await?;
        store.replace_all(Collection::Ladder, &ladder).await?;

        let fetched_at = now_millis();
        let history = ladder
            .iter()
            .cloned()
            .map(|entry| LadderHistoryEntry::new(entry, fetched_at))
            .collect::<Vec<_>>();
        store.insert(Collection::LadderHistory, &history).await?;
        log::info!("Stored ladder of {} entries.", ladder.len());
        Ok(ladder)
    }
}
