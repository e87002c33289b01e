//! Paginated match-id history collection.

use std::collections::HashSet;

use itertools::Itertools;

use crate::backoff::BackoffExecutor;
use crate::config::PipelineConfig;
use crate::model::{now_millis, MatchId};
use crate::rate_gate::{RateGate, Sleeper};
use crate::riot::Upstream;
use crate::store::{get_strings, Collection, Query, Store};
use crate::Result;

/// Pages through each player's match history up to a hard per-player cap.
///
/// The cap is strict: each page asks for at most the ids still allowed and anything returned
/// past the cap is dropped, so one player never contributes more than the cap.
pub struct MatchIdCollector<'a, U, Sl> {
    upstream: &'a U,
    executor: BackoffExecutor<Sl>,
    gate: RateGate<Sl>,
    page_size: u32,
    cap: u32,
}

impl<'a, U: Upstream, Sl: Sleeper> MatchIdCollector<'a, U, Sl> {
    /// Create.
    pub fn new(upstream: &'a U, config: &PipelineConfig, sleeper: Sl) -> Self {
        Self {
            upstream,
            executor: BackoffExecutor::new(config.backoff(), sleeper.clone()),
            gate: RateGate::new(config.request_interval, sleeper),
            page_size: config.match_page_size.max(1),
            cap: config.match_cap_per_player,
        }
    }

    /// One player's match ids, most recent first. Stops at the first empty page or at the cap.
    pub async fn collect(&self, puuid: &str) -> Result<Vec<String>> {
        let cap = self.cap as usize;
        let mut ids = Vec::new();
        let mut start = 0;
        while ids.len() < cap {
            let count = self.page_size.min((cap - ids.len()) as u32);
            let page = self
                .executor
                .execute("match-v5 ids by puuid", || {
                    self.upstream.match_ids_by_puuid(puuid, start, count)
                })
                .await?;
            if page.is_empty() {
                break;
            }
            let taken = page.len().min(count as usize);
            ids.extend(page.into_iter().take(taken));
            // Next page starts after what was returned, which can be less than asked for.
            start += taken as u32;
            if cap <= ids.len() {
                break;
            }
            self.gate.wait().await;
        }
        log::debug!("Collected {} match ids for `{}`.", ids.len(), puuid);
        Ok(ids)
    }

    /// Union of every player's ids, first-seen order, no duplicates. Any player's pagination
    /// failing fails the whole collection.
    pub async fn collect_all(&self, puuids: &[String]) -> Result<Vec<String>> {
        let mut all = Vec::new();
        for (i, puuid) in puuids.iter().enumerate() {
            all.extend(self.collect(puuid).await?);
            if i + 1 < puuids.len() {
                self.gate.wait().await;
            }
        }
        Ok(all.into_iter().unique().collect())
    }

    /// Collect ids for every stored player and replace the known-match collection with the
    /// union of the previously known ids (keeping their discovery time) and the new ones.
    /// Nothing is written if collection fails. Returns the number of newly discovered ids.
    pub async fn update(&self, store: &impl Store) -> Result<usize> {
        let puuids = get_strings(store, Collection::PlayerIds, None, "puuid").await?;
        let known: Vec<MatchId> = store.get(Collection::MatchIds, &Query::all()).await?;
        let collected = self.collect_all(&puuids).await?;

        let known_ids = known
            .iter()
            .map(|m| m.match_id.as_str())
            .collect::<HashSet<_>>();
        let discovered_at = now_millis();
        let new = collected
            .into_iter()
            .filter(|id| !known_ids.contains(id.as_str()))
            .map(|match_id| MatchId {
                match_id,
                discovered_at,
            })
            .collect::<Vec<_>>();
        let new_count = new.len();

        let superset = known.into_iter().chain(new).collect::<Vec<_>>();
        store.replace_all(Collection::MatchIds, &superset).await?;
        log::info!(
            "Stored {} match ids ({} new) from {} players.",
            superset.len(),
            new_count,
            puuids.len()
        );
        Ok(new_count)
    }
}
