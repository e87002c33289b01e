//! Test doubles: a scripted upstream, a recording sleeper, and a store that fails on demand.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::model::ApexTier;
use crate::rate_gate::Sleeper;
use riven::models::account_v1::Account;
use riven::models::league_v4::LeagueList;

use crate::riot::{Summoner, Upstream};
use crate::store::{Collection, Filter, MemStore, Query, Stage, Store};
use crate::{Error, Result};

/// Records requested sleeps and returns immediately. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper(Rc<RefCell<Vec<Duration>>>);
impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.0.borrow().clone()
    }
}
impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        self.0.borrow_mut().push(duration);
        std::future::ready(())
    }
}

/// A league-v4 list body for `tier` holding `(summonerId, leaguePoints)` entries, each with one
/// win and one loss.
pub fn league_list(tier: &str, entries: &[(&str, i32)]) -> Value {
    let entries = entries
        .iter()
        .map(|(sid, lp)| {
            json!({
                "summonerId": sid, "puuid": format!("puuid-{}", sid), "leaguePoints": lp,
                "rank": "I", "wins": 1, "losses": 1, "veteran": false, "inactive": false,
                "freshBlood": false, "hotStreak": false,
            })
        })
        .collect::<Vec<_>>();
    json!({ "tier": tier, "leagueId": "L", "queue": "RANKED_SOLO_5x5", "name": "n", "entries": entries })
}

/// [`Upstream`] answering from per-call queues of scripted responses.
///
/// Calls are keyed `league:<TIER>`, `summoner:<id>`, `account:<puuid>`,
/// `match_ids:<puuid>:<start>:<count>` and `match:<id>`. An unscripted call fails with a 404.
#[derive(Default)]
pub struct MockUpstream {
    responses: RefCell<HashMap<String, VecDeque<Result<Value>>>>,
    calls: RefCell<Vec<String>>,
    endless_pages: Cell<bool>,
}
impl MockUpstream {
    pub fn push(&self, call: impl Into<String>, response: Result<Value>) -> &Self {
        self.responses
            .borrow_mut()
            .entry(call.into())
            .or_default()
            .push_back(response);
        self
    }

    pub fn ok(&self, call: impl Into<String>, value: impl Serialize) -> &Self {
        self.push(call, Ok(serde_json::to_value(value).unwrap()))
    }

    /// Unscripted match id pages return a full page of generated ids instead of failing.
    pub fn endless_pages(&self) -> &Self {
        self.endless_pages.set(true);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn respond<T: DeserializeOwned>(&self, call: String) -> Result<T> {
        self.calls.borrow_mut().push(call.clone());
        let scripted = self
            .responses
            .borrow_mut()
            .get_mut(&call)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => Ok(serde_json::from_slice(&serde_json::to_vec(&response?)?)?),
            None => Err(Error::Upstream {
                status: Some(404),
                message: format!("no scripted response for `{}`", call),
            }),
        }
    }
}

impl Upstream for MockUpstream {
    async fn league_by_tier(&self, tier: ApexTier, _queue: &str) -> Result<LeagueList> {
        let tier = serde_json::to_value(tier)?;
        self.respond(format!("league:{}", tier.as_str().unwrap_or_default()))
    }

    async fn summoner_by_id(&self, summoner_id: &str) -> Result<Summoner> {
        self.respond(format!("summoner:{}", summoner_id))
    }

    async fn account_by_puuid(&self, puuid: &str) -> Result<Account> {
        self.respond(format!("account:{}", puuid))
    }

    async fn match_ids_by_puuid(&self, puuid: &str, start: u32, count: u32) -> Result<Vec<String>> {
        let call = format!("match_ids:{}:{}:{}", puuid, start, count);
        let scripted = self.responses.borrow().contains_key(&call);
        if !scripted && self.endless_pages.get() {
            self.calls.borrow_mut().push(call);
            return Ok((start..start + count)
                .map(|i| format!("{}_{}", puuid, i))
                .collect());
        }
        self.respond(call)
    }

    async fn match_detail(&self, match_id: &str) -> Result<Value> {
        self.respond(format!("match:{}", match_id))
    }
}

/// A [`MemStore`] whose writes to chosen collections fail with [`Error::Persistence`]. Reads
/// are counted per collection.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemStore,
    failing: RefCell<HashSet<Collection>>,
    reads: RefCell<HashMap<Collection, usize>>,
}
impl FailingStore {
    pub fn reads(&self, collection: Collection) -> usize {
        self.reads.borrow().get(&collection).copied().unwrap_or(0)
    }

    fn count_read(&self, collection: Collection) {
        *self.reads.borrow_mut().entry(collection).or_default() += 1;
    }

    pub fn fail_writes(&self, collection: Collection) {
        self.failing.borrow_mut().insert(collection);
    }

    fn check(&self, collection: Collection) -> Result<()> {
        if self.failing.borrow().contains(&collection) {
            return Err(Error::Persistence(format!(
                "`{}` is unavailable",
                collection.name()
            )));
        }
        Ok(())
    }
}
impl Store for FailingStore {
    async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<T>> {
        self.count_read(collection);
        self.inner.get(collection, query).await
    }

    async fn get_aggregate<T: DeserializeOwned>(
        &self,
        collection: Collection,
        pipeline: &[Stage],
    ) -> Result<Vec<T>> {
        self.count_read(collection);
        self.inner.get_aggregate(collection, pipeline).await
    }

    async fn insert<T: Serialize>(&self, collection: Collection, docs: &[T]) -> Result<usize> {
        self.check(collection)?;
        self.inner.insert(collection, docs).await
    }

    async fn replace_all<T: Serialize>(&self, collection: Collection, docs: &[T]) -> Result<()> {
        self.check(collection)?;
        self.inner.replace_all(collection, docs).await
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        self.check(collection)?;
        self.inner.delete_many(collection, filter).await
    }
}
