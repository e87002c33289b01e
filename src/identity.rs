//! Resolution of new ladder players into durable identities.

use std::collections::HashSet;

use itertools::Itertools;

use crate::backoff::BackoffExecutor;
use crate::config::PipelineConfig;
use crate::model::PlayerIdentity;
use crate::rate_gate::{RateGate, Sleeper};
use crate::riot::Upstream;
use crate::store::{get_strings, Collection, Store};
use crate::{Error, Result};

/// `new` minus `known`, in first-seen order of `new`, without duplicates.
pub fn missing_ids<'s>(
    new: impl IntoIterator<Item = &'s str>,
    known: &HashSet<String>,
) -> Vec<String> {
    new.into_iter()
        .filter(|id| !known.contains(*id))
        .unique()
        .map(str::to_owned)
        .collect()
}

/// Looks up summoner and account data for players not yet in the identity store.
///
/// Best effort per player: a failure is logged and that player is left for the next run.
/// Stored identities are never rewritten.
pub struct IdentityResolver<'a, U, Sl> {
    upstream: &'a U,
    executor: BackoffExecutor<Sl>,
    gate: RateGate<Sl>,
}

impl<'a, U: Upstream, Sl: Sleeper> IdentityResolver<'a, U, Sl> {
    /// Create.
    pub fn new(upstream: &'a U, config: &PipelineConfig, sleeper: Sl) -> Self {
        Self {
            upstream,
            executor: BackoffExecutor::new(config.backoff(), sleeper.clone()),
            gate: RateGate::new(config.request_interval, sleeper),
        }
    }

    /// Resolve each summoner ID, skipping (and logging) any that fail.
    pub async fn resolve(&self, summoner_ids: &[String]) -> Vec<PlayerIdentity> {
        let mut resolved = Vec::with_capacity(summoner_ids.len());
        for summoner_id in summoner_ids {
            match self.resolve_one(summoner_id).await {
                Ok(identity) => resolved.push(identity),
                Err(e) => log::warn!("Skipping summoner `{}` this run: {}.", summoner_id, e),
            }
            self.gate.wait().await;
        }
        resolved
    }

    async fn resolve_one(&self, summoner_id: &str) -> Result<PlayerIdentity> {
        let summoner = self
            .executor
            .execute("summoner-v4 by id", || self.upstream.summoner_by_id(summoner_id))
            .await?;
        self.gate.wait().await;
        let account = self
            .executor
            .execute("account-v1 by puuid", || {
                self.upstream.account_by_puuid(&summoner.puuid)
            })
            .await?;
        if account.puuid != summoner.puuid {
            return Err(Error::DataShape(format!(
                "account PUUID `{}` does not match summoner PUUID `{}`",
                account.puuid, summoner.puuid
            )));
        }
        Ok(PlayerIdentity {
            summoner_id: summoner_id.to_owned(),
            puuid: summoner.puuid,
            account_id: summoner.account_id,
            profile_icon_id: summoner.profile_icon_id,
            game_name: account.game_name,
            tag_line: account.tag_line,
            revision_date: summoner.revision_date,
        })
    }

    /// Resolve every ladder player without a stored identity and store the new identities.
    /// Returns the newly stored identities.
    pub async fn update(&self, store: &impl Store) -> Result<Vec<PlayerIdentity>> {
        let ladder = get_strings(store, Collection::Ladder, None, "summonerId").await?;
        let known = get_strings(store, Collection::PlayerIds, None, "summonerId")
            .await?
            .into_iter()
            .collect::<HashSet<_>>();
        let missing = missing_ids(ladder.iter().map(String::as_str), &known);
        log::info!(
            "{} ladder players, {} known, {} to resolve.",
            ladder.len(),
            known.len(),
            missing.len()
        );

        let resolved = self.resolve(&missing).await;
        if !resolved.is_empty() {
            store.insert(Collection::PlayerIds, &resolved).await?;
        }
        log::info!("Stored {}/{} new identities.", resolved.len(), missing.len());
        Ok(resolved)
    }
}

#[cfg(test)]
mod test {
    use futures::executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::model::{ApexTier, LadderEntry};
    use crate::store::MemStore;
    use crate::testutil::{MockUpstream, RecordingSleeper};

    fn script_player(upstream: &MockUpstream, sid: &str, game_name: &str) {
        let puuid = format!("puuid-{}", sid);
        upstream
            .ok(
                format!("summoner:{}", sid),
                json!({
                    "id": sid, "accountId": format!("acc-{}", sid), "puuid": puuid,
                    "profileIconId": 7, "revisionDate": 1700, "summonerLevel": 300,
                }),
            )
            .ok(
                format!("account:{}", puuid),
                json!({ "puuid": puuid, "gameName": game_name, "tagLine": "NA1" }),
            );
    }

    fn ladder_of(ids: &[&str]) -> Vec<LadderEntry> {
        ids.iter()
            .map(|sid| LadderEntry {
                tier: ApexTier::Master,
                summoner_id: (*sid).to_owned(),
                league_points: 0,
                wins: 0,
                losses: 0,
            })
            .collect()
    }

    #[test]
    fn test_missing_ids_is_set_difference() {
        let known = HashSet::from(["a".to_owned(), "c".to_owned()]);
        assert_eq!(
            vec!["d", "b"],
            missing_ids(["d", "a", "b", "d", "c", "b"], &known)
        );
        assert!(missing_ids([], &known).is_empty());
    }

    #[test]
    fn test_resolve_joins_summoner_and_account() {
        let upstream = MockUpstream::default();
        script_player(&upstream, "s1", "Faker");
        let config = PipelineConfig::default();
        let sleeper = RecordingSleeper::default();
        let resolver = IdentityResolver::new(&upstream, &config, sleeper.clone());

        let resolved = block_on(resolver.resolve(&["s1".to_owned()]));
        assert_eq!(
            vec![PlayerIdentity {
                summoner_id: "s1".into(),
                puuid: "puuid-s1".into(),
                account_id: "acc-s1".into(),
                profile_icon_id: 7,
                game_name: Some("Faker".into()),
                tag_line: Some("NA1".into()),
                revision_date: 1700,
            }],
            resolved
        );
        // One wait between the two lookups, one after the player.
        assert_eq!(vec![config.request_interval; 2], sleeper.sleeps());
    }

    #[test]
    fn test_failed_player_is_skipped() {
        let upstream = MockUpstream::default();
        script_player(&upstream, "s1", "One");
        upstream.push(
            "summoner:s2",
            Err(Error::Upstream {
                status: Some(500),
                message: "down".into(),
            }),
        );
        script_player(&upstream, "s3", "Three");
        let config = PipelineConfig::default();
        let resolver = IdentityResolver::new(&upstream, &config, RecordingSleeper::default());

        let ids = ["s1", "s2", "s3"].map(String::from);
        let resolved = block_on(resolver.resolve(&ids));
        assert_eq!(
            vec!["s1", "s3"],
            resolved
                .iter()
                .map(|i| i.summoner_id.as_str())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_mismatched_puuid_is_skipped() {
        let upstream = MockUpstream::default();
        upstream
            .ok(
                "summoner:s1",
                json!({ "id": "s1", "accountId": "a", "puuid": "p1", "profileIconId": 1, "revisionDate": 0 }),
            )
            .ok("account:p1", json!({ "puuid": "other" }));
        let config = PipelineConfig::default();
        let resolver = IdentityResolver::new(&upstream, &config, RecordingSleeper::default());
        assert!(block_on(resolver.resolve(&["s1".to_owned()])).is_empty());
    }

    #[test]
    fn test_update_only_adds_unknown_players() {
        let upstream = MockUpstream::default();
        script_player(&upstream, "s2", "New");
        let config = PipelineConfig::default();
        let resolver = IdentityResolver::new(&upstream, &config, RecordingSleeper::default());
        let store = MemStore::new();
        let existing = PlayerIdentity {
            summoner_id: "s1".into(),
            puuid: "puuid-s1".into(),
            account_id: "acc-s1".into(),
            profile_icon_id: 1,
            game_name: Some("Original".into()),
            tag_line: Some("NA1".into()),
            revision_date: 1,
        };
        block_on(async {
            store
                .replace_all(Collection::Ladder, &ladder_of(&["s1", "s2"]))
                .await
                .unwrap();
            store.insert(Collection::PlayerIds, &[existing]).await.unwrap();

            let added = resolver.update(&store).await.unwrap();
            assert_eq!(1, added.len());
            assert_eq!("s2", added[0].summoner_id);

            let stored: Vec<PlayerIdentity> = store
                .get(Collection::PlayerIds, &crate::store::Query::all())
                .await
                .unwrap();
            assert_eq!(2, stored.len());
            assert_eq!(Some("Original"), stored[0].game_name.as_deref());
        });
        assert_eq!(0, upstream.calls_starting_with("summoner:s1"));
    }
}
