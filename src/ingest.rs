//! Match detail ingestion and checkpointing.
//!
//! A match moves `Known` (in the match id collection) -> `Fetched` (detail stored) -> `Marked`
//! (processed marker written). Markers are only written for details stored earlier in the same
//! run, so a failed fetch or a failed write can never leave a marker without a detail.
//!
//! A match whose payload is rejected gets an unprocessed marker instead, so it stops taking a
//! slot in every later batch. Deleting that marker makes it outstanding again.

use std::collections::HashSet;

use itertools::Itertools;

use crate::backoff::BackoffExecutor;
use crate::config::PipelineConfig;
use crate::model::{MatchDetail, ProcessedMarker};
use crate::rate_gate::{RateGate, Sleeper};
use crate::riot::Upstream;
use crate::store::{get_strings, Collection, Filter, Store};
use crate::{Error, Result};

/// Ids of every match marked processed.
pub async fn marked_ids(store: &impl Store) -> Result<HashSet<String>> {
    let filter = Filter::new().eq("processed_with_api_call", true);
    let ids = get_strings(store, Collection::ProcessedMatchIds, Some(filter), "match_id").await?;
    Ok(ids.into_iter().collect())
}

/// Known match ids without any marker (processed or rejected), in the known collection's
/// stored order.
pub async fn outstanding_ids(store: &impl Store) -> Result<Vec<String>> {
    let known = get_strings(store, Collection::MatchIds, None, "match_id").await?;
    let checkpointed = get_strings(store, Collection::ProcessedMatchIds, None, "match_id")
        .await?
        .into_iter()
        .collect::<HashSet<_>>();
    Ok(known
        .into_iter()
        .filter(|id| !checkpointed.contains(id))
        .unique()
        .collect())
}

/// What one [`MatchDetailIngestor::run`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Outstanding matches before the run.
    pub outstanding: usize,
    /// Matches stored and marked, in fetch order.
    pub stored: Vec<String>,
    /// Matches whose payload failed validation. Marked unprocessed.
    pub skipped: Vec<String>,
    /// The match whose fetch failed and stopped the batch.
    pub halted_at: Option<String>,
}

/// Fetches outstanding match details in bounded batches and checkpoints them.
pub struct MatchDetailIngestor<'a, U, Sl> {
    upstream: &'a U,
    executor: BackoffExecutor<Sl>,
    gate: RateGate<Sl>,
    batch_ceiling: usize,
}

impl<'a, U: Upstream, Sl: Sleeper> MatchDetailIngestor<'a, U, Sl> {
    /// Create.
    pub fn new(upstream: &'a U, config: &PipelineConfig, sleeper: Sl) -> Self {
        Self {
            upstream,
            executor: BackoffExecutor::new(config.backoff(), sleeper.clone()),
            gate: RateGate::new(config.request_interval, sleeper),
            batch_ceiling: config.match_detail_batch_ceiling,
        }
    }

    async fn fetch(&self, match_id: &str) -> Result<MatchDetail> {
        let payload = self
            .executor
            .execute("match-v5 by id", || self.upstream.match_detail(match_id))
            .await?;
        let detail = MatchDetail::from_payload(payload)?;
        if detail.match_id() != match_id {
            return Err(Error::DataShape(format!(
                "requested match `{}` but got `{}`",
                match_id,
                detail.match_id()
            )));
        }
        Ok(detail)
    }

    /// Run one batch.
    ///
    /// Fetches up to the batch ceiling of outstanding matches, one at a time. The first fetch
    /// error (other than an invalid payload, which is skipped) stops the batch. Everything
    /// fetched is then stored, and only after that are the stored matches marked processed and
    /// the skipped ones marked unprocessed. A storage error is returned before any marking.
    pub async fn run(&self, store: &impl Store) -> Result<IngestReport> {
        let outstanding = outstanding_ids(store).await?;
        let batch = &outstanding[..outstanding.len().min(self.batch_ceiling)];
        log::info!(
            "{} outstanding matches, fetching {}.",
            outstanding.len(),
            batch.len()
        );

        let mut report = IngestReport {
            outstanding: outstanding.len(),
            ..Default::default()
        };
        let mut buffer = Vec::with_capacity(batch.len());
        for match_id in batch {
            match self.fetch(match_id).await {
                Ok(detail) => buffer.push(detail),
                Err(e) if e.is_data_shape() => {
                    log::warn!("Skipping match `{}`: {}.", match_id, e);
                    report.skipped.push(match_id.clone());
                }
                Err(e) => {
                    log::error!(
                        "Halting batch at match `{}` after {} fetched: {}.",
                        match_id,
                        buffer.len(),
                        e
                    );
                    report.halted_at = Some(match_id.clone());
                    break;
                }
            }
            self.gate.wait().await;
        }

        if !buffer.is_empty() {
            let payloads = buffer.iter().map(|d| &d.payload).collect::<Vec<_>>();
            store.insert(Collection::MatchDetails, &payloads).await?;
        }

        report.stored = buffer.iter().map(|d| d.match_id().to_owned()).collect();
        let markers = report
            .stored
            .iter()
            .map(ProcessedMarker::processed)
            .chain(report.skipped.iter().map(ProcessedMarker::rejected))
            .collect::<Vec<_>>();
        if !markers.is_empty() {
            store.insert(Collection::ProcessedMatchIds, &markers).await?;
        }
        log::info!(
            "Stored and marked {} match details, marked {} rejected.",
            report.stored.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use futures::executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::model::test::{match_payload, puuids};
    use crate::model::MatchId;
    use crate::store::MemStore;
    use crate::testutil::{FailingStore, MockUpstream, RecordingSleeper};

    fn config(batch_ceiling: usize) -> PipelineConfig {
        PipelineConfig {
            match_detail_batch_ceiling: batch_ceiling,
            ..Default::default()
        }
    }

    fn seed_known(store: &impl Store, ids: &[&str]) {
        let known = ids
            .iter()
            .map(|id| MatchId {
                match_id: (*id).to_owned(),
                discovered_at: 0,
            })
            .collect::<Vec<_>>();
        block_on(store.replace_all(Collection::MatchIds, &known)).unwrap();
    }

    fn script_match(upstream: &MockUpstream, id: &str) {
        upstream.ok(format!("match:{}", id), match_payload(id, &puuids(id), 1000));
    }

    fn detail_ids(store: &MemStore) -> Vec<String> {
        store
            .documents(Collection::MatchDetails)
            .iter()
            .map(|d| d["metadata"]["matchId"].as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn test_outstanding_is_known_minus_checkpointed() {
        let store = MemStore::new();
        seed_known(&store, &["m1", "m2", "m3", "m4"]);
        block_on(store.insert(
            Collection::ProcessedMatchIds,
            &[
                ProcessedMarker::processed("m2"),
                ProcessedMarker {
                    match_id: "m3".into(),
                    processed_with_api_call: false,
                },
            ],
        ))
        .unwrap();
        assert_eq!(vec!["m1", "m4"], block_on(outstanding_ids(&store)).unwrap());
        assert_eq!(
            HashSet::from(["m2".to_owned()]),
            block_on(marked_ids(&store)).unwrap()
        );
    }

    #[test]
    fn test_upstream_error_halts_batch_and_marks_only_stored() {
        let upstream = MockUpstream::default();
        script_match(&upstream, "m1");
        upstream.push(
            "match:m2",
            Err(Error::Upstream {
                status: Some(500),
                message: "down".into(),
            }),
        );
        script_match(&upstream, "m3");
        let store = MemStore::new();
        seed_known(&store, &["m1", "m2", "m3"]);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(2), RecordingSleeper::default());

        let report = block_on(ingestor.run(&store)).unwrap();
        assert_eq!(vec!["m1"], report.stored);
        assert_eq!(Some("m2".to_owned()), report.halted_at);
        assert_eq!(vec!["m1"], detail_ids(&store));
        assert_eq!(
            HashSet::from(["m1".to_owned()]),
            block_on(marked_ids(&store)).unwrap()
        );
        assert_eq!(0, upstream.calls_starting_with("match:m3"));
    }

    #[test]
    fn test_retry_budget_exhaustion_halts_batch() {
        let upstream = MockUpstream::default();
        script_match(&upstream, "m1");
        for _ in 0..5 {
            upstream.push("match:m2", Err(Error::RateLimited { retry_after: None }));
        }
        let store = MemStore::new();
        seed_known(&store, &["m1", "m2", "m3"]);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(10), RecordingSleeper::default());

        let report = block_on(ingestor.run(&store)).unwrap();
        assert_eq!(vec!["m1"], report.stored);
        assert_eq!(Some("m2".to_owned()), report.halted_at);
        assert_eq!(5, upstream.calls_starting_with("match:m2"));
        assert_eq!(
            vec!["m2", "m3"],
            block_on(outstanding_ids(&store)).unwrap()
        );
    }

    #[test]
    fn test_second_run_makes_no_calls() {
        let upstream = MockUpstream::default();
        script_match(&upstream, "m1");
        script_match(&upstream, "m2");
        let store = MemStore::new();
        seed_known(&store, &["m1", "m2"]);
        let sleeper = RecordingSleeper::default();
        let ingestor = MatchDetailIngestor::new(&upstream, &config(10), sleeper.clone());

        assert_eq!(2, block_on(ingestor.run(&store)).unwrap().stored.len());
        let calls = upstream.calls().len();
        let sleeps = sleeper.sleeps().len();

        let second = block_on(ingestor.run(&store)).unwrap();
        assert_eq!(0, second.outstanding);
        assert!(second.stored.is_empty());
        assert_eq!(calls, upstream.calls().len());
        assert_eq!(sleeps, sleeper.sleeps().len());
    }

    #[test]
    fn test_batch_ceiling_bounds_run() {
        let upstream = MockUpstream::default();
        for id in ["m1", "m2", "m3"] {
            script_match(&upstream, id);
        }
        let store = MemStore::new();
        seed_known(&store, &["m1", "m2", "m3"]);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(2), RecordingSleeper::default());

        let report = block_on(ingestor.run(&store)).unwrap();
        assert_eq!(3, report.outstanding);
        assert_eq!(vec!["m1", "m2"], report.stored);
        assert_eq!(vec!["m3"], block_on(outstanding_ids(&store)).unwrap());
    }

    #[test]
    fn test_invalid_payload_is_skipped_and_marked_rejected() {
        let upstream = MockUpstream::default();
        upstream.ok(
            "match:m1",
            json!({ "metadata": { "matchId": "m1", "participants": ["only-one"] }, "info": {} }),
        );
        script_match(&upstream, "m2");
        // Payload for a different match than requested.
        upstream.ok("match:m3", match_payload("m9", &puuids("x"), 1));
        let store = MemStore::new();
        seed_known(&store, &["m1", "m2", "m3"]);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(10), RecordingSleeper::default());

        let report = block_on(ingestor.run(&store)).unwrap();
        assert_eq!(vec!["m2"], report.stored);
        assert_eq!(vec!["m1", "m3"], report.skipped);
        assert_eq!(None, report.halted_at);
        assert_eq!(vec!["m2"], detail_ids(&store));
        assert!(block_on(outstanding_ids(&store)).unwrap().is_empty());
        assert_eq!(
            HashSet::from(["m2".to_owned()]),
            block_on(marked_ids(&store)).unwrap()
        );
    }

    #[test]
    fn test_rejected_match_does_not_starve_batch() {
        let upstream = MockUpstream::default();
        upstream.ok(
            "match:bad",
            json!({ "metadata": { "matchId": "bad", "participants": ["only-one"] }, "info": {} }),
        );
        script_match(&upstream, "good");
        let store = MemStore::new();
        seed_known(&store, &["bad", "good"]);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(1), RecordingSleeper::default());

        for _ in 0..3 {
            block_on(ingestor.run(&store)).unwrap();
        }
        assert_eq!(1, upstream.calls_starting_with("match:bad"));
        assert_eq!(1, upstream.calls_starting_with("match:good"));
        assert_eq!(vec!["good"], detail_ids(&store));
        assert!(block_on(outstanding_ids(&store)).unwrap().is_empty());
    }

    #[test]
    fn test_only_rejected_matches_are_still_marked() {
        let upstream = MockUpstream::default();
        upstream.ok("match:m1", match_payload("m9", &puuids("x"), 1));
        let store = FailingStore::default();
        seed_known(&store, &["m1"]);
        store.fail_writes(Collection::MatchDetails);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(10), RecordingSleeper::default());

        let report = block_on(ingestor.run(&store)).unwrap();
        assert!(report.stored.is_empty());
        assert_eq!(vec!["m1"], report.skipped);
        assert_eq!(1, store.inner.len(Collection::ProcessedMatchIds));
        assert!(block_on(marked_ids(&store)).unwrap().is_empty());
    }

    #[test]
    fn test_detail_write_failure_marks_nothing() {
        let upstream = MockUpstream::default();
        script_match(&upstream, "m1");
        let store = FailingStore::default();
        seed_known(&store, &["m1"]);
        store.fail_writes(Collection::MatchDetails);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(10), RecordingSleeper::default());

        let result = block_on(ingestor.run(&store));
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(store.inner.is_empty(Collection::ProcessedMatchIds));
        assert_eq!(vec!["m1"], block_on(outstanding_ids(&store)).unwrap());
    }

    #[test]
    fn test_marked_is_subset_of_details() {
        let upstream = MockUpstream::default();
        for id in ["a", "b", "c", "d"] {
            script_match(&upstream, id);
        }
        upstream.push(
            "match:c",
            Err(Error::Upstream {
                status: Some(403),
                message: "forbidden".into(),
            }),
        );
        let store = MemStore::new();
        seed_known(&store, &["a", "b", "c", "d"]);
        let ingestor = MatchDetailIngestor::new(&upstream, &config(3), RecordingSleeper::default());

        for _ in 0..3 {
            block_on(ingestor.run(&store)).unwrap();
            let details = detail_ids(&store).into_iter().collect::<HashSet<_>>();
            let marked = block_on(marked_ids(&store)).unwrap();
            assert!(marked.is_subset(&details));
        }
    }
}
