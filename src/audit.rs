//! Repair of processed markers that have no stored detail.

use std::collections::HashSet;

use crate::config::PipelineConfig;
use crate::ingest::marked_ids;
use crate::store::{get_strings, Collection, Filter, Store};
use crate::Result;

/// Outcome of one [`CheckpointAuditor::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Markers checked.
    pub marked: usize,
    /// Markers without a stored detail, sorted.
    pub orphans: Vec<String>,
    /// Markers deleted.
    pub deleted: u64,
}

/// Finds markers whose match has no stored detail and deletes them, so the match becomes
/// outstanding again. Never touches details or known match ids.
pub struct CheckpointAuditor {
    sample_size: usize,
}

impl CheckpointAuditor {
    /// Create.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sample_size: config.audit_sample_size,
        }
    }

    /// Marked match IDs without a stored detail, sorted.
    pub async fn orphans(&self, store: &impl Store) -> Result<(usize, Vec<String>)> {
        let marked = marked_ids(store).await?;
        let details = get_strings(store, Collection::MatchDetails, None, "metadata.matchId")
            .await?
            .into_iter()
            .collect::<HashSet<_>>();
        let mut orphans = marked
            .iter()
            .filter(|id| !details.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        orphans.sort();
        Ok((marked.len(), orphans))
    }

    /// Report and delete orphaned markers.
    pub async fn run(&self, store: &impl Store) -> Result<AuditReport> {
        let (marked, orphans) = self.orphans(store).await?;
        if orphans.is_empty() {
            log::info!("Audit: all {} marked matches have details.", marked);
            return Ok(AuditReport {
                marked,
                ..Default::default()
            });
        }

        let sample = &orphans[..orphans.len().min(self.sample_size)];
        log::warn!(
            "Audit: {}/{} marked matches have no detail, e.g. {:?}.",
            orphans.len(),
            marked,
            sample
        );
        let filter = Filter::new().is_in("match_id", orphans.iter().map(String::as_str));
        let deleted = store
            .delete_many(Collection::ProcessedMatchIds, &filter)
            .await?;
        log::info!("Audit: deleted {} orphaned markers.", deleted);
        Ok(AuditReport {
            marked,
            orphans,
            deleted,
        })
    }
}
