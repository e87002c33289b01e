//! The ordered daily run and the audit run.

use crate::audit::{AuditReport, CheckpointAuditor};
use crate::config::PipelineConfig;
use crate::identity::IdentityResolver;
use crate::ingest::{IngestReport, MatchDetailIngestor};
use crate::ladder::LadderFetcher;
use crate::match_ids::MatchIdCollector;
use crate::rate_gate::Sleeper;
use crate::riot::Upstream;
use crate::stats;
use crate::store::Store;
use crate::Result;

/// Counts from one [`run_daily`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyReport {
    /// Ladder entries stored.
    pub ladder_entries: usize,
    /// New identities stored.
    pub new_players: usize,
    /// New match IDs stored.
    pub new_match_ids: usize,
    /// Match detail batch.
    pub ingest: IngestReport,
    /// Match history rows stored.
    pub match_history_rows: usize,
    /// Player summaries stored.
    pub summaries: usize,
}

/// Ladder, identities, match IDs, match details, then derived stats, in that order.
/// Stops at the first stage that fails.
pub async fn run_daily<U: Upstream, Sl: Sleeper>(
    upstream: &U,
    store: &impl Store,
    config: &PipelineConfig,
    sleeper: Sl,
) -> Result<DailyReport> {
    config.validate()?;
    log::info!("Daily update starting for `{}`.", config.platform);

    let ladder = LadderFetcher::new(upstream, config, sleeper.clone())
        .fetch_and_store(store)
        .await?;
    let new_players = IdentityResolver::new(upstream, config, sleeper.clone())
        .update(store)
        .await?;
    let new_match_ids = MatchIdCollector::new(upstream, config, sleeper.clone())
        .update(store)
        .await?;
    let ingest = MatchDetailIngestor::new(upstream, config, sleeper)
        .run(store)
        .await?;
    let match_history_rows = stats::update_player_match_history(store).await?;
    let summaries = stats::update_player_summaries(store).await?;

    let report = DailyReport {
        ladder_entries: ladder.len(),
        new_players: new_players.len(),
        new_match_ids,
        ingest,
        match_history_rows,
        summaries: summaries.len(),
    };
    log::info!("Daily update done: {:?}.", report);
    Ok(report)
}

/// Run the [`CheckpointAuditor`].
pub async fn run_audit(store: &impl Store, config: &PipelineConfig) -> Result<AuditReport> {
    config.validate()?;
    CheckpointAuditor::new(config).run(store).await
}
