//! Background "webjob" task handling.

use apexdata::audit::CheckpointAuditor;
use apexdata::identity::IdentityResolver;
use apexdata::ingest::MatchDetailIngestor;
use apexdata::ladder::LadderFetcher;
use apexdata::match_ids::MatchIdCollector;
use apexdata::{pipeline, stats};
use worker::{Env, Message, Result};

use crate::init::{to_worker_error, AppState};
use crate::sleep::WorkerSleeper;

/// Enum of the possible tasks for the pipeline web job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Task {
    /// Fetch and store the apex ladder.
    UpdateLadder,
    /// Resolve identities of new ladder players.
    UpdatePlayerIds,
    /// Collect match IDs for every known player.
    UpdateMatchIds,
    /// Fetch one batch of outstanding match details.
    UpdateMatchDetails,
    /// Rebuild match histories and player summaries.
    UpdatePlayerStats,
    /// Delete processed markers without a stored detail.
    AuditCheckpoints,
    /// Every stage above except the audit, in order.
    DailyUpdate,
}

/// Handle a `Task`.
pub async fn handle(env: &Env, msg: Message<Task>) -> Result<Message<Task>> {
    let app = AppState::from_env(env)?;
    run(&app, *msg.body()).await.map_err(to_worker_error)?;
    Ok(msg)
}

/// Run one task.
pub async fn run(app: &AppState, task: Task) -> apexdata::Result<()> {
    let AppState {
        config,
        store,
        upstream,
    } = app;
    match task {
        Task::UpdateLadder => {
            let ladder = LadderFetcher::new(upstream, config, WorkerSleeper)
                .fetch_and_store(store)
                .await?;
            log::info!("Ladder updated, {} entries.", ladder.len());
        }
        Task::UpdatePlayerIds => {
            let added = IdentityResolver::new(upstream, config, WorkerSleeper)
                .update(store)
                .await?;
            log::info!("Added {} players.", added.len());
        }
        Task::UpdateMatchIds => {
            let added = MatchIdCollector::new(upstream, config, WorkerSleeper)
                .update(store)
                .await?;
            log::info!("Added {} match IDs.", added);
        }
        Task::UpdateMatchDetails => {
            let report = MatchDetailIngestor::new(upstream, config, WorkerSleeper)
                .run(store)
                .await?;
            log::info!("Match details: {:?}.", report);
        }
        Task::UpdatePlayerStats => {
            stats::update_player_match_history(store).await?;
            stats::update_player_summaries(store).await?;
        }
        Task::AuditCheckpoints => {
            let report = CheckpointAuditor::new(config).run(store).await?;
            log::info!("Audit: {:?}.", report);
        }
        Task::DailyUpdate => {
            pipeline::run_daily(upstream, store, config, WorkerSleeper).await?;
        }
    }
    Ok(())
}
