//! Explicit pipeline configuration, passed into each component at construction.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use riven::consts::{PlatformRoute, RegionalRoute};
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds};

use crate::{Error, Result};

/// Largest page the match-v5 ids endpoint will return.
pub const MAX_MATCH_PAGE_SIZE: u32 = 100;

/// Everything the core reads from its environment.
#[serde_as]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Platform the ladder lives on. Match and account calls use its regional route.
    #[serde_as(as = "DisplayFromStr")]
    pub platform: PlatformRoute,
    /// Ranked queue type for the apex ladders, e.g. `RANKED_SOLO_5x5`.
    pub ladder_queue: String,
    /// Queue ID filter for match history (420 = ranked solo).
    pub match_queue_id: u16,
    /// Fixed delay after each unit of upstream work, see [`crate::rate_gate::RateGate`].
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_interval: Duration,
    /// Total attempts allowed for a rate limited call.
    pub max_attempts: u32,
    /// First computed backoff wait, doubled each retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_backoff: Duration,
    /// Most match details fetched in one ingestion run.
    pub match_detail_batch_ceiling: usize,
    /// Match ids requested per page.
    pub match_page_size: u32,
    /// Most match ids collected for a single player.
    pub match_cap_per_player: u32,
    /// How many orphan ids the auditor logs.
    pub audit_sample_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            platform: PlatformRoute::NA1,
            ladder_queue: "RANKED_SOLO_5x5".to_owned(),
            match_queue_id: 420,
            request_interval: Duration::from_millis(1200),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1000),
            match_detail_batch_ceiling: 100,
            match_page_size: MAX_MATCH_PAGE_SIZE,
            match_cap_per_player: 1000,
            audit_sample_size: 10,
        }
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    get(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("`{}`={:?}: {}", name, value, e)))
        })
        .transpose()
}

impl PipelineConfig {
    /// Build from environment variables (`PLATFORM`, `LADDER_QUEUE`, `MATCH_QUEUE_ID`,
    /// `REQUEST_INTERVAL_MS`, `MAX_ATTEMPTS`, `INITIAL_BACKOFF_MS`, `MATCH_DETAIL_BATCH_CEILING`,
    /// `MATCH_PAGE_SIZE`, `MATCH_CAP_PER_PLAYER`, `AUDIT_SAMPLE_SIZE`). Unset variables keep
    /// their defaults. The result is validated.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(platform) = parse_var(&get, "PLATFORM")? {
            config.platform = platform;
        }
        if let Some(queue) = get("LADDER_QUEUE") {
            config.ladder_queue = queue;
        }
        if let Some(queue_id) = parse_var(&get, "MATCH_QUEUE_ID")? {
            config.match_queue_id = queue_id;
        }
        if let Some(ms) = parse_var(&get, "REQUEST_INTERVAL_MS")? {
            config.request_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var(&get, "MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }
        if let Some(ms) = parse_var(&get, "INITIAL_BACKOFF_MS")? {
            config.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ceiling) = parse_var(&get, "MATCH_DETAIL_BATCH_CEILING")? {
            config.match_detail_batch_ceiling = ceiling;
        }
        if let Some(page_size) = parse_var(&get, "MATCH_PAGE_SIZE")? {
            config.match_page_size = page_size;
        }
        if let Some(cap) = parse_var(&get, "MATCH_CAP_PER_PLAYER")? {
            config.match_cap_per_player = cap;
        }
        if let Some(sample) = parse_var(&get, "AUDIT_SAMPLE_SIZE")? {
            config.audit_sample_size = sample;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or overrun the pipeline.
    pub fn validate(&self) -> Result<()> {
        if 0 == self.max_attempts {
            return Err(Error::Config("`max_attempts` must be at least 1".into()));
        }
        if 0 == self.match_detail_batch_ceiling {
            return Err(Error::Config(
                "`match_detail_batch_ceiling` must be at least 1".into(),
            ));
        }
        if !(1..=MAX_MATCH_PAGE_SIZE).contains(&self.match_page_size) {
            return Err(Error::Config(format!(
                "`match_page_size` must be in 1..={}, got {}",
                MAX_MATCH_PAGE_SIZE, self.match_page_size
            )));
        }
        if 0 == self.match_cap_per_player {
            return Err(Error::Config(
                "`match_cap_per_player` must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Route for account-v1 and match-v5.
    pub fn regional_route(&self) -> RegionalRoute {
        self.platform.to_regional()
    }

    /// Settings for [`crate::backoff::BackoffExecutor`].
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_attempts: self.max_attempts,
            initial_backoff: self.initial_backoff,
        }
    }
}

/// Retry settings for rate limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt. Doubles for each later attempt.
    pub initial_backoff: Duration,
}
