//! Exponential backoff around rate limited upstream calls.

use std::future::Future;

use crate::config::BackoffConfig;
use crate::rate_gate::Sleeper;
use crate::{Error, Result};

/// Retries an operation while it fails with [`Error::RateLimited`].
///
/// The computed wait starts at [`BackoffConfig::initial_backoff`] and doubles every retry. A
/// server supplied `Retry-After` replaces the computed wait for that retry only. After
/// [`BackoffConfig::max_attempts`] rate limited attempts the call fails with
/// [`Error::RetryBudgetExhausted`]. Any other error is returned immediately.
#[derive(Debug, Clone)]
pub struct BackoffExecutor<Sl> {
    config: BackoffConfig,
    sleeper: Sl,
}

impl<Sl: Sleeper> BackoffExecutor<Sl> {
    /// Create.
    pub fn new(config: BackoffConfig, sleeper: Sl) -> Self {
        Self { config, sleeper }
    }

    /// Run `op` until it succeeds, fails with a non rate limit error, or runs out of attempts.
    /// `label` names the call in logs and errors.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;
        loop {
            let retry_after = match op().await {
                Err(Error::RateLimited { retry_after }) => retry_after,
                other => return other,
            };
            if max_attempts <= attempt {
                log::error!(
                    "Rate limited on `{}`, giving up after {} attempts.",
                    label,
                    attempt
                );
                return Err(Error::RetryBudgetExhausted {
                    label: label.to_owned(),
                    attempts: attempt,
                });
            }

            let wait = retry_after.unwrap_or(backoff);
            log::warn!(
                "Rate limited on `{}`, attempt {}/{}, waiting {:?} ({}).",
                label,
                attempt,
                max_attempts,
                wait,
                if retry_after.is_some() {
                    "retry-after"
                } else {
                    "backoff"
                },
            );
            self.sleeper.sleep(wait).await;
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}
