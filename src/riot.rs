//! Riot Games API access: the [`Upstream`] seam and its [`RiotApi`] implementation.

use std::str::FromStr;
use std::time::Duration;

use riven::consts::{PlatformRoute, Queue, QueueType, RegionalRoute};
use riven::models::account_v1::Account;
use riven::models::league_v4::LeagueList;
use riven::reqwest::header::{HeaderMap, RETRY_AFTER};
use riven::reqwest::{Method, StatusCode};
use riven::{RiotApi, RiotApiConfig, RiotApiError};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::model::ApexTier;
use crate::{Error, Result};

/// GET summoner-v4 `/lol/summoner/v4/summoners/{encryptedSummonerId}`
///
/// Riven has no by-summoner-ID method and its `Summoner` model has no `accountId`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summoner {
    /// Encrypted summoner ID.
    pub id: String,
    /// Encrypted account ID.
    pub account_id: String,
    /// PUUID.
    pub puuid: String,
    /// Profile icon.
    pub profile_icon_id: i32,
    /// Last modified (unix epoch milliseconds).
    pub revision_date: i64,
    // Many other fields.
}

/// The upstream calls the pipeline makes. Every call may fail with [`Error::RateLimited`],
/// which [`crate::backoff::BackoffExecutor`] retries.
#[allow(async_fn_in_trait)]
pub trait Upstream {
    /// Entry list of one apex tier.
    async fn league_by_tier(&self, tier: ApexTier, queue: &str) -> Result<LeagueList>;

    /// Summoner by encrypted summoner ID.
    async fn summoner_by_id(&self, summoner_id: &str) -> Result<Summoner>;

    /// Riot account (game name and tag line) by PUUID.
    async fn account_by_puuid(&self, puuid: &str) -> Result<Account>;

    /// One page of a player's match ids, most recent first.
    async fn match_ids_by_puuid(&self, puuid: &str, start: u32, count: u32) -> Result<Vec<String>>;

    /// Raw match-v5 payload.
    async fn match_detail(&self, match_id: &str) -> Result<Value>;
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Map a failed response to the error taxonomy. `429` becomes [`Error::RateLimited`].
pub fn status_error(
    status: Option<StatusCode>,
    headers: Option<&HeaderMap>,
    message: impl Into<String>,
) -> Error {
    match status {
        Some(StatusCode::TOO_MANY_REQUESTS) => Error::RateLimited {
            retry_after: headers.and_then(retry_after),
        },
        status => Error::Upstream {
            status: status.map(|status| status.as_u16()),
            message: message.into(),
        },
    }
}

/// Convert a riven error. Bodies that fail to parse are [`Error::DataShape`].
pub fn upstream_error(error: RiotApiError) -> Error {
    if let Some(de_error) = error.de_error() {
        return Error::DataShape(format!("unexpected response body: {}", de_error));
    }
    status_error(
        error.status_code(),
        error.response().map(|response| response.headers()),
        error.to_string(),
    )
}

/// Build a [`RiotApi`] that makes exactly one attempt per call, leaving retries to
/// [`crate::backoff::BackoffExecutor`]. Riven still paces calls by the returned rate limit
/// headers.
pub fn single_attempt_api(api_key: &SecretString) -> RiotApi {
    RiotApi::new(RiotApiConfig::with_key(api_key.expose_secret()).set_retries(0))
}

/// [`Upstream`] over a [`RiotApi`].
pub struct RiotUpstream<'a> {
    api: &'a RiotApi,
    platform: PlatformRoute,
    regional: RegionalRoute,
    match_queue: Queue,
}

impl<'a> RiotUpstream<'a> {
    /// Create for the configured platform. `api` should come from [`single_attempt_api`].
    pub fn new(api: &'a RiotApi, config: &PipelineConfig) -> Self {
        Self {
            api,
            platform: config.platform,
            regional: config.regional_route(),
            match_queue: Queue(config.match_queue_id),
        }
    }
}

impl Upstream for RiotUpstream<'_> {
    async fn league_by_tier(&self, tier: ApexTier, queue: &str) -> Result<LeagueList> {
        let queue = QueueType::from_str(queue)
            .map_err(|e| Error::Config(format!("ladder queue `{}`: {}", queue, e)))?;
        let league_v4 = self.api.league_v4();
        let list = match tier {
            ApexTier::Challenger => league_v4.get_challenger_league(self.platform, queue).await,
            ApexTier::Grandmaster => {
                league_v4.get_grandmaster_league(self.platform, queue).await
            }
            ApexTier::Master => league_v4.get_master_league(self.platform, queue).await,
        };
        list.map_err(upstream_error)
    }

    async fn summoner_by_id(&self, summoner_id: &str) -> Result<Summoner> {
        let route: &'static str = self.platform.into();
        let request = self.api.request(
            Method::GET,
            route,
            &format!("/lol/summoner/v4/summoners/{}", summoner_id),
        );
        self.api
            .execute_opt::<Summoner>("summoner-v4.getBySummonerId", route, request)
            .await
            .map_err(upstream_error)?
            .ok_or_else(|| Error::Upstream {
                status: Some(StatusCode::NOT_FOUND.as_u16()),
                message: format!("summoner `{}` not found", summoner_id),
            })
    }

    async fn account_by_puuid(&self, puuid: &str) -> Result<Account> {
        self.api
            .account_v1()
            .get_by_puuid(self.regional, puuid)
            .await
            .map_err(upstream_error)
    }

    async fn match_ids_by_puuid(&self, puuid: &str, start: u32, count: u32) -> Result<Vec<String>> {
        let to_i32 = |n: u32| {
            i32::try_from(n).map_err(|_| Error::Config(format!("page bound {} is too large", n)))
        };
        self.api
            .match_v5()
            .get_match_ids_by_puuid(
                self.regional,
                puuid,
                Some(to_i32(count)?),
                None,
                Some(self.match_queue),
                None,
                Some(to_i32(start)?),
                None,
            )
            .await
            .map_err(upstream_error)
    }

    /// Uses riven's raw request path so the stored document keeps every upstream field.
    async fn match_detail(&self, match_id: &str) -> Result<Value> {
        let route: &'static str = self.regional.into();
        let request = self.api.request(
            Method::GET,
            route,
            &format!("/lol/match/v5/matches/{}", match_id),
        );
        let info = self
            .api
            .execute_raw("match-v5.getMatch", route, request)
            .await
            .map_err(upstream_error)?;
        let status = info.response.status();
        if info.status_none {
            return Err(status_error(
                Some(status),
                None,
                format!("match `{}` not found", match_id),
            ));
        }
        let body = info.response.bytes().await.map_err(|e| Error::Upstream {
            status: Some(status.as_u16()),
            message: format!("reading match `{}` failed: {}", match_id, e),
        })?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod test {
    use riven::consts::Tier;
    use riven::reqwest::header::HeaderValue;

    use super::*;
    use crate::testutil::league_list;

    #[test]
    fn test_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(None, retry_after(&headers));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(Some(Duration::from_secs(7)), retry_after(&headers));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(None, retry_after(&headers));
    }

    #[test]
    fn test_status_error() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert!(matches!(
            status_error(Some(StatusCode::TOO_MANY_REQUESTS), Some(&headers), "u"),
            Error::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            status_error(Some(StatusCode::TOO_MANY_REQUESTS), None, "u"),
            Error::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            status_error(Some(StatusCode::SERVICE_UNAVAILABLE), Some(&headers), "u"),
            Error::Upstream { status: Some(503), .. }
        ));
        assert!(matches!(
            status_error(None, None, "connection reset"),
            Error::Upstream { status: None, .. }
        ));
    }

    #[test]
    fn test_league_list_is_riven_model() {
        let list: LeagueList = serde_json::from_slice(&serde_json::to_vec(&league_list("CHALLENGER", &[("s1", 500)])).unwrap())
            .unwrap();
        assert_eq!(Tier::CHALLENGER, list.tier);
        assert_eq!(Some("s1"), list.entries[0].summoner_id.as_deref());
        assert_eq!(500, list.entries[0].league_points);
    }

    #[test]
    fn test_summoner_ignores_extra_fields() {
        let summoner: Summoner = serde_json::from_str(
            r#"{ "id": "s1", "accountId": "a1", "puuid": "p1", "profileIconId": 7,
                "revisionDate": 1700, "summonerLevel": 300 }"#,
        )
        .unwrap();
        assert_eq!("a1", summoner.account_id);
        assert_eq!(1700, summoner.revision_date);
    }
}
