//! Upstream providers: rate-limited, retried HTTP fetches reshaped into
//! [`SourceRecord`]s.

mod odds_api;
mod sdql;

pub use odds_api::OddsApiClient;
pub use sdql::SdqlClient;

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ImportError;
use crate::record::SourceRecord;
use crate::retry::{with_retry, FetchFailurePolicy, RetryPolicy};
use crate::sport::{SportProfile, UpstreamSource};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Inclusive range of game dates covered by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ImportError> {
        if start > end {
            return Err(ImportError::Config(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// `days` days ending the day before `today`.
    pub fn lookback(today: NaiveDate, days: u32) -> Self {
        let end = today - ChronoDuration::days(1);
        let start = end - ChronoDuration::days(i64::from(days.max(1)) - 1);
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Shared HTTP client: one rate limiter and retry policy for every request.
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: Limiter,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        requests_per_minute: u32,
        retry: RetryPolicy,
    ) -> Result<Self, ImportError> {
        let per_minute = NonZeroU32::new(requests_per_minute)
            .ok_or_else(|| ImportError::Config("requests per minute must be positive".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|source| ImportError::Http {
                source_name: "client".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            retry,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send `request` with retries, returning the body of the first
    /// successful response.
    pub async fn fetch_text(
        &self,
        source_name: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, ImportError> {
        let request = &request;
        with_retry(&self.retry, source_name, || async move {
            let request = request
                .try_clone()
                .ok_or_else(|| ImportError::NotReplayable(source_name.to_string()))?;

            self.limiter.until_ready().await;

            let response = request.send().await.map_err(|source| ImportError::Http {
                source_name: source_name.to_string(),
                source,
            })?;

            if let Some(remaining) = response.headers().get("x-requests-remaining") {
                info!(
                    "{} requests remaining: {}",
                    source_name,
                    remaining.to_str().unwrap_or("?")
                );
            }

            let status = response.status();
            let body = response.text().await.map_err(|source| ImportError::Http {
                source_name: source_name.to_string(),
                source,
            })?;

            if !status.is_success() {
                return Err(ImportError::UpstreamStatus {
                    source_name: source_name.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(body)
        })
        .await
    }
}

/// Resolve a fetch result against its failure policy.
pub(crate) fn apply_failure_policy<T: Default>(
    policy: FetchFailurePolicy,
    label: &str,
    result: Result<T, ImportError>,
) -> Result<T, ImportError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => match policy {
            FetchFailurePolicy::Abort => Err(e),
            FetchFailurePolicy::Empty => {
                warn!("{} failed after retries, continuing without it: {}", label, e);
                Ok(T::default())
            }
        },
    }
}

/// Decode a JSON body, treating an undecodable payload as empty.
pub(crate) fn decode_or_empty<T>(label: &str, body: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    serde_json::from_str(body).unwrap_or_else(|e| {
        warn!("Failed to parse {} response, treating as empty: {}", label, e);
        T::default()
    })
}

/// Fetch every record for `profile` in `range` from its configured provider.
pub async fn fetch_records(
    fetcher: &HttpFetcher,
    config: &Config,
    profile: &SportProfile,
    range: DateRange,
) -> Result<Vec<SourceRecord>, ImportError> {
    match &profile.source {
        UpstreamSource::Sdql { .. } => {
            let client = SdqlClient::from_config(fetcher, config)?;
            client.fetch(profile, range).await
        }
        UpstreamSource::OddsApi { .. } => {
            let client = OddsApiClient::from_config(fetcher, config)?;
            client.fetch(profile, range).await
        }
    }
}
