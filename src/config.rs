//! Run configuration, read once at startup. Anything missing or invalid is
//! fatal before a single record is fetched.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::FixedOffset;

use crate::retry::{FetchFailurePolicy, RetryPolicy};
use crate::sport::UpstreamSource;

/// Configuration
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    sdql_user: Option<String>,
    sdql_token: Option<String>,
    odds_api_key: Option<String>,
    pub http_timeout: Duration,
    pub requests_per_minute: u32,
    pub fetch_retry: RetryPolicy,
    pub write_retry: RetryPolicy,
    /// Primary score feeds.
    pub score_fetch_failure: FetchFailurePolicy,
    /// Secondary historical odds feed.
    pub odds_fetch_failure: FetchFailurePolicy,
    /// Offset used to turn provider timestamps into local game dates.
    pub utc_offset: FixedOffset,
    pub normalization_table: Option<PathBuf>,
    pub db_connect_retries: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("sdql_user", &self.sdql_user)
            .field("http_timeout", &self.http_timeout)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("fetch_retry", &self.fetch_retry)
            .field("write_retry", &self.write_retry)
            .field("score_fetch_failure", &self.score_fetch_failure)
            .field("odds_fetch_failure", &self.odds_fetch_failure)
            .field("utc_offset", &self.utc_offset)
            .field("normalization_table", &self.normalization_table)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Secrets come from env vars, falling back to /run/secrets/* mounts.
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = match lookup("DATABASE_URL") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            Some(_) => bail!("DATABASE_URL is set but empty"),
            None => read_secret_file("/run/secrets/database_url", "database_url")?,
        };

        let odds_api_key = optional_secret(&lookup, "ODDS_API_KEY", "/run/secrets/odds_api_key")?;
        if let Some(key) = &odds_api_key {
            reject_placeholder("ODDS_API_KEY", key)?;
        }
        let sdql_token = optional_secret(&lookup, "SDQL_TOKEN", "/run/secrets/sdql_token")?;
        if let Some(token) = &sdql_token {
            reject_placeholder("SDQL_TOKEN", token)?;
        }

        let fetch_attempts = parse_var(&lookup, "FETCH_RETRY_ATTEMPTS", 3)?;
        let fetch_delay = Duration::from_secs(parse_var(&lookup, "FETCH_RETRY_DELAY_SECS", 1)?);
        let fetch_retry = match lookup("FETCH_RETRY_BACKOFF").as_deref().map(str::trim) {
            None | Some("fixed") => RetryPolicy::fixed(fetch_attempts, fetch_delay),
            Some("exponential") => RetryPolicy::exponential(fetch_attempts, fetch_delay),
            Some(other) => bail!("FETCH_RETRY_BACKOFF must be fixed or exponential, got `{other}`"),
        };

        Ok(Self {
            database_url,
            sdql_user: lookup("SDQL_USER").filter(|v| !v.trim().is_empty()),
            sdql_token,
            odds_api_key,
            http_timeout: Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
            requests_per_minute: parse_var(&lookup, "REQUESTS_PER_MINUTE", 45)?,
            fetch_retry,
            write_retry: RetryPolicy::fixed(
                parse_var(&lookup, "WRITE_RETRY_ATTEMPTS", 3)?,
                Duration::from_secs(parse_var(&lookup, "WRITE_RETRY_DELAY_SECS", 5)?),
            ),
            score_fetch_failure: parse_var(&lookup, "SCORE_FETCH_FAILURE", FetchFailurePolicy::Abort)?,
            odds_fetch_failure: parse_var(&lookup, "ODDS_FETCH_FAILURE", FetchFailurePolicy::Empty)?,
            utc_offset: match lookup("IMPORT_UTC_OFFSET") {
                Some(raw) => parse_utc_offset(&raw)?,
                None => FixedOffset::west_opt(5 * 3600).context("invalid default offset")?,
            },
            normalization_table: lookup("NORMALIZATION_TABLE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            db_connect_retries: parse_var(&lookup, "DB_CONNECT_RETRIES", 5)?,
        })
    }

    pub fn sdql_credentials(&self) -> Option<(&str, &str)> {
        Some((self.sdql_user.as_deref()?, self.sdql_token.as_deref()?))
    }

    pub fn odds_api_key(&self) -> Option<&str> {
        self.odds_api_key.as_deref()
    }

    /// Fail fast when the credentials a source needs are absent.
    pub fn require_credentials(&self, source: &UpstreamSource) -> Result<()> {
        match source {
            UpstreamSource::Sdql { .. } if self.sdql_credentials().is_none() => {
                bail!("SDQL_USER and SDQL_TOKEN are required for SDQL sports")
            }
            UpstreamSource::OddsApi { .. } if self.odds_api_key.is_none() => {
                bail!("ODDS_API_KEY is required for The Odds API sports")
            }
            _ => Ok(()),
        }
    }
}

/// Read a secret from a mounted secret file
fn read_secret_file(file_path: &str, secret_name: &str) -> Result<String> {
    std::fs::read_to_string(file_path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("Secret not set and no secret file at {file_path} ({secret_name})"))
}

fn optional_secret(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    file_path: &str,
) -> Result<Option<String>> {
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(Some(v.trim().to_string())),
        Some(_) => bail!("{name} is set but empty"),
        None => Ok(std::fs::read_to_string(file_path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())),
    }
}

/// Prevent accidental use of sample/placeholder keys
fn reject_placeholder(name: &str, value: &str) -> Result<()> {
    let lower = value.trim().to_lowercase();
    if lower.contains("change_me") || lower.contains("your_") || lower.starts_with("sample") {
        bail!("{name} appears to be a placeholder value; replace it with a real credential");
    }
    Ok(())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {name} `{raw}`: {e}")),
        _ => Ok(default),
    }
}

/// `+HH:MM` / `-HH:MM`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => bail!("UTC offset `{raw}` must start with + or -"),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .with_context(|| format!("UTC offset `{raw}` must look like -05:00"))?;
    let hours: i32 = hours.parse().with_context(|| format!("invalid hours in `{raw}`"))?;
    let minutes: i32 = minutes.parse().with_context(|| format!("invalid minutes in `{raw}`"))?;
    if !(0..24).contains(&hours) {
        bail!("invalid hours in `{raw}`");
    }
    if !(0..60).contains(&minutes) {
        bail!("invalid minutes in `{raw}`");
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset `{raw}` out of range"))
}
