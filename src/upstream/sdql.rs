use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{apply_failure_policy, decode_or_empty, DateRange, HttpFetcher};
use crate::config::Config;
use crate::error::ImportError;
use crate::record::SourceRecord;
use crate::retry::FetchFailurePolicy;
use crate::sport::{SportProfile, UpstreamSource};

const SDQL_BASE_URL: &str = "https://s3.sportsdatabase.com";

/// Column-oriented SportsDataQuery response: one column per requested field.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SdqlResponse {
    pub headers: Vec<String>,
    pub groups: Vec<SdqlGroup>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SdqlGroup {
    pub columns: Vec<Vec<Value>>,
}

impl SdqlResponse {
    /// Transpose every group's columns into one record per game.
    pub fn into_records(self) -> Vec<SourceRecord> {
        let headers = self.headers;
        let mut records = Vec::new();
        for group in self.groups {
            if group.columns.len() != headers.len() {
                warn!(
                    "SDQL group has {} columns for {} headers, skipping group",
                    group.columns.len(),
                    headers.len()
                );
                continue;
            }
            let rows = group.columns.iter().map(Vec::len).min().unwrap_or(0);
            for row in 0..rows {
                records.push(
                    headers
                        .iter()
                        .zip(&group.columns)
                        .map(|(header, column)| (header.clone(), column[row].clone()))
                        .collect(),
                );
            }
        }
        records
    }
}

pub struct SdqlClient<'a> {
    fetcher: &'a HttpFetcher,
    user: &'a str,
    token: &'a str,
    failure_policy: FetchFailurePolicy,
}

impl<'a> SdqlClient<'a> {
    pub fn from_config(fetcher: &'a HttpFetcher, config: &'a Config) -> Result<Self, ImportError> {
        let (user, token) = config
            .sdql_credentials()
            .ok_or_else(|| ImportError::Config("SDQL_USER and SDQL_TOKEN are required".to_string()))?;
        Ok(Self {
            fetcher,
            user,
            token,
            failure_policy: config.score_fetch_failure,
        })
    }

    pub async fn fetch(
        &self,
        profile: &SportProfile,
        range: DateRange,
    ) -> Result<Vec<SourceRecord>, ImportError> {
        let UpstreamSource::Sdql { league, site_filter } = &profile.source else {
            return Err(ImportError::Config(format!(
                "{} is not served by SDQL",
                profile.sport
            )));
        };

        let query = build_query(&profile.source_keys(), site_filter, range);
        info!(sport = %profile.sport, %query, "Querying SDQL");

        let request = self
            .fetcher
            .client()
            .get(format!("{SDQL_BASE_URL}/{league}/query"))
            .header("user", self.user)
            .header("token", self.token)
            .query(&[("sdql", query.as_str())]);

        let body = apply_failure_policy(
            self.failure_policy,
            "SDQL query",
            self.fetcher.fetch_text("sdql", request).await.map(Some),
        )?;
        let Some(body) = body else {
            return Ok(Vec::new());
        };

        let response: SdqlResponse = decode_or_empty("SDQL", &body);
        let records = response.into_records();
        info!(sport = %profile.sport, "Fetched {} games from SDQL", records.len());
        Ok(records)
    }
}

/// `"{fields}@{site filter} and date>=YYYYMMDD and date<=YYYYMMDD"`
pub fn build_query(fields: &[&str], site_filter: &str, range: DateRange) -> String {
    format!(
        "{}@{} and date>={} and date<={}",
        fields.join(","),
        site_filter,
        range.start.format("%Y%m%d"),
        range.end.format("%Y%m%d")
    )
}
