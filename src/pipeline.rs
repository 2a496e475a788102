//! One import run: normalize, resolve, check for duplicates and insert each
//! record, counting every outcome.

use std::fmt;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::corrections::NormalizationTable;
use crate::dedupe::MatchKey;
use crate::error::{ImportError, SkipReason};
use crate::normalize::Normalizer;
use crate::record::SourceRecord;
use crate::resolver::{ResolvedGame, TeamResolver};
use crate::retry::{with_retry, RetryPolicy};
use crate::sport::SportProfile;
use crate::store::GameStore;

/// Per-run outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub skipped_missing_data: usize,
    pub skipped_missing_team: usize,
    pub skipped_malformed: usize,
    pub failed_write: usize,
}

impl ImportSummary {
    fn record_skip(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::MissingScore { .. } | SkipReason::MissingField(_) => self.skipped_missing_data += 1,
            SkipReason::Malformed { .. } => self.skipped_malformed += 1,
            SkipReason::UnknownTeam { .. } | SkipReason::ExcludedTeam(_) => self.skipped_missing_team += 1,
            SkipReason::Duplicate => self.skipped_duplicate += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_duplicate + self.skipped_missing_data + self.skipped_missing_team + self.skipped_malformed
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} inserted={} duplicate={} missing_data={} missing_team={} malformed={} failed_write={}",
            self.fetched,
            self.inserted,
            self.skipped_duplicate,
            self.skipped_missing_data,
            self.skipped_missing_team,
            self.skipped_malformed,
            self.failed_write
        )
    }
}

enum Outcome {
    Inserted,
    Skipped(SkipReason),
    WriteFailed(ImportError),
}

pub struct Importer<'a, S> {
    store: &'a S,
    profile: &'a SportProfile,
    table: &'a NormalizationTable,
    write_retry: RetryPolicy,
    dry_run: bool,
}

impl<'a, S: GameStore> Importer<'a, S> {
    pub fn new(store: &'a S, profile: &'a SportProfile, table: &'a NormalizationTable) -> Self {
        Self {
            store,
            profile,
            table,
            write_retry: RetryPolicy::fixed(3, std::time::Duration::from_secs(5)),
            dry_run: false,
        }
    }

    pub fn with_write_retry(mut self, retry: RetryPolicy) -> Self {
        self.write_retry = retry;
        self
    }

    /// Run everything except the insert.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Import `records`. Record-level problems are counted, never returned;
    /// only failing to load reference teams aborts the run.
    pub async fn run(&self, records: Vec<SourceRecord>) -> Result<ImportSummary, ImportError> {
        let sport = self.profile.sport;
        let teams = self.store.load_teams(sport.team_tag()).await?;
        let resolver = TeamResolver::new(sport, teams, self.table);
        if resolver.is_empty() {
            warn!(%sport, "No reference teams loaded; every record will be skipped");
        } else {
            info!(%sport, "Loaded {} reference teams", resolver.len());
        }

        let normalizer = Normalizer::new(self.profile, self.table);
        let mut summary = ImportSummary {
            fetched: records.len(),
            ..ImportSummary::default()
        };
        // Keys that a dry run would have written, so in-run duplicates still count.
        let mut pending: Vec<MatchKey> = Vec::new();

        for record in &records {
            let outcome = match normalizer
                .normalize(record)
                .and_then(|game| resolver.resolve_game(game))
            {
                Ok(resolved) => self.persist(resolved, &mut pending).await,
                Err(reason) => Outcome::Skipped(reason),
            };

            match outcome {
                Outcome::Inserted => summary.inserted += 1,
                Outcome::Skipped(reason) => {
                    if reason.is_routine() {
                        debug!(%sport, %reason, "Skipping record");
                    } else {
                        warn!(%sport, %reason, "Skipping record");
                    }
                    summary.record_skip(&reason);
                }
                Outcome::WriteFailed(e) => {
                    error!(%sport, "Giving up on record after retries: {}", e);
                    summary.failed_write += 1;
                }
            }
        }

        info!(%sport, dry_run = self.dry_run, "Import finished: {}", summary);
        Ok(summary)
    }

    async fn persist(&self, resolved: ResolvedGame, pending: &mut Vec<MatchKey>) -> Outcome {
        let schema = &self.profile.schema;
        let policy = self.profile.duplicate_policy;
        let key = resolved.match_key();

        let exists = with_retry(&self.write_retry, "duplicate check", || {
            self.store.game_exists(schema, policy, &key)
        })
        .await;
        match exists {
            Ok(true) => return Outcome::Skipped(SkipReason::Duplicate),
            Ok(false) => {}
            Err(e) => return Outcome::WriteFailed(e),
        }
        if pending.iter().any(|seen| policy.is_duplicate(&key, seen)) {
            return Outcome::Skipped(SkipReason::Duplicate);
        }

        let game = &resolved.game;
        if self.dry_run {
            info!(
                "[dry run] would insert {} vs {} on {}",
                resolved.home.name, resolved.away.name, game.game_date
            );
            pending.push(key);
            return Outcome::Inserted;
        }

        let row = schema.row(&resolved, Utc::now());
        let inserted = with_retry(&self.write_retry, "insert", || self.store.insert_game(schema, &row)).await;
        match inserted {
            Ok(()) => {
                info!(
                    "Inserted {} {} - {} {} on {}",
                    resolved.home.name, game.home.score, game.away.score, resolved.away.name, game.game_date
                );
                Outcome::Inserted
            }
            Err(e) => Outcome::WriteFailed(e),
        }
    }
}
