use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use game_importer::corrections::NormalizationTable;
use game_importer::store::PgGameStore;
use game_importer::upstream::{fetch_records, DateRange, HttpFetcher};
use game_importer::sport::{SourceKind, SportProfile};
use game_importer::{Config, ImportSummary, Importer, Sport};

#[derive(Parser, Debug)]
#[command(name = "game-importer", version, about = "Import completed games into per-sport tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import completed games for one sport
    Import {
        #[arg(value_enum)]
        sport: Sport,
        /// First game date (YYYY-MM-DD). Alone, imports that single day.
        start: Option<NaiveDate>,
        /// Last game date, inclusive
        end: Option<NaiveDate>,
        /// Provider to read from instead of the sport's default
        #[arg(long, value_enum)]
        source: Option<SourceKind>,
        /// Run everything except the insert
        #[arg(long)]
        dry_run: bool,
        /// JSON normalization table replacing the built-in corrections
        #[arg(long)]
        corrections: Option<PathBuf>,
    },
    /// List supported sports and how each is imported
    Sports,
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("game_importer=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Sports => {
            list_sports();
            Ok(())
        }
        Command::Migrate => {
            let config = Config::from_env()?;
            let store = PgGameStore::connect(&config.database_url, config.db_connect_retries).await?;
            store.migrate().await?;
            Ok(())
        }
        Command::Import {
            sport,
            start,
            end,
            source,
            dry_run,
            corrections,
        } => {
            let profile = match source {
                Some(kind) => sport
                    .profile_from(kind)
                    .ok_or_else(|| anyhow!("{sport} cannot be imported from {kind}"))?,
                None => sport.profile(),
            };
            let range = match (start, end) {
                (None, None) => DateRange::lookback(Local::now().date_naive(), profile.lookback_days),
                (Some(start), None) => DateRange::single(start),
                (Some(start), Some(end)) => DateRange::new(start, end)?,
                (None, Some(_)) => bail!("END requires START"),
            };

            let run_id = Uuid::new_v4();
            let span = info_span!("import", %run_id, %sport, source = profile.source.name());
            match run_import(profile, range, dry_run, corrections).instrument(span).await {
                Ok(summary) => {
                    info!(%run_id, "Run complete: {}", summary);
                    Ok(())
                }
                Err(e) => {
                    error!(%run_id, "Run failed: {:?}", e);
                    Err(e)
                }
            }
        }
    }
}

async fn run_import(
    profile: SportProfile,
    range: DateRange,
    dry_run: bool,
    corrections: Option<PathBuf>,
) -> Result<ImportSummary> {
    let config = Config::from_env()?;
    let sport = profile.sport;
    config.require_credentials(&profile.source)?;

    let table = match corrections.or_else(|| config.normalization_table.clone()) {
        Some(path) => NormalizationTable::from_file(&path)
            .with_context(|| format!("Failed to load normalization table {}", path.display()))?,
        None => NormalizationTable::builtin(),
    };

    info!(
        "Importing {} games from {} to {} ({} duplicate policy{})",
        sport,
        range.start,
        range.end,
        profile.duplicate_policy,
        if dry_run { ", dry run" } else { "" }
    );

    let store = PgGameStore::connect(&config.database_url, config.db_connect_retries).await?;
    let fetcher = HttpFetcher::new(config.http_timeout, config.requests_per_minute, config.fetch_retry)?;

    let records = fetch_records(&fetcher, &config, &profile, range)
        .await
        .with_context(|| format!("Failed to fetch {sport} games"))?;

    let summary = Importer::new(&store, &profile, &table)
        .with_write_retry(config.write_retry)
        .dry_run(dry_run)
        .run(records)
        .await?;
    Ok(summary)
}

fn list_sports() {
    println!("{:<8} {:<14} {:<28} {:<14} LOOKBACK", "SPORT", "SOURCE", "DUPLICATE POLICY", "TABLE");
    for profile in Sport::ALL.iter().flat_map(Sport::profiles) {
        println!(
            "{:<8} {:<14} {:<28} {:<14} {}d",
            profile.sport,
            profile.source.name(),
            profile.duplicate_policy,
            profile.schema.table,
            profile.lookback_days
        );
    }
}
