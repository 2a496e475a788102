use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use super::GameStore;
use crate::dedupe::{DuplicatePolicy, MatchKey};
use crate::error::ImportError;
use crate::resolver::Team;
use crate::retry::RetryPolicy;
use crate::schema::{ColumnValue, DestinationSchema, Field};

/// Postgres-backed store. Table and column names come from the static
/// destination schemas; every value is bound.
#[derive(Clone)]
pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with exponential backoff (2s, 4s, 8s, ...).
    pub async fn connect(url: &str, max_retries: u32) -> Result<Self, ImportError> {
        let backoff = RetryPolicy::exponential(max_retries, Duration::from_secs(2));
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self::new(pool));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries.max(1) {
                        return Err(ImportError::Database(e));
                    }
                    warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(backoff.delay_for(attempt)).await;
                }
            }
        }
    }

    pub async fn migrate(&self) -> Result<(), ImportError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }
}

impl GameStore for PgGameStore {
    async fn load_teams(&self, sport_tag: &str) -> Result<Vec<Team>, ImportError> {
        let teams = sqlx::query_as::<_, Team>(
            "SELECT team_id, team_name, sport FROM teams WHERE sport = $1",
        )
        .bind(sport_tag)
        .fetch_all(&self.pool)
        .await?;
        Ok(teams)
    }

    async fn game_exists(
        &self,
        schema: &DestinationSchema,
        policy: DuplicatePolicy,
        key: &MatchKey,
    ) -> Result<bool, ImportError> {
        let mut qb = existence_query(schema, policy, key)?;
        debug!(sql = qb.sql(), "Duplicate check");
        let found = qb.build_query_scalar::<i32>().fetch_optional(&self.pool).await?;
        Ok(found.is_some())
    }

    async fn insert_game(
        &self,
        schema: &DestinationSchema,
        row: &[(String, ColumnValue)],
    ) -> Result<(), ImportError> {
        let mut qb = insert_query(schema.table, row);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

/// `SELECT 1 ... LIMIT 1` matching [`DuplicatePolicy::is_duplicate`].
fn existence_query<'a>(
    schema: &DestinationSchema,
    policy: DuplicatePolicy,
    key: &'a MatchKey,
) -> Result<QueryBuilder<'a, Postgres>, ImportError> {
    let date = schema.require(Field::GameDate)?;
    let home = schema.require(Field::HomeTeamId)?;
    let away = schema.require(Field::AwayTeamId)?;

    let mut qb = QueryBuilder::new(format!("SELECT 1 FROM {} WHERE ", schema.table));
    match policy {
        DuplicatePolicy::SymmetricPair => {
            push_date(&mut qb, date, key);
            push_same_pair(&mut qb, home, away, key);
        }
        DuplicatePolicy::EitherTeamPlayed => {
            push_date(&mut qb, date, key);
            push_shares_team(&mut qb, home, away, key);
        }
        DuplicatePolicy::EitherTeamAtStartTime => {
            push_date(&mut qb, date, key);
            match key.start_time {
                Some(start) => {
                    let column = schema.require(Field::StartTime)?;
                    qb.push(format!(" AND {column} = ")).push_bind(start);
                    push_shares_team(&mut qb, home, away, key);
                }
                None => push_same_pair(&mut qb, home, away, key),
            }
        }
        DuplicatePolicy::ExternalId => {
            qb.push("(");
            if let Some(id) = &key.external_id {
                let column = schema.require(Field::ExternalId)?;
                qb.push(format!("{column} = ")).push_bind(id.as_str()).push(" OR ");
            }
            qb.push("(");
            push_date(&mut qb, date, key);
            push_same_pair(&mut qb, home, away, key);
            qb.push("))");
        }
    }
    qb.push(" LIMIT 1");
    Ok(qb)
}

fn push_date(qb: &mut QueryBuilder<'_, Postgres>, column: &str, key: &MatchKey) {
    qb.push(format!("{column} = ")).push_bind(key.game_date);
}

fn push_same_pair(qb: &mut QueryBuilder<'_, Postgres>, home: &str, away: &str, key: &MatchKey) {
    qb.push(format!(" AND (({home} = "))
        .push_bind(key.home_team_id)
        .push(format!(" AND {away} = "))
        .push_bind(key.away_team_id)
        .push(format!(") OR ({home} = "))
        .push_bind(key.away_team_id)
        .push(format!(" AND {away} = "))
        .push_bind(key.home_team_id)
        .push("))");
}

fn push_shares_team(qb: &mut QueryBuilder<'_, Postgres>, home: &str, away: &str, key: &MatchKey) {
    qb.push(format!(" AND ({home} IN ("))
        .push_bind(key.home_team_id)
        .push(", ")
        .push_bind(key.away_team_id)
        .push(format!(") OR {away} IN ("))
        .push_bind(key.home_team_id)
        .push(", ")
        .push_bind(key.away_team_id)
        .push("))");
}

fn insert_query<'a>(table: &str, row: &'a [(String, ColumnValue)]) -> QueryBuilder<'a, Postgres> {
    let columns: Vec<&str> = row.iter().map(|(name, _)| name.as_str()).collect();
    let mut qb = QueryBuilder::new(format!("INSERT INTO {table} ({}) VALUES (", columns.join(", ")));

    let mut values = qb.separated(", ");
    for (_, value) in row {
        match value.clone() {
            ColumnValue::Int(v) => values.push_bind(v),
            ColumnValue::Float(v) => values.push_bind(v),
            ColumnValue::Text(v) => values.push_bind(v),
            ColumnValue::Bool(v) => values.push_bind(v),
            ColumnValue::Date(v) => values.push_bind(v),
            ColumnValue::Time(v) => values.push_bind(v),
            ColumnValue::Timestamp(v) => values.push_bind(v),
            ColumnValue::Json(v) => values.push_bind(v),
            ColumnValue::IntArray(v) => values.push_bind(v),
        };
    }
    values.push_unseparated(")");
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport::Sport;
    use chrono::{NaiveDate, NaiveTime};

    fn key() -> MatchKey {
        MatchKey {
            game_date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            home_team_id: 1,
            away_team_id: 2,
            start_time: Some(NaiveTime::from_hms_opt(13, 5, 0).unwrap()),
            external_id: Some("evt-1".to_string()),
        }
    }

    #[test]
    fn test_symmetric_pair_sql() {
        let schema = Sport::Nba.profile().schema;
        let key = key();
        let qb = existence_query(&schema, DuplicatePolicy::SymmetricPair, &key).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM nba_games_1 WHERE game_date = $1 AND ((home_team_id = $2 AND away_team_id = $3) \
             OR (home_team_id = $4 AND away_team_id = $5)) LIMIT 1"
        );
    }

    #[test]
    fn test_start_time_sql() {
        let schema = Sport::Mlb.profile().schema;
        let key = key();
        let qb = existence_query(&schema, DuplicatePolicy::EitherTeamAtStartTime, &key).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM mlb_games WHERE game_date = $1 AND start_time = $2 AND (home_team_id IN ($3, $4) \
             OR away_team_id IN ($5, $6)) LIMIT 1"
        );
    }

    #[test]
    fn test_external_id_sql() {
        let schema = Sport::Afcon.profile().schema;
        let key = key();
        let qb = existence_query(&schema, DuplicatePolicy::ExternalId, &key).unwrap();
        assert!(qb.sql().starts_with("SELECT 1 FROM soccer_games WHERE (odds_id = $1 OR (game_date = $2"));
    }

    #[test]
    fn test_external_id_requires_column() {
        let schema = Sport::Nba.profile().schema;
        let key = key();
        assert!(matches!(
            existence_query(&schema, DuplicatePolicy::ExternalId, &key),
            Err(ImportError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_insert_sql() {
        let row = vec![
            ("game_date".to_string(), ColumnValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())),
            ("home_points".to_string(), ColumnValue::Int(Some(102))),
            ("league".to_string(), ColumnValue::Text(Some("AFCON".to_string()))),
        ];
        let qb = insert_query("nba_games_1", &row);
        assert_eq!(
            qb.sql(),
            "INSERT INTO nba_games_1 (game_date, home_points, league) VALUES ($1, $2, $3)"
        );
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a migrated database"]
    async fn test_load_teams_against_database() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgGameStore::connect(&url, 1).await.unwrap();
        store.migrate().await.unwrap();
        let teams = store.load_teams("NBA").await.unwrap();
        assert!(teams.iter().all(|t| t.sport == "NBA"));
    }
}
