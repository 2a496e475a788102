use std::sync::Mutex;

use super::GameStore;
use crate::dedupe::{DuplicatePolicy, MatchKey};
use crate::error::ImportError;
use crate::resolver::Team;
use crate::schema::{ColumnValue, DestinationSchema, Field};

/// In-process store for pipeline tests. Duplicate checks go through
/// [`DuplicatePolicy::is_duplicate`] against every stored row.
#[derive(Default)]
pub struct MemoryStore {
    teams: Vec<Team>,
    rows: Mutex<Vec<Vec<(String, ColumnValue)>>>,
    /// Number of upcoming inserts that fail with a pool timeout.
    failing_inserts: Mutex<u32>,
    insert_attempts: Mutex<u32>,
}

impl MemoryStore {
    pub fn with_teams(sport_tag: &str, names: &[(i32, &str)]) -> Self {
        let teams = names
            .iter()
            .map(|(id, name)| Team {
                team_id: *id,
                team_name: name.to_string(),
                sport: sport_tag.to_string(),
            })
            .collect();
        Self {
            teams,
            ..Self::default()
        }
    }

    pub fn fail_next_inserts(&self, count: u32) {
        *self.failing_inserts.lock().unwrap() = count;
    }

    pub fn rows(&self) -> Vec<Vec<(String, ColumnValue)>> {
        self.rows.lock().unwrap().clone()
    }

    pub fn insert_attempts(&self) -> u32 {
        *self.insert_attempts.lock().unwrap()
    }
}

impl GameStore for MemoryStore {
    async fn load_teams(&self, sport_tag: &str) -> Result<Vec<Team>, ImportError> {
        Ok(self.teams.iter().filter(|t| t.sport == sport_tag).cloned().collect())
    }

    async fn game_exists(
        &self,
        schema: &DestinationSchema,
        policy: DuplicatePolicy,
        key: &MatchKey,
    ) -> Result<bool, ImportError> {
        let rows = self.rows.lock().unwrap();
        for row in rows.iter() {
            let stored = match_key(schema, row)?;
            if policy.is_duplicate(key, &stored) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn insert_game(
        &self,
        _schema: &DestinationSchema,
        row: &[(String, ColumnValue)],
    ) -> Result<(), ImportError> {
        *self.insert_attempts.lock().unwrap() += 1;

        let mut failing = self.failing_inserts.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(ImportError::Database(sqlx::Error::PoolTimedOut));
        }
        drop(failing);

        self.rows.lock().unwrap().push(row.to_vec());
        Ok(())
    }
}

/// Read a stored row's identity columns back into a [`MatchKey`].
fn match_key(schema: &DestinationSchema, row: &[(String, ColumnValue)]) -> Result<MatchKey, ImportError> {
    let get = |field: Field| column_value(schema, row, field);
    let team = |field: Field| match get(field) {
        Some(ColumnValue::Int(Some(id))) => Ok(*id),
        _ => Err(ImportError::MissingColumn {
            table: schema.table.to_string(),
            field: format!("{field:?}"),
        }),
    };

    let game_date = match get(Field::GameDate) {
        Some(ColumnValue::Date(date)) => *date,
        _ => {
            return Err(ImportError::MissingColumn {
                table: schema.table.to_string(),
                field: "GameDate".to_string(),
            })
        }
    };

    Ok(MatchKey {
        game_date,
        home_team_id: team(Field::HomeTeamId)?,
        away_team_id: team(Field::AwayTeamId)?,
        start_time: match get(Field::StartTime) {
            Some(ColumnValue::Time(time)) => *time,
            _ => None,
        },
        external_id: match get(Field::ExternalId) {
            Some(ColumnValue::Text(id)) => id.clone(),
            _ => None,
        },
    })
}

fn column_value<'r>(
    schema: &DestinationSchema,
    row: &'r [(String, ColumnValue)],
    field: Field,
) -> Option<&'r ColumnValue> {
    let column = schema.column(field)?;
    row.iter().find(|(name, _)| name == column).map(|(_, v)| v)
}
