//! Destination schema descriptors: which columns a sport's table has and
//! how a resolved game fills them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;

use crate::error::ImportError;
use crate::resolver::ResolvedGame;

/// Canonical game fields a destination table may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ExternalId,
    GameDate,
    GameSite,
    StartTime,
    HomeTeamId,
    AwayTeamId,
    HomeTeamName,
    AwayTeamName,
    HomeScore,
    AwayScore,
    TotalScore,
    TotalMargin,
    HomeLine,
    AwayLine,
    Total,
    HomeMoneyLine,
    AwayMoneyLine,
    Playoffs,
    HomePeriods,
    AwayPeriods,
    HomeFirstHalf,
    AwayFirstHalf,
    HomeSecondHalf,
    AwaySecondHalf,
    HomeOvertime,
    AwayOvertime,
    CreatedDate,
    ModifiedDate,
}

/// Storage type used for period-score columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEncoding {
    Json,
    IntArray,
}

/// A typed value bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int(Option<i32>),
    Float(Option<f64>),
    Text(Option<String>),
    Bool(Option<bool>),
    Date(NaiveDate),
    Time(Option<NaiveTime>),
    Timestamp(DateTime<Utc>),
    Json(Option<Value>),
    IntArray(Option<Vec<i32>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationSchema {
    pub table: &'static str,
    pub columns: Vec<(Field, &'static str)>,
    /// Columns holding a fixed value for every row (e.g. a league tag).
    pub constants: Vec<(&'static str, &'static str)>,
    pub period_encoding: PeriodEncoding,
}

impl DestinationSchema {
    pub fn new(table: &'static str, columns: Vec<(Field, &'static str)>) -> Self {
        Self {
            table,
            columns,
            constants: Vec::new(),
            period_encoding: PeriodEncoding::Json,
        }
    }

    pub fn with_constant(mut self, column: &'static str, value: &'static str) -> Self {
        self.constants.push((column, value));
        self
    }

    pub fn with_period_encoding(mut self, encoding: PeriodEncoding) -> Self {
        self.period_encoding = encoding;
        self
    }

    pub fn column(&self, field: Field) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, name)| *name)
    }

    pub fn require(&self, field: Field) -> Result<&'static str, ImportError> {
        self.column(field).ok_or_else(|| ImportError::MissingColumn {
            table: self.table.to_string(),
            field: format!("{field:?}"),
        })
    }

    /// Column/value pairs for one insert, in declaration order followed by
    /// constants and the game's extra columns.
    pub fn row(&self, resolved: &ResolvedGame, now: DateTime<Utc>) -> Vec<(String, ColumnValue)> {
        let mut row: Vec<(String, ColumnValue)> = self
            .columns
            .iter()
            .map(|(field, name)| (name.to_string(), self.value_of(*field, resolved, now)))
            .collect();

        row.extend(
            self.constants
                .iter()
                .map(|(name, value)| (name.to_string(), ColumnValue::Text(Some(value.to_string())))),
        );
        row.extend(resolved.game.extras.iter().cloned());
        row
    }

    fn value_of(&self, field: Field, resolved: &ResolvedGame, now: DateTime<Utc>) -> ColumnValue {
        let game = &resolved.game;
        let (home, away) = (&game.home, &game.away);
        match field {
            Field::ExternalId => ColumnValue::Text(game.external_id.clone()),
            Field::GameDate => ColumnValue::Date(game.game_date),
            Field::GameSite => ColumnValue::Text(game.site.clone()),
            Field::StartTime => ColumnValue::Time(game.start_time),
            Field::HomeTeamId => ColumnValue::Int(Some(resolved.home.id)),
            Field::AwayTeamId => ColumnValue::Int(Some(resolved.away.id)),
            Field::HomeTeamName => ColumnValue::Text(Some(resolved.home.name.clone())),
            Field::AwayTeamName => ColumnValue::Text(Some(resolved.away.name.clone())),
            Field::HomeScore => ColumnValue::Int(Some(home.score)),
            Field::AwayScore => ColumnValue::Int(Some(away.score)),
            Field::TotalScore => ColumnValue::Float(Some(f64::from(game.total_score()))),
            Field::TotalMargin => ColumnValue::Float(Some(f64::from(game.margin()))),
            Field::HomeLine => ColumnValue::Float(home.line),
            Field::AwayLine => ColumnValue::Float(away.line),
            Field::Total => ColumnValue::Float(game.total),
            Field::HomeMoneyLine => ColumnValue::Int(home.money_line),
            Field::AwayMoneyLine => ColumnValue::Int(away.money_line),
            Field::Playoffs => ColumnValue::Bool(game.playoffs),
            Field::HomePeriods => self.periods(&home.periods),
            Field::AwayPeriods => self.periods(&away.periods),
            Field::HomeFirstHalf => ColumnValue::Int(home.splits.first_half),
            Field::AwayFirstHalf => ColumnValue::Int(away.splits.first_half),
            Field::HomeSecondHalf => ColumnValue::Int(home.splits.second_half),
            Field::AwaySecondHalf => ColumnValue::Int(away.splits.second_half),
            Field::HomeOvertime => ColumnValue::Int(home.splits.overtime),
            Field::AwayOvertime => ColumnValue::Int(away.splits.overtime),
            Field::CreatedDate | Field::ModifiedDate => ColumnValue::Timestamp(now),
        }
    }

    fn periods(&self, periods: &Option<Vec<i32>>) -> ColumnValue {
        match self.period_encoding {
            PeriodEncoding::Json => ColumnValue::Json(periods.as_ref().map(|p| Value::from(p.clone()))),
            PeriodEncoding::IntArray => ColumnValue::IntArray(periods.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{NormalizedGame, PeriodRule, TeamLine};
    use crate::resolver::ResolvedTeam;
    use serde_json::json;

    fn resolved() -> ResolvedGame {
        let side = |name: &str, score, periods: Vec<i32>| TeamLine {
            name: name.to_string(),
            score,
            line: None,
            money_line: Some(-110),
            splits: PeriodRule::Quarters.split(&periods).unwrap(),
            periods: Some(periods),
        };
        ResolvedGame {
            game: NormalizedGame {
                game_date: NaiveDate::from_ymd_opt(2024, 2, 11).unwrap(),
                site: Some("neutral".to_string()),
                start_time: None,
                external_id: None,
                home: side("Chiefs", 25, vec![0, 3, 10, 3, 9]),
                away: side("49ers", 22, vec![0, 10, 0, 9, 3]),
                total: Some(47.5),
                playoffs: Some(true),
                extras: vec![("attendance".to_string(), ColumnValue::Int(Some(61629)))],
            },
            home: ResolvedTeam {
                id: 16,
                name: "Chiefs".to_string(),
            },
            away: ResolvedTeam {
                id: 26,
                name: "49ers".to_string(),
            },
        }
    }

    #[test]
    fn test_row_follows_descriptor() {
        let now = Utc::now();
        let schema = DestinationSchema::new(
            "nfl_games",
            vec![
                (Field::GameDate, "game_date"),
                (Field::HomeTeamId, "home_team_id"),
                (Field::TotalScore, "total_points"),
                (Field::TotalMargin, "total_margin"),
                (Field::HomePeriods, "home_quarter_scores"),
                (Field::HomeOvertime, "home_overtime_points"),
                (Field::CreatedDate, "created_date"),
            ],
        )
        .with_constant("league", "NFL");

        let row = schema.row(&resolved(), now);
        let names: Vec<&str> = row.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "game_date",
                "home_team_id",
                "total_points",
                "total_margin",
                "home_quarter_scores",
                "home_overtime_points",
                "created_date",
                "league",
                "attendance"
            ]
        );
        assert_eq!(row[1].1, ColumnValue::Int(Some(16)));
        assert_eq!(row[2].1, ColumnValue::Float(Some(47.0)));
        assert_eq!(row[3].1, ColumnValue::Float(Some(3.0)));
        assert_eq!(row[4].1, ColumnValue::Json(Some(json!([0, 3, 10, 3, 9]))));
        assert_eq!(row[5].1, ColumnValue::Int(Some(9)));
        assert_eq!(row[6].1, ColumnValue::Timestamp(now));
        assert_eq!(row[7].1, ColumnValue::Text(Some("NFL".to_string())));
    }

    #[test]
    fn test_int_array_encoding() {
        let schema = DestinationSchema::new("nhl_games", vec![(Field::AwayPeriods, "away_period_goals")])
            .with_period_encoding(PeriodEncoding::IntArray);
        let row = schema.row(&resolved(), Utc::now());
        assert_eq!(row[0].1, ColumnValue::IntArray(Some(vec![0, 10, 0, 9, 3])));
    }

    #[test]
    fn test_require_missing_column() {
        let schema = DestinationSchema::new("soccer_games", vec![(Field::GameDate, "game_date")]);
        assert_eq!(schema.require(Field::GameDate).unwrap(), "game_date");
        assert!(matches!(
            schema.require(Field::StartTime),
            Err(ImportError::MissingColumn { .. })
        ));
    }
}
