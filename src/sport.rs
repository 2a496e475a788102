//! Supported sports and the profile that drives the generic import pipeline
//! for each: where records come from, how fields map, how duplicates are
//! detected and which table receives them.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::dedupe::DuplicatePolicy;
use crate::normalize::{PeriodRule, ValueKind};
use crate::schema::{DestinationSchema, Field, PeriodEncoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Nba,
    Ncaab,
    Ncaaf,
    Nfl,
    Nhl,
    Mlb,
    Afcon,
}

impl Sport {
    pub const ALL: [Sport; 7] = [
        Sport::Nba,
        Sport::Ncaab,
        Sport::Ncaaf,
        Sport::Nfl,
        Sport::Nhl,
        Sport::Mlb,
        Sport::Afcon,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Sport::Nba => "nba",
            Sport::Ncaab => "ncaab",
            Sport::Ncaaf => "ncaaf",
            Sport::Nfl => "nfl",
            Sport::Nhl => "nhl",
            Sport::Mlb => "mlb",
            Sport::Afcon => "afcon",
        }
    }

    /// Value of `teams.sport` for this sport's reference rows.
    pub fn team_tag(&self) -> &'static str {
        match self {
            Sport::Nba => "NBA",
            Sport::Ncaab => "NCAAB",
            Sport::Ncaaf => "NCAAF",
            Sport::Nfl => "NFL",
            Sport::Nhl => "NHL",
            Sport::Mlb => "MLB",
            Sport::Afcon => "SOCCER",
        }
    }

    pub fn profile(&self) -> SportProfile {
        match self {
            Sport::Nba => SportProfile {
                sport: *self,
                source: UpstreamSource::sdql("NBA", SITE_HOME),
                fields: FieldMap::sdql("points", Some("quarter scores")),
                required: &[],
                periods: PeriodRule::Quarters,
                extras: Vec::new(),
                duplicate_policy: DuplicatePolicy::SymmetricPair,
                schema: quarters_schema("nba_games_1", false),
                lookback_days: 1,
            },
            Sport::Ncaab => SportProfile {
                sport: *self,
                source: UpstreamSource::sdql("NCAABB", SITE_HOME_OR_NEUTRAL),
                fields: FieldMap {
                    start_time: Some("start time"),
                    ..FieldMap::sdql("points", None)
                },
                required: &[],
                periods: PeriodRule::Verbatim,
                extras: Vec::new(),
                duplicate_policy: DuplicatePolicy::SymmetricPair,
                schema: DestinationSchema::new(
                    "ncaab_games",
                    [
                        common_columns("points"),
                        odds_columns(),
                        vec![
                            (Field::StartTime, "start_time"),
                            (Field::CreatedDate, "created_date"),
                            (Field::ModifiedDate, "modified_date"),
                        ],
                    ]
                    .concat(),
                ),
                lookback_days: 2,
            },
            Sport::Ncaaf => SportProfile {
                sport: *self,
                source: UpstreamSource::sdql("NCAAFB", SITE_HOME_OR_NEUTRAL),
                fields: FieldMap {
                    start_time: Some("start time"),
                    ..FieldMap::sdql("points", Some("quarter scores"))
                },
                required: &[],
                periods: PeriodRule::Quarters,
                extras: Vec::new(),
                duplicate_policy: DuplicatePolicy::EitherTeamPlayed,
                schema: quarters_schema("ncaaf_games", true),
                lookback_days: 1,
            },
            Sport::Nfl => SportProfile {
                sport: *self,
                source: UpstreamSource::sdql("NFL", SITE_HOME_OR_NEUTRAL),
                fields: FieldMap {
                    start_time: Some("start time"),
                    ..FieldMap::sdql("points", Some("quarter scores"))
                },
                required: &["total", "line", "o:line"],
                periods: PeriodRule::Quarters,
                extras: Vec::new(),
                duplicate_policy: DuplicatePolicy::EitherTeamPlayed,
                schema: quarters_schema("nfl_games", true),
                lookback_days: 1,
            },
            Sport::Nhl => SportProfile {
                sport: *self,
                source: UpstreamSource::sdql("NHL", SITE_HOME_OR_NEUTRAL),
                // The NHL feed's "line" is the money line.
                fields: FieldMap {
                    home_line: None,
                    away_line: None,
                    home_money_line: Some("line"),
                    away_money_line: Some("o:line"),
                    ..FieldMap::sdql("goals", Some("period scores"))
                },
                required: &[],
                periods: PeriodRule::Verbatim,
                extras: vec![
                    ExtraField::new("goalie", "home_starting_goalie", ValueKind::Text),
                    ExtraField::new("o:goalie", "away_starting_goalie", ValueKind::Text),
                    ExtraField::new("power play goals", "home_powerplay_goals", ValueKind::Int),
                    ExtraField::new("o:power play goals", "away_powerplay_goals", ValueKind::Int),
                    ExtraField::new("overtime", "overtime", ValueKind::Flag),
                    ExtraField::new("shoot out", "shoot_out", ValueKind::Flag),
                ],
                duplicate_policy: DuplicatePolicy::EitherTeamPlayed,
                schema: DestinationSchema::new(
                    "nhl_games",
                    [
                        common_columns("goals"),
                        vec![
                            (Field::HomeMoneyLine, "home_money_line"),
                            (Field::AwayMoneyLine, "away_money_line"),
                            (Field::HomePeriods, "home_period_goals"),
                            (Field::AwayPeriods, "away_period_goals"),
                            (Field::Total, "total"),
                            (Field::Playoffs, "playoffs"),
                            (Field::CreatedDate, "created_date"),
                            (Field::ModifiedDate, "modified_date"),
                        ],
                    ]
                    .concat(),
                )
                .with_period_encoding(PeriodEncoding::IntArray),
                lookback_days: 2,
            },
            Sport::Mlb => SportProfile {
                sport: *self,
                source: UpstreamSource::sdql("MLB", SITE_HOME_OR_NEUTRAL),
                fields: FieldMap {
                    start_time: Some("start time"),
                    ..FieldMap::sdql("runs", Some("inning runs"))
                },
                required: &[],
                periods: PeriodRule::FirstInnings(5),
                extras: vec![
                    ExtraField::new("starter", "home_starting_pitcher", ValueKind::Text),
                    ExtraField::new("o:starter", "away_starting_pitcher", ValueKind::Text),
                    ExtraField::new("line F5", "home_first_5_line", ValueKind::Float),
                    ExtraField::new("o:line F5", "away_first_5_line", ValueKind::Float),
                    ExtraField::new("total F5", "total_first_5", ValueKind::Float),
                ],
                duplicate_policy: DuplicatePolicy::EitherTeamAtStartTime,
                schema: DestinationSchema::new(
                    "mlb_games",
                    [
                        common_columns("runs"),
                        vec![
                            (Field::TotalScore, "total_runs"),
                            (Field::HomeLine, "home_line"),
                            (Field::AwayLine, "away_line"),
                            (Field::HomePeriods, "home_inning_runs"),
                            (Field::AwayPeriods, "away_inning_runs"),
                            (Field::HomeFirstHalf, "home_first_5_runs"),
                            (Field::AwayFirstHalf, "away_first_5_runs"),
                            (Field::HomeMoneyLine, "home_money_line"),
                            (Field::AwayMoneyLine, "away_money_line"),
                            (Field::Playoffs, "playoffs"),
                            (Field::StartTime, "start_time"),
                            (Field::Total, "total"),
                            (Field::CreatedDate, "created_date"),
                            (Field::ModifiedDate, "modified_date"),
                        ],
                    ]
                    .concat(),
                ),
                lookback_days: 1,
            },
            Sport::Afcon => SportProfile {
                sport: *self,
                source: UpstreamSource::OddsApi {
                    sport_key: "soccer_africa_cup_of_nations",
                    regions: "us,uk,eu",
                    bookmaker: "bovada",
                },
                fields: FieldMap {
                    site: None,
                    playoffs: None,
                    start_time: Some("start time"),
                    external_id: Some("id"),
                    ..FieldMap::sdql("points", None)
                },
                required: &[],
                periods: PeriodRule::Verbatim,
                extras: vec![
                    ExtraField::new("draw money line", "draw_money_line", ValueKind::Int),
                    ExtraField::new("over price", "total_over_price", ValueKind::Int),
                    ExtraField::new("under point", "total_under_point", ValueKind::Float),
                    ExtraField::new("under price", "total_under_price", ValueKind::Int),
                ],
                duplicate_policy: DuplicatePolicy::ExternalId,
                schema: DestinationSchema::new(
                    "soccer_games",
                    vec![
                        (Field::ExternalId, "odds_id"),
                        (Field::GameDate, "game_date"),
                        (Field::HomeTeamId, "home_team_id"),
                        (Field::AwayTeamId, "away_team_id"),
                        (Field::HomeTeamName, "home_team_name"),
                        (Field::AwayTeamName, "away_team_name"),
                        (Field::HomeScore, "home_goals"),
                        (Field::AwayScore, "away_goals"),
                        (Field::TotalScore, "total_goals"),
                        (Field::HomeMoneyLine, "home_money_line"),
                        (Field::AwayMoneyLine, "away_money_line"),
                        (Field::HomeLine, "home_spread"),
                        (Field::AwayLine, "away_spread"),
                        (Field::Total, "total_over_point"),
                        (Field::StartTime, "start_time"),
                        (Field::CreatedDate, "created_date"),
                        (Field::ModifiedDate, "modified_date"),
                    ],
                )
                .with_constant("league", "AFCON"),
                lookback_days: 1,
            },
        }
    }

    /// The profile fed from `source`, when this sport has one. NHL can also
    /// be imported from The Odds API scores feed into the same table.
    pub fn profile_from(&self, source: SourceKind) -> Option<SportProfile> {
        match (self, source) {
            (Sport::Nhl, SourceKind::OddsApi) => Some(nhl_odds_api_profile()),
            _ => Some(self.profile()).filter(|profile| profile.source.kind() == source),
        }
    }

    /// Every profile this sport can be imported with, default first.
    pub fn profiles(&self) -> Vec<SportProfile> {
        let default = self.profile();
        let mut profiles = vec![default.clone()];
        profiles.extend(
            SourceKind::ALL
                .into_iter()
                .filter(|kind| *kind != default.source.kind())
                .filter_map(|kind| self.profile_from(kind)),
        );
        profiles
    }
}

/// NHL final scores from The Odds API with DraftKings money lines. Writes
/// the same table as the SDQL feed and shares its duplicate rule, so either
/// source can backfill the other.
fn nhl_odds_api_profile() -> SportProfile {
    SportProfile {
        sport: Sport::Nhl,
        source: UpstreamSource::OddsApi {
            sport_key: "icehockey_nhl",
            regions: "us",
            bookmaker: "draftkings",
        },
        fields: FieldMap {
            site: None,
            home_line: None,
            away_line: None,
            total: None,
            playoffs: None,
            ..FieldMap::sdql("points", None)
        },
        required: &[],
        periods: PeriodRule::Verbatim,
        extras: Vec::new(),
        duplicate_policy: DuplicatePolicy::EitherTeamPlayed,
        schema: DestinationSchema::new(
            "nhl_games",
            vec![
                (Field::GameDate, "game_date"),
                (Field::HomeTeamId, "home_team_id"),
                (Field::AwayTeamId, "away_team_id"),
                (Field::HomeTeamName, "home_team_name"),
                (Field::AwayTeamName, "away_team_name"),
                (Field::HomeScore, "home_goals"),
                (Field::AwayScore, "away_goals"),
                (Field::HomeMoneyLine, "home_money_line"),
                (Field::AwayMoneyLine, "away_money_line"),
                (Field::CreatedDate, "created_date"),
                (Field::ModifiedDate, "modified_date"),
            ],
        )
        .with_constant("game_site", "home"),
        lookback_days: 1,
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.key())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Sport::ALL
            .into_iter()
            .find(|sport| sport.key() == wanted)
            .ok_or_else(|| format!("unknown sport `{s}`"))
    }
}

const SITE_HOME: &str = "site='home'";
const SITE_HOME_OR_NEUTRAL: &str = "(site='home' or site='neutral')";

/// Provider family, selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SourceKind {
    Sdql,
    OddsApi,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Sdql, SourceKind::OddsApi];
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SourceKind::Sdql => "sdql",
            SourceKind::OddsApi => "the-odds-api",
        })
    }
}

/// Where a sport's records are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamSource {
    /// SportsDataQuery, one query per run covering the whole date range.
    Sdql {
        league: &'static str,
        site_filter: &'static str,
    },
    /// The Odds API scores feed merged with historical odds for one bookmaker.
    OddsApi {
        sport_key: &'static str,
        regions: &'static str,
        bookmaker: &'static str,
    },
}

impl UpstreamSource {
    fn sdql(league: &'static str, site_filter: &'static str) -> Self {
        UpstreamSource::Sdql { league, site_filter }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            UpstreamSource::Sdql { .. } => SourceKind::Sdql,
            UpstreamSource::OddsApi { .. } => SourceKind::OddsApi,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            SourceKind::Sdql => "sdql",
            SourceKind::OddsApi => "the-odds-api",
        }
    }
}

/// Provider field names for the canonical game fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    pub date: &'static str,
    pub site: Option<&'static str>,
    pub home_team: &'static str,
    pub away_team: &'static str,
    pub home_score: &'static str,
    pub away_score: &'static str,
    pub home_line: Option<&'static str>,
    pub away_line: Option<&'static str>,
    pub total: Option<&'static str>,
    pub home_money_line: Option<&'static str>,
    pub away_money_line: Option<&'static str>,
    pub playoffs: Option<&'static str>,
    pub home_periods: Option<&'static str>,
    pub away_periods: Option<&'static str>,
    pub start_time: Option<&'static str>,
    pub external_id: Option<&'static str>,
}

impl FieldMap {
    /// SDQL naming: the home side is `team`, its opponent is prefixed `o:`.
    pub fn sdql(score: &'static str, periods: Option<&'static str>) -> Self {
        Self {
            date: "date",
            site: Some("site"),
            home_team: "team",
            away_team: "o:team",
            home_score: score,
            away_score: opponent(score),
            home_line: Some("line"),
            away_line: Some("o:line"),
            total: Some("total"),
            home_money_line: Some("money line"),
            away_money_line: Some("o:money line"),
            playoffs: Some("playoffs"),
            home_periods: periods,
            away_periods: periods.map(opponent),
            start_time: None,
            external_id: None,
        }
    }

    fn keys(&self) -> Vec<&'static str> {
        let mut keys = vec![
            self.date,
            self.home_team,
            self.away_team,
            self.home_score,
            self.away_score,
        ];
        keys.extend(
            [
                self.site,
                self.home_line,
                self.away_line,
                self.total,
                self.home_money_line,
                self.away_money_line,
                self.playoffs,
                self.home_periods,
                self.away_periods,
                self.start_time,
                self.external_id,
            ]
            .into_iter()
            .flatten(),
        );
        keys
    }
}

fn opponent(key: &'static str) -> &'static str {
    match key {
        "points" => "o:points",
        "goals" => "o:goals",
        "runs" => "o:runs",
        "quarter scores" => "o:quarter scores",
        "period scores" => "o:period scores",
        "inning runs" => "o:inning runs",
        other => other,
    }
}

/// A sport-specific column copied straight from the source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: ValueKind,
}

impl ExtraField {
    pub fn new(key: &'static str, column: &'static str, kind: ValueKind) -> Self {
        Self { key, column, kind }
    }
}

/// Everything the pipeline needs to import one sport.
#[derive(Debug, Clone, PartialEq)]
pub struct SportProfile {
    pub sport: Sport,
    pub source: UpstreamSource,
    pub fields: FieldMap,
    /// Source fields without which a record is rejected as incomplete.
    pub required: &'static [&'static str],
    pub periods: PeriodRule,
    pub extras: Vec<ExtraField>,
    pub duplicate_policy: DuplicatePolicy,
    pub schema: DestinationSchema,
    /// Default number of days, ending yesterday, a run covers.
    pub lookback_days: u32,
}

impl SportProfile {
    /// Every provider field the pipeline reads, in a stable order.
    pub fn source_keys(&self) -> Vec<&'static str> {
        let mut keys = self.fields.keys();
        keys.extend(self.required.iter().copied());
        keys.extend(self.extras.iter().map(|e| e.key));

        let mut seen = std::collections::HashSet::new();
        keys.retain(|k| seen.insert(*k));
        keys
    }
}

fn common_columns(score: &'static str) -> Vec<(Field, &'static str)> {
    let (home_score, away_score) = match score {
        "goals" => ("home_goals", "away_goals"),
        "runs" => ("home_runs", "away_runs"),
        _ => ("home_points", "away_points"),
    };
    vec![
        (Field::GameDate, "game_date"),
        (Field::GameSite, "game_site"),
        (Field::HomeTeamId, "home_team_id"),
        (Field::AwayTeamId, "away_team_id"),
        (Field::HomeTeamName, "home_team_name"),
        (Field::AwayTeamName, "away_team_name"),
        (Field::HomeScore, home_score),
        (Field::AwayScore, away_score),
    ]
}

fn odds_columns() -> Vec<(Field, &'static str)> {
    vec![
        (Field::TotalScore, "total_points"),
        (Field::TotalMargin, "total_margin"),
        (Field::HomeLine, "home_line"),
        (Field::AwayLine, "away_line"),
        (Field::HomeMoneyLine, "home_money_line"),
        (Field::AwayMoneyLine, "away_money_line"),
        (Field::Playoffs, "playoffs"),
        (Field::Total, "total"),
    ]
}

/// Layout shared by the quarter-scored sports.
fn quarters_schema(table: &'static str, with_start_time: bool) -> DestinationSchema {
    let mut columns = [
        common_columns("points"),
        odds_columns(),
        vec![
            (Field::HomePeriods, "home_quarter_scores"),
            (Field::AwayPeriods, "away_quarter_scores"),
            (Field::HomeFirstHalf, "home_first_half_points"),
            (Field::AwayFirstHalf, "away_first_half_points"),
            (Field::HomeSecondHalf, "home_second_half_points"),
            (Field::AwaySecondHalf, "away_second_half_points"),
            (Field::HomeOvertime, "home_overtime_points"),
            (Field::AwayOvertime, "away_overtime_points"),
        ],
    ]
    .concat();
    if with_start_time {
        columns.push((Field::StartTime, "start_time"));
    }
    columns.push((Field::CreatedDate, "created_date"));
    columns.push((Field::ModifiedDate, "modified_date"));
    DestinationSchema::new(table, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sport_round_trips_through_key() {
        for sport in Sport::ALL {
            assert_eq!(sport.key().parse::<Sport>(), Ok(sport));
        }
        assert_eq!("NHL".parse::<Sport>(), Ok(Sport::Nhl));
        assert!("cricket".parse::<Sport>().is_err());
    }

    #[test]
    fn test_nhl_has_odds_api_feed() {
        let profile = Sport::Nhl.profile_from(SourceKind::OddsApi).unwrap();
        assert_eq!(profile.schema.table, Sport::Nhl.profile().schema.table);
        assert_eq!(profile.duplicate_policy, Sport::Nhl.profile().duplicate_policy);
        assert!(matches!(
            profile.source,
            UpstreamSource::OddsApi { sport_key: "icehockey_nhl", .. }
        ));
        assert_eq!(Sport::Nhl.profiles().len(), 2);

        assert_eq!(Sport::Nba.profile_from(SourceKind::Sdql), Some(Sport::Nba.profile()));
        assert_eq!(Sport::Nba.profile_from(SourceKind::OddsApi), None);
        assert_eq!(Sport::Afcon.profile_from(SourceKind::Sdql), None);
    }

    #[test]
    fn test_every_profile_has_identity_columns() {
        for schema in Sport::ALL.iter().flat_map(Sport::profiles).map(|p| p.schema) {
            for field in [
                Field::GameDate,
                Field::HomeTeamId,
                Field::AwayTeamId,
                Field::HomeTeamName,
                Field::AwayTeamName,
                Field::HomeScore,
                Field::AwayScore,
            ] {
                assert!(
                    schema.column(field).is_some(),
                    "table {} lacks {field:?}",
                    schema.table
                );
            }
        }
    }

    #[test]
    fn test_policy_specific_columns_present() {
        for profile in Sport::ALL.iter().flat_map(Sport::profiles) {
            match profile.duplicate_policy {
                DuplicatePolicy::EitherTeamAtStartTime => {
                    assert!(profile.schema.column(Field::StartTime).is_some())
                }
                DuplicatePolicy::ExternalId => {
                    assert!(profile.schema.column(Field::ExternalId).is_some())
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_sdql_opponent_keys() {
        let fields = FieldMap::sdql("goals", Some("period scores"));
        assert_eq!(fields.away_score, "o:goals");
        assert_eq!(fields.away_periods, Some("o:period scores"));
    }

    #[test]
    fn test_source_keys_are_unique() {
        let keys = Sport::Afcon.profile().source_keys();
        assert_eq!(keys.iter().filter(|k| **k == "total").count(), 1);
        assert!(keys.contains(&"draw money line"));
        assert!(keys.contains(&"id"));
    }
}
