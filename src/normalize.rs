//! Field normalization: turning a provider record into typed values that
//! match the destination schema, including derived period aggregates.

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde_json::Value;
use tracing::warn;

use crate::corrections::NormalizationTable;
use crate::error::{Side, SkipReason};
use crate::record::{coerce_int, SourceRecord};
use crate::schema::ColumnValue;
use crate::sport::{FieldMap, SportProfile};

/// Nested score arrays are sometimes JSON-encoded more than once.
const MAX_DECODE_DEPTH: usize = 3;

/// How per-period scores roll up into derived columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodRule {
    /// Four quarters: halves are periods 1-2 and 3-4, overtime is period 5.
    Quarters,
    /// Runs over the first `n` innings, once at least `n` have been played.
    FirstInnings(usize),
    /// Periods are stored as-is with no derived columns.
    Verbatim,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodSplits {
    pub first_half: Option<i32>,
    pub second_half: Option<i32>,
    pub overtime: Option<i32>,
}

impl PeriodRule {
    /// Derive the aggregates for one side. Fails when a sum leaves `i32`.
    pub fn split(&self, periods: &[i32]) -> Result<PeriodSplits, String> {
        let splits = match *self {
            PeriodRule::Quarters => PeriodSplits {
                first_half: sum_periods(periods, 0..2)?,
                second_half: sum_periods(periods, 2..4)?,
                overtime: periods.get(4).copied(),
            },
            PeriodRule::FirstInnings(n) => PeriodSplits {
                first_half: sum_periods(periods, 0..n)?,
                ..PeriodSplits::default()
            },
            PeriodRule::Verbatim => PeriodSplits::default(),
        };
        Ok(splits)
    }
}

/// `None` when fewer periods than `range` were played.
fn sum_periods(periods: &[i32], range: std::ops::Range<usize>) -> Result<Option<i32>, String> {
    let Some(slice) = periods.get(range.clone()) else {
        return Ok(None);
    };
    slice
        .iter()
        .try_fold(0i32, |acc, p| acc.checked_add(*p))
        .map(Some)
        .ok_or_else(|| format!("periods {}-{} overflow: {slice:?}", range.start + 1, range.end))
}

/// Coercion applied to a sport-specific extra column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Text,
    Flag,
}

/// Everything known about one participant of a normalized game.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamLine {
    pub name: String,
    pub score: i32,
    pub line: Option<f64>,
    pub money_line: Option<i32>,
    pub periods: Option<Vec<i32>>,
    pub splits: PeriodSplits,
}

/// A game whose fields are parsed, typed and have derived aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGame {
    pub game_date: NaiveDate,
    pub site: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub external_id: Option<String>,
    pub home: TeamLine,
    pub away: TeamLine,
    pub total: Option<f64>,
    pub playoffs: Option<bool>,
    pub extras: Vec<(String, ColumnValue)>,
}

impl NormalizedGame {
    pub fn total_score(&self) -> i32 {
        self.home.score.saturating_add(self.away.score)
    }

    /// Home minus away.
    pub fn margin(&self) -> i32 {
        self.home.score.saturating_sub(self.away.score)
    }
}

pub struct Normalizer<'a> {
    profile: &'a SportProfile,
    table: &'a NormalizationTable,
}

impl<'a> Normalizer<'a> {
    pub fn new(profile: &'a SportProfile, table: &'a NormalizationTable) -> Self {
        Self { profile, table }
    }

    pub fn normalize(&self, record: &SourceRecord) -> Result<NormalizedGame, SkipReason> {
        let fields = &self.profile.fields;

        // A game without a final score can never be reconciled, so this check
        // runs before anything else.
        let home_score = record
            .int(fields.home_score)?
            .ok_or(SkipReason::MissingScore { side: Side::Home })?;
        let away_score = record
            .int(fields.away_score)?
            .ok_or(SkipReason::MissingScore { side: Side::Away })?;
        if home_score.checked_add(away_score).is_none() || home_score.checked_sub(away_score).is_none() {
            return Err(SkipReason::malformed(
                fields.home_score,
                format!("scores {home_score} and {away_score} out of range"),
            ));
        }

        for key in self.profile.required {
            if record.value(key).is_none() {
                return Err(SkipReason::MissingField(key.to_string()));
            }
        }

        let home_name = required_text(record, fields.home_team)?;
        let away_name = required_text(record, fields.away_team)?;

        let game_date = match record.value(fields.date) {
            Some(value) => parse_game_date(value)
                .ok_or_else(|| SkipReason::malformed(fields.date, format!("unrecognized date {value}")))?,
            None => return Err(SkipReason::MissingField(fields.date.to_string())),
        };

        let site = match fields.site {
            Some(key) => Some(required_text(record, key)?),
            None => None,
        };

        let home_periods = periods(record, fields.home_periods)?;
        let away_periods = periods(record, fields.away_periods)?;

        let home = TeamLine {
            name: home_name,
            score: home_score,
            line: optional_float(record, fields.home_line),
            money_line: optional_int(record, fields.home_money_line),
            splits: self.splits(fields.home_periods, home_periods.as_deref())?,
            periods: home_periods,
        };
        let away = TeamLine {
            name: away_name,
            score: away_score,
            line: optional_float(record, fields.away_line),
            money_line: optional_int(record, fields.away_money_line),
            splits: self.splits(fields.away_periods, away_periods.as_deref())?,
            periods: away_periods,
        };

        Ok(NormalizedGame {
            game_date,
            site,
            start_time: self.start_time(record, fields),
            external_id: fields.external_id.and_then(|key| record.text(key)),
            home,
            away,
            total: optional_float(record, fields.total),
            playoffs: fields.playoffs.and_then(|key| record.flag(key)),
            extras: self.extras(record),
        })
    }

    fn splits(&self, key: Option<&str>, periods: Option<&[i32]>) -> Result<PeriodSplits, SkipReason> {
        match (key, periods) {
            (Some(key), Some(periods)) => self
                .profile
                .periods
                .split(periods)
                .map_err(|detail| SkipReason::malformed(key, detail)),
            _ => Ok(PeriodSplits::default()),
        }
    }

    fn start_time(&self, record: &SourceRecord, fields: &FieldMap) -> Option<NaiveTime> {
        let key = fields.start_time?;
        let value = record.value(key)?;
        match parse_start_time(value, self.table) {
            Ok(time) => time,
            Err(detail) => {
                warn!(field = key, %detail, "Unparseable start time, storing null");
                None
            }
        }
    }

    fn extras(&self, record: &SourceRecord) -> Vec<(String, ColumnValue)> {
        self.profile
            .extras
            .iter()
            .map(|extra| {
                let value = match extra.kind {
                    ValueKind::Int => ColumnValue::Int(optional_int(record, Some(extra.key))),
                    ValueKind::Float => ColumnValue::Float(optional_float(record, Some(extra.key))),
                    ValueKind::Text => ColumnValue::Text(record.text(extra.key)),
                    ValueKind::Flag => ColumnValue::Bool(record.flag(extra.key)),
                };
                (extra.column.to_string(), value)
            })
            .collect()
    }
}

fn required_text(record: &SourceRecord, key: &str) -> Result<String, SkipReason> {
    record
        .text(key)
        .ok_or_else(|| SkipReason::MissingField(key.to_string()))
}

fn optional_int(record: &SourceRecord, key: Option<&str>) -> Option<i32> {
    let key = key?;
    record.int(key).unwrap_or_else(|reason| {
        warn!(%reason, "Ignoring unusable optional value");
        None
    })
}

fn optional_float(record: &SourceRecord, key: Option<&str>) -> Option<f64> {
    let key = key?;
    record.float(key).unwrap_or_else(|reason| {
        warn!(%reason, "Ignoring unusable optional value");
        None
    })
}

fn periods(record: &SourceRecord, key: Option<&str>) -> Result<Option<Vec<i32>>, SkipReason> {
    let Some(key) = key else {
        return Ok(None);
    };
    match record.value(key) {
        Some(value) => decode_periods(value)
            .map(Some)
            .map_err(|detail| SkipReason::malformed(key, detail)),
        None => Ok(None),
    }
}

/// Decode a period-score array that may arrive natively or as (possibly
/// repeatedly) JSON-encoded text.
pub fn decode_periods(value: &Value) -> Result<Vec<i32>, String> {
    let mut current = value.clone();
    for _ in 0..=MAX_DECODE_DEPTH {
        match current {
            Value::Array(items) => {
                return items
                    .iter()
                    .map(|item| coerce_int(item).ok_or_else(|| format!("non-integer period score {item}")))
                    .collect();
            }
            Value::String(text) => {
                current = serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))?;
            }
            other => return Err(format!("expected an array of scores, got {other}")),
        }
    }
    Err(format!("still encoded after {MAX_DECODE_DEPTH} rounds of decoding"))
}

/// Accepts `YYYYMMDD` (number or text), `YYYY-MM-DD` and RFC 3339 timestamps.
pub fn parse_game_date(value: &Value) -> Option<NaiveDate> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    NaiveDate::parse_from_str(&text, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(&text, "%Y-%m-%d"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(&text).ok().map(|dt| dt.date_naive()))
}

/// Parse a military start time (`1838`, `730`, `"19:05"`). Zero means
/// "not scheduled" and yields `None`.
pub fn parse_start_time(
    value: &Value,
    table: &NormalizationTable,
) -> Result<Option<NaiveTime>, String> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("unexpected start time {other}")),
    };
    if raw.is_empty() || raw == "0" {
        return Ok(None);
    }

    if raw.contains(':') {
        return NaiveTime::parse_from_str(&raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
            .map(Some)
            .map_err(|e| format!("invalid start time `{raw}`: {e}"));
    }

    let corrected = table.correct_start_time(&raw);
    if corrected.len() > 4 || !corrected.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid start time `{raw}`"));
    }
    let padded = format!("{corrected:0>4}");
    NaiveTime::parse_from_str(&padded, "%H%M")
        .map(Some)
        .map_err(|e| format!("invalid start time `{raw}`: {e}"))
}
