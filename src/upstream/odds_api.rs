use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{apply_failure_policy, decode_or_empty, DateRange, HttpFetcher};
use crate::config::Config;
use crate::error::ImportError;
use crate::record::SourceRecord;
use crate::retry::FetchFailurePolicy;
use crate::sport::{SportProfile, UpstreamSource};

const ODDS_API_BASE_URL: &str = "https://api.the-odds-api.com/v4";

/// Scores endpoint only looks back this many days.
const SCORES_DAYS_FROM: u32 = 3;

/// The Odds API event structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OddsApiEvent {
    pub id: String,
    pub sport_key: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub markets: Vec<Market>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Outcome {
    pub name: String,
    pub price: Option<i32>,
    pub point: Option<f64>,
}

/// An event from the scores endpoint.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScoreEvent {
    pub id: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub home_team: String,
    pub away_team: String,
    pub scores: Option<Vec<TeamScore>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TeamScore {
    pub name: String,
    /// Sent as a string.
    pub score: Value,
}

/// Historical odds snapshot wrapper.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HistoricalOdds {
    pub data: Vec<OddsApiEvent>,
}

/// One bookmaker's closing prices for a game, oriented to the score event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameOdds {
    pub home_money_line: Option<i32>,
    pub away_money_line: Option<i32>,
    pub draw_money_line: Option<i32>,
    pub home_spread: Option<f64>,
    pub away_spread: Option<f64>,
    pub over_point: Option<f64>,
    pub over_price: Option<i32>,
    pub under_point: Option<f64>,
    pub under_price: Option<i32>,
}

/// Extract odds for `bookmaker` from an event. Outcomes are matched by team
/// name, so a feed listing the teams the other way round still lines up.
pub fn extract_odds(event: &OddsApiEvent, bookmaker: &str, home_team: &str, away_team: &str) -> GameOdds {
    let mut odds = GameOdds::default();
    let Some(book) = event.bookmakers.iter().find(|b| b.key == bookmaker) else {
        return odds;
    };

    for market in &book.markets {
        for outcome in &market.outcomes {
            match market.key.as_str() {
                "h2h" => {
                    if outcome.name == home_team {
                        odds.home_money_line = outcome.price;
                    } else if outcome.name == away_team {
                        odds.away_money_line = outcome.price;
                    } else if outcome.name == "Draw" {
                        odds.draw_money_line = outcome.price;
                    }
                }
                "spreads" => {
                    if outcome.name == home_team {
                        odds.home_spread = outcome.point;
                    } else if outcome.name == away_team {
                        odds.away_spread = outcome.point;
                    }
                }
                "totals" => {
                    if outcome.name == "Over" {
                        odds.over_point = outcome.point;
                        odds.over_price = outcome.price;
                    } else if outcome.name == "Under" {
                        odds.under_point = outcome.point;
                        odds.under_price = outcome.price;
                    }
                }
                _ => {}
            }
        }
    }
    odds
}

pub struct OddsApiClient<'a> {
    fetcher: &'a HttpFetcher,
    api_key: &'a str,
    offset: FixedOffset,
    scores_policy: FetchFailurePolicy,
    odds_policy: FetchFailurePolicy,
}

impl<'a> OddsApiClient<'a> {
    pub fn from_config(fetcher: &'a HttpFetcher, config: &'a Config) -> Result<Self, ImportError> {
        let api_key = config
            .odds_api_key()
            .ok_or_else(|| ImportError::Config("ODDS_API_KEY is required".to_string()))?;
        Ok(Self {
            fetcher,
            api_key,
            offset: config.utc_offset,
            scores_policy: config.score_fetch_failure,
            odds_policy: config.odds_fetch_failure,
        })
    }

    pub async fn fetch(
        &self,
        profile: &SportProfile,
        range: DateRange,
    ) -> Result<Vec<SourceRecord>, ImportError> {
        let UpstreamSource::OddsApi {
            sport_key,
            regions,
            bookmaker,
        } = &profile.source
        else {
            return Err(ImportError::Config(format!(
                "{} is not served by The Odds API",
                profile.sport
            )));
        };

        let today = Utc::now().with_timezone(&self.offset).date_naive();
        if let Some(earliest) = beyond_scores_window(range, today) {
            warn!(
                sport = %profile.sport,
                "Scores feed only reaches back to {}; games between {} and that day cannot be imported",
                earliest,
                range.start
            );
        }

        let scores = self.fetch_scores(sport_key).await?;
        let games = completed_in_range(scores, range, self.offset);
        info!(
            sport = %profile.sport,
            "Found {} completed games between {} and {}",
            games.len(),
            range.start,
            range.end
        );

        let mut odds_by_date: HashMap<NaiveDate, Vec<OddsApiEvent>> = HashMap::new();
        let mut records = Vec::with_capacity(games.len());
        for (date, game) in games {
            if !odds_by_date.contains_key(&date) {
                let events = self.fetch_historical_odds(sport_key, regions, bookmaker, date).await?;
                odds_by_date.insert(date, events);
            }
            let events = odds_by_date.get(&date).map(Vec::as_slice).unwrap_or_default();

            let odds = find_matchup(events, &game.home_team, &game.away_team)
                .map(|event| extract_odds(event, bookmaker, &game.home_team, &game.away_team))
                .unwrap_or_else(|| {
                    debug!("No odds for {} vs {}", game.home_team, game.away_team);
                    GameOdds::default()
                });

            records.push(to_record(&game, date, self.offset, &odds));
        }
        Ok(records)
    }

    async fn fetch_scores(&self, sport_key: &str) -> Result<Vec<ScoreEvent>, ImportError> {
        let days_from = SCORES_DAYS_FROM.to_string();
        let request = self
            .fetcher
            .client()
            .get(format!("{ODDS_API_BASE_URL}/sports/{sport_key}/scores"))
            .query(&[
                ("apiKey", self.api_key),
                ("daysFrom", days_from.as_str()),
                ("dateFormat", "iso"),
            ]);

        let body = apply_failure_policy(
            self.scores_policy,
            "Odds API scores",
            self.fetcher.fetch_text("the-odds-api", request).await.map(Some),
        )?;
        Ok(body
            .map(|body| decode_or_empty("Odds API scores", &body))
            .unwrap_or_default())
    }

    async fn fetch_historical_odds(
        &self,
        sport_key: &str,
        regions: &str,
        bookmaker: &str,
        date: NaiveDate,
    ) -> Result<Vec<OddsApiEvent>, ImportError> {
        let snapshot = format!("{}T00:00:00Z", date.format("%Y-%m-%d"));
        let request = self
            .fetcher
            .client()
            .get(format!("{ODDS_API_BASE_URL}/historical/sports/{sport_key}/odds"))
            .query(&[
                ("apiKey", self.api_key),
                ("regions", regions),
                ("bookmakers", bookmaker),
                ("markets", "h2h,spreads,totals"),
                ("oddsFormat", "american"),
                ("date", snapshot.as_str()),
            ]);

        let body = apply_failure_policy(
            self.odds_policy,
            "Odds API historical odds",
            self.fetcher.fetch_text("the-odds-api", request).await.map(Some),
        )?;
        let events = body
            .map(|body| decode_or_empty::<HistoricalOdds>("Odds API historical odds", &body).data)
            .unwrap_or_default();
        info!("Found odds for {} games on {}", events.len(), date);
        Ok(events)
    }
}

/// Earliest date the scores feed still covers, when `range` starts before it.
fn beyond_scores_window(range: DateRange, today: NaiveDate) -> Option<NaiveDate> {
    let earliest = today - Duration::days(i64::from(SCORES_DAYS_FROM));
    (range.start < earliest).then_some(earliest)
}

/// Completed, scored events whose local commence date falls inside `range`.
fn completed_in_range(
    scores: Vec<ScoreEvent>,
    range: DateRange,
    offset: FixedOffset,
) -> Vec<(NaiveDate, ScoreEvent)> {
    scores
        .into_iter()
        .filter(|event| event.completed && event.scores.is_some())
        .filter_map(|event| {
            let date = event.commence_time?.with_timezone(&offset).date_naive();
            range.contains(date).then_some((date, event))
        })
        .collect()
}

fn find_matchup<'e>(events: &'e [OddsApiEvent], home: &str, away: &str) -> Option<&'e OddsApiEvent> {
    events.iter().find(|e| {
        (e.home_team == home && e.away_team == away) || (e.home_team == away && e.away_team == home)
    })
}

fn score_for(event: &ScoreEvent, team: &str) -> Value {
    event
        .scores
        .iter()
        .flatten()
        .find(|s| s.name == team)
        .map(|s| s.score.clone())
        .unwrap_or(Value::Null)
}

/// Reshape into the same keys the SDQL feed uses.
fn to_record(event: &ScoreEvent, date: NaiveDate, offset: FixedOffset, odds: &GameOdds) -> SourceRecord {
    let start_time = event
        .commence_time
        .map(|t| t.with_timezone(&offset).format("%H:%M").to_string());

    SourceRecord::new()
        .with("id", event.id.as_str())
        .with("date", date.format("%Y-%m-%d").to_string())
        .with("start time", start_time)
        .with("team", event.home_team.as_str())
        .with("o:team", event.away_team.as_str())
        .with("points", score_for(event, &event.home_team))
        .with("o:points", score_for(event, &event.away_team))
        .with("money line", odds.home_money_line)
        .with("o:money line", odds.away_money_line)
        .with("draw money line", odds.draw_money_line)
        .with("line", odds.home_spread)
        .with("o:line", odds.away_spread)
        .with("total", odds.over_point)
        .with("over price", odds.over_price)
        .with("under point", odds.under_point)
        .with("under price", odds.under_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn historical() -> Vec<OddsApiEvent> {
        serde_json::from_value::<HistoricalOdds>(json!({
            "timestamp": "2024-01-20T00:00:00Z",
            "data": [{
                "id": "odds-1",
                "sport_key": "soccer_africa_cup_of_nations",
                "home_team": "Ivory Coast",
                "away_team": "Nigeria",
                "bookmakers": [
                    { "key": "pinnacle", "markets": [] },
                    {
                        "key": "bovada",
                        "markets": [
                            { "key": "h2h", "outcomes": [
                                { "name": "Ivory Coast", "price": 150 },
                                { "name": "Nigeria", "price": 190 },
                                { "name": "Draw", "price": 210 }
                            ]},
                            { "key": "spreads", "outcomes": [
                                { "name": "Ivory Coast", "price": -110, "point": -0.5 },
                                { "name": "Nigeria", "price": -110, "point": 0.5 }
                            ]},
                            { "key": "totals", "outcomes": [
                                { "name": "Over", "price": 105, "point": 2.5 },
                                { "name": "Under", "price": -125, "point": 2.5 }
                            ]}
                        ]
                    }
                ]
            }]
        }))
        .unwrap()
        .data
    }

    #[test]
    fn test_extract_odds_for_bookmaker() {
        let events = historical();
        let odds = extract_odds(&events[0], "bovada", "Ivory Coast", "Nigeria");
        assert_eq!(odds.home_money_line, Some(150));
        assert_eq!(odds.away_money_line, Some(190));
        assert_eq!(odds.draw_money_line, Some(210));
        assert_eq!(odds.home_spread, Some(-0.5));
        assert_eq!(odds.over_point, Some(2.5));
        assert_eq!(odds.under_price, Some(-125));

        assert_eq!(extract_odds(&events[0], "pinnacle", "Ivory Coast", "Nigeria"), GameOdds::default());
    }

    #[test]
    fn test_reversed_matchup_is_reoriented() {
        let events = historical();
        let event = find_matchup(&events, "Nigeria", "Ivory Coast").unwrap();
        let odds = extract_odds(event, "bovada", "Nigeria", "Ivory Coast");
        assert_eq!(odds.home_money_line, Some(190));
        assert_eq!(odds.away_spread, Some(-0.5));
    }

    #[test]
    fn test_range_older_than_scores_window() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let today = day(20);

        assert_eq!(beyond_scores_window(DateRange::single(day(19)), today), None);
        assert_eq!(beyond_scores_window(DateRange::single(day(17)), today), None);
        assert_eq!(
            beyond_scores_window(DateRange::new(day(10), day(19)).unwrap(), today),
            Some(day(17))
        );
    }

    #[test]
    fn test_completed_games_filtered_by_local_date() {
        let scores: Vec<ScoreEvent> = serde_json::from_value(json!([
            {
                "id": "a", "completed": true, "home_team": "Ivory Coast", "away_team": "Nigeria",
                "commence_time": "2024-01-19T01:00:00Z",
                "scores": [{ "name": "Ivory Coast", "score": "0" }, { "name": "Nigeria", "score": "1" }]
            },
            {
                "id": "b", "completed": false, "home_team": "Mali", "away_team": "Ghana",
                "commence_time": "2024-01-18T17:00:00Z", "scores": null
            }
        ]))
        .unwrap();

        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 18).unwrap();
        let games = completed_in_range(scores, DateRange::single(day), offset);

        assert_eq!(games.len(), 1);
        assert_eq!(games[0].0, day);

        let record = to_record(&games[0].1, games[0].0, offset, &GameOdds::default());
        assert_eq!(record.text("id").as_deref(), Some("a"));
        assert_eq!(record.text("date").as_deref(), Some("2024-01-18"));
        assert_eq!(record.text("start time").as_deref(), Some("20:00"));
        assert_eq!(record.int("o:points"), Ok(Some(1)));
        assert_eq!(record.value("money line"), None);
    }
}
