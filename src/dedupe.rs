//! Duplicate detection: deciding whether a candidate game is already stored.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};

use crate::resolver::TeamId;

/// How a sport decides that a candidate game is already recorded.
///
/// Providers may report a neutral-site game from either participant's side,
/// so every policy treats home/away orientation as unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Same date and the same unordered `{home, away}` pair.
    ///
    /// Prevents the neutral-site double count. A doubleheader against a
    /// different opponent is admitted; a second game between the same two
    /// teams on one day is rejected.
    SymmetricPair,

    /// Same date and either team already appears as home or away.
    ///
    /// Tolerates feeds that emit one row per participant, but rejects every
    /// legitimate doubleheader.
    EitherTeamPlayed,

    /// Same date, same start time and either team appears. Admits
    /// doubleheaders as long as start times differ. Candidates without a
    /// start time fall back to [`DuplicatePolicy::SymmetricPair`].
    EitherTeamAtStartTime,

    /// Same provider id, or a [`DuplicatePolicy::SymmetricPair`] match for
    /// rows imported before ids were tracked.
    ExternalId,
}

impl DuplicatePolicy {
    /// In-memory form of the existence check. Store implementations must
    /// agree with this predicate.
    pub fn is_duplicate(&self, candidate: &MatchKey, existing: &MatchKey) -> bool {
        if candidate.game_date != existing.game_date && *self != DuplicatePolicy::ExternalId {
            return false;
        }

        match self {
            DuplicatePolicy::SymmetricPair => same_pair(candidate, existing),
            DuplicatePolicy::EitherTeamPlayed => shares_team(candidate, existing),
            DuplicatePolicy::EitherTeamAtStartTime => match candidate.start_time {
                Some(start) => existing.start_time == Some(start) && shares_team(candidate, existing),
                None => same_pair(candidate, existing),
            },
            DuplicatePolicy::ExternalId => {
                let same_id = matches!(
                    (&candidate.external_id, &existing.external_id),
                    (Some(a), Some(b)) if a == b
                );
                same_id || (candidate.game_date == existing.game_date && same_pair(candidate, existing))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DuplicatePolicy::SymmetricPair => "symmetric-pair",
            DuplicatePolicy::EitherTeamPlayed => "either-team-played",
            DuplicatePolicy::EitherTeamAtStartTime => "either-team-at-start-time",
            DuplicatePolicy::ExternalId => "external-id",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "symmetric-pair" => Ok(DuplicatePolicy::SymmetricPair),
            "either-team-played" => Ok(DuplicatePolicy::EitherTeamPlayed),
            "either-team-at-start-time" => Ok(DuplicatePolicy::EitherTeamAtStartTime),
            "external-id" => Ok(DuplicatePolicy::ExternalId),
            other => Err(format!("unknown duplicate policy `{other}`")),
        }
    }
}

/// The identity columns a duplicate check compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
    pub game_date: NaiveDate,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub start_time: Option<NaiveTime>,
    pub external_id: Option<String>,
}

fn same_pair(a: &MatchKey, b: &MatchKey) -> bool {
    (a.home_team_id == b.home_team_id && a.away_team_id == b.away_team_id)
        || (a.home_team_id == b.away_team_id && a.away_team_id == b.home_team_id)
}

fn shares_team(a: &MatchKey, b: &MatchKey) -> bool {
    [a.home_team_id, a.away_team_id]
        .iter()
        .any(|team| *team == b.home_team_id || *team == b.away_team_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(date: &str, home: TeamId, away: TeamId) -> MatchKey {
        MatchKey {
            game_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            home_team_id: home,
            away_team_id: away,
            start_time: None,
            external_id: None,
        }
    }

    fn at(mut key: MatchKey, hhmm: &str) -> MatchKey {
        key.start_time = Some(NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap());
        key
    }

    #[test]
    fn test_symmetric_pair_ignores_orientation() {
        let policy = DuplicatePolicy::SymmetricPair;
        let stored = key("2024-03-01", 1, 2);

        assert!(policy.is_duplicate(&key("2024-03-01", 1, 2), &stored));
        assert!(policy.is_duplicate(&key("2024-03-01", 2, 1), &stored));
        assert!(!policy.is_duplicate(&key("2024-03-02", 2, 1), &stored));
    }

    #[test]
    fn test_symmetric_pair_admits_doubleheader_against_other_opponent() {
        let policy = DuplicatePolicy::SymmetricPair;
        let stored = key("2024-03-01", 1, 2);

        assert!(!policy.is_duplicate(&key("2024-03-01", 1, 3), &stored));
    }

    #[test]
    fn test_either_team_rejects_doubleheader() {
        let policy = DuplicatePolicy::EitherTeamPlayed;
        let stored = key("2024-03-01", 1, 2);

        assert!(policy.is_duplicate(&key("2024-03-01", 3, 1), &stored));
        assert!(policy.is_duplicate(&key("2024-03-01", 2, 4), &stored));
        assert!(!policy.is_duplicate(&key("2024-03-01", 3, 4), &stored));
    }

    #[test]
    fn test_start_time_policy() {
        let policy = DuplicatePolicy::EitherTeamAtStartTime;
        let stored = at(key("2024-07-04", 1, 2), "13:05");

        assert!(policy.is_duplicate(&at(key("2024-07-04", 2, 1), "13:05"), &stored));
        // Second game of a doubleheader.
        assert!(!policy.is_duplicate(&at(key("2024-07-04", 1, 2), "19:10"), &stored));
        // No start time: falls back to the unordered pair.
        assert!(policy.is_duplicate(&key("2024-07-04", 2, 1), &stored));
        assert!(!policy.is_duplicate(&key("2024-07-04", 1, 3), &stored));
    }

    #[test]
    fn test_external_id_matches_across_dates() {
        let policy = DuplicatePolicy::ExternalId;
        let mut stored = key("2024-01-20", 5, 6);
        stored.external_id = Some("abc123".to_string());

        let mut moved = key("2024-01-21", 7, 8);
        moved.external_id = Some("abc123".to_string());
        assert!(policy.is_duplicate(&moved, &stored));

        let legacy = key("2024-01-20", 6, 5);
        assert!(policy.is_duplicate(&legacy, &stored));

        let mut other = key("2024-01-20", 5, 9);
        other.external_id = Some("zzz".to_string());
        assert!(!policy.is_duplicate(&other, &stored));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("symmetric_pair".parse(), Ok(DuplicatePolicy::SymmetricPair));
        assert_eq!("External-Id".parse(), Ok(DuplicatePolicy::ExternalId));
        assert!("nearest".parse::<DuplicatePolicy>().is_err());
    }
}
