use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::corrections::NormalizationTable;
use crate::dedupe::MatchKey;
use crate::error::SkipReason;
use crate::normalize::NormalizedGame;
use crate::sport::Sport;

pub type TeamId = i32;

/// A row of the `teams` reference table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Team {
    pub team_id: TeamId,
    pub team_name: String,
    pub sport: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTeam {
    pub id: TeamId,
    /// Canonical (post-alias) name, stored as the denormalized team name.
    pub name: String,
}

/// A normalized game whose participants both exist in the reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGame {
    pub game: NormalizedGame,
    pub home: ResolvedTeam,
    pub away: ResolvedTeam,
}

impl ResolvedGame {
    pub fn match_key(&self) -> MatchKey {
        MatchKey {
            game_date: self.game.game_date,
            home_team_id: self.home.id,
            away_team_id: self.away.id,
            start_time: self.game.start_time,
            external_id: self.game.external_id.clone(),
        }
    }
}

/// Name → id lookup for one sport, built once per run.
///
/// Matching is exact and case-sensitive after alias substitution.
#[derive(Debug, Clone)]
pub struct TeamResolver {
    sport: Sport,
    by_name: HashMap<String, TeamId>,
    aliases: HashMap<String, String>,
    excluded: HashSet<String>,
}

impl TeamResolver {
    pub fn new(sport: Sport, teams: Vec<Team>, table: &NormalizationTable) -> Self {
        let mut by_name = HashMap::with_capacity(teams.len());
        for team in teams {
            if let Some(existing) = by_name.get(&team.team_name) {
                warn!(
                    sport = %sport,
                    name = %team.team_name,
                    kept = existing,
                    ignored = team.team_id,
                    "Duplicate team name in reference table"
                );
                continue;
            }
            by_name.insert(team.team_name, team.team_id);
        }

        Self {
            sport,
            by_name,
            aliases: table.aliases_for(sport),
            excluded: table.excluded_for(sport).into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedTeam, SkipReason> {
        if self.excluded.contains(name) {
            return Err(SkipReason::ExcludedTeam(name.to_string()));
        }

        let canonical = self.canonical_name(name);
        if canonical != name {
            debug!(from = name, to = canonical, "Applied team alias");
        }

        self.by_name
            .get(canonical)
            .map(|&id| ResolvedTeam {
                id,
                name: canonical.to_string(),
            })
            .ok_or_else(|| SkipReason::UnknownTeam {
                sport: self.sport.to_string(),
                name: canonical.to_string(),
            })
    }

    /// Resolve both participants. Either one failing rejects the game.
    pub fn resolve_game(&self, game: NormalizedGame) -> Result<ResolvedGame, SkipReason> {
        let home = self.resolve(&game.home.name)?;
        let away = self.resolve(&game.away.name)?;
        Ok(ResolvedGame { game, home, away })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams(sport: &str, names: &[(TeamId, &str)]) -> Vec<Team> {
        names
            .iter()
            .map(|(id, name)| Team {
                team_id: *id,
                team_name: name.to_string(),
                sport: sport.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_exact_case_sensitive_match() {
        let resolver = TeamResolver::new(
            Sport::Nba,
            teams("NBA", &[(1, "Celtics"), (2, "Knicks")]),
            &NormalizationTable::default(),
        );

        assert_eq!(resolver.resolve("Celtics").unwrap().id, 1);
        assert!(matches!(
            resolver.resolve("celtics"),
            Err(SkipReason::UnknownTeam { .. })
        ));
        assert!(resolver.resolve("Lakers").is_err());
    }

    #[test]
    fn test_alias_applied_before_lookup() {
        let resolver = TeamResolver::new(
            Sport::Nhl,
            teams("NHL", &[(40, "Mammoth"), (41, "Kraken")]),
            &NormalizationTable::builtin(),
        );

        let team = resolver.resolve("Hockey Club").unwrap();
        assert_eq!(team.id, 40);
        assert_eq!(team.name, "Mammoth");
    }

    #[test]
    fn test_excluded_team() {
        let resolver = TeamResolver::new(
            Sport::Nfl,
            teams("NFL", &[(7, "Bulls")]),
            &NormalizationTable::builtin(),
        );
        assert_eq!(
            resolver.resolve("Bulls"),
            Err(SkipReason::ExcludedTeam("Bulls".to_string()))
        );
    }

    #[test]
    fn test_duplicate_reference_rows_keep_first() {
        let resolver = TeamResolver::new(
            Sport::Mlb,
            teams("MLB", &[(3, "Giants"), (9, "Giants")]),
            &NormalizationTable::default(),
        );
        assert_eq!(resolver.len(), 1);
        assert_eq!(resolver.resolve("Giants").unwrap().id, 3);
    }
}
