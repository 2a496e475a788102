//! Data-driven corrections applied to provider values before lookup:
//! franchise aliases, excluded opponents and malformed start-time codes.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ImportError;
use crate::sport::Sport;

/// Corrections table. Loaded from JSON or taken from [`NormalizationTable::builtin`].
///
/// ```json
/// {
///   "team_aliases": { "nhl": { "Hockey Club": "Mammoth" } },
///   "excluded_teams": { "nfl": ["Bulls"] },
///   "start_time_corrections": [ { "prefix": "243", "replacement": "1230" } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationTable {
    pub team_aliases: HashMap<Sport, HashMap<String, String>>,
    pub excluded_teams: HashMap<Sport, Vec<String>>,
    pub start_time_corrections: Vec<StartTimeCorrection>,
}

/// Replace any start time beginning with `prefix` by `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTimeCorrection {
    pub prefix: String,
    pub replacement: String,
}

impl NormalizationTable {
    /// Corrections known to be needed for the current feeds.
    pub fn builtin() -> Self {
        let mut team_aliases = HashMap::new();
        team_aliases.insert(
            Sport::Nhl,
            HashMap::from([("Hockey Club".to_string(), "Mammoth".to_string())]),
        );

        let mut excluded_teams = HashMap::new();
        excluded_teams.insert(Sport::Nfl, vec!["Bulls".to_string()]);

        let start_time_corrections = [("243", "1230"), ("244", "1300"), ("245", "1300")]
            .into_iter()
            .map(|(prefix, replacement)| StartTimeCorrection {
                prefix: prefix.to_string(),
                replacement: replacement.to_string(),
            })
            .collect();

        Self {
            team_aliases,
            excluded_teams,
            start_time_corrections,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ImportError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table: Self = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            aliases = table.team_aliases.values().map(HashMap::len).sum::<usize>(),
            start_time_fixes = table.start_time_corrections.len(),
            "Loaded normalization table"
        );
        Ok(table)
    }

    pub fn aliases_for(&self, sport: Sport) -> HashMap<String, String> {
        self.team_aliases.get(&sport).cloned().unwrap_or_default()
    }

    pub fn excluded_for(&self, sport: Sport) -> Vec<String> {
        self.excluded_teams.get(&sport).cloned().unwrap_or_default()
    }

    /// Apply the first matching start-time correction, if any.
    pub fn correct_start_time<'a>(&'a self, raw: &'a str) -> &'a str {
        self.start_time_corrections
            .iter()
            .find(|c| raw.starts_with(&c.prefix))
            .map(|c| c.replacement.as_str())
            .unwrap_or(raw)
    }
}
