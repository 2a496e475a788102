use std::fmt;

use thiserror::Error;

/// Failures that stop an operation. Record-level problems are [`SkipReason`]s
/// and never abort a run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{source_name} returned HTTP {status}: {body}")]
    UpstreamStatus {
        source_name: String,
        status: u16,
        body: String,
    },

    #[error("request to {source_name} failed: {source}")]
    Http {
        source_name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {0} could not be replayed for retry")]
    NotReplayable(String),

    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("destination schema for `{table}` has no column for {field}")]
    MissingColumn { table: String, field: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which participant a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => f.write_str("home"),
            Side::Away => f.write_str("away"),
        }
    }
}

/// Why a single source record was not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("missing {side} score")]
    MissingScore { side: Side },

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("malformed field `{field}`: {detail}")]
    Malformed { field: String, detail: String },

    #[error("no {sport} team named `{name}`")]
    UnknownTeam { sport: String, name: String },

    #[error("`{0}` is excluded from this league")]
    ExcludedTeam(String),

    #[error("game already recorded")]
    Duplicate,
}

impl SkipReason {
    pub fn malformed(field: &str, detail: impl Into<String>) -> Self {
        SkipReason::Malformed {
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    /// Duplicates are the normal result of re-running a window; every other
    /// skip points at data someone may need to fix.
    pub fn is_routine(&self) -> bool {
        matches!(self, SkipReason::Duplicate)
    }
}
