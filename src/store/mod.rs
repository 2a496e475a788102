//! Persistence seam: team reference data, existence checks and inserts.

mod postgres;

#[cfg(test)]
pub mod memory;

pub use postgres::PgGameStore;

use crate::dedupe::{DuplicatePolicy, MatchKey};
use crate::error::ImportError;
use crate::resolver::Team;
use crate::schema::{ColumnValue, DestinationSchema};

/// Backing store for imported games.
///
/// Implementations must answer [`GameStore::game_exists`] exactly as
/// [`DuplicatePolicy::is_duplicate`] would against every stored row.
#[allow(async_fn_in_trait)]
pub trait GameStore {
    /// All reference teams tagged with `sport_tag`.
    async fn load_teams(&self, sport_tag: &str) -> Result<Vec<Team>, ImportError>;

    async fn game_exists(
        &self,
        schema: &DestinationSchema,
        policy: DuplicatePolicy,
        key: &MatchKey,
    ) -> Result<bool, ImportError>;

    /// Insert one row. A failure leaves nothing behind.
    async fn insert_game(
        &self,
        schema: &DestinationSchema,
        row: &[(String, ColumnValue)],
    ) -> Result<(), ImportError>;
}
