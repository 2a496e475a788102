//! Idempotent importer for completed sports games.
//!
//! Each sport is described by a [`sport::SportProfile`]; a single generic
//! [`pipeline::Importer`] fetches, normalizes, resolves, de-duplicates and
//! inserts its games.

pub mod config;
pub mod corrections;
pub mod dedupe;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod resolver;
pub mod retry;
pub mod schema;
pub mod sport;
pub mod store;
pub mod upstream;

pub use config::Config;
pub use error::{ImportError, SkipReason};
pub use pipeline::{ImportSummary, Importer};
pub use sport::Sport;
