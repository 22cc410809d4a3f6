//! Storage and deduplication core for a real-estate listing aggregator.
//!
//! Ingestion pipelines hand this crate normalized listing records; it
//! resolves identity (exact natural key, then trigram-similarity fallback),
//! merges field by field without erasing known values, and persists to an
//! embedded SQLite database. Read paths cover exact lookup, bounding-box
//! geo filters, structured filter queries, and similarity-scored fuzzy
//! search over addresses and descriptions.

pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod fuzzy;

#[cfg(test)]
mod tests;

pub use config::StoreConfig;
pub use db::connection::{init_db, Database};
pub use db::listings::{
    by_bounding_box, fuzzy_search, get_by_id, get_by_natural_key, upsert, upsert_batch,
};
pub use db::query::{Condition, FilterOp, ListingQuery, OrderBy};
pub use domain::listing::{Listing, ListingRecord, UpsertOutcome, UpsertReceipt};
pub use errors::StoreError;
