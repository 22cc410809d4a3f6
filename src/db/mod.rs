pub mod connection;
pub mod listings;
pub mod query;

pub use listings::{fuzzy_search, get_by_id, get_by_natural_key, upsert, upsert_batch};
