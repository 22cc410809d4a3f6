use crate::db::connection::{init_db, Database};
use crate::domain::listing::ListingRecord;
use std::time::{SystemTime, UNIX_EPOCH};

/// Initialize a fresh test DB using the production schema.
pub fn make_db(label: &str) -> Database {
    let path = std::env::temp_dir().join(format!(
        "{label}_{}.sqlite",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let db = Database::new(path);
    init_db(&db).unwrap_or_else(|e| panic!("Database initialization failed: {e}"));
    db
}

pub fn record(source: &str, external_id: Option<&str>) -> ListingRecord {
    ListingRecord {
        listing_data_source: source.to_string(),
        external_id: external_id.map(str::to_string),
        ..Default::default()
    }
}

pub fn record_at(
    source: &str,
    external_id: Option<&str>,
    street: &str,
    city: &str,
    state: &str,
) -> ListingRecord {
    ListingRecord {
        address_street: Some(street.to_string()),
        address_city: Some(city.to_string()),
        address_state: Some(state.to_string()),
        ..record(source, external_id)
    }
}

pub fn count_listings(db: &Database) -> i64 {
    db.with_conn(|conn| {
        conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))
            .map_err(|e| crate::errors::StoreError::StorageUnavailable(e.to_string()))
    })
    .unwrap()
}
