use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored listing row. The surrogate `id` is assigned by the store at
/// first insert and never changes; the natural key is
/// `(listing_data_source, external_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: i64,

    // Source identity
    pub external_id: Option<String>,
    pub listing_data_source: String,

    // Address
    pub address_unit: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,

    // Geo: the provider's original strings plus the parsed values. The two
    // may legitimately disagree and both are retained.
    pub longitude_text: Option<String>,
    pub latitude_text: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,

    // Facts
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub listing_price: Option<i64>,
    pub year_built: Option<i64>,
    pub living_area: Option<f64>,
    pub rent_estimate: Option<i64>,
    pub photo_count: Option<i64>,
    pub days_on_market: Option<i64>,
    pub home_type: Option<String>,
    pub hdp_url: Option<String>,
    pub virtual_tour_url: Option<String>,

    pub general_description: Option<String>,

    // Provider-shaped documents, stored and returned unchanged
    pub price_history: Option<Value>,
    pub nearby_homes: Option<Value>,
    pub interior_description: Option<Value>,
    pub overview: Option<Value>,
    pub property_description: Option<Value>,
    pub getting_around_scores: Option<Value>,

    // Ordered string collections
    pub photos: Option<Vec<String>>,
    pub utilities: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub unit_amenities: Option<Vec<String>>,

    // Flags
    pub is_instant_offer_enabled: Option<bool>,
    pub is_off_market: Option<bool>,
    pub is_listed_by_management_company: Option<bool>,
    pub has_virtual_tour: Option<bool>,

    // Lifecycle
    pub availability_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A normalized ingestion record, as produced by the ETL layer. Every
/// attribute except the data source is optional; unknown means `None`, never
/// an empty string or zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing_data_source: String,
    pub external_id: Option<String>,

    pub address_unit: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,

    pub longitude_text: Option<String>,
    pub latitude_text: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,

    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub listing_price: Option<i64>,
    pub year_built: Option<i64>,
    pub living_area: Option<f64>,
    pub rent_estimate: Option<i64>,
    pub photo_count: Option<i64>,
    pub days_on_market: Option<i64>,
    pub home_type: Option<String>,
    pub hdp_url: Option<String>,
    pub virtual_tour_url: Option<String>,

    pub general_description: Option<String>,

    pub price_history: Option<Value>,
    pub nearby_homes: Option<Value>,
    pub interior_description: Option<Value>,
    pub overview: Option<Value>,
    pub property_description: Option<Value>,
    pub getting_around_scores: Option<Value>,

    pub photos: Option<Vec<String>>,
    pub utilities: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub unit_amenities: Option<Vec<String>>,

    pub is_instant_offer_enabled: Option<bool>,
    pub is_off_market: Option<bool>,
    pub is_listed_by_management_company: Option<bool>,
    pub has_virtual_tour: Option<bool>,

    pub availability_date: Option<NaiveDate>,
}

impl ListingRecord {
    /// External id with whitespace trimmed; empty strings count as absent.
    pub fn external_id_trimmed(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Street, city and state all present: the minimum address needed to
    /// attempt fuzzy identity resolution.
    pub fn has_complete_address(&self) -> bool {
        [&self.address_street, &self.address_city, &self.address_state]
            .iter()
            .all(|part| part.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// How an upsert call settled the incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No existing row matched; a new listing was inserted.
    Created,
    /// The natural key matched an existing row, which was merged in place.
    Updated,
    /// Exactly one fuzzy candidate cleared the threshold and absorbed the
    /// record.
    MergedViaFuzzyMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReceipt {
    pub listing_id: i64,
    pub outcome: UpsertOutcome,
}
