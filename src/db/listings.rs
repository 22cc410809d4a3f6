use crate::config::StoreConfig;
use crate::db::connection::Database;
use crate::domain::listing::{Listing, ListingRecord, UpsertOutcome, UpsertReceipt};
use crate::domain::merge;
use crate::errors::StoreError;
use crate::fuzzy::{self, FIELD_ADDRESS, FIELD_DESCRIPTION};
use chrono::{NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub(crate) const LISTING_COLUMNS: &str = "id, external_id, listing_data_source, \
     address_unit, address_street, address_city, address_state, \
     longitude_text, latitude_text, longitude, latitude, \
     bedrooms, bathrooms, listing_price, year_built, living_area, \
     rent_estimate, photo_count, days_on_market, home_type, hdp_url, virtual_tour_url, \
     general_description, price_history, nearby_homes, interior_description, \
     overview, property_description, getting_around_scores, \
     photos, utilities, tags, unit_amenities, \
     is_instant_offer_enabled, is_off_market, is_listed_by_management_company, \
     has_virtual_tour, availability_date, created_at, updated_at";

/// Insert or update a single listing.
///
/// Identity is resolved in order: exact `(listing_data_source, external_id)`
/// match, then the external id alone (a hit under another source is a
/// conflict, never a silent cross-source merge), then trigram candidates over
/// the normalized address. The whole resolve-then-write sequence runs in one
/// IMMEDIATE transaction, so concurrent ingesters of the same key race
/// safely; the loser sees the uniqueness constraint and is retried once as
/// an update before any error reaches the caller.
pub fn upsert(
    db: &Database,
    cfg: &StoreConfig,
    record: &ListingRecord,
) -> Result<UpsertReceipt, StoreError> {
    if record.listing_data_source.trim().is_empty()
        || (record.external_id_trimmed().is_none() && !record.has_complete_address())
    {
        return Err(StoreError::IdentityIndeterminate);
    }

    db.with_conn(|conn| match try_upsert(conn, cfg, record) {
        Err(StoreError::ConstraintViolation) => {
            debug!(
                source = %record.listing_data_source,
                "uniqueness index raced; re-running resolution once"
            );
            try_upsert(conn, cfg, record)
        }
        result => result,
    })
}

/// Upsert many records, never halting the batch: each record gets its own
/// result so ingestion pipelines can quarantine problem records and move on.
pub fn upsert_batch(
    db: &Database,
    cfg: &StoreConfig,
    records: &[ListingRecord],
) -> Vec<Result<UpsertReceipt, StoreError>> {
    records
        .iter()
        .map(|record| {
            let result = upsert(db, cfg, record);
            if let Err(err) = &result {
                warn!(
                    source = %record.listing_data_source,
                    error = %err,
                    "record quarantined during batch upsert"
                );
            }
            result
        })
        .collect()
}

fn try_upsert(
    conn: &mut Connection,
    cfg: &StoreConfig,
    record: &ListingRecord,
) -> Result<UpsertReceipt, StoreError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(db_err)?;
    let receipt = resolve_and_write(&tx, cfg, record)?;
    tx.commit().map_err(db_err)?;
    Ok(receipt)
}

fn resolve_and_write(
    conn: &Connection,
    cfg: &StoreConfig,
    record: &ListingRecord,
) -> Result<UpsertReceipt, StoreError> {
    let now = Utc::now().naive_utc();
    let source = record.listing_data_source.trim();

    if let Some(external_id) = record.external_id_trimmed() {
        if let Some(id) = find_by_natural_key_id(conn, source, external_id)? {
            return merge_existing(conn, id, record, now, UpsertOutcome::Updated);
        }
        if let Some(existing_source) = find_source_of_external_id(conn, external_id)? {
            warn!(
                external_id,
                existing_source = %existing_source,
                incoming_source = %source,
                "external id already claimed by another source"
            );
            return Err(StoreError::IdentityConflict {
                external_id: external_id.to_string(),
                existing_source,
                incoming_source: source.to_string(),
            });
        }
    }

    // Unknown id (or none at all): fall back to the trigram index before
    // deciding this is a brand-new listing.
    if record.has_complete_address() {
        if let Some(projection) = fuzzy::address_projection(
            record.address_unit.as_deref(),
            record.address_street.as_deref(),
            record.address_city.as_deref(),
            record.address_state.as_deref(),
        ) {
            let candidates = fuzzy::candidates(
                conn,
                FIELD_ADDRESS,
                &projection,
                cfg.min_similarity,
                cfg.max_fuzzy_candidates,
            )?;
            match candidates.as_slice() {
                [] => {}
                [single] => {
                    return merge_existing(
                        conn,
                        single.listing_id,
                        record,
                        now,
                        UpsertOutcome::MergedViaFuzzyMatch,
                    );
                }
                several => {
                    return Err(StoreError::AmbiguousMatch {
                        candidates: several.iter().map(|c| c.listing_id).collect(),
                    });
                }
            }
        }
    }

    let listing = listing_from_record(record, now);
    let id = insert_row(conn, &listing)?;
    refresh_projections(conn, id, &listing)?;
    debug!(listing_id = id, source = %source, "listing created");
    Ok(UpsertReceipt {
        listing_id: id,
        outcome: UpsertOutcome::Created,
    })
}

fn merge_existing(
    conn: &Connection,
    id: i64,
    record: &ListingRecord,
    now: NaiveDateTime,
    outcome: UpsertOutcome,
) -> Result<UpsertReceipt, StoreError> {
    let mut listing = load_by_id(conn, id)?.ok_or_else(|| {
        StoreError::StorageUnavailable(format!("listing {id} vanished mid-transaction"))
    })?;
    merge::apply_record(&mut listing, record);
    listing.updated_at = now;
    update_row(conn, &listing)?;
    refresh_projections(conn, id, &listing)?;
    debug!(listing_id = id, ?outcome, "listing merged");
    Ok(UpsertReceipt {
        listing_id: id,
        outcome,
    })
}

fn listing_from_record(record: &ListingRecord, now: NaiveDateTime) -> Listing {
    let mut listing = Listing {
        id: 0,
        external_id: None,
        listing_data_source: record.listing_data_source.trim().to_string(),
        address_unit: None,
        address_street: None,
        address_city: None,
        address_state: None,
        longitude_text: None,
        latitude_text: None,
        longitude: None,
        latitude: None,
        bedrooms: None,
        bathrooms: None,
        listing_price: None,
        year_built: None,
        living_area: None,
        rent_estimate: None,
        photo_count: None,
        days_on_market: None,
        home_type: None,
        hdp_url: None,
        virtual_tour_url: None,
        general_description: None,
        price_history: None,
        nearby_homes: None,
        interior_description: None,
        overview: None,
        property_description: None,
        getting_around_scores: None,
        photos: None,
        utilities: None,
        tags: None,
        unit_amenities: None,
        is_instant_offer_enabled: None,
        is_off_market: None,
        is_listed_by_management_company: None,
        has_virtual_tour: None,
        availability_date: None,
        created_at: now,
        updated_at: now,
    };
    merge::apply_record(&mut listing, record);
    listing
}

fn refresh_projections(conn: &Connection, id: i64, listing: &Listing) -> Result<(), StoreError> {
    let address = fuzzy::address_projection(
        listing.address_unit.as_deref(),
        listing.address_street.as_deref(),
        listing.address_city.as_deref(),
        listing.address_state.as_deref(),
    );
    fuzzy::write_projection(conn, id, FIELD_ADDRESS, address.as_deref())?;

    let description = fuzzy::description_projection(listing.general_description.as_deref());
    fuzzy::write_projection(conn, id, FIELD_DESCRIPTION, description.as_deref())
}

// ========== Lookups ==========

pub fn get_by_id(db: &Database, id: i64) -> Result<Option<Listing>, StoreError> {
    db.with_conn(|conn| load_by_id(conn, id))
}

pub fn get_by_natural_key(
    db: &Database,
    source: &str,
    external_id: &str,
) -> Result<Option<Listing>, StoreError> {
    db.with_conn(|conn| {
        conn.query_row(
            &format!(
                "SELECT {LISTING_COLUMNS} FROM listings \
                 WHERE listing_data_source = ?1 AND external_id = ?2"
            ),
            params![source, external_id],
            row_to_listing,
        )
        .optional()
        .map_err(db_err)
    })
}

/// Geospatial filter over the parsed (numeric) coordinates. Rows lacking a
/// parsed coordinate never match.
pub fn by_bounding_box(
    db: &Database,
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
) -> Result<Vec<Listing>, StoreError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings \
                 WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4 \
                 ORDER BY id"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![min_lat, max_lat, min_lon, max_lon], row_to_listing)
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err)?);
        }
        Ok(out)
    })
}

/// Approximate search over address and description text, best score first.
/// Independent of the dedup path; reads only.
pub fn fuzzy_search(
    db: &Database,
    text: &str,
    min_similarity: f64,
    limit: usize,
) -> Result<Vec<(Listing, f64)>, StoreError> {
    let normalized = fuzzy::normalize(text);
    if normalized.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let mut best: BTreeMap<i64, f64> = BTreeMap::new();
        for field in [FIELD_ADDRESS, FIELD_DESCRIPTION] {
            for candidate in fuzzy::candidates(conn, field, &normalized, min_similarity, limit)? {
                best.entry(candidate.listing_id)
                    .and_modify(|score| *score = score.max(candidate.score))
                    .or_insert(candidate.score);
            }
        }

        let mut scored: Vec<(i64, f64)> = best.into_iter().collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let mut out = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            if let Some(listing) = load_by_id(conn, id)? {
                out.push((listing, score));
            }
        }
        Ok(out)
    })
}

// ========== Row access ==========

fn load_by_id(conn: &Connection, id: i64) -> Result<Option<Listing>, StoreError> {
    conn.query_row(
        &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
        params![id],
        row_to_listing,
    )
    .optional()
    .map_err(db_err)
}

fn find_by_natural_key_id(
    conn: &Connection,
    source: &str,
    external_id: &str,
) -> Result<Option<i64>, StoreError> {
    conn.query_row(
        "SELECT id FROM listings WHERE listing_data_source = ?1 AND external_id = ?2",
        params![source, external_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

fn find_source_of_external_id(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<String>, StoreError> {
    conn.query_row(
        "SELECT listing_data_source FROM listings WHERE external_id = ?1",
        params![external_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

fn insert_row(conn: &Connection, listing: &Listing) -> Result<i64, StoreError> {
    conn.execute(
        r#"
        INSERT INTO listings (
            external_id, listing_data_source,
            address_unit, address_street, address_city, address_state,
            longitude_text, latitude_text, longitude, latitude,
            bedrooms, bathrooms, listing_price, year_built, living_area,
            rent_estimate, photo_count, days_on_market, home_type, hdp_url, virtual_tour_url,
            general_description, price_history, nearby_homes, interior_description,
            overview, property_description, getting_around_scores,
            photos, utilities, tags, unit_amenities,
            is_instant_offer_enabled, is_off_market, is_listed_by_management_company,
            has_virtual_tour, availability_date, created_at, updated_at
        ) VALUES (
            ?1, ?2,
            ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20, ?21,
            ?22, ?23, ?24, ?25,
            ?26, ?27, ?28,
            ?29, ?30, ?31, ?32,
            ?33, ?34, ?35,
            ?36, ?37, ?38, ?39
        )
        "#,
        params![
            listing.external_id,
            listing.listing_data_source,
            listing.address_unit,
            listing.address_street,
            listing.address_city,
            listing.address_state,
            listing.longitude_text,
            listing.latitude_text,
            listing.longitude,
            listing.latitude,
            listing.bedrooms,
            listing.bathrooms,
            listing.listing_price,
            listing.year_built,
            listing.living_area,
            listing.rent_estimate,
            listing.photo_count,
            listing.days_on_market,
            listing.home_type,
            listing.hdp_url,
            listing.virtual_tour_url,
            listing.general_description,
            json_text(&listing.price_history),
            json_text(&listing.nearby_homes),
            json_text(&listing.interior_description),
            json_text(&listing.overview),
            json_text(&listing.property_description),
            json_text(&listing.getting_around_scores),
            list_text(&listing.photos)?,
            list_text(&listing.utilities)?,
            list_text(&listing.tags)?,
            list_text(&listing.unit_amenities)?,
            listing.is_instant_offer_enabled,
            listing.is_off_market,
            listing.is_listed_by_management_company,
            listing.has_virtual_tour,
            listing.availability_date,
            listing.created_at,
            listing.updated_at,
        ],
    )
    .map_err(db_err)?;

    Ok(conn.last_insert_rowid())
}

fn update_row(conn: &Connection, listing: &Listing) -> Result<(), StoreError> {
    conn.execute(
        r#"
        UPDATE listings SET
            external_id = ?1, listing_data_source = ?2,
            address_unit = ?3, address_street = ?4, address_city = ?5, address_state = ?6,
            longitude_text = ?7, latitude_text = ?8, longitude = ?9, latitude = ?10,
            bedrooms = ?11, bathrooms = ?12, listing_price = ?13, year_built = ?14,
            living_area = ?15, rent_estimate = ?16, photo_count = ?17, days_on_market = ?18,
            home_type = ?19, hdp_url = ?20, virtual_tour_url = ?21,
            general_description = ?22, price_history = ?23, nearby_homes = ?24,
            interior_description = ?25, overview = ?26, property_description = ?27,
            getting_around_scores = ?28,
            photos = ?29, utilities = ?30, tags = ?31, unit_amenities = ?32,
            is_instant_offer_enabled = ?33, is_off_market = ?34,
            is_listed_by_management_company = ?35, has_virtual_tour = ?36,
            availability_date = ?37, updated_at = ?38
        WHERE id = ?39
        "#,
        params![
            listing.external_id,
            listing.listing_data_source,
            listing.address_unit,
            listing.address_street,
            listing.address_city,
            listing.address_state,
            listing.longitude_text,
            listing.latitude_text,
            listing.longitude,
            listing.latitude,
            listing.bedrooms,
            listing.bathrooms,
            listing.listing_price,
            listing.year_built,
            listing.living_area,
            listing.rent_estimate,
            listing.photo_count,
            listing.days_on_market,
            listing.home_type,
            listing.hdp_url,
            listing.virtual_tour_url,
            listing.general_description,
            json_text(&listing.price_history),
            json_text(&listing.nearby_homes),
            json_text(&listing.interior_description),
            json_text(&listing.overview),
            json_text(&listing.property_description),
            json_text(&listing.getting_around_scores),
            list_text(&listing.photos)?,
            list_text(&listing.utilities)?,
            list_text(&listing.tags)?,
            list_text(&listing.unit_amenities)?,
            listing.is_instant_offer_enabled,
            listing.is_off_market,
            listing.is_listed_by_management_company,
            listing.has_virtual_tour,
            listing.availability_date,
            listing.updated_at,
            listing.id,
        ],
    )
    .map_err(db_err)?;

    Ok(())
}

pub(crate) fn row_to_listing(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        external_id: row.get(1)?,
        listing_data_source: row.get(2)?,

        address_unit: row.get(3)?,
        address_street: row.get(4)?,
        address_city: row.get(5)?,
        address_state: row.get(6)?,

        longitude_text: row.get(7)?,
        latitude_text: row.get(8)?,
        longitude: row.get(9)?,
        latitude: row.get(10)?,

        bedrooms: row.get(11)?,
        bathrooms: row.get(12)?,
        listing_price: row.get(13)?,
        year_built: row.get(14)?,
        living_area: row.get(15)?,
        rent_estimate: row.get(16)?,
        photo_count: row.get(17)?,
        days_on_market: row.get(18)?,
        home_type: row.get(19)?,
        hdp_url: row.get(20)?,
        virtual_tour_url: row.get(21)?,

        general_description: row.get(22)?,

        price_history: json_value(row, 23)?,
        nearby_homes: json_value(row, 24)?,
        interior_description: json_value(row, 25)?,
        overview: json_value(row, 26)?,
        property_description: json_value(row, 27)?,
        getting_around_scores: json_value(row, 28)?,

        photos: string_list(row, 29)?,
        utilities: string_list(row, 30)?,
        tags: string_list(row, 31)?,
        unit_amenities: string_list(row, 32)?,

        is_instant_offer_enabled: row.get(33)?,
        is_off_market: row.get(34)?,
        is_listed_by_management_company: row.get(35)?,
        has_virtual_tour: row.get(36)?,

        availability_date: row.get(37)?,
        created_at: row.get(38)?,
        updated_at: row.get(39)?,
    })
}

// ========== Column encoding ==========

fn json_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

fn list_text(list: &Option<Vec<String>>) -> Result<Option<String>, StoreError> {
    list.as_ref()
        .map(|items| serde_json::to_string(items))
        .transpose()
        .map_err(|e| StoreError::StorageUnavailable(e.to_string()))
}

fn json_value(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn string_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<String>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn db_err(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(inner, _) = &e {
        if inner.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::ConstraintViolation;
        }
    }
    StoreError::StorageUnavailable(e.to_string())
}
