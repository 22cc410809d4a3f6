// src/domain/merge.rs

use crate::domain::listing::{Listing, ListingRecord};

/// Merge an incoming record into a stored listing, field by field.
///
/// A non-null incoming value overwrites the stored one; a null incoming value
/// never erases what is already known. Collections and provider-shaped
/// documents are replaced wholesale when present, since their internal shape
/// is opaque to the store. Identity fields (`external_id`,
/// `listing_data_source`) are only filled when previously unset, never
/// replaced; a fuzzy-matched row keeps the identity it was first stored under.
pub fn apply_record(listing: &mut Listing, record: &ListingRecord) {
    if listing.external_id.is_none() {
        listing.external_id = record.external_id_trimmed().map(str::to_string);
    }

    keep_known(&mut listing.address_unit, &record.address_unit);
    keep_known(&mut listing.address_street, &record.address_street);
    keep_known(&mut listing.address_city, &record.address_city);
    keep_known(&mut listing.address_state, &record.address_state);

    keep_known(&mut listing.longitude_text, &record.longitude_text);
    keep_known(&mut listing.latitude_text, &record.latitude_text);
    keep_known(&mut listing.longitude, &record.longitude);
    keep_known(&mut listing.latitude, &record.latitude);

    keep_known(&mut listing.bedrooms, &record.bedrooms);
    keep_known(&mut listing.bathrooms, &record.bathrooms);
    keep_known(&mut listing.listing_price, &record.listing_price);
    keep_known(&mut listing.year_built, &record.year_built);
    keep_known(&mut listing.living_area, &record.living_area);
    keep_known(&mut listing.rent_estimate, &record.rent_estimate);
    keep_known(&mut listing.photo_count, &record.photo_count);
    keep_known(&mut listing.days_on_market, &record.days_on_market);
    keep_known(&mut listing.home_type, &record.home_type);
    keep_known(&mut listing.hdp_url, &record.hdp_url);
    keep_known(&mut listing.virtual_tour_url, &record.virtual_tour_url);

    keep_known(&mut listing.general_description, &record.general_description);

    keep_known(&mut listing.price_history, &record.price_history);
    keep_known(&mut listing.nearby_homes, &record.nearby_homes);
    keep_known(&mut listing.interior_description, &record.interior_description);
    keep_known(&mut listing.overview, &record.overview);
    keep_known(&mut listing.property_description, &record.property_description);
    keep_known(&mut listing.getting_around_scores, &record.getting_around_scores);

    keep_known(&mut listing.photos, &record.photos);
    keep_known(&mut listing.utilities, &record.utilities);
    keep_known(&mut listing.tags, &record.tags);
    keep_known(&mut listing.unit_amenities, &record.unit_amenities);

    keep_known(&mut listing.is_instant_offer_enabled, &record.is_instant_offer_enabled);
    keep_known(&mut listing.is_off_market, &record.is_off_market);
    keep_known(
        &mut listing.is_listed_by_management_company,
        &record.is_listed_by_management_company,
    );
    keep_known(&mut listing.has_virtual_tour, &record.has_virtual_tour);

    keep_known(&mut listing.availability_date, &record.availability_date);
}

fn keep_known<T: Clone>(stored: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *stored = incoming.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn stored() -> Listing {
        let epoch = NaiveDateTime::default();
        Listing {
            id: 1,
            external_id: Some("E1".into()),
            listing_data_source: "zillow".into(),
            address_unit: None,
            address_street: Some("1 A St".into()),
            address_city: Some("X".into()),
            address_state: Some("NJ".into()),
            longitude_text: None,
            latitude_text: None,
            longitude: None,
            latitude: None,
            bedrooms: Some(3.0),
            bathrooms: None,
            listing_price: Some(2000),
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
            photos: Some(vec!["a.jpg".into(), "b.jpg".into()]),
            utilities: None,
            tags: None,
            unit_amenities: None,
            is_instant_offer_enabled: None,
            is_off_market: None,
            is_listed_by_management_company: None,
            has_virtual_tour: None,
            availability_date: None,
            created_at: epoch,
            updated_at: epoch,
        }
    }

    #[test]
    fn null_never_erases_known_values() {
        let mut listing = stored();
        let record = ListingRecord {
            listing_data_source: "zillow".into(),
            bedrooms: None,
            listing_price: Some(2100),
            ..Default::default()
        };

        apply_record(&mut listing, &record);

        assert_eq!(listing.bedrooms, Some(3.0));
        assert_eq!(listing.listing_price, Some(2100));
    }

    #[test]
    fn collections_replace_wholesale() {
        let mut listing = stored();
        let record = ListingRecord {
            listing_data_source: "zillow".into(),
            photos: Some(vec!["c.jpg".into()]),
            ..Default::default()
        };

        apply_record(&mut listing, &record);

        assert_eq!(listing.photos, Some(vec!["c.jpg".to_string()]));
    }

    #[test]
    fn identity_filled_only_when_unset() {
        let mut listing = stored();
        let record = ListingRecord {
            listing_data_source: "apartments".into(),
            external_id: Some("OTHER".into()),
            ..Default::default()
        };

        apply_record(&mut listing, &record);

        // the row keeps the identity it was first stored under
        assert_eq!(listing.external_id.as_deref(), Some("E1"));
        assert_eq!(listing.listing_data_source, "zillow");

        listing.external_id = None;
        apply_record(&mut listing, &record);
        assert_eq!(listing.external_id.as_deref(), Some("OTHER"));
    }

    #[test]
    fn documents_replace_wholesale() {
        let mut listing = stored();
        listing.price_history = Some(serde_json::json!([{"date": "2026-01-01"}]));
        let record = ListingRecord {
            listing_data_source: "zillow".into(),
            price_history: Some(serde_json::json!([{"date": "2026-02-01", "price": 1900}])),
            ..Default::default()
        };

        apply_record(&mut listing, &record);

        assert_eq!(
            listing.price_history,
            Some(serde_json::json!([{"date": "2026-02-01", "price": 1900}]))
        );
    }
}
