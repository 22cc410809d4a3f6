// src/tests/query_tests.rs

use crate::config::StoreConfig;
use crate::db::listings::upsert;
use crate::db::query::{run, Condition, FilterOp, ListingQuery, OrderBy};
use crate::errors::StoreError;
use crate::tests::utils::{make_db, record_at};
use serde_json::json;

fn seeded() -> crate::db::connection::Database {
    let db = make_db("query");
    let cfg = StoreConfig::default();

    let rows = [
        ("Q1", "2 Palm Ct", "Bayonne", 2, 2600, "APARTMENT"),
        ("Q2", "17 Vine St", "Bayonne", 3, 2200, "CONDO"),
        ("Q3", "84 Summit Ave", "Jersey City", 1, 1800, "APARTMENT"),
        ("Q4", "5 Glen Rd", "Hoboken", 4, 3400, "SINGLE_FAMILY"),
    ];
    for (eid, street, city, beds, price, home_type) in rows {
        let mut rec = record_at("zillow", Some(eid), street, city, "NJ");
        rec.bedrooms = Some(beds as f64);
        rec.listing_price = Some(price);
        rec.home_type = Some(home_type.to_string());
        upsert(&db, &cfg, &rec).unwrap();
    }
    db
}

#[test]
fn filters_compose_with_ordering() {
    let db = seeded();

    // Bayonne, >= 2 beds, sorted by price ascending
    let query = ListingQuery {
        all_of: vec![
            Condition {
                field: "address_city".into(),
                op: FilterOp::Eq,
                value: json!("Bayonne"),
            },
            Condition {
                field: "bedrooms".into(),
                op: FilterOp::Ge,
                value: json!(2),
            },
        ],
        order_by: vec![OrderBy {
            field: "listing_price".into(),
            descending: false,
        }],
        ..Default::default()
    };

    let rows = run(&db, &query).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].external_id.as_deref(), Some("Q2"));
    assert_eq!(rows[1].external_id.as_deref(), Some("Q1"));
}

#[test]
fn any_of_widens_the_match() {
    let db = seeded();

    let query = ListingQuery {
        all_of: vec![Condition {
            field: "listing_price".into(),
            op: FilterOp::Le,
            value: json!(2600),
        }],
        any_of: vec![
            Condition {
                field: "address_city".into(),
                op: FilterOp::Like,
                value: json!("%Bayonne%"),
            },
            Condition {
                field: "address_city".into(),
                op: FilterOp::Like,
                value: json!("%Jersey City%"),
            },
        ],
        ..Default::default()
    };

    let rows = run(&db, &query).unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn in_and_between_operators() {
    let db = seeded();

    let query = ListingQuery {
        all_of: vec![
            Condition {
                field: "home_type".into(),
                op: FilterOp::In,
                value: json!(["APARTMENT", "CONDO"]),
            },
            Condition {
                field: "listing_price".into(),
                op: FilterOp::Between,
                value: json!([2000, 3000]),
            },
        ],
        ..Default::default()
    };

    let rows = run(&db, &query).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn limit_and_offset_paginate() {
    let db = seeded();

    let query = ListingQuery {
        order_by: vec![OrderBy {
            field: "listing_price".into(),
            descending: true,
        }],
        limit: Some(2),
        offset: 1,
        ..Default::default()
    };

    let rows = run(&db, &query).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].external_id.as_deref(), Some("Q1"));
}

#[test]
fn unknown_fields_are_rejected_not_interpolated() {
    let db = seeded();

    let query = ListingQuery {
        all_of: vec![Condition {
            field: "price_history; DROP TABLE listings".into(),
            op: FilterOp::Eq,
            value: json!(1),
        }],
        ..Default::default()
    };

    let err = run(&db, &query).unwrap_err();
    assert!(matches!(err, StoreError::InvalidQuery(_)));
}

#[test]
fn operator_value_shapes_are_checked() {
    let db = seeded();

    let bad_in = ListingQuery {
        all_of: vec![Condition {
            field: "home_type".into(),
            op: FilterOp::In,
            value: json!([]),
        }],
        ..Default::default()
    };
    assert!(matches!(run(&db, &bad_in), Err(StoreError::InvalidQuery(_))));

    let bad_between = ListingQuery {
        all_of: vec![Condition {
            field: "listing_price".into(),
            op: FilterOp::Between,
            value: json!([100]),
        }],
        ..Default::default()
    };
    assert!(matches!(run(&db, &bad_between), Err(StoreError::InvalidQuery(_))));

    let bad_like = ListingQuery {
        all_of: vec![Condition {
            field: "address_city".into(),
            op: FilterOp::Like,
            value: json!(42),
        }],
        ..Default::default()
    };
    assert!(matches!(run(&db, &bad_like), Err(StoreError::InvalidQuery(_))));
}
