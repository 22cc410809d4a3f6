//! Structured, allow-listed filter queries over the listing table.
//!
//! This is the storage side of the contract consumed by the query-serving
//! layer: callers describe filters declaratively and the store compiles them
//! to parameterized SQL. Fields and operators outside the allow-list are
//! rejected up front, never interpolated.

use crate::db::connection::Database;
use crate::db::listings::{row_to_listing, LISTING_COLUMNS};
use crate::domain::listing::Listing;
use crate::errors::StoreError;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard cap on rows returned by a single query.
pub const MAX_LIMIT: usize = 50;

/// Fields that may appear in filters and ordering. Opaque document columns
/// are deliberately absent; the store never queries inside them.
const ALLOWED_FIELDS: &[&str] = &[
    "external_id",
    "listing_data_source",
    "address_city",
    "address_state",
    "bedrooms",
    "bathrooms",
    "listing_price",
    "year_built",
    "home_type",
    "living_area",
    "days_on_market",
    "availability_date",
    "updated_at",
    "created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    In,
    Between,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// A declarative listing query. The final predicate is
/// `AND(all_of...) AND OR(any_of...)`; nested boolean groups are not
/// supported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub all_of: Vec<Condition>,
    #[serde(default)]
    pub any_of: Vec<Condition>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

pub fn run(db: &Database, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
    let mut sql = format!("SELECT {LISTING_COLUMNS} FROM listings");
    let mut bindings: Vec<SqlValue> = Vec::new();

    let mut and_clauses = Vec::new();
    for condition in &query.all_of {
        and_clauses.push(compile_condition(condition, &mut bindings)?);
    }

    let or_clauses: Vec<String> = query
        .any_of
        .iter()
        .map(|condition| compile_condition(condition, &mut bindings))
        .collect::<Result<_, _>>()?;
    if !or_clauses.is_empty() {
        and_clauses.push(format!("({})", or_clauses.join(" OR ")));
    }

    if !and_clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&and_clauses.join(" AND "));
    }

    if !query.order_by.is_empty() {
        let mut orders = Vec::new();
        for order in &query.order_by {
            check_field(&order.field)?;
            let direction = if order.descending { "DESC" } else { "ASC" };
            orders.push(format!("{} {direction}", order.field));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&orders.join(", "));
    }

    let limit = query.limit.unwrap_or(MAX_LIMIT).min(MAX_LIMIT);
    sql.push_str(" LIMIT ? OFFSET ?");
    bindings.push(SqlValue::Integer(limit as i64));
    bindings.push(SqlValue::Integer(query.offset as i64));

    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        let rows = stmt
            .query_map(params_from_iter(bindings.iter()), row_to_listing)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| StoreError::StorageUnavailable(e.to_string()))?);
        }
        Ok(out)
    })
}

fn compile_condition(
    condition: &Condition,
    bindings: &mut Vec<SqlValue>,
) -> Result<String, StoreError> {
    check_field(&condition.field)?;
    let field = condition.field.as_str();

    match condition.op {
        FilterOp::Eq => scalar_clause(field, "=", condition, bindings),
        FilterOp::Ne => scalar_clause(field, "!=", condition, bindings),
        FilterOp::Gt => scalar_clause(field, ">", condition, bindings),
        FilterOp::Ge => scalar_clause(field, ">=", condition, bindings),
        FilterOp::Lt => scalar_clause(field, "<", condition, bindings),
        FilterOp::Le => scalar_clause(field, "<=", condition, bindings),
        FilterOp::Like => {
            if !condition.value.is_string() {
                return Err(StoreError::InvalidQuery(format!(
                    "like on {field} needs a string pattern"
                )));
            }
            scalar_clause(field, "LIKE", condition, bindings)
        }
        FilterOp::In => {
            let items = condition.value.as_array().filter(|a| !a.is_empty()).ok_or_else(|| {
                StoreError::InvalidQuery(format!("in on {field} needs a non-empty array"))
            })?;
            for item in items {
                bindings.push(scalar(field, item)?);
            }
            let placeholders = vec!["?"; items.len()].join(", ");
            Ok(format!("{field} IN ({placeholders})"))
        }
        FilterOp::Between => {
            let bounds = condition
                .value
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| {
                    StoreError::InvalidQuery(format!(
                        "between on {field} needs a two-element array"
                    ))
                })?;
            bindings.push(scalar(field, &bounds[0])?);
            bindings.push(scalar(field, &bounds[1])?);
            Ok(format!("{field} BETWEEN ? AND ?"))
        }
    }
}

fn scalar_clause(
    field: &str,
    op: &str,
    condition: &Condition,
    bindings: &mut Vec<SqlValue>,
) -> Result<String, StoreError> {
    bindings.push(scalar(field, &condition.value)?);
    Ok(format!("{field} {op} ?"))
}

fn scalar(field: &str, value: &Value) -> Result<SqlValue, StoreError> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(StoreError::InvalidQuery(format!(
                    "unrepresentable number for {field}"
                )))
            }
        }
        _ => Err(StoreError::InvalidQuery(format!(
            "value for {field} must be a string, number or boolean"
        ))),
    }
}

fn check_field(field: &str) -> Result<(), StoreError> {
    if ALLOWED_FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!(
            "field {field:?} is not queryable"
        )))
    }
}
