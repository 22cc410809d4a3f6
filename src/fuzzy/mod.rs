//! Trigram similarity index over normalized listing text.
//!
//! Each listing carries up to two projections ('address', 'description'):
//! the case-folded, punctuation-stripped, whitespace-collapsed concatenation
//! of the source fields, plus its trigram set, persisted in
//! `listing_search_text` / `listing_trigrams`. Projections are written only
//! by the listing store during upsert, inside the same transaction as the
//! row itself.
//!
//! The metric is trigram Jaccard overlap with per-word padding (two leading
//! blanks, one trailing), the same shingling pg_trgm uses. It is symmetric
//! and monotonic in shared-substring length; swapping in another metric only
//! touches this module.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::errors::StoreError;

pub const FIELD_ADDRESS: &str = "address";
pub const FIELD_DESCRIPTION: &str = "description";

/// A stored listing that cleared the similarity threshold for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyCandidate {
    pub listing_id: i64,
    pub score: f64,
}

/// Case-fold, strip punctuation to spaces, collapse whitespace.
pub fn normalize(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            folded.extend(ch.to_lowercase());
        } else {
            folded.push(' ');
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The address projection for a listing, or None when no address text exists.
pub fn address_projection(
    unit: Option<&str>,
    street: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> Option<String> {
    let joined = [unit, street, city, state]
        .iter()
        .filter_map(|part| *part)
        .collect::<Vec<_>>()
        .join(" ");
    let normalized = normalize(&joined);
    (!normalized.is_empty()).then_some(normalized)
}

pub fn description_projection(text: Option<&str>) -> Option<String> {
    let normalized = normalize(text?);
    (!normalized.is_empty()).then_some(normalized)
}

/// Word-padded 3-shingles of a normalized string.
pub fn trigrams(normalized: &str) -> BTreeSet<String> {
    let mut grams = BTreeSet::new();
    for word in normalized.split_whitespace() {
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

/// Trigram overlap ratio between two normalized strings: |A ∩ B| / |A ∪ B|.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (ta, tb) = (trigrams(a), trigrams(b));
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f64 / (ta.len() + tb.len() - shared) as f64
}

/// Stored listings whose projection for `field` scores at or above
/// `min_similarity` against `normalized`, best first. Each call re-executes
/// the search; no cursor state survives between calls.
///
/// Shared-trigram counts come from the index; the final ratio is computed
/// here so the SQL never sees the metric.
pub fn candidates(
    conn: &Connection,
    field: &str,
    normalized: &str,
    min_similarity: f64,
    cap: usize,
) -> Result<Vec<FuzzyCandidate>, StoreError> {
    let grams = trigrams(normalized);
    if grams.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; grams.len()].join(", ");
    let sql = format!(
        "SELECT t.listing_id, COUNT(*), s.trigram_count \
         FROM listing_trigrams t \
         JOIN listing_search_text s \
           ON s.listing_id = t.listing_id AND s.field = t.field \
         WHERE t.field = ? AND t.trigram IN ({placeholders}) \
         GROUP BY t.listing_id"
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

    let bindings: Vec<&str> = std::iter::once(field)
        .chain(grams.iter().map(String::as_str))
        .collect();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(bindings), |row| {
            Ok((
                row.get::<_, i64>(0)?, // listing_id
                row.get::<_, i64>(1)?, // shared trigrams
                row.get::<_, i64>(2)?, // stored trigram count
            ))
        })
        .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

    let query_count = grams.len() as i64;
    let mut out = Vec::new();
    for row in rows {
        let (listing_id, shared, stored) =
            row.map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        let union = query_count + stored - shared;
        if union <= 0 {
            continue;
        }
        let score = shared as f64 / union as f64;
        if score >= min_similarity {
            out.push(FuzzyCandidate { listing_id, score });
        }
    }

    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.listing_id.cmp(&b.listing_id))
    });
    out.truncate(cap);

    debug!(
        field,
        candidates = out.len(),
        "fuzzy candidate search finished"
    );
    Ok(out)
}

/// Rewrite the persisted projection for one listing and field. A `None` or
/// empty projection clears it. No-op when the normalized text is unchanged,
/// so untouched address fields cost nothing on re-ingestion.
pub fn write_projection(
    conn: &Connection,
    listing_id: i64,
    field: &str,
    normalized: Option<&str>,
) -> Result<(), StoreError> {
    let current: Option<String> = conn
        .query_row(
            "SELECT normalized FROM listing_search_text WHERE listing_id = ?1 AND field = ?2",
            params![listing_id, field],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

    if current.as_deref() == normalized {
        return Ok(());
    }

    conn.execute(
        "DELETE FROM listing_trigrams WHERE listing_id = ?1 AND field = ?2",
        params![listing_id, field],
    )
    .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
    conn.execute(
        "DELETE FROM listing_search_text WHERE listing_id = ?1 AND field = ?2",
        params![listing_id, field],
    )
    .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

    let Some(text) = normalized.filter(|t| !t.is_empty()) else {
        return Ok(());
    };

    let grams = trigrams(text);
    conn.execute(
        "INSERT INTO listing_search_text (listing_id, field, normalized, trigram_count) \
         VALUES (?1, ?2, ?3, ?4)",
        params![listing_id, field, text, grams.len() as i64],
    )
    .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

    let mut insert = conn
        .prepare(
            "INSERT INTO listing_trigrams (trigram, field, listing_id) VALUES (?1, ?2, ?3)",
        )
        .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
    for gram in &grams {
        insert
            .execute(params![gram, field, listing_id])
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_punctuation() {
        assert_eq!(
            normalize("123 Main St., Springfield,  IL"),
            "123 main st springfield il"
        );
        assert_eq!(normalize("  \t "), "");
    }

    #[test]
    fn trigrams_are_word_padded() {
        let grams = trigrams("st");
        assert!(grams.contains("  s"));
        assert!(grams.contains(" st"));
        assert!(grams.contains("st "));
        assert_eq!(grams.len(), 3);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "123 main st springfield il";
        let b = "123 main street springfield il";
        assert_eq!(similarity(a, b), similarity(b, a));
    }

    #[test]
    fn abbreviated_street_clears_default_threshold() {
        let score = similarity(
            "123 main st springfield il",
            "123 main street springfield il",
        );
        assert!(score > 0.5, "score was {score}");
    }

    #[test]
    fn unrelated_addresses_score_low() {
        let score = similarity(
            "123 main st springfield il",
            "742 evergreen ter shelbyville il",
        );
        assert!(score < 0.3, "score was {score}");
    }

    #[test]
    fn longer_shared_prefix_scores_higher() {
        let base = "12 oak st portland or";
        let close = "12 oak street portland or";
        let far = "98 oak street portland or";
        assert!(similarity(base, close) > similarity(base, far));
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(similarity("", "12 oak st"), 0.0);
    }

    #[test]
    fn address_projection_skips_missing_parts() {
        let projection = address_projection(None, Some("1 A St."), Some("X"), Some("NJ"));
        assert_eq!(projection.as_deref(), Some("1 a st x nj"));
        assert_eq!(address_projection(None, None, None, None), None);
    }
}
