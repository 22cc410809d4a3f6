use thiserror::Error;

/// Errors surfaced by the storage core.
///
/// Identity errors are terminal for the ingestion attempt that produced them
/// and never leave partial writes behind; the only internal retry is the
/// single constraint-violation retry inside `upsert`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record carries neither a non-empty external id nor a complete
    /// street/city/state address, so identity cannot be resolved. The caller
    /// must enrich the record, not retry it as-is.
    #[error("cannot resolve identity: no external id and no complete address")]
    IdentityIndeterminate,

    /// The incoming external id is already claimed by a different data
    /// source. Surfaced for data-quality review, never auto-merged.
    #[error(
        "external id {external_id:?} already exists under source \
         {existing_source:?}, refusing upsert from {incoming_source:?}"
    )]
    IdentityConflict {
        external_id: String,
        existing_source: String,
        incoming_source: String,
    },

    /// More than one stored listing cleared the similarity threshold for a
    /// record without a usable external id. Never guess among duplicates.
    #[error("{} listings matched the incoming address; refusing to merge", .candidates.len())]
    AmbiguousMatch { candidates: Vec<i64> },

    /// A uniqueness index rejected a write because a concurrent ingester got
    /// there first. Retried once internally before being surfaced.
    #[error("uniqueness constraint raced with a concurrent ingester")]
    ConstraintViolation,

    /// A structured query referenced a field or operator outside the
    /// allow-list, or its value shape did not fit the operator.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Underlying persistence failure. Retry policy belongs to the caller.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}
