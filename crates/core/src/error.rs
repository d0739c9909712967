//! Ledger error model.

use thiserror::Error;

use crate::id::{InventoryItemId, LevelKey, ReservationId, TransactionId};

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Not-found conditions always carry the offending identifier(s); batch
/// existence validation aggregates every missing pair into one `NotStocked`
/// failure instead of failing on the first.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// An inventory item does not exist.
    #[error("inventory item {0} not found")]
    ItemNotFound(InventoryItemId),

    /// No level row exists for the requested (item, location) pair.
    #[error("inventory level for {0} not found")]
    LevelNotFound(LevelKey),

    /// A reservation row does not exist.
    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// One or more requested (item, location) pairs have no level row.
    /// The message enumerates every offending pair.
    #[error("items not stocked at locations: {}", join_keys(.0))]
    NotStocked(Vec<LevelKey>),

    /// A write would leave available quantity negative.
    #[error(
        "insufficient stock for {key}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        key: LevelKey,
        requested: i64,
        available: i64,
    },

    /// A value failed validation (malformed input, disallowed quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A concurrent update was detected (optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A transaction handle was used after commit/rollback, or never existed.
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
}

fn join_keys(keys: &[LevelKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn item_not_found(id: InventoryItemId) -> Self {
        Self::ItemNotFound(id)
    }

    pub fn level_not_found(key: LevelKey) -> Self {
        Self::LevelNotFound(key)
    }

    pub fn reservation_not_found(id: ReservationId) -> Self {
        Self::ReservationNotFound(id)
    }

    pub fn not_stocked(keys: Vec<LevelKey>) -> Self {
        Self::NotStocked(keys)
    }

    /// Whether this error is the optimistic-concurrency conflict kind
    /// (safe to retry in a fresh transaction).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::LocationId;

    #[test]
    fn not_stocked_message_enumerates_every_pair() {
        let a = LevelKey::new(InventoryItemId::new(), LocationId::new());
        let b = LevelKey::new(InventoryItemId::new(), LocationId::new());
        let err = LedgerError::not_stocked(vec![a, b]);

        let msg = err.to_string();
        assert!(msg.contains(&a.inventory_item_id.to_string()));
        assert!(msg.contains(&b.inventory_item_id.to_string()));
        assert!(msg.contains(&a.location_id.to_string()));
        assert!(msg.contains(&b.location_id.to_string()));
    }

    #[test]
    fn conflict_is_the_only_retryable_kind() {
        assert!(LedgerError::conflict("stale row").is_conflict());
        assert!(!LedgerError::validation("bad input").is_conflict());
        assert!(!LedgerError::ItemNotFound(InventoryItemId::new()).is_conflict());
    }
}
