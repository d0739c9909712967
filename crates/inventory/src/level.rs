use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{InventoryItemId, LedgerError, LedgerResult, LevelKey, LocationId};

/// Stock record for one item at one location.
///
/// The (item, location) pair is the row's identity; the ledger never allows
/// two rows with the same key. `reserved_quantity` is written only by the
/// coordinator, in step with reservation writes. Available quantity is always
/// derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub inventory_item_id: InventoryItemId,
    pub location_id: LocationId,
    pub stocked_quantity: i64,
    pub reserved_quantity: i64,
    /// Stock on order but not yet received. Carried and updatable; does not
    /// participate in availability.
    pub incoming_quantity: i64,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLevel {
    pub fn key(&self) -> LevelKey {
        LevelKey::new(self.inventory_item_id, self.location_id)
    }

    /// Stocked minus reserved.
    pub fn available_quantity(&self) -> i64 {
        self.stocked_quantity - self.reserved_quantity
    }
}

/// Input for creating a level row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInventoryLevelInput {
    pub inventory_item_id: InventoryItemId,
    pub location_id: LocationId,
    #[serde(default)]
    pub stocked_quantity: i64,
    #[serde(default)]
    pub incoming_quantity: i64,
    pub metadata: Option<JsonValue>,
}

impl CreateInventoryLevelInput {
    pub fn key(&self) -> LevelKey {
        LevelKey::new(self.inventory_item_id, self.location_id)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.stocked_quantity < 0 {
            return Err(LedgerError::validation(format!(
                "stocked_quantity cannot be negative at creation ({})",
                self.stocked_quantity
            )));
        }
        if self.incoming_quantity < 0 {
            return Err(LedgerError::validation(format!(
                "incoming_quantity cannot be negative at creation ({})",
                self.incoming_quantity
            )));
        }
        Ok(())
    }
}

/// Partial update for a level row. `None` fields are left unchanged.
/// Reserved quantity is deliberately absent: only the coordinator moves it,
/// in step with reservation writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInventoryLevelInput {
    pub stocked_quantity: Option<i64>,
    pub incoming_quantity: Option<i64>,
    pub metadata: Option<JsonValue>,
}

/// One row of a bulk level update: the target key plus the partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkLevelUpdate {
    pub inventory_item_id: InventoryItemId,
    pub location_id: LocationId,
    pub update: UpdateInventoryLevelInput,
}

impl BulkLevelUpdate {
    pub fn key(&self) -> LevelKey {
        LevelKey::new(self.inventory_item_id, self.location_id)
    }
}

impl InventoryLevel {
    pub fn from_input(input: CreateInventoryLevelInput, now: DateTime<Utc>) -> LedgerResult<Self> {
        input.validate()?;
        Ok(Self {
            inventory_item_id: input.inventory_item_id,
            location_id: input.location_id,
            stocked_quantity: input.stocked_quantity,
            reserved_quantity: 0,
            incoming_quantity: input.incoming_quantity,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: UpdateInventoryLevelInput, now: DateTime<Utc>) {
        if let Some(stocked) = update.stocked_quantity {
            self.stocked_quantity = stocked;
        }
        if let Some(incoming) = update.incoming_quantity {
            self.incoming_quantity = incoming;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = Some(metadata);
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(stocked: i64) -> CreateInventoryLevelInput {
        CreateInventoryLevelInput {
            inventory_item_id: InventoryItemId::new(),
            location_id: LocationId::new(),
            stocked_quantity: stocked,
            incoming_quantity: 0,
            metadata: None,
        }
    }

    #[test]
    fn new_level_starts_with_nothing_reserved() {
        let level = InventoryLevel::from_input(input(10), Utc::now()).unwrap();
        assert_eq!(level.reserved_quantity, 0);
        assert_eq!(level.available_quantity(), 10);
    }

    #[test]
    fn negative_stocked_quantity_is_rejected_at_creation() {
        let err = InventoryLevel::from_input(input(-1), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn available_is_stocked_minus_reserved() {
        let mut level = InventoryLevel::from_input(input(10), Utc::now()).unwrap();
        level.reserved_quantity = 4;
        assert_eq!(level.available_quantity(), 6);
    }
}
