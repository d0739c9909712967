use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{
    InventoryItemId, LedgerError, LedgerResult, LevelKey, LineItemId, LocationId, ReservationId,
};

/// Demand held against a specific level: a reservation of `quantity` units of
/// one item at one location, usually on behalf of an order line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub id: ReservationId,
    pub inventory_item_id: InventoryItemId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub line_item_id: Option<LineItemId>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationItem {
    /// Key of the level this reservation holds stock against.
    pub fn level_key(&self) -> LevelKey {
        LevelKey::new(self.inventory_item_id, self.location_id)
    }
}

/// Input for creating a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReservationInput {
    pub id: Option<ReservationId>,
    pub inventory_item_id: InventoryItemId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub line_item_id: Option<LineItemId>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl CreateReservationInput {
    pub fn level_key(&self) -> LevelKey {
        LevelKey::new(self.inventory_item_id, self.location_id)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.quantity <= 0 {
            return Err(LedgerError::validation(format!(
                "reservation quantity must be positive ({})",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// Partial update for a reservation. Only quantity and descriptive fields may
/// change; re-pointing a reservation at another (item, location) pair is not
/// supported — delete and recreate instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateReservationInput {
    pub quantity: Option<i64>,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl UpdateReservationInput {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(quantity) = self.quantity {
            if quantity <= 0 {
                return Err(LedgerError::validation(format!(
                    "reservation quantity must be positive ({quantity})"
                )));
            }
        }
        Ok(())
    }
}

impl ReservationItem {
    pub fn from_input(input: CreateReservationInput, now: DateTime<Utc>) -> LedgerResult<Self> {
        input.validate()?;
        Ok(Self {
            id: input.id.unwrap_or_default(),
            inventory_item_id: input.inventory_item_id,
            location_id: input.location_id,
            quantity: input.quantity,
            line_item_id: input.line_item_id,
            description: input.description,
            created_by: input.created_by,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: UpdateReservationInput, now: DateTime<Utc>) {
        if let Some(quantity) = update.quantity {
            self.quantity = quantity;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
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

    fn input(quantity: i64) -> CreateReservationInput {
        CreateReservationInput {
            id: None,
            inventory_item_id: InventoryItemId::new(),
            location_id: LocationId::new(),
            quantity,
            line_item_id: Some(LineItemId::new()),
            description: None,
            created_by: None,
            metadata: None,
        }
    }

    #[test]
    fn zero_quantity_reservation_is_rejected() {
        let err = ReservationItem::from_input(input(0), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn negative_quantity_update_is_rejected() {
        let update = UpdateReservationInput {
            quantity: Some(-3),
            ..Default::default()
        };
        assert!(matches!(
            update.validate().unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn level_key_points_at_the_reserved_pair() {
        let input = input(2);
        let reservation = ReservationItem::from_input(input.clone(), Utc::now()).unwrap();
        assert_eq!(reservation.level_key(), input.level_key());
    }
}
