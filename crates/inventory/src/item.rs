use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{InventoryItemId, LedgerError, LedgerResult};

/// A sellable unit whose stock is tracked.
///
/// Descriptive attributes only; nothing here is load-bearing for the ledger.
/// Quantities live on [`crate::InventoryLevel`] rows keyed by (item, location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub requires_shipping: bool,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an inventory item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateInventoryItemInput {
    pub id: Option<InventoryItemId>,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_requires_shipping")]
    pub requires_shipping: bool,
    pub metadata: Option<JsonValue>,
}

fn default_requires_shipping() -> bool {
    true
}

/// Partial update for an inventory item. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInventoryItemInput {
    pub sku: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub requires_shipping: Option<bool>,
    pub metadata: Option<JsonValue>,
}

impl CreateInventoryItemInput {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(sku) = &self.sku {
            if sku.trim().is_empty() {
                return Err(LedgerError::validation("sku cannot be blank"));
            }
        }
        Ok(())
    }
}

impl InventoryItem {
    /// Materialize a record from a creation input.
    pub fn from_input(input: CreateInventoryItemInput, now: DateTime<Utc>) -> LedgerResult<Self> {
        input.validate()?;
        Ok(Self {
            id: input.id.unwrap_or_default(),
            sku: input.sku,
            title: input.title,
            description: input.description,
            requires_shipping: input.requires_shipping,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update in place, bumping `updated_at`.
    pub fn apply_update(&mut self, update: UpdateInventoryItemInput, now: DateTime<Utc>) {
        if let Some(sku) = update.sku {
            self.sku = Some(sku);
        }
        if let Some(title) = update.title {
            self.title = Some(title);
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(requires_shipping) = update.requires_shipping {
            self.requires_shipping = requires_shipping;
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

    #[test]
    fn requires_shipping_defaults_to_true_on_deserialize() {
        let input: CreateInventoryItemInput = serde_json::from_str("{}").unwrap();
        assert!(input.requires_shipping);
    }

    #[test]
    fn from_input_generates_an_id_when_none_is_supplied() {
        let item = InventoryItem::from_input(
            CreateInventoryItemInput {
                sku: Some("SKU-001".to_string()),
                requires_shipping: true,
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(item.sku.as_deref(), Some("SKU-001"));
        assert!(item.requires_shipping);
    }

    #[test]
    fn blank_sku_is_rejected() {
        let input = CreateInventoryItemInput {
            sku: Some("   ".to_string()),
            ..Default::default()
        };
        let err = InventoryItem::from_input(input, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn apply_update_leaves_unset_fields_alone() {
        let mut item = InventoryItem::from_input(
            CreateInventoryItemInput {
                sku: Some("SKU-001".to_string()),
                title: Some("Widget".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        item.apply_update(
            UpdateInventoryItemInput {
                title: Some("Gadget".to_string()),
                ..Default::default()
            },
            Utc::now(),
        );

        assert_eq!(item.sku.as_deref(), Some("SKU-001"));
        assert_eq!(item.title.as_deref(), Some("Gadget"));
    }
}
