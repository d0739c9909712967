//! List filters and pagination shared by the store contracts.

use serde::{Deserialize, Serialize};

use stockledger_core::{InventoryItemId, LineItemId, LocationId};

/// Offset/limit pagination window. `take: None` means "to the end".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: usize,
    pub take: Option<usize>,
}

impl Pagination {
    pub fn window(skip: usize, take: usize) -> Self {
        Self {
            skip,
            take: Some(take),
        }
    }

    /// Apply the window to an already-filtered row set.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let iter = rows.into_iter().skip(self.skip);
        match self.take {
            Some(take) => iter.take(take).collect(),
            None => iter.collect(),
        }
    }
}

/// Filter for inventory item listings. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub ids: Option<Vec<InventoryItemId>>,
    pub skus: Option<Vec<String>>,
}

impl ItemFilter {
    pub fn by_ids(ids: Vec<InventoryItemId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn matches(&self, id: InventoryItemId, sku: Option<&str>) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&id) {
                return false;
            }
        }
        if let Some(skus) = &self.skus {
            match sku {
                Some(sku) if skus.iter().any(|s| s == sku) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Filter for level listings: sets of item ids and/or location ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelFilter {
    pub item_ids: Option<Vec<InventoryItemId>>,
    pub location_ids: Option<Vec<LocationId>>,
}

impl LevelFilter {
    pub fn matches(&self, item_id: InventoryItemId, location_id: LocationId) -> bool {
        if let Some(item_ids) = &self.item_ids {
            if !item_ids.contains(&item_id) {
                return false;
            }
        }
        if let Some(location_ids) = &self.location_ids {
            if !location_ids.contains(&location_id) {
                return false;
            }
        }
        true
    }
}

/// Filter for reservation listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub item_ids: Option<Vec<InventoryItemId>>,
    pub location_ids: Option<Vec<LocationId>>,
    pub line_item_ids: Option<Vec<LineItemId>>,
}

impl ReservationFilter {
    pub fn by_line_item_ids(line_item_ids: Vec<LineItemId>) -> Self {
        Self {
            line_item_ids: Some(line_item_ids),
            ..Default::default()
        }
    }

    pub fn matches(
        &self,
        item_id: InventoryItemId,
        location_id: LocationId,
        line_item_id: Option<LineItemId>,
    ) -> bool {
        if let Some(item_ids) = &self.item_ids {
            if !item_ids.contains(&item_id) {
                return false;
            }
        }
        if let Some(location_ids) = &self.location_ids {
            if !location_ids.contains(&location_id) {
                return false;
            }
        }
        if let Some(line_item_ids) = &self.line_item_ids {
            match line_item_id {
                Some(id) if line_item_ids.contains(&id) => {}
                _ => return false,
            }
        }
        true
    }
}
