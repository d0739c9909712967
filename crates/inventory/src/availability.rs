//! Pure quantity aggregation over already-fetched level rows.
//!
//! No persistence here: callers fetch the rows for one item across a set of
//! locations, then sum. An empty input sums to zero.

use serde::{Deserialize, Serialize};

use crate::level::InventoryLevel;

/// Summed quantities for one item across a set of locations.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySummary {
    pub stocked: i64,
    pub reserved: i64,
}

impl AvailabilitySummary {
    /// Stocked minus reserved. Derived, never stored.
    pub fn available(&self) -> i64 {
        self.stocked - self.reserved
    }
}

/// Sum stocked and reserved quantities across exactly the given rows.
/// Locations with no row simply are not in the slice and contribute zero.
pub fn summarize(levels: &[InventoryLevel]) -> AvailabilitySummary {
    levels
        .iter()
        .fold(AvailabilitySummary::default(), |acc, level| {
            AvailabilitySummary {
                stocked: acc.stocked + level.stocked_quantity,
                reserved: acc.reserved + level.reserved_quantity,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::CreateInventoryLevelInput;
    use chrono::Utc;
    use proptest::prelude::*;
    use stockledger_core::{InventoryItemId, LocationId};

    fn level(stocked: i64, reserved: i64) -> InventoryLevel {
        let mut level = InventoryLevel::from_input(
            CreateInventoryLevelInput {
                inventory_item_id: InventoryItemId::new(),
                location_id: LocationId::new(),
                stocked_quantity: 0,
                incoming_quantity: 0,
                metadata: None,
            },
            Utc::now(),
        )
        .unwrap();
        level.stocked_quantity = stocked;
        level.reserved_quantity = reserved;
        level
    }

    #[test]
    fn empty_input_sums_to_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary, AvailabilitySummary::default());
        assert_eq!(summary.available(), 0);
    }

    #[test]
    fn sums_across_locations() {
        let summary = summarize(&[level(10, 2), level(5, 1), level(0, 0)]);
        assert_eq!(summary.stocked, 15);
        assert_eq!(summary.reserved, 3);
        assert_eq!(summary.available(), 12);
    }

    proptest! {
        #[test]
        fn summary_matches_per_row_sums(
            rows in proptest::collection::vec((0i64..1_000_000, 0i64..1_000_000), 0..32)
        ) {
            let levels: Vec<_> = rows.iter().map(|&(s, r)| level(s, r)).collect();
            let summary = summarize(&levels);

            let stocked: i64 = rows.iter().map(|&(s, _)| s).sum();
            let reserved: i64 = rows.iter().map(|&(_, r)| r).sum();

            prop_assert_eq!(summary.stocked, stocked);
            prop_assert_eq!(summary.reserved, reserved);
            prop_assert_eq!(summary.available(), stocked - reserved);
        }

        #[test]
        fn available_is_always_the_difference(stocked in -1_000i64..1_000, reserved in -1_000i64..1_000) {
            let summary = summarize(&[level(stocked, reserved)]);
            prop_assert_eq!(summary.available(), stocked - reserved);
        }
    }
}
