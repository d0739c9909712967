//! Integration tests for the full coordination pipeline.
//!
//! Tests: Coordinator → stores → engine, through real transactions.
//!
//! Verifies:
//! - quantity invariants (available = stocked - reserved, summed per location)
//! - all-or-nothing reservation batches with aggregated validation errors
//! - cascading deletes and idempotent level deletion
//! - no lost updates under concurrent adjustment

use std::sync::Arc;
use std::thread;

use stockledger_core::{
    InventoryItemId, LedgerError, LevelKey, LineItemId, LocationId,
};
use stockledger_inventory::{
    BulkLevelUpdate, CreateInventoryItemInput, CreateInventoryLevelInput, CreateReservationInput,
    InventoryLevel, ItemFilter, LevelFilter, Pagination, ReservationFilter,
    UpdateInventoryLevelInput, UpdateReservationInput,
};

use crate::coordinator::MemoryCoordinator;
use crate::transaction::{RequestContext, with_transaction};

fn setup() -> MemoryCoordinator {
    stockledger_observability::init();
    MemoryCoordinator::in_memory()
}

fn ctx() -> RequestContext {
    RequestContext::new()
}

fn create_item(coordinator: &MemoryCoordinator, sku: &str) -> InventoryItemId {
    let created = coordinator
        .create_items(
            ctx(),
            vec![CreateInventoryItemInput {
                sku: Some(sku.to_string()),
                requires_shipping: true,
                ..Default::default()
            }],
        )
        .unwrap();
    created[0].id
}

fn create_level(
    coordinator: &MemoryCoordinator,
    item: InventoryItemId,
    location: LocationId,
    stocked: i64,
) -> InventoryLevel {
    coordinator
        .create_levels(
            ctx(),
            vec![CreateInventoryLevelInput {
                inventory_item_id: item,
                location_id: location,
                stocked_quantity: stocked,
                incoming_quantity: 0,
                metadata: None,
            }],
        )
        .unwrap()
        .remove(0)
}

fn reservation_input(
    item: InventoryItemId,
    location: LocationId,
    quantity: i64,
) -> CreateReservationInput {
    CreateReservationInput {
        id: None,
        inventory_item_id: item,
        location_id: location,
        quantity,
        line_item_id: Some(LineItemId::new()),
        description: None,
        created_by: None,
        metadata: None,
    }
}

#[test]
fn quantities_sum_across_locations() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-SUM");
    let loc_a = LocationId::new();
    let loc_b = LocationId::new();
    create_level(&coordinator, item, loc_a, 10);
    create_level(&coordinator, item, loc_b, 4);

    coordinator
        .create_reservation(ctx(), reservation_input(item, loc_a, 3))
        .unwrap();

    let locations = [loc_a, loc_b];
    assert_eq!(
        coordinator.retrieve_stocked_quantity(ctx(), item, &locations).unwrap(),
        14
    );
    assert_eq!(
        coordinator.retrieve_reserved_quantity(ctx(), item, &locations).unwrap(),
        3
    );
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &locations).unwrap(),
        11
    );
}

#[test]
fn confirm_then_reserve_then_insufficient() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-CONFIRM");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    assert!(coordinator.confirm_inventory(ctx(), item, &[location], 5).unwrap());

    coordinator
        .create_reservation(ctx(), reservation_input(item, location, 5))
        .unwrap();
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        5
    );

    // Over-reservation is rejected, never driven negative.
    let err = coordinator
        .create_reservation(ctx(), reservation_input(item, location, 6))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientStock {
            requested: 6,
            available: 5,
            ..
        }
    ));
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        5
    );
}

#[test]
fn reservation_batch_is_all_or_nothing() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-BATCH");
    let stocked_loc = LocationId::new();
    let missing_a = LocationId::new();
    let missing_b = LocationId::new();
    create_level(&coordinator, item, stocked_loc, 10);

    let err = coordinator
        .create_reservations(
            ctx(),
            vec![
                reservation_input(item, stocked_loc, 2),
                reservation_input(item, missing_a, 1),
                reservation_input(item, missing_b, 1),
            ],
        )
        .unwrap_err();

    // Every bad pair is reported together.
    match &err {
        LedgerError::NotStocked(keys) => {
            assert_eq!(
                keys,
                &vec![
                    LevelKey::new(item, missing_a),
                    LevelKey::new(item, missing_b)
                ]
            );
        }
        other => panic!("expected NotStocked, got {other:?}"),
    }

    // And nothing was written: no reservations, nothing reserved.
    let (rows, count) = coordinator
        .list_and_count_reservations(ctx(), &ReservationFilter::default(), Pagination::default())
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(count, 0);
    assert_eq!(
        coordinator.retrieve_reserved_quantity(ctx(), item, &[stocked_loc]).unwrap(),
        0
    );
}

#[test]
fn a_batch_draws_down_its_own_earlier_rows() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-DRAW");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    let err = coordinator
        .create_reservations(
            ctx(),
            vec![
                reservation_input(item, location, 7),
                reservation_input(item, location, 4),
            ],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientStock {
            requested: 4,
            available: 3,
            ..
        }
    ));
    // All-or-nothing applies to the availability check too.
    assert_eq!(
        coordinator.retrieve_reserved_quantity(ctx(), item, &[location]).unwrap(),
        0
    );
}

#[test]
fn deleting_reservations_returns_quantity() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-RETURN");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    let reservation = coordinator
        .create_reservation(ctx(), reservation_input(item, location, 4))
        .unwrap();
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        6
    );

    coordinator.delete_reservations(ctx(), &[reservation.id]).unwrap();
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        10
    );
    assert!(matches!(
        coordinator.retrieve_reservation(ctx(), reservation.id).unwrap_err(),
        LedgerError::ReservationNotFound(_)
    ));
}

#[test]
fn delete_by_line_item_releases_only_matching_reservations() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-LINE");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    let line_item = LineItemId::new();
    let mut held = reservation_input(item, location, 3);
    held.line_item_id = Some(line_item);
    coordinator.create_reservation(ctx(), held).unwrap();
    let other = coordinator
        .create_reservation(ctx(), reservation_input(item, location, 2))
        .unwrap();

    coordinator
        .delete_reservations_by_line_item_ids(ctx(), &[line_item])
        .unwrap();

    assert_eq!(
        coordinator.retrieve_reserved_quantity(ctx(), item, &[location]).unwrap(),
        2
    );
    assert!(coordinator.retrieve_reservation(ctx(), other.id).is_ok());
}

#[test]
fn updating_a_reservation_moves_the_delta() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-UPDATE");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    let reservation = coordinator
        .create_reservation(ctx(), reservation_input(item, location, 4))
        .unwrap();

    let updated = coordinator
        .update_reservation(
            ctx(),
            reservation.id,
            UpdateReservationInput {
                quantity: Some(6),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.quantity, 6);
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        4
    );

    // Growing past availability is refused and leaves state untouched.
    let err = coordinator
        .update_reservation(
            ctx(),
            reservation.id,
            UpdateReservationInput {
                quantity: Some(20),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    assert_eq!(
        coordinator.retrieve_reservation(ctx(), reservation.id).unwrap().quantity,
        6
    );
}

#[test]
fn deleting_an_item_cascades_to_its_levels_only() {
    let coordinator = setup();
    let doomed = create_item(&coordinator, "SKU-DOOMED");
    let survivor = create_item(&coordinator, "SKU-SURVIVOR");
    let location = LocationId::new();
    create_level(&coordinator, doomed, location, 5);
    create_level(&coordinator, survivor, location, 7);

    coordinator.delete_items(ctx(), &[doomed]).unwrap();

    assert!(matches!(
        coordinator.retrieve_item(ctx(), doomed).unwrap_err(),
        LedgerError::ItemNotFound(id) if id == doomed
    ));
    assert!(coordinator.retrieve_level(ctx(), doomed, location).is_err());
    assert_eq!(
        coordinator.retrieve_level(ctx(), survivor, location).unwrap().stocked_quantity,
        7
    );
}

#[test]
fn deleting_a_location_cascades_levels_and_reservations_there_only() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-LOC");
    let doomed_loc = LocationId::new();
    let other_loc = LocationId::new();
    create_level(&coordinator, item, doomed_loc, 5);
    create_level(&coordinator, item, other_loc, 5);
    coordinator
        .create_reservation(ctx(), reservation_input(item, doomed_loc, 2))
        .unwrap();
    let kept = coordinator
        .create_reservation(ctx(), reservation_input(item, other_loc, 1))
        .unwrap();

    coordinator.delete_by_location_ids(ctx(), &[doomed_loc]).unwrap();

    assert!(coordinator.retrieve_level(ctx(), item, doomed_loc).is_err());
    assert!(coordinator.retrieve_level(ctx(), item, other_loc).is_ok());
    let (rows, _) = coordinator
        .list_and_count_reservations(ctx(), &ReservationFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, kept.id);
}

#[test]
fn deleting_an_absent_level_is_a_no_op() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-NOOP");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 3);

    coordinator.delete_level(ctx(), item, LocationId::new()).unwrap();
    assert_eq!(
        coordinator.retrieve_level(ctx(), item, location).unwrap().stocked_quantity,
        3
    );
}

#[test]
fn unknown_item_fails_before_any_level_query() {
    let coordinator = setup();
    let location = LocationId::new();
    let unknown = InventoryItemId::new();

    let err = coordinator
        .retrieve_available_quantity(ctx(), unknown, &[location])
        .unwrap_err();
    assert!(matches!(err, LedgerError::ItemNotFound(id) if id == unknown));
}

#[test]
fn empty_location_set_is_zero_even_for_unknown_items() {
    let coordinator = setup();
    let unknown = InventoryItemId::new();
    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), unknown, &[]).unwrap(),
        0
    );
    assert_eq!(coordinator.retrieve_stocked_quantity(ctx(), unknown, &[]).unwrap(), 0);
    assert_eq!(coordinator.retrieve_reserved_quantity(ctx(), unknown, &[]).unwrap(), 0);
}

#[test]
fn adjustment_requires_an_existing_level() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-ADJ");
    let location = LocationId::new();

    let err = coordinator
        .adjust_inventory(ctx(), item, location, 5)
        .unwrap_err();
    assert!(matches!(err, LedgerError::LevelNotFound(_)));
}

#[test]
fn adjustment_cannot_strand_reservations() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-STRAND");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);
    coordinator
        .create_reservation(ctx(), reservation_input(item, location, 6))
        .unwrap();

    // Dropping stocked below reserved would make available negative.
    let err = coordinator.adjust_inventory(ctx(), item, location, -5).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let level = coordinator.adjust_inventory(ctx(), item, location, -4).unwrap();
    assert_eq!(level.stocked_quantity, 6);
    assert_eq!(level.available_quantity(), 0);
}

#[test]
fn concurrent_adjustments_lose_no_updates() {
    let coordinator = Arc::new(setup());
    let item = create_item(&coordinator, "SKU-RACE");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 100);

    let deltas: Vec<i64> = vec![7, -3, 11, -5, 2, 9, -1, 4];
    let handles: Vec<_> = deltas
        .iter()
        .map(|&delta| {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                coordinator
                    .adjust_inventory(RequestContext::new(), item, location, delta)
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected: i64 = 100 + deltas.iter().sum::<i64>();
    assert_eq!(
        coordinator
            .retrieve_level(ctx(), item, location)
            .unwrap()
            .stocked_quantity,
        expected
    );
}

#[test]
fn ambient_transaction_spans_confirm_and_reserve() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-AMBIENT");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    // Check-then-reserve as one unit of work.
    with_transaction(coordinator.scope(), RequestContext::new(), |tx_ctx| {
        assert!(coordinator.confirm_inventory(tx_ctx, item, &[location], 4)?);
        coordinator.create_reservation(tx_ctx, reservation_input(item, location, 4))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        6
    );
}

#[test]
fn failed_ambient_unit_of_work_rolls_back_every_write() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-ROLLBACK");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 10);

    let result: stockledger_core::LedgerResult<()> = with_transaction(
        coordinator.scope(),
        RequestContext::new(),
        |tx_ctx| {
            coordinator.create_reservation(tx_ctx, reservation_input(item, location, 4))?;
            coordinator.adjust_inventory(tx_ctx, item, location, 5)?;
            Err(LedgerError::validation("caller changed its mind"))
        },
    );
    assert!(result.is_err());

    assert_eq!(
        coordinator.retrieve_available_quantity(ctx(), item, &[location]).unwrap(),
        10
    );
    let (rows, _) = coordinator
        .list_and_count_reservations(ctx(), &ReservationFilter::default(), Pagination::default())
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn bulk_level_update_validates_the_whole_batch_first() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-BULK");
    let stocked_loc = LocationId::new();
    let missing_loc = LocationId::new();
    create_level(&coordinator, item, stocked_loc, 5);

    let err = coordinator
        .update_levels(
            ctx(),
            vec![
                BulkLevelUpdate {
                    inventory_item_id: item,
                    location_id: stocked_loc,
                    update: UpdateInventoryLevelInput {
                        stocked_quantity: Some(8),
                        ..Default::default()
                    },
                },
                BulkLevelUpdate {
                    inventory_item_id: item,
                    location_id: missing_loc,
                    update: UpdateInventoryLevelInput::default(),
                },
            ],
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotStocked(_)));

    // First row untouched: validation happens before any write.
    assert_eq!(
        coordinator.retrieve_level(ctx(), item, stocked_loc).unwrap().stocked_quantity,
        5
    );
}

#[test]
fn item_listing_filters_and_paginates() {
    let coordinator = setup();
    let a = create_item(&coordinator, "SKU-A");
    let b = create_item(&coordinator, "SKU-B");
    create_item(&coordinator, "SKU-C");

    let filter = ItemFilter {
        skus: Some(vec!["SKU-A".to_string(), "SKU-B".to_string()]),
        ..Default::default()
    };
    let (page, count) = coordinator
        .list_and_count_items(ctx(), &filter, Pagination::window(0, 1))
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(page.len(), 1);

    let both = coordinator.list_items(ctx(), &filter, Pagination::default()).unwrap();
    let ids: Vec<_> = both.iter().map(|i| i.id).collect();
    assert!(ids.contains(&a) && ids.contains(&b));
}

#[test]
fn level_listing_by_sets() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-SETS");
    let other = create_item(&coordinator, "SKU-OTHER");
    let loc_a = LocationId::new();
    let loc_b = LocationId::new();
    create_level(&coordinator, item, loc_a, 1);
    create_level(&coordinator, item, loc_b, 2);
    create_level(&coordinator, other, loc_a, 3);

    let filter = LevelFilter {
        item_ids: Some(vec![item]),
        location_ids: Some(vec![loc_a]),
    };
    let rows = coordinator.list_levels(ctx(), &filter, Pagination::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stocked_quantity, 1);
}

#[test]
fn duplicate_level_key_is_rejected() {
    let coordinator = setup();
    let item = create_item(&coordinator, "SKU-DUP");
    let location = LocationId::new();
    create_level(&coordinator, item, location, 1);

    let err = coordinator
        .create_levels(
            ctx(),
            vec![CreateInventoryLevelInput {
                inventory_item_id: item,
                location_id: location,
                stocked_quantity: 2,
                incoming_quantity: 0,
                metadata: None,
            }],
        )
        .unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn level_creation_requires_an_existing_item() {
    let coordinator = setup();
    let unknown = InventoryItemId::new();
    let err = coordinator
        .create_levels(
            ctx(),
            vec![CreateInventoryLevelInput {
                inventory_item_id: unknown,
                location_id: LocationId::new(),
                stocked_quantity: 1,
                incoming_quantity: 0,
                metadata: None,
            }],
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::ItemNotFound(id) if id == unknown));
}
