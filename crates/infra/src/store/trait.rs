//! Store contracts for the three ledger entities.
//!
//! Each store is keyed persistence for one entity type and nothing more: no
//! store spans entities, and no store initiates cascades (that is the
//! coordinator's job). Every method takes a [`RequestContext`] and
//! participates in the ambient transaction when one is supplied.

use std::sync::Arc;

use stockledger_core::{
    InventoryItemId, LedgerResult, LevelKey, LineItemId, LocationId, ReservationId,
};
use stockledger_inventory::{
    CreateInventoryItemInput, CreateInventoryLevelInput, CreateReservationInput, InventoryItem,
    InventoryLevel, ItemFilter, LevelFilter, Pagination, ReservationFilter, ReservationItem,
    UpdateInventoryItemInput, UpdateInventoryLevelInput, UpdateReservationInput, summarize,
};

use crate::transaction::RequestContext;

/// Keyed persistence for inventory item records.
pub trait ItemStore: Send + Sync {
    /// Create one or many items. Fails with `Conflict` when a supplied id
    /// already exists.
    fn create(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateInventoryItemInput>,
    ) -> LedgerResult<Vec<InventoryItem>>;

    /// Fetch one item or fail with `ItemNotFound`.
    fn retrieve(&self, ctx: RequestContext, id: InventoryItemId) -> LedgerResult<InventoryItem>;

    /// Apply a partial update or fail with `ItemNotFound`.
    fn update(
        &self,
        ctx: RequestContext,
        id: InventoryItemId,
        update: UpdateInventoryItemInput,
    ) -> LedgerResult<InventoryItem>;

    /// Remove rows. No cascade: levels referencing these items are the
    /// coordinator's responsibility. Fails with `ItemNotFound` on a missing id.
    fn delete(&self, ctx: RequestContext, ids: &[InventoryItemId]) -> LedgerResult<()>;

    /// List matching items ordered by id.
    fn list(
        &self,
        ctx: RequestContext,
        filter: &ItemFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<InventoryItem>>;

    /// List a page of matching items plus the total match count.
    fn list_and_count(
        &self,
        ctx: RequestContext,
        filter: &ItemFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<InventoryItem>, usize)>;
}

/// Keyed persistence for (item, location) stock rows.
pub trait LevelStore: Send + Sync {
    /// Create level rows. Fails with `Conflict` on a duplicate (item,
    /// location) key, whether the duplicate already exists or appears twice
    /// in the batch.
    fn create(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateInventoryLevelInput>,
    ) -> LedgerResult<Vec<InventoryLevel>>;

    /// Fetch one level or fail with `LevelNotFound`.
    fn retrieve(&self, ctx: RequestContext, key: LevelKey) -> LedgerResult<InventoryLevel>;

    /// Apply a partial update or fail with `LevelNotFound`.
    fn update(
        &self,
        ctx: RequestContext,
        key: LevelKey,
        update: UpdateInventoryLevelInput,
    ) -> LedgerResult<InventoryLevel>;

    /// Move reserved quantity by `delta`. Coordinator-only path: reserved
    /// quantity changes only in step with reservation writes.
    fn adjust_reserved(
        &self,
        ctx: RequestContext,
        key: LevelKey,
        delta: i64,
    ) -> LedgerResult<InventoryLevel>;

    /// Remove one row. Returns whether a row existed; deleting an absent row
    /// is not an error.
    fn delete(&self, ctx: RequestContext, key: LevelKey) -> LedgerResult<bool>;

    /// Remove every level of the given items. Returns the removed count.
    fn delete_by_item_ids(
        &self,
        ctx: RequestContext,
        item_ids: &[InventoryItemId],
    ) -> LedgerResult<usize>;

    /// Remove every level at the given locations. Returns the removed count.
    fn delete_by_location_ids(
        &self,
        ctx: RequestContext,
        location_ids: &[LocationId],
    ) -> LedgerResult<usize>;

    /// List matching levels ordered by key.
    fn list(
        &self,
        ctx: RequestContext,
        filter: &LevelFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<InventoryLevel>>;

    /// List a page of matching levels plus the total match count.
    fn list_and_count(
        &self,
        ctx: RequestContext,
        filter: &LevelFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<InventoryLevel>, usize)>;

    /// Batch lookup: every existing row whose item id is in `item_ids` and
    /// whose location id is in `location_ids`. Used for batch existence
    /// checks and quantity aggregation.
    fn list_by_keys(
        &self,
        ctx: RequestContext,
        item_ids: &[InventoryItemId],
        location_ids: &[LocationId],
    ) -> LedgerResult<Vec<InventoryLevel>>;

    /// Sum of stocked quantity for one item across the given locations.
    /// Locations with no row contribute zero; an empty location set is a
    /// fast path returning zero without touching storage.
    fn stocked_quantity(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
    ) -> LedgerResult<i64> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        let rows = self.list_by_keys(ctx, &[item_id], location_ids)?;
        Ok(summarize(&rows).stocked)
    }

    /// Sum of reserved quantity, same shape as [`Self::stocked_quantity`].
    fn reserved_quantity(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
    ) -> LedgerResult<i64> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        let rows = self.list_by_keys(ctx, &[item_id], location_ids)?;
        Ok(summarize(&rows).reserved)
    }

    /// Derived available quantity, same shape as [`Self::stocked_quantity`].
    fn available_quantity(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
    ) -> LedgerResult<i64> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        let rows = self.list_by_keys(ctx, &[item_id], location_ids)?;
        Ok(summarize(&rows).available())
    }
}

/// Keyed persistence for reservation rows.
pub trait ReservationStore: Send + Sync {
    fn create(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateReservationInput>,
    ) -> LedgerResult<Vec<ReservationItem>>;

    /// Fetch one reservation or fail with `ReservationNotFound`.
    fn retrieve(&self, ctx: RequestContext, id: ReservationId) -> LedgerResult<ReservationItem>;

    /// Apply a partial update or fail with `ReservationNotFound`.
    fn update(
        &self,
        ctx: RequestContext,
        id: ReservationId,
        update: UpdateReservationInput,
    ) -> LedgerResult<ReservationItem>;

    /// Remove rows. Fails with `ReservationNotFound` on a missing id.
    fn delete(&self, ctx: RequestContext, ids: &[ReservationId]) -> LedgerResult<()>;

    /// Remove every reservation at the given locations. Returns the removed
    /// count.
    fn delete_by_location_ids(
        &self,
        ctx: RequestContext,
        location_ids: &[LocationId],
    ) -> LedgerResult<usize>;

    /// Remove every reservation referencing the given demand sources.
    /// Returns the removed count.
    fn delete_by_line_item_ids(
        &self,
        ctx: RequestContext,
        line_item_ids: &[LineItemId],
    ) -> LedgerResult<usize>;

    /// List matching reservations ordered by id.
    fn list(
        &self,
        ctx: RequestContext,
        filter: &ReservationFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<ReservationItem>>;

    /// List a page of matching reservations plus the total match count.
    fn list_and_count(
        &self,
        ctx: RequestContext,
        filter: &ReservationFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<ReservationItem>, usize)>;
}

macro_rules! forward_arc_impl {
    ($trait_:ident { $(fn $name:ident(&self, $($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;)* }) => {
        impl<S> $trait_ for Arc<S>
        where
            S: $trait_ + ?Sized,
        {
            $(
                fn $name(&self, $($arg: $ty),*) -> $ret {
                    (**self).$name($($arg),*)
                }
            )*
        }
    };
}

forward_arc_impl!(ItemStore {
    fn create(&self, ctx: RequestContext, inputs: Vec<CreateInventoryItemInput>) -> LedgerResult<Vec<InventoryItem>>;
    fn retrieve(&self, ctx: RequestContext, id: InventoryItemId) -> LedgerResult<InventoryItem>;
    fn update(&self, ctx: RequestContext, id: InventoryItemId, update: UpdateInventoryItemInput) -> LedgerResult<InventoryItem>;
    fn delete(&self, ctx: RequestContext, ids: &[InventoryItemId]) -> LedgerResult<()>;
    fn list(&self, ctx: RequestContext, filter: &ItemFilter, pagination: Pagination) -> LedgerResult<Vec<InventoryItem>>;
    fn list_and_count(&self, ctx: RequestContext, filter: &ItemFilter, pagination: Pagination) -> LedgerResult<(Vec<InventoryItem>, usize)>;
});

forward_arc_impl!(LevelStore {
    fn create(&self, ctx: RequestContext, inputs: Vec<CreateInventoryLevelInput>) -> LedgerResult<Vec<InventoryLevel>>;
    fn retrieve(&self, ctx: RequestContext, key: LevelKey) -> LedgerResult<InventoryLevel>;
    fn update(&self, ctx: RequestContext, key: LevelKey, update: UpdateInventoryLevelInput) -> LedgerResult<InventoryLevel>;
    fn adjust_reserved(&self, ctx: RequestContext, key: LevelKey, delta: i64) -> LedgerResult<InventoryLevel>;
    fn delete(&self, ctx: RequestContext, key: LevelKey) -> LedgerResult<bool>;
    fn delete_by_item_ids(&self, ctx: RequestContext, item_ids: &[InventoryItemId]) -> LedgerResult<usize>;
    fn delete_by_location_ids(&self, ctx: RequestContext, location_ids: &[LocationId]) -> LedgerResult<usize>;
    fn list(&self, ctx: RequestContext, filter: &LevelFilter, pagination: Pagination) -> LedgerResult<Vec<InventoryLevel>>;
    fn list_and_count(&self, ctx: RequestContext, filter: &LevelFilter, pagination: Pagination) -> LedgerResult<(Vec<InventoryLevel>, usize)>;
    fn list_by_keys(&self, ctx: RequestContext, item_ids: &[InventoryItemId], location_ids: &[LocationId]) -> LedgerResult<Vec<InventoryLevel>>;
});

forward_arc_impl!(ReservationStore {
    fn create(&self, ctx: RequestContext, inputs: Vec<CreateReservationInput>) -> LedgerResult<Vec<ReservationItem>>;
    fn retrieve(&self, ctx: RequestContext, id: ReservationId) -> LedgerResult<ReservationItem>;
    fn update(&self, ctx: RequestContext, id: ReservationId, update: UpdateReservationInput) -> LedgerResult<ReservationItem>;
    fn delete(&self, ctx: RequestContext, ids: &[ReservationId]) -> LedgerResult<()>;
    fn delete_by_location_ids(&self, ctx: RequestContext, location_ids: &[LocationId]) -> LedgerResult<usize>;
    fn delete_by_line_item_ids(&self, ctx: RequestContext, line_item_ids: &[LineItemId]) -> LedgerResult<usize>;
    fn list(&self, ctx: RequestContext, filter: &ReservationFilter, pagination: Pagination) -> LedgerResult<Vec<ReservationItem>>;
    fn list_and_count(&self, ctx: RequestContext, filter: &ReservationFilter, pagination: Pagination) -> LedgerResult<(Vec<ReservationItem>, usize)>;
});
