//! Inventory coordination (application-level orchestration).
//!
//! The coordinator is the only component with cross-entity invariants: it
//! validates existence, opens or joins transactions, keeps reserved
//! quantities in step with reservation writes, and performs the cascading
//! deletes that preserve referential consistency. It holds no state of its
//! own; every public operation is a short-lived transaction script over the
//! three injected stores.
//!
//! ## Transaction discipline
//!
//! Every mutating operation runs inside a transaction boundary. When the
//! caller supplies an ambient transaction the operation joins it and the
//! caller owns the outcome; otherwise the operation opens its own, commits
//! on success, and rolls back on any error. Conflicted commits (optimistic
//! concurrency) are retried a bounded number of times in a fresh transaction.
//!
//! ## Availability policy
//!
//! Over-reservation is rejected: creating or growing a reservation beyond
//! the level's available quantity fails with `InsufficientStock`, and a
//! stock write that would leave available quantity negative is refused.
//! `confirm_inventory` is advisory only — a caller that confirms and then
//! reserves in two separate transactions is racing; the reservation path
//! re-checks availability inside its own boundary.

use std::collections::{BTreeSet, HashMap};

use stockledger_core::{
    InventoryItemId, LedgerError, LedgerResult, LevelKey, LineItemId, LocationId, ReservationId,
};
use stockledger_inventory::{
    BulkLevelUpdate, CreateInventoryItemInput, CreateInventoryLevelInput, CreateReservationInput,
    InventoryItem, InventoryLevel, ItemFilter, LevelFilter, Pagination, ReservationFilter,
    ReservationItem, UpdateInventoryItemInput, UpdateInventoryLevelInput, UpdateReservationInput,
};

use crate::store::{
    ItemStore, LevelStore, MemoryEngine, MemoryItemStore, MemoryLevelStore, MemoryReservationStore,
    ReservationStore,
};
use crate::transaction::{RequestContext, TransactionScope, with_transaction};

/// Upper bound on fresh-transaction retries after an optimistic conflict.
/// Every conflict implies some other transaction committed, so retries are
/// naturally bounded by concurrent progress; this cap only guards misuse.
const MAX_CONFLICT_RETRIES: usize = 32;

/// Orchestrating service over the three entity stores.
///
/// Generic over the transaction scope and the store implementations so tests
/// and future backends can swap them; [`MemoryCoordinator::in_memory`] wires
/// the in-memory engine.
#[derive(Debug)]
pub struct InventoryCoordinator<E, I, L, R> {
    scope: E,
    items: I,
    levels: L,
    reservations: R,
}

/// Coordinator wired to the in-memory engine.
pub type MemoryCoordinator = InventoryCoordinator<
    std::sync::Arc<MemoryEngine>,
    MemoryItemStore,
    MemoryLevelStore,
    MemoryReservationStore,
>;

impl MemoryCoordinator {
    pub fn in_memory() -> Self {
        let engine = MemoryEngine::arc();
        Self::new(
            engine.clone(),
            MemoryItemStore::new(engine.clone()),
            MemoryLevelStore::new(engine.clone()),
            MemoryReservationStore::new(engine),
        )
    }
}

impl<E, I, L, R> InventoryCoordinator<E, I, L, R> {
    pub fn new(scope: E, items: I, levels: L, reservations: R) -> Self {
        Self {
            scope,
            items,
            levels,
            reservations,
        }
    }

    /// The underlying transaction scope, for callers composing several
    /// operations into one ambient unit of work.
    pub fn scope(&self) -> &E {
        &self.scope
    }
}

impl<E, I, L, R> InventoryCoordinator<E, I, L, R>
where
    E: TransactionScope,
    I: ItemStore,
    L: LevelStore,
    R: ReservationStore,
{
    /// Run a mutation inside a transaction boundary (force policy), retrying
    /// in a fresh transaction on an optimistic conflict. A joined ambient
    /// transaction is never retried here — its owner decides.
    fn mutate<T>(
        &self,
        ctx: RequestContext,
        f: impl Fn(RequestContext) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        if ctx.transaction().is_some() {
            return f(ctx);
        }
        let mut last_conflict = None;
        for attempt in 0..MAX_CONFLICT_RETRIES {
            match with_transaction(&self.scope, ctx, &f) {
                Err(err) if err.is_conflict() => {
                    tracing::debug!(attempt, error = %err, "retrying conflicted transaction");
                    last_conflict = Some(err);
                }
                outcome => return outcome,
            }
        }
        Err(last_conflict.unwrap_or_else(|| LedgerError::conflict("conflict retries exhausted")))
    }

    // ---- items ------------------------------------------------------------

    pub fn create_items(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateInventoryItemInput>,
    ) -> LedgerResult<Vec<InventoryItem>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }
        for input in &inputs {
            input.validate()?;
        }
        tracing::info!(count = inputs.len(), "creating inventory items");
        self.mutate(ctx, |ctx| self.items.create(ctx, inputs.clone()))
    }

    pub fn retrieve_item(
        &self,
        ctx: RequestContext,
        id: InventoryItemId,
    ) -> LedgerResult<InventoryItem> {
        self.items.retrieve(ctx, id)
    }

    pub fn update_item(
        &self,
        ctx: RequestContext,
        id: InventoryItemId,
        update: UpdateInventoryItemInput,
    ) -> LedgerResult<InventoryItem> {
        tracing::info!(%id, "updating inventory item");
        self.mutate(ctx, |ctx| self.items.update(ctx, id, update.clone()))
    }

    /// Delete items, cascading: all levels at each item go first, then the
    /// item rows. Reservations are untouched (a reservation without its item
    /// is reachable only through the demand-source cascade).
    pub fn delete_items(&self, ctx: RequestContext, ids: &[InventoryItemId]) -> LedgerResult<()> {
        tracing::info!(count = ids.len(), "deleting inventory items");
        self.mutate(ctx, |ctx| {
            for &id in ids {
                self.items.retrieve(ctx, id)?;
            }
            self.levels.delete_by_item_ids(ctx, ids)?;
            self.items.delete(ctx, ids)
        })
    }

    pub fn list_items(
        &self,
        ctx: RequestContext,
        filter: &ItemFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<InventoryItem>> {
        self.items.list(ctx, filter, pagination)
    }

    pub fn list_and_count_items(
        &self,
        ctx: RequestContext,
        filter: &ItemFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<InventoryItem>, usize)> {
        self.items.list_and_count(ctx, filter, pagination)
    }

    // ---- levels -----------------------------------------------------------

    /// Create level rows. Each referenced item must exist; a duplicate
    /// (item, location) key fails with `Conflict`.
    pub fn create_levels(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateInventoryLevelInput>,
    ) -> LedgerResult<Vec<InventoryLevel>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }
        for input in &inputs {
            input.validate()?;
        }
        tracing::info!(count = inputs.len(), "creating inventory levels");
        self.mutate(ctx, |ctx| {
            for input in &inputs {
                self.items.retrieve(ctx, input.inventory_item_id)?;
            }
            self.levels.create(ctx, inputs.clone())
        })
    }

    pub fn retrieve_level(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_id: LocationId,
    ) -> LedgerResult<InventoryLevel> {
        self.levels.retrieve(ctx, LevelKey::new(item_id, location_id))
    }

    /// Bulk update: resolve every target row through batch existence
    /// validation first, then apply per-row updates. A stock write that
    /// would leave available quantity negative is refused.
    pub fn update_levels(
        &self,
        ctx: RequestContext,
        updates: Vec<BulkLevelUpdate>,
    ) -> LedgerResult<Vec<InventoryLevel>> {
        if updates.is_empty() {
            return Ok(vec![]);
        }
        tracing::info!(count = updates.len(), "updating inventory levels");
        self.mutate(ctx, |ctx| {
            let keys: Vec<LevelKey> = updates.iter().map(|u| u.key()).collect();
            let current = self.ensure_inventory_levels(ctx, &keys)?;

            let mut updated = Vec::with_capacity(updates.len());
            for (request, level) in updates.iter().zip(&current) {
                if let Some(stocked) = request.update.stocked_quantity {
                    if stocked < level.reserved_quantity {
                        return Err(LedgerError::validation(format!(
                            "stocked_quantity {stocked} below reserved_quantity {} for {}",
                            level.reserved_quantity,
                            request.key()
                        )));
                    }
                }
                updated.push(self.levels.update(ctx, request.key(), request.update.clone())?);
            }
            Ok(updated)
        })
    }

    /// Delete one level. Idempotent: an absent row is a successful no-op.
    pub fn delete_level(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_id: LocationId,
    ) -> LedgerResult<()> {
        let key = LevelKey::new(item_id, location_id);
        tracing::info!(%key, "deleting inventory level");
        self.mutate(ctx, |ctx| self.levels.delete(ctx, key).map(|_| ()))
    }

    /// Location removal: two independent cascades on the same location key —
    /// levels at the location and reservations at the location.
    pub fn delete_by_location_ids(
        &self,
        ctx: RequestContext,
        location_ids: &[LocationId],
    ) -> LedgerResult<()> {
        tracing::info!(count = location_ids.len(), "deleting by location");
        self.mutate(ctx, |ctx| {
            let levels = self.levels.delete_by_location_ids(ctx, location_ids)?;
            let reservations = self.reservations.delete_by_location_ids(ctx, location_ids)?;
            tracing::debug!(levels, reservations, "location cascade complete");
            Ok(())
        })
    }

    pub fn list_levels(
        &self,
        ctx: RequestContext,
        filter: &LevelFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<InventoryLevel>> {
        self.levels.list(ctx, filter, pagination)
    }

    pub fn list_and_count_levels(
        &self,
        ctx: RequestContext,
        filter: &LevelFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<InventoryLevel>, usize)> {
        self.levels.list_and_count(ctx, filter, pagination)
    }

    /// Batch existence validation: fetch all requested rows in one query,
    /// index them item → location → level, and verify every requested pair
    /// resolves. Unresolved pairs are collected — not short-circuited — and
    /// reported together so the caller sees every bad pair at once. On
    /// success the rows come back in input order.
    pub fn ensure_inventory_levels(
        &self,
        ctx: RequestContext,
        keys: &[LevelKey],
    ) -> LedgerResult<Vec<InventoryLevel>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let item_ids: Vec<InventoryItemId> = keys
            .iter()
            .map(|k| k.inventory_item_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let location_ids: Vec<LocationId> = keys
            .iter()
            .map(|k| k.location_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = self.levels.list_by_keys(ctx, &item_ids, &location_ids)?;

        let mut by_item: HashMap<InventoryItemId, HashMap<LocationId, InventoryLevel>> =
            HashMap::new();
        for row in rows {
            by_item
                .entry(row.inventory_item_id)
                .or_default()
                .insert(row.location_id, row);
        }

        let mut resolved = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match by_item
                .get(&key.inventory_item_id)
                .and_then(|locations| locations.get(&key.location_id))
            {
                Some(level) => resolved.push(level.clone()),
                None => missing.push(*key),
            }
        }

        if !missing.is_empty() {
            return Err(LedgerError::not_stocked(missing));
        }
        Ok(resolved)
    }

    // ---- adjustment and availability --------------------------------------

    /// Read-modify-write on stocked quantity. Runs inside a forced
    /// transaction; a concurrent adjustment of the same row conflicts at
    /// commit and is retried, so no update is lost.
    pub fn adjust_inventory(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_id: LocationId,
        delta: i64,
    ) -> LedgerResult<InventoryLevel> {
        let key = LevelKey::new(item_id, location_id);
        tracing::info!(%key, delta, "adjusting inventory");
        self.mutate(ctx, |ctx| {
            let level = self.levels.retrieve(ctx, key)?;
            let stocked = level.stocked_quantity + delta;
            if stocked < level.reserved_quantity {
                return Err(LedgerError::validation(format!(
                    "adjustment of {delta} would leave {key} with stocked {stocked} below reserved {}",
                    level.reserved_quantity
                )));
            }
            self.levels.update(
                ctx,
                key,
                UpdateInventoryLevelInput {
                    stocked_quantity: Some(stocked),
                    ..Default::default()
                },
            )
        })
    }

    /// Sum of stocked quantity for one item across the given locations.
    /// An empty location set is answered as zero without touching storage;
    /// otherwise the item must exist.
    pub fn retrieve_stocked_quantity(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
    ) -> LedgerResult<i64> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        self.items.retrieve(ctx, item_id)?;
        self.levels.stocked_quantity(ctx, item_id, location_ids)
    }

    /// Sum of reserved quantity, same shape as
    /// [`Self::retrieve_stocked_quantity`].
    pub fn retrieve_reserved_quantity(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
    ) -> LedgerResult<i64> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        self.items.retrieve(ctx, item_id)?;
        self.levels.reserved_quantity(ctx, item_id, location_ids)
    }

    /// Derived available quantity, same shape as
    /// [`Self::retrieve_stocked_quantity`].
    pub fn retrieve_available_quantity(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
    ) -> LedgerResult<i64> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        self.items.retrieve(ctx, item_id)?;
        self.levels.available_quantity(ctx, item_id, location_ids)
    }

    /// Whether at least `quantity` units are available across the locations.
    /// Advisory only: it does not reserve. Callers needing check-then-reserve
    /// atomicity run both inside one ambient transaction.
    pub fn confirm_inventory(
        &self,
        ctx: RequestContext,
        item_id: InventoryItemId,
        location_ids: &[LocationId],
        quantity: i64,
    ) -> LedgerResult<bool> {
        let available = self.retrieve_available_quantity(ctx, item_id, location_ids)?;
        tracing::debug!(%item_id, available, requested = quantity, "confirming inventory");
        Ok(available >= quantity)
    }

    // ---- reservations -----------------------------------------------------

    /// Create reservations as one transactional unit. Existence of every
    /// (item, location) pair is validated first — atomically, as one check
    /// spanning the whole batch — so if any pair is unstocked, no reservation
    /// row is written and the error names every bad pair. Each write bumps
    /// the level's reserved quantity in step and is refused when it would
    /// exceed availability (earlier rows of the same batch count).
    pub fn create_reservations(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateReservationInput>,
    ) -> LedgerResult<Vec<ReservationItem>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }
        for input in &inputs {
            input.validate()?;
        }
        tracing::info!(count = inputs.len(), "creating reservations");
        self.mutate(ctx, |ctx| {
            let keys: Vec<LevelKey> = inputs.iter().map(|i| i.level_key()).collect();
            self.ensure_inventory_levels(ctx, &keys)?;

            for input in &inputs {
                let key = input.level_key();
                // Re-read per row: a prior row of this batch may already have
                // taken from the same level.
                let level = self.levels.retrieve(ctx, key)?;
                if level.available_quantity() < input.quantity {
                    return Err(LedgerError::InsufficientStock {
                        key,
                        requested: input.quantity,
                        available: level.available_quantity(),
                    });
                }
                self.levels.adjust_reserved(ctx, key, input.quantity)?;
            }
            self.reservations.create(ctx, inputs.clone())
        })
    }

    /// Single-reservation convenience over [`Self::create_reservations`].
    pub fn create_reservation(
        &self,
        ctx: RequestContext,
        input: CreateReservationInput,
    ) -> LedgerResult<ReservationItem> {
        let mut created = self.create_reservations(ctx, vec![input])?;
        created
            .pop()
            .ok_or_else(|| LedgerError::validation("reservation batch returned no rows"))
    }

    pub fn retrieve_reservation(
        &self,
        ctx: RequestContext,
        id: ReservationId,
    ) -> LedgerResult<ReservationItem> {
        self.reservations.retrieve(ctx, id)
    }

    /// Update a reservation. The referenced pair must still be stocked; a
    /// quantity change moves the delta on the level's reserved quantity and
    /// a growth beyond availability is refused.
    pub fn update_reservation(
        &self,
        ctx: RequestContext,
        id: ReservationId,
        update: UpdateReservationInput,
    ) -> LedgerResult<ReservationItem> {
        update.validate()?;
        tracing::info!(%id, "updating reservation");
        self.mutate(ctx, |ctx| {
            let existing = self.reservations.retrieve(ctx, id)?;
            let key = existing.level_key();
            let level = self
                .ensure_inventory_levels(ctx, &[key])?
                .into_iter()
                .next()
                .ok_or(LedgerError::LevelNotFound(key))?;

            if let Some(quantity) = update.quantity {
                let delta = quantity - existing.quantity;
                if delta > 0 && level.available_quantity() < delta {
                    return Err(LedgerError::InsufficientStock {
                        key,
                        requested: delta,
                        available: level.available_quantity(),
                    });
                }
                if delta != 0 {
                    self.levels.adjust_reserved(ctx, key, delta)?;
                }
            }
            self.reservations.update(ctx, id, update.clone())
        })
    }

    /// Delete reservations, returning their quantity to the levels they
    /// held. A level that already disappeared through a cascade is skipped.
    pub fn delete_reservations(
        &self,
        ctx: RequestContext,
        ids: &[ReservationId],
    ) -> LedgerResult<()> {
        tracing::info!(count = ids.len(), "deleting reservations");
        self.mutate(ctx, |ctx| {
            for &id in ids {
                let existing = self.reservations.retrieve(ctx, id)?;
                self.release_reserved(ctx, &existing)?;
            }
            self.reservations.delete(ctx, ids)
        })
    }

    /// Delete every reservation referencing the given demand sources,
    /// returning held quantity to the levels. No level cascade.
    pub fn delete_reservations_by_line_item_ids(
        &self,
        ctx: RequestContext,
        line_item_ids: &[LineItemId],
    ) -> LedgerResult<()> {
        tracing::info!(count = line_item_ids.len(), "deleting reservations by line item");
        self.mutate(ctx, |ctx| {
            let filter = ReservationFilter::by_line_item_ids(line_item_ids.to_vec());
            let matching = self.reservations.list(ctx, &filter, Pagination::default())?;
            for reservation in &matching {
                self.release_reserved(ctx, reservation)?;
            }
            self.reservations
                .delete_by_line_item_ids(ctx, line_item_ids)
                .map(|_| ())
        })
    }

    fn release_reserved(
        &self,
        ctx: RequestContext,
        reservation: &ReservationItem,
    ) -> LedgerResult<()> {
        match self
            .levels
            .adjust_reserved(ctx, reservation.level_key(), -reservation.quantity)
        {
            Ok(_) => Ok(()),
            // The level was already removed by a cascade; nothing to return
            // the quantity to.
            Err(LedgerError::LevelNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn list_reservations(
        &self,
        ctx: RequestContext,
        filter: &ReservationFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<ReservationItem>> {
        self.reservations.list(ctx, filter, pagination)
    }

    pub fn list_and_count_reservations(
        &self,
        ctx: RequestContext,
        filter: &ReservationFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<ReservationItem>, usize)> {
        self.reservations.list_and_count(ctx, filter, pagination)
    }
}
