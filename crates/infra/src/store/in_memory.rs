//! In-memory storage engine.
//!
//! Intended for tests/dev. Three versioned tables behind one mutex, plus a
//! table of open transaction overlays. Concurrency control is optimistic:
//! reads inside a transaction record the row version they observed, commit
//! re-validates every touched row under the lock and applies the overlay
//! atomically, failing with `Conflict` on any mismatch. Rollback discards the
//! overlay. Reads outside a transaction go straight to the base tables, and
//! writes outside a transaction are single-row auto-commits.
//!
//! Point reads record the absence of a key (version 0) so a commit fails when
//! a concurrent transaction created the row in the meantime. Scans only
//! record the rows they return, so phantom inserts are not detected by scans;
//! uniqueness checks therefore go through point reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use stockledger_core::{
    InventoryItemId, LedgerError, LedgerResult, LevelKey, LineItemId, LocationId, ReservationId,
    TransactionId,
};
use stockledger_inventory::{
    CreateInventoryItemInput, CreateInventoryLevelInput, CreateReservationInput, InventoryItem,
    InventoryLevel, ItemFilter, LevelFilter, Pagination, ReservationFilter, ReservationItem,
    UpdateInventoryItemInput, UpdateInventoryLevelInput, UpdateReservationInput,
};

use super::r#trait::{ItemStore, LevelStore, ReservationStore};
use crate::transaction::{RequestContext, TransactionScope};

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    row: T,
}

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<InventoryItemId, Versioned<InventoryItem>>,
    levels: HashMap<LevelKey, Versioned<InventoryLevel>>,
    reservations: HashMap<ReservationId, Versioned<ReservationItem>>,
}

/// Pending writes of one open transaction, plus the versions observed for
/// every row it touched (version 0 means "absent when read").
#[derive(Debug, Default)]
struct Overlay {
    items: HashMap<InventoryItemId, Option<InventoryItem>>,
    levels: HashMap<LevelKey, Option<InventoryLevel>>,
    reservations: HashMap<ReservationId, Option<ReservationItem>>,
    item_reads: HashMap<InventoryItemId, u64>,
    level_reads: HashMap<LevelKey, u64>,
    reservation_reads: HashMap<ReservationId, u64>,
}

#[derive(Debug, Default)]
struct EngineState {
    tables: Tables,
    open: HashMap<TransactionId, Overlay>,
}

/// In-memory transactional engine backing the three stores.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::conflict("storage lock poisoned"))
    }
}

macro_rules! impl_table_access {
    (
        $read:ident, $write:ident, $scan:ident,
        $field:ident, $reads:ident, $key:ty, $row:ty
    ) => {
        impl MemoryEngine {
            /// Overlay-aware point read; records the observed version inside
            /// a transaction.
            fn $read(&self, ctx: RequestContext, key: $key) -> LedgerResult<Option<$row>> {
                let mut state = self.lock()?;
                let EngineState { tables, open } = &mut *state;

                let Some(tx) = ctx.transaction() else {
                    return Ok(tables.$field.get(&key).map(|v| v.row.clone()));
                };
                let overlay = open
                    .get_mut(&tx)
                    .ok_or(LedgerError::TransactionNotFound(tx))?;

                if let Some(pending) = overlay.$field.get(&key) {
                    return Ok(pending.clone());
                }
                let (version, row) = match tables.$field.get(&key) {
                    Some(v) => (v.version, Some(v.row.clone())),
                    None => (0, None),
                };
                overlay.$reads.entry(key).or_insert(version);
                Ok(row)
            }

            /// Overlay-aware write; `None` deletes. Outside a transaction
            /// this is a single-row auto-commit.
            fn $write(&self, ctx: RequestContext, key: $key, row: Option<$row>) -> LedgerResult<()> {
                let mut state = self.lock()?;
                let EngineState { tables, open } = &mut *state;

                let Some(tx) = ctx.transaction() else {
                    match row {
                        Some(row) => {
                            let version =
                                tables.$field.get(&key).map(|v| v.version).unwrap_or(0) + 1;
                            tables.$field.insert(key, Versioned { version, row });
                        }
                        None => {
                            tables.$field.remove(&key);
                        }
                    }
                    return Ok(());
                };
                let overlay = open
                    .get_mut(&tx)
                    .ok_or(LedgerError::TransactionNotFound(tx))?;

                let version = tables.$field.get(&key).map(|v| v.version).unwrap_or(0);
                overlay.$reads.entry(key).or_insert(version);
                overlay.$field.insert(key, row);
                Ok(())
            }

            /// Merged scan ordered by key. Inside a transaction, only the
            /// returned rows have their versions recorded.
            fn $scan(
                &self,
                ctx: RequestContext,
                pred: impl Fn(&$key, &$row) -> bool,
            ) -> LedgerResult<Vec<$row>> {
                let mut state = self.lock()?;
                let EngineState { tables, open } = &mut *state;

                let mut matched: Vec<($key, $row)> = Vec::new();

                let overlay = match ctx.transaction() {
                    Some(tx) => Some(
                        open.get_mut(&tx)
                            .ok_or(LedgerError::TransactionNotFound(tx))?,
                    ),
                    None => None,
                };

                if let Some(overlay) = overlay {
                    for (key, versioned) in &tables.$field {
                        if overlay.$field.contains_key(key) {
                            continue; // superseded by a pending write below
                        }
                        if pred(key, &versioned.row) {
                            overlay.$reads.entry(*key).or_insert(versioned.version);
                            matched.push((*key, versioned.row.clone()));
                        }
                    }
                    for (key, pending) in &overlay.$field {
                        if let Some(row) = pending {
                            if pred(key, row) {
                                matched.push((*key, row.clone()));
                            }
                        }
                    }
                } else {
                    for (key, versioned) in &tables.$field {
                        if pred(key, &versioned.row) {
                            matched.push((*key, versioned.row.clone()));
                        }
                    }
                }

                matched.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(matched.into_iter().map(|(_, row)| row).collect())
            }
        }
    };
}

impl_table_access!(
    read_item, write_item, scan_items,
    items, item_reads, InventoryItemId, InventoryItem
);
impl_table_access!(
    read_level, write_level, scan_levels,
    levels, level_reads, LevelKey, InventoryLevel
);
impl_table_access!(
    read_reservation, write_reservation, scan_reservations,
    reservations, reservation_reads, ReservationId, ReservationItem
);

impl TransactionScope for MemoryEngine {
    fn begin(&self) -> LedgerResult<TransactionId> {
        let transaction = TransactionId::new();
        self.lock()?.open.insert(transaction, Overlay::default());
        Ok(transaction)
    }

    fn commit(&self, transaction: TransactionId) -> LedgerResult<()> {
        let mut state = self.lock()?;
        let EngineState { tables, open } = &mut *state;

        let overlay = open
            .remove(&transaction)
            .ok_or(LedgerError::TransactionNotFound(transaction))?;

        // Validate every observed version before touching anything: all
        // writes become visible together or not at all.
        for (key, &seen) in &overlay.item_reads {
            let current = tables.items.get(key).map(|v| v.version).unwrap_or(0);
            if current != seen {
                return Err(LedgerError::conflict(format!(
                    "inventory item {key} changed concurrently"
                )));
            }
        }
        for (key, &seen) in &overlay.level_reads {
            let current = tables.levels.get(key).map(|v| v.version).unwrap_or(0);
            if current != seen {
                return Err(LedgerError::conflict(format!(
                    "inventory level for {key} changed concurrently"
                )));
            }
        }
        for (key, &seen) in &overlay.reservation_reads {
            let current = tables.reservations.get(key).map(|v| v.version).unwrap_or(0);
            if current != seen {
                return Err(LedgerError::conflict(format!(
                    "reservation {key} changed concurrently"
                )));
            }
        }

        for (key, pending) in overlay.items {
            match pending {
                Some(row) => {
                    let version = tables.items.get(&key).map(|v| v.version).unwrap_or(0) + 1;
                    tables.items.insert(key, Versioned { version, row });
                }
                None => {
                    tables.items.remove(&key);
                }
            }
        }
        for (key, pending) in overlay.levels {
            match pending {
                Some(row) => {
                    let version = tables.levels.get(&key).map(|v| v.version).unwrap_or(0) + 1;
                    tables.levels.insert(key, Versioned { version, row });
                }
                None => {
                    tables.levels.remove(&key);
                }
            }
        }
        for (key, pending) in overlay.reservations {
            match pending {
                Some(row) => {
                    let version = tables.reservations.get(&key).map(|v| v.version).unwrap_or(0) + 1;
                    tables.reservations.insert(key, Versioned { version, row });
                }
                None => {
                    tables.reservations.remove(&key);
                }
            }
        }

        Ok(())
    }

    fn rollback(&self, transaction: TransactionId) -> LedgerResult<()> {
        self.lock()?
            .open
            .remove(&transaction)
            .map(|_| ())
            .ok_or(LedgerError::TransactionNotFound(transaction))
    }
}

/// Item store over the in-memory engine.
#[derive(Debug, Clone)]
pub struct MemoryItemStore {
    engine: Arc<MemoryEngine>,
}

impl MemoryItemStore {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

impl ItemStore for MemoryItemStore {
    fn create(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateInventoryItemInput>,
    ) -> LedgerResult<Vec<InventoryItem>> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            let item = InventoryItem::from_input(input, now)?;
            if self.engine.read_item(ctx, item.id)?.is_some() {
                return Err(LedgerError::conflict(format!(
                    "inventory item {} already exists",
                    item.id
                )));
            }
            self.engine.write_item(ctx, item.id, Some(item.clone()))?;
            created.push(item);
        }
        Ok(created)
    }

    fn retrieve(&self, ctx: RequestContext, id: InventoryItemId) -> LedgerResult<InventoryItem> {
        self.engine
            .read_item(ctx, id)?
            .ok_or(LedgerError::ItemNotFound(id))
    }

    fn update(
        &self,
        ctx: RequestContext,
        id: InventoryItemId,
        update: UpdateInventoryItemInput,
    ) -> LedgerResult<InventoryItem> {
        let mut item = self.retrieve(ctx, id)?;
        item.apply_update(update, Utc::now());
        self.engine.write_item(ctx, id, Some(item.clone()))?;
        Ok(item)
    }

    fn delete(&self, ctx: RequestContext, ids: &[InventoryItemId]) -> LedgerResult<()> {
        for &id in ids {
            if self.engine.read_item(ctx, id)?.is_none() {
                return Err(LedgerError::ItemNotFound(id));
            }
            self.engine.write_item(ctx, id, None)?;
        }
        Ok(())
    }

    fn list(
        &self,
        ctx: RequestContext,
        filter: &ItemFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<InventoryItem>> {
        let rows = self
            .engine
            .scan_items(ctx, |id, item| filter.matches(*id, item.sku.as_deref()))?;
        Ok(pagination.slice(rows))
    }

    fn list_and_count(
        &self,
        ctx: RequestContext,
        filter: &ItemFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<InventoryItem>, usize)> {
        let rows = self
            .engine
            .scan_items(ctx, |id, item| filter.matches(*id, item.sku.as_deref()))?;
        let count = rows.len();
        Ok((pagination.slice(rows), count))
    }
}

/// Level store over the in-memory engine.
#[derive(Debug, Clone)]
pub struct MemoryLevelStore {
    engine: Arc<MemoryEngine>,
}

impl MemoryLevelStore {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

impl LevelStore for MemoryLevelStore {
    fn create(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateInventoryLevelInput>,
    ) -> LedgerResult<Vec<InventoryLevel>> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            let level = InventoryLevel::from_input(input, now)?;
            let key = level.key();
            // Point read so a concurrent creation of the same key is caught
            // at commit time.
            if self.engine.read_level(ctx, key)?.is_some() {
                return Err(LedgerError::conflict(format!(
                    "inventory level for {key} already exists"
                )));
            }
            self.engine.write_level(ctx, key, Some(level.clone()))?;
            created.push(level);
        }
        Ok(created)
    }

    fn retrieve(&self, ctx: RequestContext, key: LevelKey) -> LedgerResult<InventoryLevel> {
        self.engine
            .read_level(ctx, key)?
            .ok_or(LedgerError::LevelNotFound(key))
    }

    fn update(
        &self,
        ctx: RequestContext,
        key: LevelKey,
        update: UpdateInventoryLevelInput,
    ) -> LedgerResult<InventoryLevel> {
        let mut level = self.retrieve(ctx, key)?;
        level.apply_update(update, Utc::now());
        self.engine.write_level(ctx, key, Some(level.clone()))?;
        Ok(level)
    }

    fn adjust_reserved(
        &self,
        ctx: RequestContext,
        key: LevelKey,
        delta: i64,
    ) -> LedgerResult<InventoryLevel> {
        let mut level = self.retrieve(ctx, key)?;
        level.reserved_quantity += delta;
        level.updated_at = Utc::now();
        self.engine.write_level(ctx, key, Some(level.clone()))?;
        Ok(level)
    }

    fn delete(&self, ctx: RequestContext, key: LevelKey) -> LedgerResult<bool> {
        let existed = self.engine.read_level(ctx, key)?.is_some();
        if existed {
            self.engine.write_level(ctx, key, None)?;
        }
        Ok(existed)
    }

    fn delete_by_item_ids(
        &self,
        ctx: RequestContext,
        item_ids: &[InventoryItemId],
    ) -> LedgerResult<usize> {
        let doomed = self
            .engine
            .scan_levels(ctx, |key, _| item_ids.contains(&key.inventory_item_id))?;
        for level in &doomed {
            self.engine.write_level(ctx, level.key(), None)?;
        }
        Ok(doomed.len())
    }

    fn delete_by_location_ids(
        &self,
        ctx: RequestContext,
        location_ids: &[LocationId],
    ) -> LedgerResult<usize> {
        let doomed = self
            .engine
            .scan_levels(ctx, |key, _| location_ids.contains(&key.location_id))?;
        for level in &doomed {
            self.engine.write_level(ctx, level.key(), None)?;
        }
        Ok(doomed.len())
    }

    fn list(
        &self,
        ctx: RequestContext,
        filter: &LevelFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<InventoryLevel>> {
        let rows = self
            .engine
            .scan_levels(ctx, |key, _| filter.matches(key.inventory_item_id, key.location_id))?;
        Ok(pagination.slice(rows))
    }

    fn list_and_count(
        &self,
        ctx: RequestContext,
        filter: &LevelFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<InventoryLevel>, usize)> {
        let rows = self
            .engine
            .scan_levels(ctx, |key, _| filter.matches(key.inventory_item_id, key.location_id))?;
        let count = rows.len();
        Ok((pagination.slice(rows), count))
    }

    fn list_by_keys(
        &self,
        ctx: RequestContext,
        item_ids: &[InventoryItemId],
        location_ids: &[LocationId],
    ) -> LedgerResult<Vec<InventoryLevel>> {
        self.engine.scan_levels(ctx, |key, _| {
            item_ids.contains(&key.inventory_item_id) && location_ids.contains(&key.location_id)
        })
    }
}

/// Reservation store over the in-memory engine.
#[derive(Debug, Clone)]
pub struct MemoryReservationStore {
    engine: Arc<MemoryEngine>,
}

impl MemoryReservationStore {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

impl ReservationStore for MemoryReservationStore {
    fn create(
        &self,
        ctx: RequestContext,
        inputs: Vec<CreateReservationInput>,
    ) -> LedgerResult<Vec<ReservationItem>> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            let reservation = ReservationItem::from_input(input, now)?;
            if self.engine.read_reservation(ctx, reservation.id)?.is_some() {
                return Err(LedgerError::conflict(format!(
                    "reservation {} already exists",
                    reservation.id
                )));
            }
            self.engine
                .write_reservation(ctx, reservation.id, Some(reservation.clone()))?;
            created.push(reservation);
        }
        Ok(created)
    }

    fn retrieve(&self, ctx: RequestContext, id: ReservationId) -> LedgerResult<ReservationItem> {
        self.engine
            .read_reservation(ctx, id)?
            .ok_or(LedgerError::ReservationNotFound(id))
    }

    fn update(
        &self,
        ctx: RequestContext,
        id: ReservationId,
        update: UpdateReservationInput,
    ) -> LedgerResult<ReservationItem> {
        update.validate()?;
        let mut reservation = self.retrieve(ctx, id)?;
        reservation.apply_update(update, Utc::now());
        self.engine
            .write_reservation(ctx, id, Some(reservation.clone()))?;
        Ok(reservation)
    }

    fn delete(&self, ctx: RequestContext, ids: &[ReservationId]) -> LedgerResult<()> {
        for &id in ids {
            if self.engine.read_reservation(ctx, id)?.is_none() {
                return Err(LedgerError::ReservationNotFound(id));
            }
            self.engine.write_reservation(ctx, id, None)?;
        }
        Ok(())
    }

    fn delete_by_location_ids(
        &self,
        ctx: RequestContext,
        location_ids: &[LocationId],
    ) -> LedgerResult<usize> {
        let doomed = self
            .engine
            .scan_reservations(ctx, |_, r| location_ids.contains(&r.location_id))?;
        for reservation in &doomed {
            self.engine.write_reservation(ctx, reservation.id, None)?;
        }
        Ok(doomed.len())
    }

    fn delete_by_line_item_ids(
        &self,
        ctx: RequestContext,
        line_item_ids: &[LineItemId],
    ) -> LedgerResult<usize> {
        let doomed = self.engine.scan_reservations(ctx, |_, r| {
            r.line_item_id
                .map(|id| line_item_ids.contains(&id))
                .unwrap_or(false)
        })?;
        for reservation in &doomed {
            self.engine.write_reservation(ctx, reservation.id, None)?;
        }
        Ok(doomed.len())
    }

    fn list(
        &self,
        ctx: RequestContext,
        filter: &ReservationFilter,
        pagination: Pagination,
    ) -> LedgerResult<Vec<ReservationItem>> {
        let rows = self.engine.scan_reservations(ctx, |_, r| {
            filter.matches(r.inventory_item_id, r.location_id, r.line_item_id)
        })?;
        Ok(pagination.slice(rows))
    }

    fn list_and_count(
        &self,
        ctx: RequestContext,
        filter: &ReservationFilter,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<ReservationItem>, usize)> {
        let rows = self.engine.scan_reservations(ctx, |_, r| {
            filter.matches(r.inventory_item_id, r.location_id, r.line_item_id)
        })?;
        let count = rows.len();
        Ok((pagination.slice(rows), count))
    }
}
