//! Inventory domain module.
//!
//! This crate contains the ledger's records and pure business rules,
//! implemented as deterministic domain logic (no IO, no storage).

pub mod availability;
pub mod item;
pub mod level;
pub mod query;
pub mod reservation;

pub use availability::{AvailabilitySummary, summarize};
pub use item::{CreateInventoryItemInput, InventoryItem, UpdateInventoryItemInput};
pub use level::{
    BulkLevelUpdate, CreateInventoryLevelInput, InventoryLevel, UpdateInventoryLevelInput,
};
pub use query::{ItemFilter, LevelFilter, Pagination, ReservationFilter};
pub use reservation::{CreateReservationInput, ReservationItem, UpdateReservationInput};
