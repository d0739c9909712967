//! `stockledger-infra` — storage engine, entity stores, and the inventory
//! coordinator.
//!
//! Composition mirrors the layering of the workspace: the domain crates stay
//! pure, this crate owns transactions and orchestration.

pub mod coordinator;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod integration_tests;

pub use coordinator::{InventoryCoordinator, MemoryCoordinator};
pub use store::{
    ItemStore, LevelStore, MemoryEngine, MemoryItemStore, MemoryLevelStore,
    MemoryReservationStore, ReservationStore,
};
pub use transaction::{
    RequestContext, TransactionScope, with_joined_transaction, with_transaction,
};
