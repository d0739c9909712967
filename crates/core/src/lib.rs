//! `stockledger-core` — ledger foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers and the error model shared by every other crate.

pub mod error;
pub mod id;

pub use error::{LedgerError, LedgerResult};
pub use id::{
    InventoryItemId, LevelKey, LineItemId, LocationId, ReservationId, TransactionId,
};
