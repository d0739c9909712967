//! Keyed stores for the three ledger entities, plus the in-memory engine.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{MemoryEngine, MemoryItemStore, MemoryLevelStore, MemoryReservationStore};
pub use r#trait::{ItemStore, LevelStore, ReservationStore};
