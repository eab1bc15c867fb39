//! Zone/bin persistence boundary.
//!
//! This module defines the storage collaborators the structure service depends
//! on, without making any storage assumptions, plus an in-memory implementation
//! (tests/dev) and a Postgres one (feature `postgres`).

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryZoneStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresZoneStore;
pub use r#trait::{
    BinReader, OccupancyGuard, OccupancyLookup, StoreError, ZoneReader, ZoneStructureStore,
    ZoneTransaction, ZoneWriter,
};
