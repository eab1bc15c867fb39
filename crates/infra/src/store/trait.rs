use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use slotforge_core::{ExpectedVersion, WarehouseId, ZoneId};
use slotforge_warehouse::{
    Bin, BinOccupancy, BlockedBin, Layout, StructureSpec, Warehouse, Zone,
};

/// Store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, uniqueness) as
/// opposed to domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed since it was read (version mismatch).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A uniqueness constraint was hit (warehouse/zone code, live bin address).
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Bins targeted for removal hold items and the removal was not forced.
    #[error("occupied bins cannot be removed: {}", describe_blocked(.0))]
    OccupiedBins(Vec<BlockedBin>),

    /// Backend failure (connection, lock poisoning, malformed rows, ...).
    #[error("backend failure: {0}")]
    Backend(String),
}

pub(crate) fn describe_blocked(bins: &[BlockedBin]) -> String {
    bins.iter()
        .map(|b| format!("{} ({} items)", b.address, b.item_count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether a bulk soft-delete may remove bins that hold items.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OccupancyGuard {
    /// Re-check occupancy inside the transaction and fail on any occupied bin.
    RejectOccupied,
    /// The caller explicitly opted in to removing occupied bins.
    AllowOccupied,
}

/// Read access to warehouses and zones.
pub trait ZoneReader: Send + Sync {
    fn get_warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<Warehouse>, StoreError>;

    fn get_zone(&self, zone_id: ZoneId) -> Result<Option<Zone>, StoreError>;

    /// The zone's current, persisted structure.
    fn get_structure(&self, zone_id: ZoneId) -> Result<Option<StructureSpec>, StoreError> {
        Ok(self.get_zone(zone_id)?.map(|z| z.structure().clone()))
    }
}

/// Read access to bins.
pub trait BinReader: Send + Sync {
    /// Non-deleted bins of a zone, ordered by address.
    fn list_by_zone(&self, zone_id: ZoneId) -> Result<Vec<Bin>, StoreError>;
}

/// Item occupancy, owned by the inventory subsystem. Read-only from here.
pub trait OccupancyLookup: Send + Sync {
    /// Occupancy keyed by normalized bin address. Bins missing from the map are empty.
    fn occupancy_by_bin_address(
        &self,
        zone_id: ZoneId,
    ) -> Result<HashMap<String, BinOccupancy>, StoreError>;
}

/// Mutations available while a zone is exclusively locked.
///
/// Nothing written through a transaction is visible to other readers until the
/// enclosing [`ZoneWriter::with_zone_locked`] closure returns `Ok`; on `Err`
/// every write is discarded.
pub trait ZoneTransaction {
    /// The locked zone, reflecting writes made so far in this transaction.
    fn zone(&self) -> &Zone;

    fn warehouse(&self) -> &Warehouse;

    /// Non-deleted bins of the locked zone, ordered by address.
    fn list_bins(&mut self) -> Result<Vec<Bin>, StoreError>;

    fn occupancy_by_bin_address(&mut self) -> Result<HashMap<String, BinOccupancy>, StoreError>;

    /// Inserts new bins. Fails with `Duplicate` if an address is already live.
    fn bulk_create(&mut self, bins: &[Bin]) -> Result<u64, StoreError>;

    /// Soft-deletes live bins by address.
    fn bulk_soft_delete(
        &mut self,
        addresses: &[String],
        deleted_at: DateTime<Utc>,
        guard: OccupancyGuard,
    ) -> Result<u64, StoreError>;

    /// Replaces the zone's structure, bumping its structure version.
    fn update_structure(
        &mut self,
        structure: &StructureSpec,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    fn update_layout(&mut self, layout: Layout) -> Result<(), StoreError>;

    fn clear_layout(&mut self) -> Result<(), StoreError>;
}

/// Write access: registration and the locked unit of work.
pub trait ZoneWriter: Send + Sync {
    /// Fails with `Duplicate` if the code is taken.
    fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<(), StoreError>;

    /// Atomically inserts a zone and its initial bins. Fails with `Duplicate` if
    /// the zone code is taken within its warehouse, `NotFound` if the warehouse
    /// does not exist.
    fn insert_zone(&self, zone: &Zone, bins: &[Bin]) -> Result<(), StoreError>;

    /// Runs `f` with the zone exclusively locked, committing its writes only if
    /// it returns `Ok`.
    ///
    /// Calls for the same zone are serialized; calls for different zones may
    /// run concurrently. Fails with `NotFound` (converted into `E`) if the zone
    /// does not exist.
    fn with_zone_locked<T, E, F>(&self, zone_id: ZoneId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ZoneTransaction) -> Result<T, E>,
        E: From<StoreError>;
}

/// Everything the structure service needs from storage.
pub trait ZoneStructureStore: ZoneReader + BinReader + OccupancyLookup + ZoneWriter {}

impl<T> ZoneStructureStore for T where T: ZoneReader + BinReader + OccupancyLookup + ZoneWriter {}

impl<S> ZoneReader for Arc<S>
where
    S: ZoneReader + ?Sized,
{
    fn get_warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        (**self).get_warehouse(warehouse_id)
    }

    fn get_zone(&self, zone_id: ZoneId) -> Result<Option<Zone>, StoreError> {
        (**self).get_zone(zone_id)
    }

    fn get_structure(&self, zone_id: ZoneId) -> Result<Option<StructureSpec>, StoreError> {
        (**self).get_structure(zone_id)
    }
}

impl<S> BinReader for Arc<S>
where
    S: BinReader + ?Sized,
{
    fn list_by_zone(&self, zone_id: ZoneId) -> Result<Vec<Bin>, StoreError> {
        (**self).list_by_zone(zone_id)
    }
}

impl<S> OccupancyLookup for Arc<S>
where
    S: OccupancyLookup + ?Sized,
{
    fn occupancy_by_bin_address(
        &self,
        zone_id: ZoneId,
    ) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        (**self).occupancy_by_bin_address(zone_id)
    }
}

impl<S> ZoneWriter for Arc<S>
where
    S: ZoneWriter,
{
    fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<(), StoreError> {
        (**self).insert_warehouse(warehouse)
    }

    fn insert_zone(&self, zone: &Zone, bins: &[Bin]) -> Result<(), StoreError> {
        (**self).insert_zone(zone, bins)
    }

    fn with_zone_locked<T, E, F>(&self, zone_id: ZoneId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ZoneTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).with_zone_locked(zone_id, f)
    }
}
