use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use slotforge_core::{BinId, Entity, ExpectedVersion, WarehouseId, ZoneId};
use slotforge_warehouse::{
    normalize_address, Bin, BinOccupancy, BlockedBin, Layout, StructureSpec, Warehouse, Zone,
};

use super::r#trait::{
    BinReader, OccupancyGuard, OccupancyLookup, StoreError, ZoneReader, ZoneTransaction,
    ZoneWriter,
};

#[derive(Debug, Default)]
struct State {
    warehouses: HashMap<WarehouseId, Warehouse>,
    zones: HashMap<ZoneId, Zone>,
    /// All bins per zone, soft-deleted ones included.
    bins: HashMap<ZoneId, Vec<Bin>>,
    /// Occupancy per bin record. A bin re-created at an old address is a new
    /// record and starts empty.
    occupancy: HashMap<BinId, BinOccupancy>,
}

impl State {
    /// Occupancy of the live bins in `bins`, keyed by normalized address.
    fn occupancy_by_address(&self, bins: &[Bin]) -> HashMap<String, BinOccupancy> {
        bins.iter()
            .filter(|b| !b.is_deleted())
            .filter_map(|b| {
                self.occupancy
                    .get(b.id())
                    .map(|o| (normalize_address(b.address()), *o))
            })
            .collect()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory zone store.
///
/// Intended for tests/dev. A locked unit of work operates on a private copy of
/// the zone and its bins and swaps it in on success, so a failed closure leaves
/// the store exactly as it was.
#[derive(Debug, Default)]
pub struct InMemoryZoneStore {
    state: RwLock<State>,
    zone_locks: Mutex<HashMap<ZoneId, Arc<Mutex<()>>>>,
}

impl InMemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the item count of the live bin at `address`, standing in for the
    /// inventory subsystem.
    pub fn set_occupancy(
        &self,
        zone_id: ZoneId,
        address: &str,
        item_count: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let wanted = normalize_address(address);
        let bin_id = state
            .bins
            .get(&zone_id)
            .and_then(|bins| {
                bins.iter()
                    .find(|b| !b.is_deleted() && normalize_address(b.address()) == wanted)
            })
            .map(|b| *b.id())
            .ok_or_else(|| StoreError::NotFound(format!("live bin {wanted} in zone {zone_id}")))?;
        state
            .occupancy
            .insert(bin_id, BinOccupancy::with_items(item_count));
        Ok(())
    }

    /// Number of bin records of a zone, soft-deleted ones included.
    pub fn count_all_bins(&self, zone_id: ZoneId) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.bins.get(&zone_id).map_or(0, Vec::len))
    }

    /// Number of live (non-deleted) bins of a zone.
    pub fn count_live_bins(&self, zone_id: ZoneId) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .bins
            .get(&zone_id)
            .map_or(0, |bins| bins.iter().filter(|b| !b.is_deleted()).count()))
    }

    fn zone_lock(&self, zone_id: ZoneId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.zone_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(zone_id).or_default().clone())
    }

    fn occupancy_of(&self, zone_id: ZoneId) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .bins
            .get(&zone_id)
            .map(|bins| state.occupancy_by_address(bins))
            .unwrap_or_default())
    }

    /// Occupancy of the given bin records, as currently recorded.
    fn occupancy_of_bins(&self, bins: &[Bin]) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.occupancy_by_address(bins))
    }
}

fn live_sorted(bins: &[Bin]) -> Vec<Bin> {
    let mut live: Vec<Bin> = bins.iter().filter(|b| !b.is_deleted()).cloned().collect();
    live.sort_by(|a, b| a.address().cmp(b.address()));
    live
}

impl ZoneReader for InMemoryZoneStore {
    fn get_warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.warehouses.get(&warehouse_id).cloned())
    }

    fn get_zone(&self, zone_id: ZoneId) -> Result<Option<Zone>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.zones.get(&zone_id).cloned())
    }
}

impl BinReader for InMemoryZoneStore {
    fn list_by_zone(&self, zone_id: ZoneId) -> Result<Vec<Bin>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .bins
            .get(&zone_id)
            .map(|bins| live_sorted(bins))
            .unwrap_or_default())
    }
}

impl OccupancyLookup for InMemoryZoneStore {
    fn occupancy_by_bin_address(
        &self,
        zone_id: ZoneId,
    ) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        self.occupancy_of(zone_id)
    }
}

impl ZoneWriter for InMemoryZoneStore {
    fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.warehouses.values().any(|w| w.code() == warehouse.code()) {
            return Err(StoreError::Duplicate(format!(
                "warehouse code {}",
                warehouse.code()
            )));
        }
        state.warehouses.insert(*warehouse.id(), warehouse.clone());
        Ok(())
    }

    fn insert_zone(&self, zone: &Zone, bins: &[Bin]) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.warehouses.contains_key(&zone.warehouse_id()) {
            return Err(StoreError::NotFound(format!(
                "warehouse {}",
                zone.warehouse_id()
            )));
        }
        if state
            .zones
            .values()
            .any(|z| z.warehouse_id() == zone.warehouse_id() && z.code() == zone.code())
        {
            return Err(StoreError::Duplicate(format!("zone code {}", zone.code())));
        }
        if state.zones.contains_key(zone.id()) {
            return Err(StoreError::Duplicate(format!("zone {}", zone.id())));
        }

        let mut seen = HashSet::with_capacity(bins.len());
        for bin in bins {
            if !seen.insert(normalize_address(bin.address())) {
                return Err(StoreError::Duplicate(format!("bin address {}", bin.address())));
            }
        }

        state.zones.insert(*zone.id(), zone.clone());
        state.bins.insert(*zone.id(), bins.to_vec());
        Ok(())
    }

    fn with_zone_locked<T, E, F>(&self, zone_id: ZoneId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ZoneTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let lock = self.zone_lock(zone_id)?;
        let _guard = lock.lock().map_err(|_| poisoned())?;

        let mut tx = {
            let state = self.state.read().map_err(|_| poisoned())?;
            let zone = state
                .zones
                .get(&zone_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("zone {zone_id}")))?;
            let warehouse = state
                .warehouses
                .get(&zone.warehouse_id())
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("warehouse {}", zone.warehouse_id())))?;
            InMemoryZoneTx {
                store: self,
                zone,
                warehouse,
                bins: state.bins.get(&zone_id).cloned().unwrap_or_default(),
            }
        };

        let result = f(&mut tx)?;

        // Commit: swap in the working copy. The zone lock is still held, so no
        // other unit of work has touched this zone's entries meanwhile.
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.zones.insert(zone_id, tx.zone);
        state.bins.insert(zone_id, tx.bins);
        Ok(result)
    }
}

/// Working copy of one zone during a locked unit of work.
struct InMemoryZoneTx<'a> {
    store: &'a InMemoryZoneStore,
    zone: Zone,
    warehouse: Warehouse,
    bins: Vec<Bin>,
}

impl ZoneTransaction for InMemoryZoneTx<'_> {
    fn zone(&self) -> &Zone {
        &self.zone
    }

    fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    fn list_bins(&mut self) -> Result<Vec<Bin>, StoreError> {
        Ok(live_sorted(&self.bins))
    }

    fn occupancy_by_bin_address(&mut self) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        self.store.occupancy_of_bins(&self.bins)
    }

    fn bulk_create(&mut self, bins: &[Bin]) -> Result<u64, StoreError> {
        let mut live: HashSet<String> = self
            .bins
            .iter()
            .filter(|b| !b.is_deleted())
            .map(|b| normalize_address(b.address()))
            .collect();
        for bin in bins {
            if bin.zone_id() != *self.zone.id() {
                return Err(StoreError::Backend(format!(
                    "bin {} belongs to zone {}, not {}",
                    bin.address(),
                    bin.zone_id(),
                    self.zone.id()
                )));
            }
            if !live.insert(normalize_address(bin.address())) {
                return Err(StoreError::Duplicate(format!("bin address {}", bin.address())));
            }
        }
        self.bins.extend_from_slice(bins);
        Ok(bins.len() as u64)
    }

    fn bulk_soft_delete(
        &mut self,
        addresses: &[String],
        deleted_at: DateTime<Utc>,
        guard: OccupancyGuard,
    ) -> Result<u64, StoreError> {
        if addresses.is_empty() {
            return Ok(0);
        }
        let targets: HashSet<String> = addresses.iter().map(|a| normalize_address(a)).collect();

        if guard == OccupancyGuard::RejectOccupied {
            let occupancy = self.store.occupancy_of_bins(&self.bins)?;
            let mut occupied: Vec<BlockedBin> = targets
                .iter()
                .filter_map(|address| {
                    occupancy
                        .get(address)
                        .filter(|o| o.has_items)
                        .map(|o| BlockedBin {
                            address: address.clone(),
                            item_count: o.item_count,
                        })
                })
                .collect();
            if !occupied.is_empty() {
                occupied.sort_by(|a, b| a.address.cmp(&b.address));
                return Err(StoreError::OccupiedBins(occupied));
            }
        }

        let mut deleted = 0u64;
        for bin in self.bins.iter_mut() {
            if !bin.is_deleted() && targets.contains(&normalize_address(bin.address())) {
                *bin = bin.soft_deleted(deleted_at);
                deleted += 1;
            }
        }
        if deleted != targets.len() as u64 {
            return Err(StoreError::NotFound(format!(
                "{} of {} bins to remove are not live",
                targets.len() as u64 - deleted,
                targets.len()
            )));
        }
        Ok(deleted)
    }

    fn update_structure(
        &mut self,
        structure: &StructureSpec,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let actual = self.zone.structure_version();
        if !expected.matches(actual) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {actual}"
            )));
        }
        self.zone = self.zone.with_structure(structure.clone());
        Ok(())
    }

    fn update_layout(&mut self, layout: Layout) -> Result<(), StoreError> {
        self.zone = self.zone.with_layout(layout);
        Ok(())
    }

    fn clear_layout(&mut self) -> Result<(), StoreError> {
        self.zone = self.zone.without_layout();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotforge_warehouse::{AddressCodec, BinSetGenerator};

    fn seeded() -> (InMemoryZoneStore, Zone) {
        let store = InMemoryZoneStore::new();
        let warehouse = Warehouse::new(WarehouseId::new(), "WH", "Main").unwrap();
        store.insert_warehouse(&warehouse).unwrap();

        let spec = StructureSpec::uniform(1, 1, 3).unwrap();
        let zone = Zone::new(ZoneId::new(), *warehouse.id(), "Z1", "Zone 1", spec.clone()).unwrap();
        let codec = AddressCodec::new("WH", "Z1", spec.code_pattern().clone());
        let bins: Vec<Bin> = BinSetGenerator::new(&spec, &codec)
            .generate()
            .iter()
            .map(|d| Bin::from_descriptor(BinId::new(), *zone.id(), d, Utc::now()))
            .collect();
        store.insert_zone(&zone, &bins).unwrap();
        (store, zone)
    }

    #[test]
    fn list_by_zone_skips_soft_deleted_bins() {
        let (store, zone) = seeded();
        store
            .with_zone_locked(*zone.id(), |tx| {
                tx.bulk_soft_delete(
                    &["WH-Z1-01-01-B".to_string()],
                    Utc::now(),
                    OccupancyGuard::RejectOccupied,
                )
            })
            .unwrap();

        let live: Vec<String> = store
            .list_by_zone(*zone.id())
            .unwrap()
            .iter()
            .map(|b| b.address().to_string())
            .collect();
        assert_eq!(live, vec!["WH-Z1-01-01-A", "WH-Z1-01-01-C"]);
        assert_eq!(store.count_all_bins(*zone.id()).unwrap(), 3);
    }

    #[test]
    fn failed_unit_of_work_discards_writes() {
        let (store, zone) = seeded();
        let result: Result<(), StoreError> = store.with_zone_locked(*zone.id(), |tx| {
            tx.bulk_soft_delete(
                &["WH-Z1-01-01-A".to_string()],
                Utc::now(),
                OccupancyGuard::RejectOccupied,
            )?;
            tx.clear_layout()?;
            Err(StoreError::Backend("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.count_live_bins(*zone.id()).unwrap(), 3);
    }

    #[test]
    fn guard_rejects_bins_that_became_occupied() {
        let (store, zone) = seeded();
        let result: Result<u64, StoreError> = store.with_zone_locked(*zone.id(), |tx| {
            // Stock arrives after the caller looked at occupancy.
            store.set_occupancy(*zone.id(), "wh-z1-01-01-c", 4)?;
            tx.bulk_soft_delete(
                &["WH-Z1-01-01-C".to_string()],
                Utc::now(),
                OccupancyGuard::RejectOccupied,
            )
        });
        match result {
            Err(StoreError::OccupiedBins(bins)) => {
                assert_eq!(bins.len(), 1);
                assert_eq!(bins[0].address, "WH-Z1-01-01-C");
                assert_eq!(bins[0].item_count, 4);
            }
            other => panic!("expected OccupiedBins, got {other:?}"),
        }
        assert_eq!(store.count_live_bins(*zone.id()).unwrap(), 3);
    }

    #[test]
    fn bulk_create_rejects_live_duplicates() {
        let (store, zone) = seeded();
        let existing = store.list_by_zone(*zone.id()).unwrap()[0].clone();
        let result: Result<u64, StoreError> = store.with_zone_locked(*zone.id(), |tx| {
            tx.bulk_create(&[existing.clone()])
        });
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn stale_structure_version_is_rejected() {
        let (store, zone) = seeded();
        let spec = StructureSpec::uniform(2, 1, 1).unwrap();
        let result: Result<(), StoreError> = store.with_zone_locked(*zone.id(), |tx| {
            tx.update_structure(&spec, ExpectedVersion::Exact(7))
        });
        assert!(matches!(result, Err(StoreError::Concurrency(_))));
        assert_eq!(store.get_zone(*zone.id()).unwrap().unwrap().structure_version(), 1);
    }

    #[test]
    fn unknown_zone_is_not_found() {
        let store = InMemoryZoneStore::new();
        let result: Result<(), StoreError> = store.with_zone_locked(ZoneId::new(), |_| Ok(()));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let (store, zone) = seeded();
        let other = Warehouse::new(WarehouseId::new(), "wh", "Other").unwrap();
        assert!(matches!(
            store.insert_warehouse(&other),
            Err(StoreError::Duplicate(_))
        ));

        let spec = StructureSpec::uniform(1, 1, 1).unwrap();
        let twin = Zone::new(ZoneId::new(), zone.warehouse_id(), "z1", "Twin", spec).unwrap();
        assert!(matches!(
            store.insert_zone(&twin, &[]),
            Err(StoreError::Duplicate(_))
        ));
    }
}
