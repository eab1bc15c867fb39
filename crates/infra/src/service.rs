//! Zone structure orchestration: preview and apply of reconfigurations.
//!
//! ```text
//! StructureSpec (already validated by construction)
//!   ↓
//! size guard (closed-form count vs. max_bins_per_zone)
//!   ↓
//! BinSetGenerator (lazy) ──► ReconfigurationPlanner ◄── current bins + occupancy
//!   ↓
//! preview: counts + bounded sample, no writes
//! apply:   one locked unit of work: create, soft-delete, replace structure,
//!          clear layout if the topology changed
//! ```
//!
//! The service holds no state of its own besides configuration; everything it
//! reads or writes goes through the injected [`ZoneStructureStore`].

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, debug, info, instrument, warn};

use slotforge_core::{BinId, DomainError, Entity, ExpectedVersion, WarehouseId, ZoneId};
use slotforge_warehouse::{
    AddressCodec, Bin, BinDescriptor, BinOccupancy, BinSetGenerator, BlockedBin, CurrentBin,
    Layout, ReconfigurationPlanner, StructureSpec, StructureTotals, Warehouse, Zone,
    normalize_address,
};

use crate::config::EngineConfig;
use crate::store::r#trait::describe_blocked;
use crate::store::{OccupancyGuard, StoreError, ZoneStructureStore, ZoneTransaction};

#[derive(Debug, Error)]
pub enum StructureServiceError {
    /// Input rejected before any generation or write.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Removing these bins would discard items; retry with `force_delete_bins`
    /// or empty them first.
    #[error("apply blocked by occupied bins: {}", describe_blocked(.bins))]
    Blocked { bins: Vec<BlockedBin> },

    /// Stale expected version or a uniqueness clash (codes, live addresses).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Should be impossible (e.g. an address collision in a generated set).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for StructureServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => StructureServiceError::Validation(msg),
            DomainError::InvalidId(msg) => StructureServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => StructureServiceError::InvariantViolation(msg),
            DomainError::NotFound(msg) => StructureServiceError::NotFound(msg),
            DomainError::Conflict(msg) => StructureServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for StructureServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => StructureServiceError::Conflict(msg),
            StoreError::Duplicate(msg) => StructureServiceError::Conflict(msg),
            StoreError::NotFound(msg) => StructureServiceError::NotFound(msg),
            StoreError::OccupiedBins(bins) => StructureServiceError::Blocked { bins },
            other @ StoreError::Backend(_) => StructureServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, StructureServiceError>;

/// Options for [`ZoneStructureService::apply_structure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOptions {
    /// Remove bins even if they hold items.
    #[serde(default)]
    pub force_delete_bins: bool,
    /// Structure version the caller planned against (usually from a preview).
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl ApplyOptions {
    pub fn forced() -> Self {
        Self {
            force_delete_bins: true,
            ..Self::default()
        }
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Read-only outcome of planning a reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructurePreview {
    pub zone_id: ZoneId,
    /// Version of the structure the plan was computed against.
    pub structure_version: u64,
    pub total_aisles: u32,
    pub total_shelves: u64,
    pub total_bins: u64,
    /// First bins of the proposed structure, in generation order.
    pub sample_bins: Vec<BinDescriptor>,
    pub preserve_count: u64,
    pub create_count: u64,
    pub remove_count: u64,
    pub blocked_bins: Vec<BlockedBin>,
    /// Whether applying would clear the zone's layout.
    pub layout_reset: bool,
}

impl StructurePreview {
    pub fn is_blocked(&self) -> bool {
        !self.blocked_bins.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureApplied {
    /// The zone after the apply: new structure, bumped version, possibly no layout.
    pub zone: Zone,
    pub bins_created: u64,
    pub bins_removed: u64,
    pub bins_preserved: u64,
    pub layout_cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCreated {
    pub zone: Zone,
    pub bins_created: u64,
}

/// Orchestrates zone registration, structure preview and structure apply.
///
/// Preview only reads and can run concurrently with anything. Apply runs inside
/// [`ZoneWriter::with_zone_locked`](crate::store::ZoneWriter::with_zone_locked),
/// so applies against one zone are serialized and all-or-nothing.
#[derive(Debug)]
pub struct ZoneStructureService<S> {
    store: S,
    config: EngineConfig,
}

impl<S> ZoneStructureService<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S> ZoneStructureService<S>
where
    S: ZoneStructureStore,
{
    #[instrument(skip(self), err)]
    pub fn create_warehouse(&self, code: &str, name: &str) -> ServiceResult<Warehouse> {
        let warehouse = Warehouse::new(WarehouseId::new(), code, name)?;
        self.store.insert_warehouse(&warehouse)?;
        info!(warehouse_id = %warehouse.id(), code = warehouse.code(), "warehouse created");
        Ok(warehouse)
    }

    /// Registers a zone and persists its full initial bin set atomically.
    #[instrument(skip(self, structure), fields(warehouse_id = %warehouse_id), err)]
    pub fn create_zone(
        &self,
        warehouse_id: WarehouseId,
        code: &str,
        name: &str,
        structure: StructureSpec,
    ) -> ServiceResult<ZoneCreated> {
        let warehouse = self
            .store
            .get_warehouse(warehouse_id)?
            .ok_or_else(|| StructureServiceError::NotFound(format!("warehouse {warehouse_id}")))?;
        self.checked_totals(&structure)?;

        let zone = Zone::new(ZoneId::new(), warehouse_id, code, name, structure)?;
        let codec = codec_for(&warehouse, &zone, zone.structure());
        let now = Utc::now();
        let bins: Vec<Bin> = BinSetGenerator::new(zone.structure(), &codec)
            .generate_unique()?
            .iter()
            .map(|d| Bin::from_descriptor(BinId::new(), *zone.id(), d, now))
            .collect();

        self.store.insert_zone(&zone, &bins)?;
        info!(zone_id = %zone.id(), code = zone.code(), bins = bins.len(), "zone created");
        Ok(ZoneCreated {
            bins_created: bins.len() as u64,
            zone,
        })
    }

    pub fn get_zone(&self, zone_id: ZoneId) -> ServiceResult<Zone> {
        self.store
            .get_zone(zone_id)?
            .ok_or_else(|| zone_not_found(zone_id))
    }

    pub fn get_structure(&self, zone_id: ZoneId) -> ServiceResult<StructureSpec> {
        self.store
            .get_structure(zone_id)?
            .ok_or_else(|| zone_not_found(zone_id))
    }

    /// Live bins of a zone, ordered by address.
    pub fn list_bins(&self, zone_id: ZoneId) -> ServiceResult<Vec<Bin>> {
        self.get_zone(zone_id)?;
        Ok(self.store.list_by_zone(zone_id)?)
    }

    /// Plans a reconfiguration without writing anything.
    ///
    /// The proposed bin set is streamed through the planner; only
    /// `preview_sample_size` descriptors are materialized.
    #[instrument(
        skip(self, proposed),
        fields(
            zone_id = %zone_id,
            total_bins = tracing::field::Empty,
            remove_count = tracing::field::Empty
        ),
        err
    )]
    pub fn preview_reconfiguration(
        &self,
        zone_id: ZoneId,
        proposed: &StructureSpec,
    ) -> ServiceResult<StructurePreview> {
        let totals = self.checked_totals(proposed)?;
        let zone = self.get_zone(zone_id)?;
        let warehouse = self.store.get_warehouse(zone.warehouse_id())?.ok_or_else(|| {
            StructureServiceError::NotFound(format!("warehouse {}", zone.warehouse_id()))
        })?;

        let bins = self.store.list_by_zone(zone_id)?;
        let occupancy = self.store.occupancy_by_bin_address(zone_id)?;
        let current = current_bins(&bins, &occupancy);

        let codec = codec_for(&warehouse, &zone, proposed);
        let generator = BinSetGenerator::new(proposed, &codec);
        let summary = ReconfigurationPlanner::summarize(current, generator.iter())?;

        let span = Span::current();
        span.record("total_bins", totals.total_bins);
        span.record("remove_count", summary.remove_count);

        Ok(StructurePreview {
            zone_id,
            structure_version: zone.structure_version(),
            total_aisles: totals.total_aisles,
            total_shelves: totals.total_shelves,
            total_bins: totals.total_bins,
            sample_bins: generator.sample(self.config.preview_sample_size),
            preserve_count: summary.preserve_count,
            create_count: summary.create_count,
            remove_count: summary.remove_count,
            blocked_bins: summary.blocked_bins,
            layout_reset: !zone.structure().same_topology(proposed),
        })
    }

    /// Replaces the zone's structure and reconciles its bins, all or nothing.
    ///
    /// Fails with [`StructureServiceError::Blocked`] if a bin to remove holds
    /// items and `force_delete_bins` is off, including bins that became occupied
    /// after the plan was computed.
    #[instrument(
        skip(self, structure),
        fields(
            zone_id = %zone_id,
            force = options.force_delete_bins,
            expected_version = ?options.expected_version,
            created = tracing::field::Empty,
            removed = tracing::field::Empty
        ),
        err
    )]
    pub fn apply_structure(
        &self,
        zone_id: ZoneId,
        structure: StructureSpec,
        options: ApplyOptions,
    ) -> ServiceResult<StructureApplied> {
        let totals = self.checked_totals(&structure)?;
        let expected = ExpectedVersion::from(options.expected_version);

        let applied = self.store.with_zone_locked(zone_id, |tx| {
            apply_locked(tx, &structure, expected, options.force_delete_bins)
        })?;

        let span = Span::current();
        span.record("created", applied.bins_created);
        span.record("removed", applied.bins_removed);
        info!(
            zone_id = %zone_id,
            structure_version = applied.zone.structure_version(),
            total_bins = totals.total_bins,
            created = applied.bins_created,
            removed = applied.bins_removed,
            preserved = applied.bins_preserved,
            layout_cleared = applied.layout_cleared,
            "structure applied"
        );
        Ok(applied)
    }

    /// Stores the zone's opaque layout verbatim.
    #[instrument(skip(self, layout), fields(zone_id = %zone_id), err)]
    pub fn update_layout(&self, zone_id: ZoneId, layout: Layout) -> ServiceResult<Zone> {
        self.store
            .with_zone_locked(zone_id, |tx| -> ServiceResult<Zone> {
                tx.update_layout(layout)?;
                Ok(tx.zone().clone())
            })
    }

    fn checked_totals(&self, structure: &StructureSpec) -> ServiceResult<StructureTotals> {
        let totals = BinSetGenerator::totals(structure)?;
        if totals.total_bins > self.config.max_bins_per_zone {
            return Err(DomainError::field(
                "totalBins",
                format!(
                    "{} bins exceeds the maximum of {} per zone",
                    totals.total_bins, self.config.max_bins_per_zone
                ),
            )
            .into());
        }
        Ok(totals)
    }
}

/// Diff-and-persist sequence, run with the zone locked.
fn apply_locked(
    tx: &mut dyn ZoneTransaction,
    structure: &StructureSpec,
    expected: ExpectedVersion,
    force: bool,
) -> ServiceResult<StructureApplied> {
    let zone = tx.zone().clone();
    expected.check(zone.structure_version())?;

    let bins = tx.list_bins()?;
    let occupancy = tx.occupancy_by_bin_address()?;
    let codec = codec_for(tx.warehouse(), &zone, structure);
    let plan = ReconfigurationPlanner::plan(
        current_bins(&bins, &occupancy),
        BinSetGenerator::new(structure, &codec).iter(),
    )?;

    if plan.is_blocked() {
        let blocked = plan.blocked_bins();
        if !force {
            warn!(zone_id = %zone.id(), blocked = blocked.len(), "apply blocked by occupied bins");
            return Err(StructureServiceError::Blocked { bins: blocked });
        }
        let items: u64 = blocked.iter().map(|b| b.item_count).sum();
        warn!(
            zone_id = %zone.id(),
            bins = blocked.len(),
            items,
            "forced removal of occupied bins"
        );
    }

    let now = Utc::now();
    let new_bins: Vec<Bin> = plan
        .create()
        .iter()
        .map(|d| Bin::from_descriptor(BinId::new(), *zone.id(), d, now))
        .collect();
    let bins_created = tx.bulk_create(&new_bins)?;

    let guard = if force {
        OccupancyGuard::AllowOccupied
    } else {
        OccupancyGuard::RejectOccupied
    };
    let bins_removed = tx.bulk_soft_delete(&plan.removal_addresses(), now, guard)?;

    tx.update_structure(structure, expected)?;

    let layout_cleared = !zone.structure().same_topology(structure);
    if layout_cleared {
        debug!(zone_id = %zone.id(), "topology changed, clearing layout");
        tx.clear_layout()?;
    }

    Ok(StructureApplied {
        zone: tx.zone().clone(),
        bins_created,
        bins_removed,
        bins_preserved: plan.preserve().len() as u64,
        layout_cleared,
    })
}

fn codec_for(warehouse: &Warehouse, zone: &Zone, structure: &StructureSpec) -> AddressCodec {
    AddressCodec::new(
        warehouse.code(),
        zone.code(),
        structure.code_pattern().clone(),
    )
}

fn current_bins(
    bins: &[Bin],
    occupancy: &HashMap<String, BinOccupancy>,
) -> Vec<CurrentBin> {
    bins.iter()
        .map(|bin| {
            let occ = occupancy
                .get(&normalize_address(bin.address()))
                .copied()
                .unwrap_or_default();
            CurrentBin::new(bin.address(), occ)
        })
        .collect()
}

fn zone_not_found(zone_id: ZoneId) -> StructureServiceError {
    StructureServiceError::NotFound(format!("zone {zone_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_service_categories() {
        let blocked = vec![BlockedBin {
            address: "WH-Z1-01-01-A".to_string(),
            item_count: 3,
        }];
        assert!(matches!(
            StructureServiceError::from(StoreError::OccupiedBins(blocked.clone())),
            StructureServiceError::Blocked { bins } if bins == blocked
        ));
        assert!(matches!(
            StructureServiceError::from(StoreError::Concurrency("v".into())),
            StructureServiceError::Conflict(_)
        ));
        assert!(matches!(
            StructureServiceError::from(StoreError::Duplicate("code".into())),
            StructureServiceError::Conflict(_)
        ));
        assert!(matches!(
            StructureServiceError::from(StoreError::Backend("io".into())),
            StructureServiceError::Store(StoreError::Backend(_))
        ));
    }

    #[test]
    fn domain_errors_map_to_service_categories() {
        assert!(matches!(
            StructureServiceError::from(DomainError::field("aisles", "must be at least 1")),
            StructureServiceError::Validation(msg) if msg.starts_with("aisles")
        ));
        assert!(matches!(
            StructureServiceError::from(DomainError::invariant("collision")),
            StructureServiceError::InvariantViolation(_)
        ));
    }

    #[test]
    fn blocked_error_lists_every_bin() {
        let err = StructureServiceError::Blocked {
            bins: vec![
                BlockedBin {
                    address: "A".to_string(),
                    item_count: 1,
                },
                BlockedBin {
                    address: "B".to_string(),
                    item_count: 12,
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("A (1 items)"));
        assert!(text.contains("B (12 items)"));
    }

    #[test]
    fn apply_options_deserialize_with_defaults() {
        let options: ApplyOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ApplyOptions::default());
        let options: ApplyOptions =
            serde_json::from_str(r#"{"forceDeleteBins":true,"expectedVersion":3}"#).unwrap();
        assert_eq!(options, ApplyOptions::forced().expecting(3));
    }
}
