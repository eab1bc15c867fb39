//! Warehouse, zone and bin records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use slotforge_core::{BinId, DomainError, DomainResult, Entity, WarehouseId, ZoneId};

use crate::generator::BinDescriptor;
use crate::structure::StructureSpec;

/// Longest accepted warehouse / zone code.
pub const MAX_CODE_LEN: usize = 16;

/// Validates a warehouse or zone code and returns its canonical (uppercase) form.
pub fn validate_code(field: &str, raw: &str) -> DomainResult<String> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(DomainError::field(field, "cannot be empty"));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(DomainError::field(
            field,
            format!("must be at most {MAX_CODE_LEN} characters"),
        ));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::field(field, "must be ASCII letters and digits only"));
    }
    Ok(code.to_ascii_uppercase())
}

fn validate_name(field: &str, raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::field(field, "cannot be empty"));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WarehouseRecord", into = "WarehouseRecord")]
pub struct Warehouse {
    id: WarehouseId,
    code: String,
    name: String,
}

impl Warehouse {
    pub fn new(id: WarehouseId, code: &str, name: &str) -> DomainResult<Self> {
        Ok(Self {
            id,
            code: validate_code("code", code)?,
            name: validate_name("name", name)?,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Wire form of [`Warehouse`]; decoding re-runs the constructor checks.
#[derive(Serialize, Deserialize)]
struct WarehouseRecord {
    id: WarehouseId,
    code: String,
    name: String,
}

impl TryFrom<WarehouseRecord> for Warehouse {
    type Error = DomainError;

    fn try_from(record: WarehouseRecord) -> Result<Self, Self::Error> {
        Self::new(record.id, &record.code, &record.name)
    }
}

impl From<Warehouse> for WarehouseRecord {
    fn from(warehouse: Warehouse) -> Self {
        Self {
            id: warehouse.id,
            code: warehouse.code,
            name: warehouse.name,
        }
    }
}

/// Opaque visual layout of a zone (UI canvas data). Never inspected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout(JsonValue);

impl Layout {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_json(self) -> JsonValue {
        self.0
    }
}

/// A zone of a warehouse with its current structure.
///
/// Updates go through `with_*` / `without_*` transformations that return a new
/// value. `structure_version` starts at 1 and grows by one per structure change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ZoneRecord", into = "ZoneRecord")]
pub struct Zone {
    id: ZoneId,
    warehouse_id: WarehouseId,
    code: String,
    name: String,
    structure: StructureSpec,
    layout: Option<Layout>,
    structure_version: u64,
}

impl Zone {
    pub fn new(
        id: ZoneId,
        warehouse_id: WarehouseId,
        code: &str,
        name: &str,
        structure: StructureSpec,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            warehouse_id,
            code: validate_code("code", code)?,
            name: validate_name("name", name)?,
            structure,
            layout: None,
            structure_version: 1,
        })
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure(&self) -> &StructureSpec {
        &self.structure
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    /// Replaces the structure wholesale and bumps the structure version.
    pub fn with_structure(&self, structure: StructureSpec) -> Self {
        Self {
            structure,
            structure_version: self.structure_version + 1,
            ..self.clone()
        }
    }

    pub fn with_layout(&self, layout: Layout) -> Self {
        Self {
            layout: Some(layout),
            ..self.clone()
        }
    }

    pub fn without_layout(&self) -> Self {
        Self {
            layout: None,
            ..self.clone()
        }
    }

    /// Restores a zone at a given version (store rehydration).
    pub fn restore(
        id: ZoneId,
        warehouse_id: WarehouseId,
        code: String,
        name: String,
        structure: StructureSpec,
        layout: Option<Layout>,
        structure_version: u64,
    ) -> Self {
        Self {
            id,
            warehouse_id,
            code,
            name,
            structure,
            layout,
            structure_version,
        }
    }
}

impl Entity for Zone {
    type Id = ZoneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Wire form of [`Zone`]; decoding validates code, name and version.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneRecord {
    id: ZoneId,
    warehouse_id: WarehouseId,
    code: String,
    name: String,
    structure: StructureSpec,
    #[serde(default)]
    layout: Option<Layout>,
    structure_version: u64,
}

impl TryFrom<ZoneRecord> for Zone {
    type Error = DomainError;

    fn try_from(record: ZoneRecord) -> Result<Self, Self::Error> {
        if record.structure_version == 0 {
            return Err(DomainError::field("structureVersion", "must be at least 1"));
        }
        let zone = Self::new(
            record.id,
            record.warehouse_id,
            &record.code,
            &record.name,
            record.structure,
        )?;
        Ok(Self {
            layout: record.layout,
            structure_version: record.structure_version,
            ..zone
        })
    }
}

impl From<Zone> for ZoneRecord {
    fn from(zone: Zone) -> Self {
        Self {
            id: zone.id,
            warehouse_id: zone.warehouse_id,
            code: zone.code,
            name: zone.name,
            structure: zone.structure,
            layout: zone.layout,
            structure_version: zone.structure_version,
        }
    }
}

/// Occupancy of one bin, as reported by the inventory subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinOccupancy {
    pub has_items: bool,
    pub item_count: u64,
}

impl BinOccupancy {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_items(item_count: u64) -> Self {
        Self {
            has_items: item_count > 0,
            item_count,
        }
    }
}

/// Plain field set of a [`Bin`], used by stores to rehydrate records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinParts {
    pub id: BinId,
    pub zone_id: ZoneId,
    pub address: String,
    pub aisle: u32,
    pub shelf: u32,
    pub position: u32,
    pub position_label: String,
    pub is_active: bool,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub capacity: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A persisted, addressable slot of a zone.
///
/// Bins are never physically deleted: removal sets `deleted_at`, so movement
/// history referencing an old bin stays resolvable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    id: BinId,
    zone_id: ZoneId,
    address: String,
    aisle: u32,
    shelf: u32,
    position: u32,
    position_label: String,
    is_active: bool,
    is_blocked: bool,
    block_reason: Option<String>,
    capacity: Option<u32>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Bin {
    /// A fresh bin (new identity) for a generated descriptor.
    pub fn from_descriptor(
        id: BinId,
        zone_id: ZoneId,
        descriptor: &BinDescriptor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            zone_id,
            address: descriptor.address.clone(),
            aisle: descriptor.aisle,
            shelf: descriptor.shelf,
            position: descriptor.position,
            position_label: descriptor.position_label.clone(),
            is_active: true,
            is_blocked: false,
            block_reason: None,
            capacity: None,
            created_at,
            deleted_at: None,
        }
    }

    pub fn restore(parts: BinParts) -> Self {
        Self {
            id: parts.id,
            zone_id: parts.zone_id,
            address: parts.address,
            aisle: parts.aisle,
            shelf: parts.shelf,
            position: parts.position,
            position_label: parts.position_label,
            is_active: parts.is_active,
            is_blocked: parts.is_blocked,
            block_reason: parts.block_reason,
            capacity: parts.capacity,
            created_at: parts.created_at,
            deleted_at: parts.deleted_at,
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn aisle(&self) -> u32 {
        self.aisle
    }

    pub fn shelf(&self) -> u32 {
        self.shelf
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn position_label(&self) -> &str {
        &self.position_label
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }

    pub fn capacity(&self) -> Option<u32> {
        self.capacity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn with_capacity(&self, capacity: Option<u32>) -> Self {
        Self {
            capacity,
            ..self.clone()
        }
    }

    pub fn blocked(&self, reason: impl Into<String>) -> Self {
        Self {
            is_blocked: true,
            block_reason: Some(reason.into()),
            ..self.clone()
        }
    }

    pub fn unblocked(&self) -> Self {
        Self {
            is_blocked: false,
            block_reason: None,
            ..self.clone()
        }
    }

    /// Marks the bin removed at `at`. Already-deleted bins keep their original timestamp.
    pub fn soft_deleted(&self, at: DateTime<Utc>) -> Self {
        Self {
            deleted_at: self.deleted_at.or(Some(at)),
            ..self.clone()
        }
    }
}

impl Entity for Bin {
    type Id = BinId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
