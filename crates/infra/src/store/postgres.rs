//! Postgres-backed zone store.
//!
//! ## Locking
//!
//! [`ZoneWriter::with_zone_locked`] opens a transaction and locks the zone row
//! with `SELECT ... FOR UPDATE`. Every write issued through the
//! [`ZoneTransaction`] handed to the closure runs inside that transaction, which
//! is committed only when the closure returns `Ok`. Concurrent applies against
//! the same zone therefore queue on the row lock.
//!
//! ## Bulk statements
//!
//! Bin inserts use `INSERT ... SELECT FROM UNNEST(...)` and soft deletes use
//! `upper(btrim(address)) = ANY($n)`, both chunked by `bulk_chunk_size`, so a
//! structure with tens of thousands of bins costs a handful of round trips.
//! Addresses are matched in normalized form, like the planner compares them.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! ## Runtime
//!
//! The store traits are synchronous; calls are driven through the current tokio
//! runtime handle, so they must be made from a context where blocking on that
//! handle is allowed (e.g. `spawn_blocking`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{Span, debug, instrument, warn};

use slotforge_core::{BinId, Entity, ExpectedVersion, WarehouseId, ZoneId};
use slotforge_warehouse::{
    Bin, BinOccupancy, BinParts, BlockedBin, Layout, StructureSpec, Warehouse, Zone,
    normalize_address,
};

use crate::config::{DATABASE_URL_VAR, DEFAULT_BULK_CHUNK_SIZE, EngineConfig};

use super::r#trait::{
    BinReader, OccupancyGuard, OccupancyLookup, StoreError, ZoneReader, ZoneTransaction,
    ZoneWriter,
};

/// Schema for the tables this store reads and writes.
pub const SCHEMA: &str = include_str!("../../migrations/0001_zone_structure.sql");

/// Postgres-backed zone/bin store.
#[derive(Debug, Clone)]
pub struct PostgresZoneStore {
    pool: Arc<PgPool>,
    chunk_size: usize,
}

impl PostgresZoneStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            chunk_size: DEFAULT_BULK_CHUNK_SIZE,
        }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Connects to `config.database_url` and applies `config.bulk_chunk_size`.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, StoreError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::Backend(format!("{DATABASE_URL_VAR} is not set"))
        })?;
        let store = Self::connect(url).await?;
        Ok(store.with_chunk_size(config.bulk_chunk_size))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Rows per bulk statement. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Creates the tables if they don't exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(warehouse_id = %warehouse_id), err)]
    pub async fn load_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Option<Warehouse>, StoreError> {
        fetch_warehouse(&*self.pool, warehouse_id).await
    }

    #[instrument(skip(self), fields(zone_id = %zone_id), err)]
    pub async fn load_zone(&self, zone_id: ZoneId) -> Result<Option<Zone>, StoreError> {
        fetch_zone(&*self.pool, zone_id, false).await
    }

    #[instrument(skip(self), fields(zone_id = %zone_id, bin_count = tracing::field::Empty), err)]
    pub async fn load_bins(&self, zone_id: ZoneId) -> Result<Vec<Bin>, StoreError> {
        let bins = fetch_live_bins(&*self.pool, zone_id).await?;
        Span::current().record("bin_count", bins.len());
        Ok(bins)
    }

    #[instrument(skip(self), fields(zone_id = %zone_id), err)]
    pub async fn load_occupancy(
        &self,
        zone_id: ZoneId,
    ) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        fetch_occupancy(&*self.pool, zone_id).await
    }

    #[instrument(skip(self, warehouse), fields(warehouse_id = %warehouse.id()), err)]
    pub async fn save_warehouse(&self, warehouse: &Warehouse) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO warehouses (id, code, name) VALUES ($1, $2, $3)")
            .bind(warehouse.id().as_uuid())
            .bind(warehouse.code())
            .bind(warehouse.name())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_warehouse", e))?;
        Ok(())
    }

    /// Inserts a zone and its initial bins in one transaction.
    #[instrument(
        skip(self, zone, bins),
        fields(zone_id = %zone.id(), bin_count = bins.len()),
        err
    )]
    pub async fn save_zone(&self, zone: &Zone, bins: &[Bin]) -> Result<(), StoreError> {
        let structure = structure_json(zone.structure())?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO zones (id, warehouse_id, code, name, structure, layout, structure_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(zone.id().as_uuid())
        .bind(zone.warehouse_id().as_uuid())
        .bind(zone.code())
        .bind(zone.name())
        .bind(&structure)
        .bind(zone.layout().map(Layout::as_json))
        .bind(version_to_db(zone.structure_version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_zone", e))?;

        insert_bins(&mut tx, *zone.id(), bins, self.chunk_size).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

fn runtime() -> Result<Handle, StoreError> {
    Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresZoneStore requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
        )
    })
}

impl ZoneReader for PostgresZoneStore {
    fn get_warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        runtime()?.block_on(self.load_warehouse(warehouse_id))
    }

    fn get_zone(&self, zone_id: ZoneId) -> Result<Option<Zone>, StoreError> {
        runtime()?.block_on(self.load_zone(zone_id))
    }
}

impl BinReader for PostgresZoneStore {
    fn list_by_zone(&self, zone_id: ZoneId) -> Result<Vec<Bin>, StoreError> {
        runtime()?.block_on(self.load_bins(zone_id))
    }
}

impl OccupancyLookup for PostgresZoneStore {
    fn occupancy_by_bin_address(
        &self,
        zone_id: ZoneId,
    ) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        runtime()?.block_on(self.load_occupancy(zone_id))
    }
}

impl ZoneWriter for PostgresZoneStore {
    fn insert_warehouse(&self, warehouse: &Warehouse) -> Result<(), StoreError> {
        runtime()?.block_on(self.save_warehouse(warehouse))
    }

    fn insert_zone(&self, zone: &Zone, bins: &[Bin]) -> Result<(), StoreError> {
        runtime()?.block_on(self.save_zone(zone, bins))
    }

    fn with_zone_locked<T, E, F>(&self, zone_id: ZoneId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ZoneTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let handle = runtime()?;
        let mut tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let zone = handle
            .block_on(fetch_zone(&mut *tx, zone_id, true))?
            .ok_or_else(|| StoreError::NotFound(format!("zone {zone_id}")))?;
        let warehouse = handle
            .block_on(fetch_warehouse(&mut *tx, zone.warehouse_id()))?
            .ok_or_else(|| StoreError::NotFound(format!("warehouse {}", zone.warehouse_id())))?;

        let mut unit = PgZoneTx {
            handle: handle.clone(),
            tx,
            zone,
            warehouse,
            chunk_size: self.chunk_size,
        };

        match f(&mut unit) {
            Ok(value) => {
                handle
                    .block_on(unit.tx.commit())
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = handle.block_on(unit.tx.rollback()) {
                    warn!(zone_id = %zone_id, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Open transaction holding the zone row lock.
struct PgZoneTx {
    handle: Handle,
    tx: Transaction<'static, Postgres>,
    zone: Zone,
    warehouse: Warehouse,
    chunk_size: usize,
}

impl ZoneTransaction for PgZoneTx {
    fn zone(&self) -> &Zone {
        &self.zone
    }

    fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    fn list_bins(&mut self) -> Result<Vec<Bin>, StoreError> {
        let zone_id = *self.zone.id();
        self.handle.block_on(fetch_live_bins(&mut *self.tx, zone_id))
    }

    fn occupancy_by_bin_address(&mut self) -> Result<HashMap<String, BinOccupancy>, StoreError> {
        let zone_id = *self.zone.id();
        self.handle.block_on(fetch_occupancy(&mut *self.tx, zone_id))
    }

    fn bulk_create(&mut self, bins: &[Bin]) -> Result<u64, StoreError> {
        let zone_id = *self.zone.id();
        self.handle
            .block_on(insert_bins(&mut self.tx, zone_id, bins, self.chunk_size))
    }

    fn bulk_soft_delete(
        &mut self,
        addresses: &[String],
        deleted_at: DateTime<Utc>,
        guard: OccupancyGuard,
    ) -> Result<u64, StoreError> {
        let zone_id = *self.zone.id();
        self.handle.block_on(soft_delete_bins(
            &mut self.tx,
            zone_id,
            addresses,
            deleted_at,
            guard,
            self.chunk_size,
        ))
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
        let json = structure_json(structure)?;
        let zone_id = *self.zone.id();
        let version = version_to_db(actual)?;

        let result = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    UPDATE zones
                    SET structure = $2, structure_version = structure_version + 1
                    WHERE id = $1 AND structure_version = $3
                    "#,
                )
                .bind(zone_id.as_uuid())
                .bind(&json)
                .bind(version)
                .execute(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("update_structure", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Concurrency(format!(
                "zone {zone_id} changed while locked (expected version {actual})"
            )));
        }
        self.zone = self.zone.with_structure(structure.clone());
        Ok(())
    }

    fn update_layout(&mut self, layout: Layout) -> Result<(), StoreError> {
        let zone_id = *self.zone.id();
        self.handle
            .block_on(
                sqlx::query("UPDATE zones SET layout = $2 WHERE id = $1")
                    .bind(zone_id.as_uuid())
                    .bind(layout.as_json())
                    .execute(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("update_layout", e))?;
        self.zone = self.zone.with_layout(layout);
        Ok(())
    }

    fn clear_layout(&mut self) -> Result<(), StoreError> {
        let zone_id = *self.zone.id();
        self.handle
            .block_on(
                sqlx::query("UPDATE zones SET layout = NULL WHERE id = $1")
                    .bind(zone_id.as_uuid())
                    .execute(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("clear_layout", e))?;
        self.zone = self.zone.without_layout();
        Ok(())
    }
}

async fn fetch_warehouse<'e, X>(
    executor: X,
    warehouse_id: WarehouseId,
) -> Result<Option<Warehouse>, StoreError>
where
    X: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query("SELECT id, code, name FROM warehouses WHERE id = $1")
        .bind(warehouse_id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error("fetch_warehouse", e))?;

    row.map(|row| {
        let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
        let code: String = row.try_get("code").map_err(row_error)?;
        let name: String = row.try_get("name").map_err(row_error)?;
        Warehouse::new(WarehouseId::from_uuid(id), &code, &name)
            .map_err(|e| StoreError::Backend(format!("invalid warehouse row: {e}")))
    })
    .transpose()
}

async fn fetch_zone<'e, X>(
    executor: X,
    zone_id: ZoneId,
    for_update: bool,
) -> Result<Option<Zone>, StoreError>
where
    X: Executor<'e, Database = Postgres>,
{
    let sql = if for_update {
        r#"
        SELECT id, warehouse_id, code, name, structure, layout, structure_version
        FROM zones
        WHERE id = $1
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, warehouse_id, code, name, structure, layout, structure_version
        FROM zones
        WHERE id = $1
        "#
    };

    let row = sqlx::query(sql)
        .bind(zone_id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error("fetch_zone", e))?;

    row.as_ref().map(zone_from_row).transpose()
}

async fn fetch_live_bins<'e, X>(executor: X, zone_id: ZoneId) -> Result<Vec<Bin>, StoreError>
where
    X: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT
            id, zone_id, address, aisle, shelf, position, position_label,
            is_active, is_blocked, block_reason, capacity, created_at, deleted_at
        FROM bins
        WHERE zone_id = $1 AND deleted_at IS NULL
        ORDER BY address ASC
        "#,
    )
    .bind(zone_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("fetch_live_bins", e))?;

    rows.iter().map(bin_from_row).collect()
}

async fn fetch_occupancy<'e, X>(
    executor: X,
    zone_id: ZoneId,
) -> Result<HashMap<String, BinOccupancy>, StoreError>
where
    X: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT b.address, s.item_count
        FROM bins b
        JOIN bin_stock s ON s.bin_id = b.id
        WHERE b.zone_id = $1 AND b.deleted_at IS NULL
        "#,
    )
    .bind(zone_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("fetch_occupancy", e))?;

    let mut occupancy = HashMap::with_capacity(rows.len());
    for row in rows {
        let address: String = row.try_get("address").map_err(row_error)?;
        let count: i64 = row.try_get("item_count").map_err(row_error)?;
        let count = u64::try_from(count)
            .map_err(|_| StoreError::Backend(format!("negative item count for {address}")))?;
        occupancy.insert(normalize_address(&address), BinOccupancy::with_items(count));
    }
    Ok(occupancy)
}

async fn insert_bins(
    tx: &mut Transaction<'static, Postgres>,
    zone_id: ZoneId,
    bins: &[Bin],
    chunk_size: usize,
) -> Result<u64, StoreError> {
    let mut inserted = 0u64;
    for chunk in bins.chunks(chunk_size.max(1)) {
        let mut ids = Vec::with_capacity(chunk.len());
        let mut addresses = Vec::with_capacity(chunk.len());
        let mut aisles = Vec::with_capacity(chunk.len());
        let mut shelves = Vec::with_capacity(chunk.len());
        let mut positions = Vec::with_capacity(chunk.len());
        let mut labels = Vec::with_capacity(chunk.len());
        let mut active = Vec::with_capacity(chunk.len());
        let mut blocked = Vec::with_capacity(chunk.len());
        let mut reasons = Vec::with_capacity(chunk.len());
        let mut capacities = Vec::with_capacity(chunk.len());
        let mut created = Vec::with_capacity(chunk.len());

        for bin in chunk {
            if bin.zone_id() != zone_id {
                return Err(StoreError::Backend(format!(
                    "bin {} belongs to zone {}, not {zone_id}",
                    bin.address(),
                    bin.zone_id()
                )));
            }
            ids.push(*bin.id().as_uuid());
            addresses.push(bin.address().to_string());
            aisles.push(to_db_int("aisle", bin.aisle())?);
            shelves.push(to_db_int("shelf", bin.shelf())?);
            positions.push(to_db_int("position", bin.position())?);
            labels.push(bin.position_label().to_string());
            active.push(bin.is_active());
            blocked.push(bin.is_blocked());
            reasons.push(bin.block_reason().map(str::to_string));
            capacities.push(bin.capacity().map(|c| to_db_int("capacity", c)).transpose()?);
            created.push(bin.created_at());
        }

        let result = sqlx::query(
            r#"
            INSERT INTO bins (
                id, zone_id, address, aisle, shelf, position, position_label,
                is_active, is_blocked, block_reason, capacity, created_at
            )
            SELECT
                u.id, $1, u.address, u.aisle, u.shelf, u.position, u.position_label,
                u.is_active, u.is_blocked, u.block_reason, u.capacity, u.created_at
            FROM UNNEST(
                $2::uuid[], $3::text[], $4::int4[], $5::int4[], $6::int4[], $7::text[],
                $8::bool[], $9::bool[], $10::text[], $11::int4[], $12::timestamptz[]
            ) AS u(
                id, address, aisle, shelf, position, position_label,
                is_active, is_blocked, block_reason, capacity, created_at
            )
            "#,
        )
        .bind(zone_id.as_uuid())
        .bind(&ids)
        .bind(&addresses)
        .bind(&aisles)
        .bind(&shelves)
        .bind(&positions)
        .bind(&labels)
        .bind(&active)
        .bind(&blocked)
        .bind(&reasons)
        .bind(&capacities)
        .bind(&created)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("bulk_create_bins", e))?;

        inserted += result.rows_affected();
    }
    debug!(zone_id = %zone_id, inserted, "bins inserted");
    Ok(inserted)
}

async fn soft_delete_bins(
    tx: &mut Transaction<'static, Postgres>,
    zone_id: ZoneId,
    addresses: &[String],
    deleted_at: DateTime<Utc>,
    guard: OccupancyGuard,
    chunk_size: usize,
) -> Result<u64, StoreError> {
    let targets: Vec<String> = addresses
        .iter()
        .map(|a| normalize_address(a))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if targets.is_empty() {
        return Ok(0);
    }

    if guard == OccupancyGuard::RejectOccupied {
        let mut occupied = Vec::new();
        for chunk in targets.chunks(chunk_size.max(1)) {
            let rows = sqlx::query(
                r#"
                SELECT upper(btrim(b.address)) AS address, s.item_count
                FROM bins b
                JOIN bin_stock s ON s.bin_id = b.id
                WHERE b.zone_id = $1
                  AND b.deleted_at IS NULL
                  AND upper(btrim(b.address)) = ANY($2)
                  AND s.item_count > 0
                FOR SHARE OF s
                "#,
            )
            .bind(zone_id.as_uuid())
            .bind(chunk)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("check_occupancy", e))?;

            for row in rows {
                let address: String = row.try_get("address").map_err(row_error)?;
                let count: i64 = row.try_get("item_count").map_err(row_error)?;
                occupied.push(BlockedBin {
                    address,
                    item_count: u64::try_from(count).unwrap_or_default(),
                });
            }
        }
        if !occupied.is_empty() {
            occupied.sort_by(|a, b| a.address.cmp(&b.address));
            return Err(StoreError::OccupiedBins(occupied));
        }
    }

    let mut deleted = 0u64;
    for chunk in targets.chunks(chunk_size.max(1)) {
        let result = sqlx::query(
            r#"
            UPDATE bins
            SET deleted_at = $3
            WHERE zone_id = $1 AND deleted_at IS NULL AND upper(btrim(address)) = ANY($2)
            "#,
        )
        .bind(zone_id.as_uuid())
        .bind(chunk)
        .bind(deleted_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("bulk_soft_delete_bins", e))?;
        deleted += result.rows_affected();
    }

    let expected = targets.len() as u64;
    if deleted != expected {
        return Err(StoreError::NotFound(format!(
            "{} of {expected} bins to remove are not live",
            expected - deleted
        )));
    }
    debug!(zone_id = %zone_id, deleted, "bins soft-deleted");
    Ok(deleted)
}

fn zone_from_row(row: &PgRow) -> Result<Zone, StoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
    let warehouse_id: uuid::Uuid = row.try_get("warehouse_id").map_err(row_error)?;
    let structure: JsonValue = row.try_get("structure").map_err(row_error)?;
    let layout: Option<JsonValue> = row.try_get("layout").map_err(row_error)?;
    let version: i64 = row.try_get("structure_version").map_err(row_error)?;

    let structure: StructureSpec = serde_json::from_value(structure)
        .map_err(|e| StoreError::Backend(format!("invalid structure for zone {id}: {e}")))?;
    let version = u64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("invalid structure version for zone {id}")))?;

    Ok(Zone::restore(
        ZoneId::from_uuid(id),
        WarehouseId::from_uuid(warehouse_id),
        row.try_get("code").map_err(row_error)?,
        row.try_get("name").map_err(row_error)?,
        structure,
        layout.map(Layout::new),
        version,
    ))
}

fn bin_from_row(row: &PgRow) -> Result<Bin, StoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
    let zone_id: uuid::Uuid = row.try_get("zone_id").map_err(row_error)?;
    let capacity: Option<i32> = row.try_get("capacity").map_err(row_error)?;

    Ok(Bin::restore(BinParts {
        id: BinId::from_uuid(id),
        zone_id: ZoneId::from_uuid(zone_id),
        address: row.try_get("address").map_err(row_error)?,
        aisle: from_db_int("aisle", row.try_get("aisle").map_err(row_error)?)?,
        shelf: from_db_int("shelf", row.try_get("shelf").map_err(row_error)?)?,
        position: from_db_int("position", row.try_get("position").map_err(row_error)?)?,
        position_label: row.try_get("position_label").map_err(row_error)?,
        is_active: row.try_get("is_active").map_err(row_error)?,
        is_blocked: row.try_get("is_blocked").map_err(row_error)?,
        block_reason: row.try_get("block_reason").map_err(row_error)?,
        capacity: capacity.map(|c| from_db_int("capacity", c)).transpose()?,
        created_at: row.try_get("created_at").map_err(row_error)?,
        deleted_at: row.try_get("deleted_at").map_err(row_error)?,
    }))
}

fn structure_json(structure: &StructureSpec) -> Result<JsonValue, StoreError> {
    serde_json::to_value(structure)
        .map_err(|e| StoreError::Backend(format!("failed to serialize structure: {e}")))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("structure version {version} out of range")))
}

fn to_db_int(column: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Backend(format!("{column} {value} out of range")))
}

fn from_db_int(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Backend(format!("negative {column} in bin row")))
}

fn row_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to read row: {err}"))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
