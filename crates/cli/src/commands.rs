use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;

use slotforge_core::Entity;
use slotforge_infra::store::InMemoryZoneStore;
use slotforge_infra::{EngineConfig, StructurePreview, ZoneStructureService};
use slotforge_warehouse::model::validate_code;
use slotforge_warehouse::{AddressCodec, BinSetGenerator, StructureSpec};

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_spec(path: &Path) -> anyhow::Result<StructureSpec> {
    read_json(path)
}

/// Writes every address of `spec` (or its full descriptors as JSON lines).
pub fn generate(
    config: &EngineConfig,
    spec: &Path,
    warehouse_code: &str,
    zone_code: &str,
    json: bool,
    mut out: impl Write,
) -> anyhow::Result<()> {
    let spec = read_spec(spec)?;
    let total = BinSetGenerator::count_only(&spec)?;
    anyhow::ensure!(
        total <= config.max_bins_per_zone,
        "structure has {total} bins, above the limit of {}",
        config.max_bins_per_zone
    );

    let codec = AddressCodec::new(
        validate_code("warehouseCode", warehouse_code)?,
        validate_code("zoneCode", zone_code)?,
        spec.code_pattern().clone(),
    );

    for descriptor in BinSetGenerator::new(&spec, &codec).iter() {
        if json {
            serde_json::to_writer(&mut out, &descriptor)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", descriptor.address)?;
        }
    }
    out.flush()?;
    tracing::debug!(total, "addresses written");
    Ok(())
}

pub fn count(spec: &Path, mut out: impl Write) -> anyhow::Result<()> {
    let spec = read_spec(spec)?;
    let totals = BinSetGenerator::totals(&spec)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&totals)?)?;
    out.flush()?;
    Ok(())
}

/// Builds a throwaway zone from `current`, seeds its occupancy and previews
/// reconfiguring it to `proposed`.
pub fn plan_preview(
    config: &EngineConfig,
    current: &Path,
    proposed: &Path,
    warehouse_code: &str,
    zone_code: &str,
    occupancy: Option<&Path>,
) -> anyhow::Result<StructurePreview> {
    let current = read_spec(current)?;
    let proposed = read_spec(proposed)?;
    let occupancy: BTreeMap<String, u64> = match occupancy {
        Some(path) => read_json(path)?,
        None => BTreeMap::new(),
    };

    let store = Arc::new(InMemoryZoneStore::new());
    let service = ZoneStructureService::new(store.clone(), config.clone());
    let warehouse = service.create_warehouse(warehouse_code, warehouse_code)?;
    let zone = service
        .create_zone(*warehouse.id(), zone_code, zone_code, current)?
        .zone;
    for (address, item_count) in &occupancy {
        store
            .set_occupancy(*zone.id(), address, *item_count)
            .with_context(|| format!("seeding occupancy of {address}"))?;
    }

    Ok(service.preview_reconfiguration(*zone.id(), &proposed)?)
}

pub fn preview(
    config: &EngineConfig,
    current: &Path,
    proposed: &Path,
    warehouse_code: &str,
    zone_code: &str,
    occupancy: Option<&Path>,
    mut out: impl Write,
) -> anyhow::Result<()> {
    let preview = plan_preview(config, current, proposed, warehouse_code, zone_code, occupancy)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&preview)?)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use slotforge_warehouse::BlockedBin;

    fn demo(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../demos")
            .join(name)
    }

    #[test]
    fn generate_prints_addresses_in_generation_order() {
        let mut out = Vec::new();
        generate(
            &EngineConfig::default(),
            &demo("zone-current.json"),
            "wh",
            "z1",
            false,
            &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 60);
        assert_eq!(lines[0], "WH-Z1-01-01-A");
        assert_eq!(lines[3], "WH-Z1-01-01-D");
        assert_eq!(lines[59], "WH-Z1-03-05-D");
    }

    #[test]
    fn generate_respects_the_size_limit() {
        let config = EngineConfig::default().with_max_bins_per_zone(59);
        let err = generate(
            &config,
            &demo("zone-current.json"),
            "WH",
            "Z1",
            false,
            Vec::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("above the limit"));
    }

    #[test]
    fn generate_rejects_bad_codes() {
        let result = generate(
            &EngineConfig::default(),
            &demo("zone-current.json"),
            "W-H",
            "Z1",
            false,
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn count_prints_totals() {
        let mut out = Vec::new();
        count(&demo("zone-proposed.json"), &mut out).unwrap();
        let totals: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(totals["totalAisles"], 2);
        assert_eq!(totals["totalShelves"], 8);
        assert_eq!(totals["totalBins"], 38);
    }

    #[test]
    fn demo_preview_reports_the_stocked_bins_of_the_dropped_aisle() {
        let preview = plan_preview(
            &EngineConfig::default(),
            &demo("zone-current.json"),
            &demo("zone-proposed.json"),
            "WH",
            "Z1",
            Some(&demo("occupancy.json")),
        )
        .unwrap();

        assert_eq!(preview.total_bins, 38);
        assert_eq!(preview.preserve_count, 32);
        assert_eq!(preview.create_count, 6);
        assert_eq!(preview.remove_count, 28);
        assert_eq!(
            preview.blocked_bins,
            vec![
                BlockedBin {
                    address: "WH-Z1-03-01-A".to_string(),
                    item_count: 12
                },
                BlockedBin {
                    address: "WH-Z1-03-02-B".to_string(),
                    item_count: 1
                },
            ]
        );
        assert!(preview.layout_reset);
        assert_eq!(preview.sample_bins.len(), 20);
    }

    #[test]
    fn preview_rejects_occupancy_for_unknown_bins() {
        let dir = std::env::temp_dir().join(format!("slotforge-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let occupancy = dir.join("occupancy.json");
        fs::write(&occupancy, r#"{"WH-Z1-09-01-A": 3}"#).unwrap();

        let err = plan_preview(
            &EngineConfig::default(),
            &demo("zone-current.json"),
            &demo("zone-proposed.json"),
            "WH",
            "Z1",
            Some(&occupancy),
        )
        .unwrap_err();
        assert!(err.to_string().contains("WH-Z1-09-01-A"));
        fs::remove_dir_all(&dir).unwrap();
    }
}
