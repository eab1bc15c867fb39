use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use slotforge_core::Entity;
use slotforge_infra::store::InMemoryZoneStore;
use slotforge_infra::{ApplyOptions, EngineConfig, ZoneStructureService};
use slotforge_warehouse::{
    AddressCodec, AisleConfig, BinSetGenerator, CurrentBin, ReconfigurationPlanner,
    StructureDraft, StructureSpec,
};

/// Square-ish structures from ~1k to ~50k bins.
const SIZES: [(u32, u32, u32); 4] = [(10, 10, 10), (20, 10, 25), (40, 25, 25), (50, 40, 25)];

fn spec(aisles: u32, shelves: u32, bins: u32) -> StructureSpec {
    StructureSpec::uniform(aisles, shelves, bins).unwrap()
}

fn current_bins(spec: &StructureSpec) -> Vec<CurrentBin> {
    let codec = AddressCodec::new("WH", "Z1", spec.code_pattern().clone());
    BinSetGenerator::new(spec, &codec)
        .iter()
        .map(|d| CurrentBin::empty(&d.address))
        .collect()
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_generation");

    for (aisles, shelves, bins) in SIZES {
        let spec = spec(aisles, shelves, bins);
        let total = BinSetGenerator::count_only(&spec).unwrap();
        let codec = AddressCodec::new("WH", "Z1", spec.code_pattern().clone());
        group.throughput(Throughput::Elements(total));
        group.bench_with_input(BenchmarkId::new("generate", total), &spec, |b, spec| {
            b.iter(|| black_box(BinSetGenerator::new(spec, &codec).generate()));
        });
    }

    group.finish();
}

fn bench_counting(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_counting");

    // Many overrides: counting stays proportional to aisles, not bins.
    let mut draft = StructureDraft::uniform(500, 40, 25);
    for aisle in (1..=500).step_by(2) {
        draft = draft.with_aisle_config(AisleConfig::new(aisle, 30, 20));
    }
    let overridden = StructureSpec::new(draft).unwrap();

    group.bench_function("count_only_uniform", |b| {
        let spec = spec(500, 40, 25);
        b.iter(|| black_box(BinSetGenerator::count_only(black_box(&spec)).unwrap()));
    });
    group.bench_function("count_only_overrides", |b| {
        b.iter(|| black_box(BinSetGenerator::count_only(black_box(&overridden)).unwrap()));
    });

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconfiguration_planning");
    group.sample_size(20);

    for (aisles, shelves, bins) in SIZES {
        let before = spec(aisles, shelves, bins);
        // Drop one aisle, add one shelf per aisle.
        let after = spec(aisles - 1, shelves + 1, bins);
        let current = current_bins(&before);
        let codec = AddressCodec::new("WH", "Z1", after.code_pattern().clone());
        let total = current.len() as u64;
        group.throughput(Throughput::Elements(total));

        group.bench_with_input(BenchmarkId::new("plan", total), &current, |b, current| {
            b.iter(|| {
                black_box(
                    ReconfigurationPlanner::plan(
                        current.iter().cloned(),
                        BinSetGenerator::new(&after, &codec).iter(),
                    )
                    .unwrap(),
                )
            });
        });
        group.bench_with_input(BenchmarkId::new("summarize", total), &current, |b, current| {
            b.iter(|| {
                black_box(
                    ReconfigurationPlanner::summarize(
                        current.iter().cloned(),
                        BinSetGenerator::new(&after, &codec).iter(),
                    )
                    .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_service_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_apply_in_memory");
    group.sample_size(10);

    group.bench_function("grow_and_shrink_10k", |b| {
        let store = Arc::new(InMemoryZoneStore::new());
        let service = ZoneStructureService::new(store, EngineConfig::default());
        let warehouse = service.create_warehouse("WH", "Bench").unwrap();
        let zone_id = *service
            .create_zone(*warehouse.id(), "Z1", "Bench", spec(20, 20, 25))
            .unwrap()
            .zone
            .id();
        let mut grow = true;

        b.iter(|| {
            let next = if grow { spec(21, 20, 25) } else { spec(20, 20, 25) };
            grow = !grow;
            black_box(
                service
                    .apply_structure(zone_id, next, ApplyOptions::default())
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_generation,
    bench_counting,
    bench_planning,
    bench_service_apply
);
criterion_main!(benches);
