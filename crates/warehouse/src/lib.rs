//! Warehouse topology domain module.
//!
//! This crate contains the zone structure and bin reconfiguration rules,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - [`StructureSpec`]: validated, immutable aisle/shelf/bin topology + code pattern
//! - [`AddressCodec`]: coordinate → human-readable bin address
//! - [`BinSetGenerator`]: enumerates (or just counts) the bins a spec implies
//! - [`ReconfigurationPlanner`]: diffs a zone's current bins against a proposed set

pub mod codec;
pub mod generator;
pub mod model;
pub mod planner;
pub mod structure;

pub use codec::{normalize_address, AddressCodec, EncodedBin};
pub use generator::{BinDescriptor, BinDescriptors, BinSetGenerator, StructureTotals};
pub use model::{Bin, BinOccupancy, BinParts, Layout, Warehouse, Zone};
pub use planner::{
    BlockedBin, CurrentBin, PlanSummary, ReconfigurationPlan, ReconfigurationPlanner, RemovedBin,
};
pub use structure::{
    AisleConfig, BinDirection, BinLabeling, CodePattern, StructureDraft, StructureSpec,
};
