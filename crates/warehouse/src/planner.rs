//! Reconfiguration planning: diff a zone's current bins against a proposed bin set.
//!
//! The planner is a pure function over two collections. It never looks at
//! storage; callers hand it the current (non-deleted) bins with their occupancy
//! and the descriptors generated for the proposed structure.
//!
//! Classification, by exact address match after normalization:
//!
//! ```text
//! current ∩ proposed  → preserve  (record kept as-is)
//! proposed \ current  → create
//! current \ proposed  → remove    (+ blocked, if the bin holds items)
//! ```
//!
//! Cost is `O(|current| + |proposed|)` hash lookups.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use slotforge_core::{DomainError, DomainResult};

use crate::codec::normalize_address;
use crate::generator::BinDescriptor;
use crate::model::BinOccupancy;

/// A current bin as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBin {
    pub address: String,
    pub has_items: bool,
    pub item_count: u64,
}

impl CurrentBin {
    pub fn new(address: &str, occupancy: BinOccupancy) -> Self {
        Self {
            address: normalize_address(address),
            has_items: occupancy.has_items || occupancy.item_count > 0,
            item_count: occupancy.item_count,
        }
    }

    pub fn empty(address: &str) -> Self {
        Self::new(address, BinOccupancy::empty())
    }
}

/// A bin scheduled for soft deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedBin {
    pub address: String,
    pub has_items: bool,
    pub item_count: u64,
}

/// A non-empty bin whose removal needs explicit opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedBin {
    pub address: String,
    pub item_count: u64,
}

/// Full classified diff.
///
/// `preserve` and `create` follow generation order; `remove` and `blocked` are
/// sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigurationPlan {
    preserve: Vec<String>,
    create: Vec<BinDescriptor>,
    remove: Vec<RemovedBin>,
    blocked: Vec<String>,
}

impl ReconfigurationPlan {
    pub fn preserve(&self) -> &[String] {
        &self.preserve
    }

    pub fn create(&self) -> &[BinDescriptor] {
        &self.create
    }

    pub fn remove(&self) -> &[RemovedBin] {
        &self.remove
    }

    pub fn blocked(&self) -> &[String] {
        &self.blocked
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.remove.is_empty()
    }

    pub fn blocked_bins(&self) -> Vec<BlockedBin> {
        self.remove
            .iter()
            .filter(|r| r.has_items)
            .map(|r| BlockedBin {
                address: r.address.clone(),
                item_count: r.item_count,
            })
            .collect()
    }

    pub fn removal_addresses(&self) -> Vec<String> {
        self.remove.iter().map(|r| r.address.clone()).collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            preserve_count: self.preserve.len() as u64,
            create_count: self.create.len() as u64,
            remove_count: self.remove.len() as u64,
            blocked_bins: self.blocked_bins(),
        }
    }
}

/// Counts-only form of a plan, for previews.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub preserve_count: u64,
    pub create_count: u64,
    pub remove_count: u64,
    pub blocked_bins: Vec<BlockedBin>,
}

/// Stateless planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconfigurationPlanner;

impl ReconfigurationPlanner {
    /// Computes the full plan, keeping every created descriptor.
    pub fn plan<C, P>(current: C, proposed: P) -> DomainResult<ReconfigurationPlan>
    where
        C: IntoIterator<Item = CurrentBin>,
        P: IntoIterator<Item = BinDescriptor>,
    {
        let mut preserve = Vec::new();
        let mut create = Vec::new();
        let removed = reconcile(
            current,
            proposed,
            CollisionCheck::Track,
            |d| preserve.push(d.address),
            |d| create.push(d),
        )?;

        let blocked = removed
            .iter()
            .filter(|r| r.has_items)
            .map(|r| r.address.clone())
            .collect();
        Ok(ReconfigurationPlan {
            preserve,
            create,
            remove: removed,
            blocked,
        })
    }

    /// Computes only the counts and blocked bins. `proposed` is consumed as a
    /// stream; neither descriptors nor their addresses are retained, so memory
    /// stays proportional to the current bin set.
    pub fn summarize<C, P>(current: C, proposed: P) -> DomainResult<PlanSummary>
    where
        C: IntoIterator<Item = CurrentBin>,
        P: IntoIterator<Item = BinDescriptor>,
    {
        let mut preserve_count = 0u64;
        let mut create_count = 0u64;
        let removed = reconcile(
            current,
            proposed,
            CollisionCheck::Skip,
            |_| preserve_count += 1,
            |_| create_count += 1,
        )?;

        Ok(PlanSummary {
            preserve_count,
            create_count,
            remove_count: removed.len() as u64,
            blocked_bins: removed
                .into_iter()
                .filter(|r| r.has_items)
                .map(|r| BlockedBin {
                    address: r.address,
                    item_count: r.item_count,
                })
                .collect(),
        })
    }
}

/// Whether `reconcile` remembers every proposed address to catch collisions.
/// Generated sets are collision-free by construction; the check guards the
/// apply path, where a collision would overwrite a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollisionCheck {
    Track,
    Skip,
}

/// Routes each proposed descriptor to `on_preserve` or `on_create` and returns
/// the unmatched current bins, sorted by address.
fn reconcile<C, P>(
    current: C,
    proposed: P,
    collisions: CollisionCheck,
    mut on_preserve: impl FnMut(BinDescriptor),
    mut on_create: impl FnMut(BinDescriptor),
) -> DomainResult<Vec<RemovedBin>>
where
    C: IntoIterator<Item = CurrentBin>,
    P: IntoIterator<Item = BinDescriptor>,
{
    let mut unmatched: HashMap<String, CurrentBin> = HashMap::new();
    for bin in current {
        let address = normalize_address(&bin.address);
        if unmatched.contains_key(&address) {
            return Err(DomainError::invariant(format!(
                "duplicate address among current bins: {address}"
            )));
        }
        unmatched.insert(address, bin);
    }

    let mut seen: HashSet<String> = HashSet::new();
    for mut descriptor in proposed {
        descriptor.address = normalize_address(&descriptor.address);
        if collisions == CollisionCheck::Track && !seen.insert(descriptor.address.clone()) {
            return Err(DomainError::invariant(format!(
                "address collision in generated bin set: {}",
                descriptor.address
            )));
        }
        if unmatched.remove(&descriptor.address).is_some() {
            on_preserve(descriptor);
        } else {
            on_create(descriptor);
        }
    }

    let mut removed: Vec<RemovedBin> = unmatched
        .into_iter()
        .map(|(address, bin)| RemovedBin {
            address,
            has_items: bin.has_items,
            item_count: bin.item_count,
        })
        .collect();
    removed.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(removed)
}
