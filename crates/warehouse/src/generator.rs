//! Bin set generation.
//!
//! Enumerates the coordinate space a [`StructureSpec`] implies, in a fixed order
//! (aisle, then shelf, then position), rendering each coordinate through an
//! [`AddressCodec`]. Generation is lazy: [`BinSetGenerator::iter`] yields one
//! descriptor at a time, so callers that only need a prefix (preview samples)
//! or a streaming diff never hold the full set in memory.

use std::collections::HashSet;
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use slotforge_core::{DomainError, DomainResult};

use crate::codec::AddressCodec;
use crate::structure::StructureSpec;

/// One generated bin coordinate and its rendered address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinDescriptor {
    pub aisle: u32,
    pub shelf: u32,
    /// 1-based physical slot on the shelf, counted from the bottom.
    pub position: u32,
    pub position_index: u32,
    pub position_label: String,
    pub address: String,
}

/// Aisle/shelf/bin totals of a structure, computed without enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureTotals {
    pub total_aisles: u32,
    pub total_shelves: u64,
    pub total_bins: u64,
}

/// Generator over the bins of one structure, rendered for one zone.
#[derive(Debug, Clone, Copy)]
pub struct BinSetGenerator<'a> {
    spec: &'a StructureSpec,
    codec: &'a AddressCodec,
}

impl<'a> BinSetGenerator<'a> {
    pub fn new(spec: &'a StructureSpec, codec: &'a AddressCodec) -> Self {
        Self { spec, codec }
    }

    /// Lazily yields every descriptor in generation order.
    pub fn iter(&self) -> BinDescriptors<'a> {
        BinDescriptors {
            spec: self.spec,
            codec: self.codec,
            aisle: 1,
            shelf: 1,
            position_index: 0,
            done: false,
        }
    }

    /// Materializes the full bin set.
    pub fn generate(&self) -> Vec<BinDescriptor> {
        let capacity = Self::count_only(self.spec)
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let mut out = Vec::with_capacity(capacity);
        out.extend(self.iter());
        out
    }

    /// Materializes the full bin set, failing if two coordinates render to the
    /// same address.
    pub fn generate_unique(&self) -> DomainResult<Vec<BinDescriptor>> {
        let bins = self.generate();
        let mut seen = HashSet::with_capacity(bins.len());
        for bin in &bins {
            if !seen.insert(bin.address.as_str()) {
                return Err(DomainError::invariant(format!(
                    "address collision in generated bin set: {}",
                    bin.address
                )));
            }
        }
        Ok(bins)
    }

    /// First `k` descriptors in generation order.
    pub fn sample(&self, k: usize) -> Vec<BinDescriptor> {
        self.iter().take(k).collect()
    }

    /// Total bin count: `Σ effective_shelves(a) × effective_bins_per_shelf(a)`.
    ///
    /// Closed form over the default aisles plus one term per override, so the
    /// cost is independent of the number of bins. Fails on `u64` overflow.
    pub fn count_only(spec: &StructureSpec) -> DomainResult<u64> {
        Ok(Self::totals(spec)?.total_bins)
    }

    pub fn totals(spec: &StructureSpec) -> DomainResult<StructureTotals> {
        let overflow = || DomainError::field("totalBins", "structure is too large to count");

        let default_aisles = u64::from(spec.default_aisle_count());
        let default_shelves = u64::from(spec.shelves_per_aisle());
        let default_bins = u64::from(spec.bins_per_shelf());

        let mut total_shelves = default_aisles
            .checked_mul(default_shelves)
            .ok_or_else(overflow)?;
        let mut total_bins = total_shelves
            .checked_mul(default_bins)
            .ok_or_else(overflow)?;

        for (_, shelves, bins) in spec.overrides() {
            let shelves = u64::from(shelves);
            total_shelves = total_shelves.checked_add(shelves).ok_or_else(overflow)?;
            total_bins = shelves
                .checked_mul(u64::from(bins))
                .and_then(|n| total_bins.checked_add(n))
                .ok_or_else(overflow)?;
        }

        Ok(StructureTotals {
            total_aisles: spec.aisles(),
            total_shelves,
            total_bins,
        })
    }
}

impl<'a> IntoIterator for &BinSetGenerator<'a> {
    type Item = BinDescriptor;
    type IntoIter = BinDescriptors<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator returned by [`BinSetGenerator::iter`].
#[derive(Debug, Clone)]
pub struct BinDescriptors<'a> {
    spec: &'a StructureSpec,
    codec: &'a AddressCodec,
    aisle: u32,
    shelf: u32,
    position_index: u32,
    done: bool,
}

impl BinDescriptors<'_> {
    fn next_aisle(&mut self) {
        match self.aisle.checked_add(1) {
            Some(next) => {
                self.aisle = next;
                self.shelf = 1;
                self.position_index = 0;
            }
            None => self.done = true,
        }
    }
}

impl Iterator for BinDescriptors<'_> {
    type Item = BinDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.aisle > self.spec.aisles() {
                self.done = true;
                return None;
            }
            let shelves = self.spec.effective_shelves(self.aisle);
            let bins = self.spec.effective_bins_per_shelf(self.aisle);
            if self.shelf > shelves {
                self.next_aisle();
                continue;
            }
            if self.position_index >= bins {
                self.shelf += 1;
                self.position_index = 0;
                continue;
            }

            let index = self.position_index;
            let encoded = self.codec.render(self.aisle, self.shelf, index, bins);
            self.position_index += 1;
            return Some(BinDescriptor {
                aisle: self.aisle,
                shelf: self.shelf,
                position: index + 1,
                position_index: index,
                position_label: encoded.position_label,
                address: encoded.address,
            });
        }
    }
}

impl FusedIterator for BinDescriptors<'_> {}
