//! Identity for warehouses, zones and bins.
//!
//! A bin keeps its [`BinId`](crate::BinId) for as long as its address survives
//! reconfiguration; attribute changes never alter identity.

pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// `true` when both values refer to the same entity, whatever their state.
    fn is_same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
