//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values. A structure specification is the canonical example here:
//! two zones configured with the same aisle/shelf/bin counts and code pattern
//! have equal specs, regardless of which zone they belong to.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new instance through a transformation function (`with_*`) that
/// returns a fresh value and leaves the original untouched.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Dimensions {
///     width_mm: u32,
///     depth_mm: u32,
/// }
///
/// impl ValueObject for Dimensions {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
