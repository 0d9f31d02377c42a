//! Shared coordinates, requirement tiers and the region spatial index.
//!
//! # Invariants
//! - A region is a cube of [`REGION_EDGE`] voxels per side; block coordinates
//!   map to region coordinates by floor division.
//! - [`Requirement`] tiers are totally ordered and a region's achieved tier
//!   never decreases.
//! - [`SpatialIndex`] never holds two entries for the same key and always keeps
//!   at least one empty slot.

mod coords;
mod index;
mod types;

pub use coords::{ColumnPos, LocalColumnPos, LocalPos, REGION_EDGE, RegionPos};
pub use index::{Cursor, IndexKey, SpatialIndex, mix_coords};
pub use types::{Requirement, SubscriberId};

pub fn crate_info() -> &'static str {
    "strata-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
