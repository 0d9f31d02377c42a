//! Collaborator interfaces the provider drives but does not implement.

use glam::IVec3;
use strata_common::{ColumnPos, RegionPos};

use crate::region::{Column, ColumnPayload, ColumnRecord, Region, RegionPayload, RegionRecord};

/// Errors from region/column persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Produces terrain. Called on the owner thread only.
pub trait Generator {
    fn generate_region(&mut self, pos: RegionPos) -> RegionPayload;

    fn generate_column(&mut self, pos: ColumnPos) -> ColumnPayload;

    /// Offsets of the regions that must exist before `region` can be
    /// considered fully populated.
    fn population_footprint(&self, region: &Region) -> Vec<IVec3>;

    fn populate(&mut self, region: &mut Region);
}

/// Lighting passes run on newly generated and fully populated regions.
pub trait LightingEngine {
    fn initialize_skylight(&mut self, region: &mut Region);

    /// Spread skylight once the surrounding neighborhood is resident.
    fn diffuse_skylight(&mut self, region: &mut Region);
}

/// Lighting engine that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLighting;

impl LightingEngine for NullLighting {
    fn initialize_skylight(&mut self, _region: &mut Region) {}

    fn diffuse_skylight(&mut self, _region: &mut Region) {}
}

/// Persistence backend. Reads are issued from worker threads.
pub trait Store: Send + Sync {
    fn load_region(&self, pos: RegionPos) -> Result<Option<RegionRecord>, StoreError>;

    fn load_column(&self, pos: ColumnPos) -> Result<Option<ColumnRecord>, StoreError>;

    fn save_region(&self, record: &RegionRecord) -> Result<(), StoreError>;

    fn save_column(&self, record: &ColumnRecord) -> Result<(), StoreError>;
}

/// Hooks fired as regions and columns enter and leave memory.
pub trait ProviderListener {
    fn region_loaded(&mut self, _region: &Region) {}

    fn region_unloaded(&mut self, _region: &Region) {}

    fn column_loaded(&mut self, _column: &Column) {}

    fn column_unloaded(&mut self, _column: &Column) {}
}

/// Deterministic generator producing flat ground below a fixed height.
///
/// Each payload byte is one voxel in `x | z << 4 | y << 8` order; `1` is
/// solid and `0` is air. Population drops a marker voxel at the region's
/// lowest corner, and requires the `+x`, `+y`, `+z` neighbors.
#[derive(Debug, Clone, Copy)]
pub struct FlatGenerator {
    pub ground_level: i32,
}

impl FlatGenerator {
    pub const VOLUME: usize = 16 * 16 * 16;
    pub const MARKER: u8 = 2;

    pub fn new(ground_level: i32) -> Self {
        Self { ground_level }
    }
}

impl Default for FlatGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Generator for FlatGenerator {
    fn generate_region(&mut self, pos: RegionPos) -> RegionPayload {
        let base_y = pos.min_block().y;
        let mut voxels = vec![0u8; Self::VOLUME];
        for (i, voxel) in voxels.iter_mut().enumerate() {
            if base_y + (i >> 8) as i32 <= self.ground_level {
                *voxel = 1;
            }
        }
        RegionPayload(voxels)
    }

    fn generate_column(&mut self, _pos: ColumnPos) -> ColumnPayload {
        let top = self.ground_level.to_le_bytes();
        ColumnPayload(top.iter().copied().cycle().take(4 * 256).collect())
    }

    fn population_footprint(&self, _region: &Region) -> Vec<IVec3> {
        let mut offsets = Vec::with_capacity(8);
        for dx in 0..=1 {
            for dy in 0..=1 {
                for dz in 0..=1 {
                    offsets.push(IVec3::new(dx, dy, dz));
                }
            }
        }
        offsets
    }

    fn populate(&mut self, region: &mut Region) {
        if let Some(first) = region.payload_mut().0.first_mut() {
            *first = Self::MARKER;
        }
    }
}
