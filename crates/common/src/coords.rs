use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::index::{IndexKey, mix_coords};

/// Edge length of a region in voxels.
pub const REGION_EDGE: i32 = 16;

/// Integer coordinate of a region (a 16³ voxel cube).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Region containing the given block coordinate.
    pub fn from_block(block: IVec3) -> Self {
        Self {
            x: block.x.div_euclid(REGION_EDGE),
            y: block.y.div_euclid(REGION_EDGE),
            z: block.z.div_euclid(REGION_EDGE),
        }
    }

    /// Region containing the given world-space position.
    pub fn from_world(pos: Vec3) -> Self {
        Self::from_block(pos.floor().as_ivec3())
    }

    pub fn column(self) -> ColumnPos {
        ColumnPos::new(self.x, self.z)
    }

    pub fn offset(self, d: IVec3) -> Self {
        Self::new(self.x + d.x, self.y + d.y, self.z + d.z)
    }

    /// Lowest-corner block coordinate of this region.
    pub fn min_block(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * REGION_EDGE
    }

    /// World-space center of this region.
    pub fn center(self) -> Vec3 {
        self.min_block().as_vec3() + Vec3::splat(REGION_EDGE as f32 * 0.5)
    }

    /// Squared distance from a world position to the region center.
    pub fn distance_sq(self, pos: Vec3) -> f32 {
        self.center().distance_squared(pos)
    }
}

impl IndexKey for RegionPos {
    fn index_hash(&self) -> i32 {
        mix_coords(&[self.x, self.y, self.z])
    }
}

impl std::fmt::Display for RegionPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Integer coordinate of a column of regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnPos {
    pub x: i32,
    pub z: i32,
}

impl ColumnPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Column containing the given block x/z.
    pub fn from_block(x: i32, z: i32) -> Self {
        Self::new(x.div_euclid(REGION_EDGE), z.div_euclid(REGION_EDGE))
    }

    pub fn region(self, y: i32) -> RegionPos {
        RegionPos::new(self.x, y, self.z)
    }
}

impl IndexKey for ColumnPos {
    fn index_hash(&self) -> i32 {
        mix_coords(&[self.x, self.z])
    }
}

impl std::fmt::Display for ColumnPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Voxel position inside a region, packed as `x | z << 4 | y << 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalPos(u16);

impl LocalPos {
    pub fn new(x: u8, y: u8, z: u8) -> Self {
        assert!(
            (x as i32) < REGION_EDGE && (y as i32) < REGION_EDGE && (z as i32) < REGION_EDGE,
            "local position out of range: ({x}, {y}, {z})"
        );
        Self(x as u16 | (z as u16) << 4 | (y as u16) << 8)
    }

    /// Local position of a block within its region.
    pub fn from_block(block: IVec3) -> Self {
        Self::new(
            block.x.rem_euclid(REGION_EDGE) as u8,
            block.y.rem_euclid(REGION_EDGE) as u8,
            block.z.rem_euclid(REGION_EDGE) as u8,
        )
    }

    pub fn x(self) -> u8 {
        (self.0 & 0xf) as u8
    }

    pub fn y(self) -> u8 {
        (self.0 >> 8 & 0xf) as u8
    }

    pub fn z(self) -> u8 {
        (self.0 >> 4 & 0xf) as u8
    }

    pub fn packed(self) -> u16 {
        self.0
    }
}

/// Horizontal position inside a column, packed as `x | z << 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalColumnPos(u8);

impl LocalColumnPos {
    pub fn new(x: u8, z: u8) -> Self {
        assert!(
            (x as i32) < REGION_EDGE && (z as i32) < REGION_EDGE,
            "local column position out of range: ({x}, {z})"
        );
        Self(x | z << 4)
    }

    pub fn from_block(x: i32, z: i32) -> Self {
        Self::new(x.rem_euclid(REGION_EDGE) as u8, z.rem_euclid(REGION_EDGE) as u8)
    }

    pub fn x(self) -> u8 {
        self.0 & 0xf
    }

    pub fn z(self) -> u8 {
        self.0 >> 4
    }

    pub fn packed(self) -> u8 {
        self.0
    }
}
