use glam::{IVec3, Vec3};
use strata_common::{ColumnPos, REGION_EDGE, RegionPos};

/// Box of regions visible to one subscriber, captured at one position.
///
/// A formula is replaced only when the radii change or the subscriber has
/// moved at least one region edge from the anchor, so small jitter never
/// churns trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewFormula {
    anchor: IVec3,
    center: RegionPos,
    horizontal: i32,
    vertical: i32,
}

impl ViewFormula {
    pub fn new(position: Vec3, horizontal: i32, vertical: i32) -> Self {
        Self::from_block(position.floor().as_ivec3(), horizontal, vertical)
    }

    /// Formula anchored at the middle of a region.
    pub fn around(center: RegionPos, horizontal: i32, vertical: i32) -> Self {
        Self::from_block(center.min_block() + IVec3::splat(REGION_EDGE / 2), horizontal, vertical)
    }

    fn from_block(anchor: IVec3, horizontal: i32, vertical: i32) -> Self {
        assert!(
            horizontal >= 0 && vertical >= 0,
            "view radii must be non-negative, got {horizontal}/{vertical}"
        );
        Self {
            anchor,
            center: RegionPos::from_block(anchor),
            horizontal,
            vertical,
        }
    }

    pub fn center(&self) -> RegionPos {
        self.center
    }

    /// Block position the formula was captured at.
    pub fn anchor(&self) -> IVec3 {
        self.anchor
    }

    pub fn horizontal_radius(&self) -> i32 {
        self.horizontal
    }

    pub fn vertical_radius(&self) -> i32 {
        self.vertical
    }

    pub fn contains(&self, pos: RegionPos) -> bool {
        (pos.x - self.center.x).abs() <= self.horizontal
            && (pos.z - self.center.z).abs() <= self.horizontal
            && (pos.y - self.center.y).abs() <= self.vertical
    }

    pub fn contains_column(&self, pos: ColumnPos) -> bool {
        (pos.x - self.center.x).abs() <= self.horizontal
            && (pos.z - self.center.z).abs() <= self.horizontal
    }

    /// Every region in the box; column by column, bottom to top.
    pub fn positions(&self) -> Positions {
        let r = IVec3::new(self.horizontal, self.vertical, self.horizontal);
        let c = IVec3::new(self.center.x, self.center.y, self.center.z);
        Positions {
            min: c - r,
            max: c + r,
            next: Some(c - r),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnPos> + '_ {
        let h = self.horizontal;
        (-h..=h).flat_map(move |dx| {
            (-h..=h).map(move |dz| ColumnPos::new(self.center.x + dx, self.center.z + dz))
        })
    }

    pub fn region_count(&self) -> usize {
        let side = (2 * self.horizontal + 1) as usize;
        side * side * (2 * self.vertical + 1) as usize
    }

    /// A replacement formula if the radii changed or the subscriber moved
    /// far enough from the anchor, otherwise `None`.
    pub fn next(&self, position: Vec3, horizontal: i32, vertical: i32) -> Option<ViewFormula> {
        let block = position.floor().as_ivec3();
        let moved = (block - self.anchor).as_i64vec3().length_squared();
        let threshold = (REGION_EDGE * REGION_EDGE) as i64;
        if horizontal != self.horizontal || vertical != self.vertical || moved >= threshold {
            Some(Self::from_block(block, horizontal, vertical))
        } else {
            None
        }
    }
}

/// Restartable iterator over the regions of a [`ViewFormula`].
#[derive(Debug, Clone)]
pub struct Positions {
    min: IVec3,
    max: IVec3,
    next: Option<IVec3>,
}

impl Iterator for Positions {
    type Item = RegionPos;

    fn next(&mut self) -> Option<RegionPos> {
        let cur = self.next?;
        let mut n = cur;
        n.y += 1;
        if n.y > self.max.y {
            n.y = self.min.y;
            n.z += 1;
            if n.z > self.max.z {
                n.z = self.min.z;
                n.x += 1;
            }
        }
        self.next = (n.x <= self.max.x).then_some(n);
        Some(RegionPos::new(cur.x, cur.y, cur.z))
    }
}
