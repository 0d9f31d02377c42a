use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_common::{ColumnPos, LocalPos, RegionPos, Requirement};

/// Opaque voxel contents of a region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPayload(pub Vec<u8>);

/// Opaque 2-D height data of a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPayload(pub Vec<u8>);

/// Reason a region must stay resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ticket {
    /// Held by an interest tracker while at least one subscriber watches.
    Interest,
    /// Caller-defined keep-alive.
    Custom(u64),
}

/// A resident 16³ region of the world.
#[derive(Debug, Clone)]
pub struct Region {
    pub(crate) pos: RegionPos,
    pub(crate) payload: RegionPayload,
    pub(crate) populated: bool,
    pub(crate) fully_populated: bool,
    pub(crate) lit: bool,
    pub(crate) tickets: BTreeSet<Ticket>,
    pub(crate) attachments: BTreeMap<LocalPos, Vec<u8>>,
    pub(crate) dirty: bool,
}

impl Region {
    pub fn new(pos: RegionPos, payload: RegionPayload) -> Self {
        Self {
            pos,
            payload,
            populated: false,
            fully_populated: false,
            lit: false,
            tickets: BTreeSet::new(),
            attachments: BTreeMap::new(),
            dirty: true,
        }
    }

    pub fn from_record(record: RegionRecord) -> Self {
        Self {
            pos: record.pos,
            payload: record.payload,
            populated: record.populated,
            fully_populated: record.fully_populated,
            lit: record.lit,
            tickets: BTreeSet::new(),
            attachments: record.attachments.into_iter().collect(),
            dirty: false,
        }
    }

    pub fn to_record(&self) -> RegionRecord {
        RegionRecord {
            pos: self.pos,
            payload: self.payload.clone(),
            populated: self.populated,
            fully_populated: self.fully_populated,
            lit: self.lit,
            attachments: self
                .attachments
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }

    pub fn pos(&self) -> RegionPos {
        self.pos
    }

    /// Highest tier this region satisfies.
    pub fn achieved(&self) -> Requirement {
        match (self.fully_populated, self.lit) {
            (true, true) => Requirement::Light,
            (true, false) => Requirement::Populate,
            _ => Requirement::Generate,
        }
    }

    pub fn payload(&self) -> &RegionPayload {
        &self.payload
    }

    /// Mutable access to the voxel payload; marks the region dirty.
    pub fn payload_mut(&mut self) -> &mut RegionPayload {
        self.dirty = true;
        &mut self.payload
    }

    /// Whether this region's own population step has run.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Whether every region this one depends on for population is populated.
    pub fn is_fully_populated(&self) -> bool {
        self.fully_populated
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn tickets(&self) -> impl Iterator<Item = Ticket> + '_ {
        self.tickets.iter().copied()
    }

    pub fn has_tickets(&self) -> bool {
        !self.tickets.is_empty()
    }

    pub fn has_ticket(&self, ticket: Ticket) -> bool {
        self.tickets.contains(&ticket)
    }

    /// Entity payload attached at a voxel, if any.
    pub fn attachment(&self, local: LocalPos) -> Option<&[u8]> {
        self.attachments.get(&local).map(Vec::as_slice)
    }

    pub fn attachments(&self) -> impl Iterator<Item = (LocalPos, &[u8])> + '_ {
        self.attachments.iter().map(|(l, data)| (*l, data.as_slice()))
    }

    pub fn set_attachment(&mut self, local: LocalPos, data: Vec<u8>) {
        self.dirty = true;
        self.attachments.insert(local, data);
    }

    pub fn remove_attachment(&mut self, local: LocalPos) -> Option<Vec<u8>> {
        let removed = self.attachments.remove(&local);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// A resident vertical stack of regions sharing one x/z.
#[derive(Debug, Clone)]
pub struct Column {
    pub(crate) pos: ColumnPos,
    pub(crate) heights: ColumnPayload,
    pub(crate) regions: BTreeSet<i32>,
    pub(crate) unloaded: bool,
    pub(crate) dirty: bool,
}

impl Column {
    pub fn new(pos: ColumnPos, heights: ColumnPayload) -> Self {
        Self {
            pos,
            heights,
            regions: BTreeSet::new(),
            unloaded: false,
            dirty: true,
        }
    }

    pub fn from_record(record: ColumnRecord) -> Self {
        Self {
            pos: record.pos,
            heights: record.heights,
            regions: BTreeSet::new(),
            unloaded: false,
            dirty: false,
        }
    }

    pub fn to_record(&self) -> ColumnRecord {
        ColumnRecord {
            pos: self.pos,
            heights: self.heights.clone(),
        }
    }

    pub fn pos(&self) -> ColumnPos {
        self.pos
    }

    pub fn heights(&self) -> &ColumnPayload {
        &self.heights
    }

    /// Mutable access to the height data; marks the column dirty.
    pub fn heights_mut(&mut self) -> &mut ColumnPayload {
        self.dirty = true;
        &mut self.heights
    }

    /// Y coordinates of the resident regions owned by this column.
    pub fn region_ys(&self) -> impl Iterator<Item = i32> + '_ {
        self.regions.iter().copied()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn has_region(&self, y: i32) -> bool {
        self.regions.contains(&y)
    }

    /// Set once the column has been swept out of memory.
    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn attach_region(&mut self, y: i32) {
        let inserted = self.regions.insert(y);
        assert!(inserted, "column {} already owns region y={y}", self.pos);
    }

    pub(crate) fn detach_region(&mut self, y: i32) {
        self.regions.remove(&y);
    }
}

/// Persisted form of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub pos: RegionPos,
    pub payload: RegionPayload,
    pub populated: bool,
    pub fully_populated: bool,
    pub lit: bool,
    pub attachments: Vec<(LocalPos, Vec<u8>)>,
}

/// Persisted form of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub pos: ColumnPos,
    pub heights: ColumnPayload,
}
