use serde::{Deserialize, Serialize};
use strata_common::{ColumnPos, LocalColumnPos, LocalPos, RegionPos, SubscriberId};
use strata_world::{Column, ColumnPayload, Region, RegionPayload};

/// Entity payloads attached to voxel positions.
pub type Attachments = Vec<(LocalPos, Vec<u8>)>;

/// Messages emitted to subscribers. Framing and encoding are left to the
/// transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outbound {
    FullRegionSnapshot {
        pos: RegionPos,
        payload: RegionPayload,
        attachments: Attachments,
    },
    RegionUnload {
        pos: RegionPos,
    },
    RegionDeltaChanges {
        pos: RegionPos,
        changes: Vec<LocalPos>,
        attachments: Attachments,
    },
    RegionSingleChange {
        pos: RegionPos,
        local: LocalPos,
        attachment: Option<Vec<u8>>,
    },
    FullColumnSnapshot {
        pos: ColumnPos,
        heights: ColumnPayload,
    },
    ColumnUnload {
        pos: ColumnPos,
    },
    ColumnHeightDeltas {
        pos: ColumnPos,
        changes: Vec<LocalColumnPos>,
    },
}

impl Outbound {
    pub(crate) fn region_snapshot(region: &Region) -> Self {
        Outbound::FullRegionSnapshot {
            pos: region.pos(),
            payload: region.payload().clone(),
            attachments: region_attachments(region, None),
        }
    }

    pub(crate) fn column_snapshot(column: &Column) -> Self {
        Outbound::FullColumnSnapshot {
            pos: column.pos(),
            heights: column.heights().clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::FullRegionSnapshot { .. } => "full_region",
            Outbound::RegionUnload { .. } => "region_unload",
            Outbound::RegionDeltaChanges { .. } => "region_delta",
            Outbound::RegionSingleChange { .. } => "region_single",
            Outbound::FullColumnSnapshot { .. } => "full_column",
            Outbound::ColumnUnload { .. } => "column_unload",
            Outbound::ColumnHeightDeltas { .. } => "column_heights",
        }
    }
}

/// Attachments of a region, optionally restricted to some positions.
pub(crate) fn region_attachments(region: &Region, only: Option<&[LocalPos]>) -> Attachments {
    match only {
        Some(positions) => positions
            .iter()
            .filter_map(|l| region.attachment(*l).map(|data| (*l, data.to_vec())))
            .collect(),
        None => region
            .attachments()
            .map(|(l, data)| (l, data.to_vec()))
            .collect(),
    }
}

/// One message addressed to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: SubscriberId,
    pub message: Outbound,
}

/// Messages queued for transport, drained by the host once per tick.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    pub fn send(&mut self, to: SubscriberId, message: Outbound) {
        self.deliveries.push(Delivery { to, message });
    }

    pub fn broadcast(&mut self, to: impl IntoIterator<Item = SubscriberId>, message: Outbound) {
        for id in to {
            self.send(id, message.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_carries_attachments() {
        let mut region = Region::new(RegionPos::new(1, 2, 3), RegionPayload(vec![4]));
        region.set_attachment(LocalPos::new(1, 0, 0), vec![8]);
        let Outbound::FullRegionSnapshot { pos, payload, attachments } =
            Outbound::region_snapshot(&region)
        else {
            panic!("expected a snapshot");
        };
        assert_eq!(pos, RegionPos::new(1, 2, 3));
        assert_eq!(payload, RegionPayload(vec![4]));
        assert_eq!(attachments, vec![(LocalPos::new(1, 0, 0), vec![8])]);
    }

    #[test]
    fn attachments_filtered_by_position() {
        let mut region = Region::new(RegionPos::new(0, 0, 0), RegionPayload::default());
        region.set_attachment(LocalPos::new(1, 0, 0), vec![1]);
        region.set_attachment(LocalPos::new(2, 0, 0), vec![2]);
        let only = [LocalPos::new(2, 0, 0), LocalPos::new(3, 0, 0)];
        assert_eq!(
            region_attachments(&region, Some(&only)),
            vec![(LocalPos::new(2, 0, 0), vec![2])]
        );
    }

    #[test]
    fn outbox_broadcast_and_drain() {
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        outbox.broadcast([a, b], Outbound::ColumnUnload { pos: ColumnPos::new(0, 0) });
        assert_eq!(outbox.len(), 2);
        let drained = outbox.drain();
        assert_eq!(drained[0].to, a);
        assert_eq!(drained[1].message.kind(), "column_unload");
        assert!(outbox.is_empty());
    }
}
