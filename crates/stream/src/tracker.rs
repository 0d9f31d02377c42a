use std::collections::BTreeSet;

use strata_common::{ColumnPos, LocalColumnPos, LocalPos, RegionPos, Requirement, SubscriberId};
use strata_world::{AsyncFetch, RegionProvider, RequestId, Ticket};

use crate::buffer::{ChangeBuffer, Pending};
use crate::message::{Outbound, Outbox, region_attachments};

/// Issue an asynchronous fetch and keep its id if it did not resolve at once.
fn pending_of(fetch: AsyncFetch) -> Option<RequestId> {
    match fetch {
        AsyncFetch::Pending(id) => Some(id),
        AsyncFetch::Ready(_) => None,
    }
}

/// Per-region bookkeeping of who watches it and what they have been sent.
#[derive(Debug)]
pub struct RegionTracker {
    pos: RegionPos,
    subscribers: Vec<SubscriberId>,
    requested: Option<Requirement>,
    pending: Option<RequestId>,
    ready: bool,
    /// Subscribers holding some full snapshot of the region.
    received: BTreeSet<SubscriberId>,
    /// Subscribers holding a snapshot taken at the current tier.
    current: BTreeSet<SubscriberId>,
    changes: ChangeBuffer<LocalPos>,
    holds_ticket: bool,
    pub(crate) in_generation: bool,
    pub(crate) in_send: bool,
}

impl RegionTracker {
    pub(crate) fn new(pos: RegionPos, capacity: usize) -> Self {
        Self {
            pos,
            subscribers: Vec::new(),
            requested: None,
            pending: None,
            ready: false,
            received: BTreeSet::new(),
            current: BTreeSet::new(),
            changes: ChangeBuffer::new(capacity),
            holds_ticket: false,
            in_generation: false,
            in_send: false,
        }
    }

    pub fn pos(&self) -> RegionPos {
        self.pos
    }

    pub fn subscribers(&self) -> &[SubscriberId] {
        &self.subscribers
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.contains(&id)
    }

    /// Highest tier any subscriber has asked for.
    pub fn requested(&self) -> Option<Requirement> {
        self.requested
    }

    pub fn pending(&self) -> Option<RequestId> {
        self.pending
    }

    /// Whether the region is resident at the requested tier.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_received(&self, id: SubscriberId) -> bool {
        self.received.contains(&id)
    }

    pub fn change_count(&self) -> usize {
        self.changes.count()
    }

    pub(crate) fn add_subscriber(
        &mut self,
        id: SubscriberId,
        req: Requirement,
        provider: &mut RegionProvider,
    ) {
        assert!(
            !self.has_subscriber(id),
            "subscriber {id} already watches region {}",
            self.pos
        );
        self.subscribers.push(id);
        self.raise(req, provider);
    }

    /// Raise the requested tier. Tiers are never lowered.
    pub(crate) fn raise(&mut self, req: Requirement, provider: &mut RegionProvider) {
        let previous = self.requested;
        if previous.is_some_and(|p| p >= req) {
            return;
        }
        self.requested = Some(req);
        self.current.clear();
        if provider.is_available(self.pos, req) {
            self.settle(provider);
            return;
        }

        self.ready = false;
        // Store reads never go past Load; higher tiers are reached by
        // budgeted generation on the owner thread.
        let fetch = req.min(Requirement::Load);
        if let Some(id) = self.pending {
            if previous.is_some_and(|p| p >= Requirement::Load) {
                return;
            }
            provider.cancel(id);
        }
        self.pending = pending_of(provider.get_region_async(self.pos, fetch));
    }

    /// Whether the tracker is still short of its requested tier.
    pub(crate) fn wants_progress(&self) -> bool {
        !self.ready && self.requested.is_some()
    }

    /// Whether reaching the requested tier may run the generator.
    pub(crate) fn can_generate(&self) -> bool {
        self.requested.is_some_and(Requirement::allows_generation)
    }

    /// Look again for a region this tracker may not generate, reading the
    /// store again when no read is outstanding. Returns true if the tracker
    /// became ready.
    pub(crate) fn poll(&mut self, provider: &mut RegionProvider) -> bool {
        let Some(req) = self.requested else {
            return false;
        };
        if provider.is_available(self.pos, req) {
            if let Some(id) = self.pending.take() {
                provider.cancel(id);
            }
            self.settle(provider);
            return true;
        }
        if self.pending.is_none() && req >= Requirement::Load {
            self.pending = pending_of(provider.get_region_async(self.pos, Requirement::Load));
        }
        false
    }

    /// Whether some subscriber lacks a snapshot at the current tier.
    pub(crate) fn wants_send(&self) -> bool {
        self.ready && self.subscribers.iter().any(|s| !self.current.contains(s))
    }

    /// Bring the region up to the requested tier synchronously. Returns
    /// true if the tracker became ready.
    pub(crate) fn generate(&mut self, provider: &mut RegionProvider) -> bool {
        let Some(req) = self.requested else {
            return false;
        };
        if provider.get_region(self.pos, req).is_none() {
            return false;
        }
        if let Some(id) = self.pending.take() {
            provider.cancel(id);
        }
        self.settle(provider);
        true
    }

    /// Apply a provider completion. Stale ids are ignored and return false.
    pub(crate) fn on_completion(&mut self, id: RequestId, provider: &mut RegionProvider) -> bool {
        if self.pending != Some(id) {
            return false;
        }
        self.pending = None;
        if self
            .requested
            .is_some_and(|req| provider.is_available(self.pos, req))
        {
            self.settle(provider);
        }
        true
    }

    fn settle(&mut self, provider: &mut RegionProvider) {
        self.ready = true;
        if !self.holds_ticket {
            self.holds_ticket = provider.add_ticket(self.pos, Ticket::Interest);
        }
    }

    /// Send full snapshots to subscribers that lack one at the current tier,
    /// skipping those whose column has not been delivered yet. Returns true
    /// once every subscriber is current.
    pub(crate) fn deliver(
        &mut self,
        provider: &RegionProvider,
        outbox: &mut Outbox,
        column_delivered: impl Fn(SubscriberId) -> bool,
    ) -> bool {
        if !self.ready {
            return false;
        }
        let Some(region) = provider.region(self.pos) else {
            return false;
        };
        if self.current.is_empty() {
            // A full snapshot supersedes anything buffered so far.
            self.changes.clear();
        }
        let mut complete = true;
        for &id in &self.subscribers {
            if self.current.contains(&id) {
                continue;
            }
            if !column_delivered(id) {
                complete = false;
                continue;
            }
            outbox.send(id, Outbound::region_snapshot(region));
            self.received.insert(id);
            self.current.insert(id);
        }
        complete
    }

    /// Returns true when the last subscriber left and the tracker should be
    /// dropped.
    pub(crate) fn remove_subscriber(
        &mut self,
        id: SubscriberId,
        provider: &mut RegionProvider,
        outbox: &mut Outbox,
    ) -> bool {
        let Some(index) = self.subscribers.iter().position(|s| *s == id) else {
            panic!("subscriber {id} does not watch region {}", self.pos);
        };
        self.subscribers.remove(index);
        self.current.remove(&id);
        if self.received.remove(&id) {
            outbox.send(id, Outbound::RegionUnload { pos: self.pos });
        }
        if !self.subscribers.is_empty() {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            provider.cancel(pending);
        }
        if self.holds_ticket {
            provider.remove_ticket(self.pos, Ticket::Interest);
            self.holds_ticket = false;
        }
        true
    }

    /// Buffer a voxel change. Returns true on the first change since the
    /// last flush.
    pub(crate) fn on_change(&mut self, local: LocalPos) -> bool {
        self.ready && self.changes.track(local)
    }

    /// Send buffered changes to subscribers that hold a snapshot. Returns
    /// true if a message went out.
    pub(crate) fn flush(&mut self, provider: &RegionProvider, outbox: &mut Outbox) -> bool {
        let Some(region) = provider.region(self.pos) else {
            self.changes.clear();
            return false;
        };
        let pos = self.pos;
        let message = match self.changes.pending() {
            Pending::Empty => None,
            Pending::Single(local) => Some(Outbound::RegionSingleChange {
                pos,
                local,
                attachment: region.attachment(local).map(<[u8]>::to_vec),
            }),
            Pending::Batch(changes) => Some(Outbound::RegionDeltaChanges {
                pos,
                changes: changes.to_vec(),
                attachments: region_attachments(region, Some(changes)),
            }),
            Pending::Overflow => Some(Outbound::region_snapshot(region)),
        };
        self.changes.clear();
        let Some(message) = message else {
            return false;
        };
        let to: Vec<_> = self
            .subscribers
            .iter()
            .copied()
            .filter(|s| self.received.contains(s))
            .collect();
        outbox.broadcast(to, message);
        true
    }
}

/// Span of region Ys one subscriber watches in a column.
#[derive(Debug, Clone, Copy)]
struct ColumnView {
    subscriber: SubscriberId,
    min_y: i32,
    max_y: i32,
}

/// What happened to a column tracker after a region left a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRemoval {
    /// The subscriber still watches other regions of the column.
    Kept,
    /// The subscriber left the column; others remain.
    Left,
    /// No subscriber is left; the tracker should be dropped.
    Emptied,
}

/// Per-column bookkeeping: who watches which vertical span.
#[derive(Debug)]
pub struct ColumnTracker {
    pos: ColumnPos,
    views: Vec<ColumnView>,
    requested: Option<Requirement>,
    pending: Option<RequestId>,
    ready: bool,
    delivered: BTreeSet<SubscriberId>,
    changes: ChangeBuffer<LocalColumnPos>,
}

impl ColumnTracker {
    pub(crate) fn new(pos: ColumnPos, capacity: usize) -> Self {
        Self {
            pos,
            views: Vec::new(),
            requested: None,
            pending: None,
            ready: false,
            delivered: BTreeSet::new(),
            changes: ChangeBuffer::new(capacity),
        }
    }

    pub fn pos(&self) -> ColumnPos {
        self.pos
    }

    pub fn subscribers(&self) -> impl Iterator<Item = SubscriberId> + '_ {
        self.views.iter().map(|v| v.subscriber)
    }

    /// Inclusive region Y span watched by a subscriber.
    pub fn span(&self, id: SubscriberId) -> Option<(i32, i32)> {
        self.views
            .iter()
            .find(|v| v.subscriber == id)
            .map(|v| (v.min_y, v.max_y))
    }

    pub fn requested(&self) -> Option<Requirement> {
        self.requested
    }

    pub fn pending(&self) -> Option<RequestId> {
        self.pending
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_delivered(&self, id: SubscriberId) -> bool {
        self.delivered.contains(&id)
    }

    /// Record that `id` watches region `y` of this column.
    pub(crate) fn add_region(
        &mut self,
        id: SubscriberId,
        y: i32,
        req: Requirement,
        provider: &mut RegionProvider,
        outbox: &mut Outbox,
    ) {
        match self.views.iter_mut().find(|v| v.subscriber == id) {
            Some(view) => {
                view.min_y = view.min_y.min(y);
                view.max_y = view.max_y.max(y);
            }
            None => self.views.push(ColumnView {
                subscriber: id,
                min_y: y,
                max_y: y,
            }),
        }
        self.raise(req, provider);
        self.deliver(provider, outbox);
    }

    pub(crate) fn raise(&mut self, req: Requirement, provider: &mut RegionProvider) {
        let previous = self.requested;
        if previous.is_some_and(|p| p >= req) {
            return;
        }
        self.requested = Some(req);
        if self.ready {
            return;
        }
        if let Some(id) = self.pending {
            let same_reach =
                previous.is_some_and(|p| p.allows_generation() == req.allows_generation());
            if same_reach {
                return;
            }
            provider.cancel(id);
        }
        match provider.get_column_async(self.pos, req) {
            AsyncFetch::Ready(available) => {
                self.pending = None;
                self.ready = available;
            }
            AsyncFetch::Pending(id) => self.pending = Some(id),
        }
    }

    pub(crate) fn on_completion(&mut self, id: RequestId, provider: &RegionProvider) -> bool {
        if self.pending != Some(id) {
            return false;
        }
        self.pending = None;
        self.ready = provider.column(self.pos).is_some();
        true
    }

    /// Look again for a column that is not ready, reading the store again
    /// when no read is outstanding.
    pub(crate) fn poll(&mut self, provider: &mut RegionProvider, outbox: &mut Outbox) {
        if self.ready {
            return;
        }
        if provider.column(self.pos).is_some() {
            self.sync(provider, outbox);
            return;
        }
        let Some(req) = self.requested.filter(|r| *r >= Requirement::Load) else {
            return;
        };
        if self.pending.is_none() {
            self.pending = pending_of(provider.get_column_async(self.pos, req));
        }
    }

    /// Notice a column made resident by some other path, such as a region
    /// generated synchronously.
    pub(crate) fn sync(&mut self, provider: &mut RegionProvider, outbox: &mut Outbox) {
        if self.ready || provider.column(self.pos).is_none() {
            return;
        }
        if let Some(id) = self.pending.take() {
            provider.cancel(id);
        }
        self.ready = true;
        self.deliver(provider, outbox);
    }

    /// Send the column snapshot to every subscriber that lacks it.
    pub(crate) fn deliver(&mut self, provider: &RegionProvider, outbox: &mut Outbox) {
        if !self.ready {
            return;
        }
        let Some(column) = provider.column(self.pos) else {
            return;
        };
        if self.delivered.is_empty() {
            self.changes.clear();
        }
        for view in &self.views {
            if self.delivered.insert(view.subscriber) {
                outbox.send(view.subscriber, Outbound::column_snapshot(column));
            }
        }
    }

    /// Forget region `y` for `id`. `watched` reports whether the subscriber
    /// still watches a given Y of this column.
    pub(crate) fn remove_region(
        &mut self,
        id: SubscriberId,
        y: i32,
        watched: impl Fn(i32) -> bool,
        provider: &mut RegionProvider,
        outbox: &mut Outbox,
    ) -> ColumnRemoval {
        let Some(index) = self.views.iter().position(|v| v.subscriber == id) else {
            panic!("subscriber {id} does not watch column {}", self.pos);
        };
        let view = &mut self.views[index];
        if y == view.min_y {
            view.min_y += 1;
            while view.min_y <= view.max_y && !watched(view.min_y) {
                view.min_y += 1;
            }
        }
        if y == view.max_y {
            view.max_y -= 1;
            while view.max_y >= view.min_y && !watched(view.max_y) {
                view.max_y -= 1;
            }
        }
        if view.min_y <= view.max_y {
            return ColumnRemoval::Kept;
        }

        self.views.remove(index);
        if self.delivered.remove(&id) {
            outbox.send(id, Outbound::ColumnUnload { pos: self.pos });
        }
        if !self.views.is_empty() {
            return ColumnRemoval::Left;
        }
        if let Some(pending) = self.pending.take() {
            provider.cancel(pending);
        }
        ColumnRemoval::Emptied
    }

    pub(crate) fn on_change(&mut self, local: LocalColumnPos) -> bool {
        self.ready && self.changes.track(local)
    }

    pub(crate) fn flush(&mut self, provider: &RegionProvider, outbox: &mut Outbox) -> bool {
        let Some(column) = provider.column(self.pos) else {
            self.changes.clear();
            return false;
        };
        let message = match self.changes.pending() {
            Pending::Empty => None,
            Pending::Single(local) => Some(Outbound::ColumnHeightDeltas {
                pos: self.pos,
                changes: vec![local],
            }),
            Pending::Batch(changes) => Some(Outbound::ColumnHeightDeltas {
                pos: self.pos,
                changes: changes.to_vec(),
            }),
            Pending::Overflow => Some(Outbound::column_snapshot(column)),
        };
        self.changes.clear();
        let Some(message) = message else {
            return false;
        };
        let to: Vec<_> = self
            .subscribers()
            .filter(|s| self.delivered.contains(s))
            .collect();
        outbox.broadcast(to, message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use strata_world::{FlatGenerator, MemoryStore, NullLighting, ProviderConfig};

    fn provider() -> (RegionProvider, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let provider = RegionProvider::new(
            ProviderConfig {
                io_threads: 1,
                ..ProviderConfig::default()
            },
            Box::new(FlatGenerator::new(0)),
            Box::new(NullLighting),
            store.clone(),
        );
        (provider, store)
    }

    fn settle_region(tracker: &mut RegionTracker, provider: &mut RegionProvider) {
        for _ in 0..200 {
            let Some(id) = tracker.pending() else {
                return;
            };
            for completion in provider.wait_completions(Duration::from_millis(25)) {
                if completion.id == id {
                    tracker.on_completion(id, provider);
                }
            }
        }
        panic!("region request never completed");
    }

    const ORIGIN: RegionPos = RegionPos { x: 0, y: 0, z: 0 };

    #[test]
    fn resident_region_is_ready_at_once() {
        let (mut p, _store) = provider();
        p.get_region(ORIGIN, Requirement::Generate).unwrap();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        let a = SubscriberId::new();
        tracker.add_subscriber(a, Requirement::Generate, &mut p);
        assert!(tracker.is_ready());
        assert!(tracker.pending().is_none());
        assert!(p.region(ORIGIN).unwrap().has_ticket(Ticket::Interest));

        let mut outbox = Outbox::default();
        assert!(tracker.deliver(&p, &mut outbox, |_| true));
        assert_eq!(outbox.len(), 1);
        assert!(tracker.has_received(a));
        assert!(!tracker.wants_send());
    }

    #[test]
    fn missing_region_waits_for_generation() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        tracker.add_subscriber(SubscriberId::new(), Requirement::Populate, &mut p);
        assert!(!tracker.is_ready());
        assert!(tracker.pending().is_some());
        assert!(tracker.wants_progress());
        assert!(tracker.can_generate());

        settle_region(&mut tracker, &mut p);
        assert!(!tracker.is_ready());
        assert!(tracker.wants_progress());
        assert!(tracker.generate(&mut p));
        assert!(tracker.is_ready());
        assert_eq!(p.region(ORIGIN).unwrap().achieved(), Requirement::Populate);
    }

    #[test]
    fn load_only_region_is_picked_up_once_resident() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        tracker.add_subscriber(SubscriberId::new(), Requirement::Load, &mut p);
        settle_region(&mut tracker, &mut p);
        assert!(!tracker.is_ready());
        assert!(tracker.wants_progress());
        assert!(!tracker.can_generate());

        assert!(!tracker.poll(&mut p));
        assert!(tracker.pending().is_some());

        p.get_region(ORIGIN, Requirement::Generate).unwrap();
        assert!(tracker.poll(&mut p));
        assert!(tracker.is_ready());
        assert!(tracker.pending().is_none());
        assert!(!tracker.wants_progress());
        assert!(p.region(ORIGIN).unwrap().has_ticket(Ticket::Interest));
    }

    #[test]
    fn stale_completion_is_ignored() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        tracker.add_subscriber(SubscriberId::new(), Requirement::Load, &mut p);
        let Some(id) = tracker.pending() else {
            panic!("expected a pending fetch");
        };
        let unrelated = {
            let AsyncFetch::Pending(other) = p.get_column_async(ColumnPos::new(9, 9), Requirement::Load)
            else {
                panic!("expected a pending fetch");
            };
            other
        };
        assert!(!tracker.on_completion(unrelated, &mut p));
        assert_eq!(tracker.pending(), Some(id));
    }

    #[test]
    #[should_panic]
    fn duplicate_subscriber_panics() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        let a = SubscriberId::new();
        tracker.add_subscriber(a, Requirement::Load, &mut p);
        tracker.add_subscriber(a, Requirement::Load, &mut p);
    }

    #[test]
    #[should_panic]
    fn removing_absent_subscriber_panics() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        tracker.remove_subscriber(SubscriberId::new(), &mut p, &mut Outbox::default());
    }

    #[test]
    fn last_removal_releases_ticket_and_request() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        tracker.add_subscriber(a, Requirement::Generate, &mut p);
        tracker.add_subscriber(b, Requirement::Generate, &mut p);
        let Some(id) = tracker.pending() else {
            panic!("expected a pending fetch");
        };

        assert!(!tracker.remove_subscriber(a, &mut p, &mut outbox));
        assert_eq!(tracker.pending(), Some(id));
        assert!(outbox.is_empty());

        assert!(tracker.remove_subscriber(b, &mut p, &mut outbox));
        assert!(tracker.pending().is_none());
        assert!(!p.cancel(id));
    }

    #[test]
    fn unload_only_after_snapshot() {
        let (mut p, _store) = provider();
        p.get_region(ORIGIN, Requirement::Generate).unwrap();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        tracker.add_subscriber(a, Requirement::Generate, &mut p);
        tracker.add_subscriber(b, Requirement::Generate, &mut p);
        assert!(!tracker.deliver(&p, &mut outbox, |s| s == a));
        outbox.drain();

        tracker.remove_subscriber(b, &mut p, &mut outbox);
        assert!(outbox.is_empty());
        assert!(tracker.remove_subscriber(a, &mut p, &mut outbox));
        let sent = outbox.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, Outbound::RegionUnload { pos: ORIGIN });
        assert!(!p.region(ORIGIN).unwrap().has_tickets());
    }

    #[test]
    fn raising_tier_resends_snapshot() {
        let (mut p, _store) = provider();
        p.get_region(ORIGIN, Requirement::Light).unwrap();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        tracker.add_subscriber(a, Requirement::Generate, &mut p);
        tracker.deliver(&p, &mut outbox, |_| true);
        tracker.raise(Requirement::Load, &mut p);
        assert!(!tracker.wants_send());
        tracker.raise(Requirement::Light, &mut p);
        assert_eq!(tracker.requested(), Some(Requirement::Light));
        assert!(tracker.wants_send());
    }

    #[test]
    fn flush_picks_message_by_count() {
        let (mut p, _store) = provider();
        let region = p.get_region(ORIGIN, Requirement::Generate).unwrap();
        region.set_attachment(LocalPos::new(1, 1, 1), vec![7]);
        let mut tracker = RegionTracker::new(ORIGIN, 2);
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        tracker.add_subscriber(a, Requirement::Generate, &mut p);
        tracker.deliver(&p, &mut outbox, |_| true);
        outbox.drain();

        assert!(tracker.on_change(LocalPos::new(1, 1, 1)));
        assert!(tracker.flush(&p, &mut outbox));
        assert_eq!(
            outbox.drain()[0].message,
            Outbound::RegionSingleChange {
                pos: ORIGIN,
                local: LocalPos::new(1, 1, 1),
                attachment: Some(vec![7]),
            }
        );

        tracker.on_change(LocalPos::new(0, 0, 0));
        tracker.on_change(LocalPos::new(1, 1, 1));
        tracker.flush(&p, &mut outbox);
        let Outbound::RegionDeltaChanges { changes, attachments, .. } = &outbox.drain()[0].message
        else {
            panic!("expected a delta");
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(attachments, &vec![(LocalPos::new(1, 1, 1), vec![7])]);

        for x in 0..3 {
            tracker.on_change(LocalPos::new(x, 0, 0));
        }
        assert_eq!(tracker.change_count(), crate::buffer::OVERFLOW);
        tracker.flush(&p, &mut outbox);
        assert_eq!(outbox.drain()[0].message.kind(), "full_region");
        assert!(!tracker.flush(&p, &mut outbox));
    }

    #[test]
    fn changes_ignored_until_ready() {
        let (mut p, _store) = provider();
        let mut tracker = RegionTracker::new(ORIGIN, 4);
        tracker.add_subscriber(SubscriberId::new(), Requirement::Generate, &mut p);
        assert!(!tracker.on_change(LocalPos::new(0, 0, 0)));
        assert_eq!(tracker.change_count(), 0);
    }

    #[test]
    fn column_span_shrinks_from_ends() {
        let (mut p, _store) = provider();
        let col = ColumnPos::new(0, 0);
        p.get_column(col, Requirement::Generate).unwrap();
        let mut tracker = ColumnTracker::new(col, 4);
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        for y in -1..=2 {
            tracker.add_region(a, y, Requirement::Generate, &mut p, &mut outbox);
        }
        assert!(tracker.is_ready());
        assert_eq!(outbox.len(), 1);
        assert_eq!(tracker.span(a), Some((-1, 2)));

        let mut watched: BTreeSet<i32> = (-1..=2).collect();
        let mut remove = |y: i32, tracker: &mut ColumnTracker, p: &mut RegionProvider, outbox: &mut Outbox| {
            watched.remove(&y);
            let still = watched.clone();
            tracker.remove_region(a, y, |y| still.contains(&y), p, outbox)
        };
        assert_eq!(remove(0, &mut tracker, &mut p, &mut outbox), ColumnRemoval::Kept);
        assert_eq!(tracker.span(a), Some((-1, 2)));
        assert_eq!(remove(-1, &mut tracker, &mut p, &mut outbox), ColumnRemoval::Kept);
        assert_eq!(tracker.span(a), Some((1, 2)));
        assert_eq!(remove(2, &mut tracker, &mut p, &mut outbox), ColumnRemoval::Kept);
        assert_eq!(tracker.span(a), Some((1, 1)));
        assert_eq!(remove(1, &mut tracker, &mut p, &mut outbox), ColumnRemoval::Emptied);
        assert_eq!(outbox.drain().last().unwrap().message, Outbound::ColumnUnload { pos: col });
    }

    #[test]
    fn column_removal_keeps_other_subscribers() {
        let (mut p, _store) = provider();
        let col = ColumnPos::new(0, 0);
        let mut tracker = ColumnTracker::new(col, 4);
        let mut outbox = Outbox::default();
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        tracker.add_region(a, 0, Requirement::Load, &mut p, &mut outbox);
        tracker.add_region(b, 0, Requirement::Load, &mut p, &mut outbox);
        assert!(tracker.pending().is_some());
        assert_eq!(
            tracker.remove_region(a, 0, |_| false, &mut p, &mut outbox),
            ColumnRemoval::Left
        );
        assert!(outbox.is_empty());
        assert!(tracker.pending().is_some());
        assert_eq!(
            tracker.remove_region(b, 0, |_| false, &mut p, &mut outbox),
            ColumnRemoval::Emptied
        );
        assert!(tracker.pending().is_none());
    }

    #[test]
    fn column_sync_after_region_generation() {
        let (mut p, _store) = provider();
        let col = ColumnPos::new(0, 0);
        let mut tracker = ColumnTracker::new(col, 4);
        let mut outbox = Outbox::default();
        tracker.add_region(SubscriberId::new(), 0, Requirement::Generate, &mut p, &mut outbox);
        assert!(!tracker.is_ready());
        p.get_region(ORIGIN, Requirement::Generate).unwrap();
        tracker.sync(&mut p, &mut outbox);
        assert!(tracker.is_ready());
        assert!(tracker.pending().is_none());
        assert_eq!(outbox.drain()[0].message.kind(), "full_column");
    }

    #[test]
    fn load_only_column_is_picked_up_once_resident() {
        let (mut p, _store) = provider();
        let col = ColumnPos::new(0, 0);
        let mut tracker = ColumnTracker::new(col, 4);
        let mut outbox = Outbox::default();
        tracker.add_region(SubscriberId::new(), 0, Requirement::Load, &mut p, &mut outbox);
        for _ in 0..200 {
            let Some(id) = tracker.pending() else {
                break;
            };
            for completion in p.wait_completions(Duration::from_millis(25)) {
                if completion.id == id {
                    tracker.on_completion(id, &p);
                }
            }
        }
        assert!(!tracker.is_ready());
        assert!(tracker.pending().is_none());

        tracker.poll(&mut p, &mut outbox);
        assert!(tracker.pending().is_some());
        assert!(outbox.is_empty());

        p.get_column(col, Requirement::Generate).unwrap();
        tracker.poll(&mut p, &mut outbox);
        assert!(tracker.is_ready());
        assert!(tracker.pending().is_none());
        assert_eq!(outbox.drain()[0].message.kind(), "full_column");
    }

    #[test]
    fn column_flush_overflows_to_snapshot() {
        let (mut p, _store) = provider();
        let col = ColumnPos::new(0, 0);
        p.get_column(col, Requirement::Generate).unwrap();
        let mut tracker = ColumnTracker::new(col, 2);
        let mut outbox = Outbox::default();
        tracker.add_region(SubscriberId::new(), 0, Requirement::Generate, &mut p, &mut outbox);
        outbox.drain();

        assert!(tracker.on_change(LocalColumnPos::new(1, 1)));
        tracker.flush(&p, &mut outbox);
        assert_eq!(
            outbox.drain()[0].message,
            Outbound::ColumnHeightDeltas {
                pos: col,
                changes: vec![LocalColumnPos::new(1, 1)],
            }
        );
        for x in 0..3 {
            tracker.on_change(LocalColumnPos::new(x, 0));
        }
        tracker.flush(&p, &mut outbox);
        assert_eq!(outbox.drain()[0].message.kind(), "full_column");
    }
}
