use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use glam::{IVec3, Vec3};
use strata_common::{
    ColumnPos, LocalColumnPos, LocalPos, RegionPos, Requirement, SpatialIndex, SubscriberId,
};
use strata_world::{Completion, FetchTarget, RegionProvider};

use crate::budget::{TickStats, TickTimer};
use crate::config::{ConfigError, InterestConfig};
use crate::message::{Delivery, Outbox};
use crate::tracker::{ColumnRemoval, ColumnTracker, RegionTracker};
use crate::view::ViewFormula;

/// A party that wants the world around a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub position: Vec3,
    pub requirement: Requirement,
}

impl Subscriber {
    pub fn new(position: Vec3) -> Self {
        Self {
            id: SubscriberId::new(),
            position,
            requirement: Requirement::default(),
        }
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct SubscriberState {
    position: Vec3,
    requirement: Requirement,
    view: ViewFormula,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushKey {
    Region(RegionPos),
    Column(ColumnPos),
}

/// Decides which regions and columns each subscriber needs, drives the
/// provider to produce them, and queues what must be sent.
///
/// All state is owned by one thread. Store reads run on the provider's
/// workers; everything else happens inside [`InterestManager::update`] or
/// the subscriber calls.
pub struct InterestManager {
    config: InterestConfig,
    provider: RegionProvider,
    subscribers: BTreeMap<SubscriberId, SubscriberState>,
    regions: SpatialIndex<RegionPos, RegionTracker>,
    columns: SpatialIndex<ColumnPos, ColumnTracker>,
    generation_queue: Vec<RegionPos>,
    send_queue: Vec<RegionPos>,
    pending_flush: Vec<FlushKey>,
    sort_generation: bool,
    sort_send: bool,
    outbox: Outbox,
    tick: u64,
    timer: TickTimer,
    last_stats: TickStats,
}

impl InterestManager {
    pub fn new(config: InterestConfig, provider: RegionProvider) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            subscribers: BTreeMap::new(),
            regions: SpatialIndex::default(),
            columns: SpatialIndex::default(),
            generation_queue: Vec::new(),
            send_queue: Vec::new(),
            pending_flush: Vec::new(),
            sort_generation: false,
            sort_send: false,
            outbox: Outbox::default(),
            tick: 0,
            timer: TickTimer::default(),
            last_stats: TickStats::default(),
        })
    }

    pub fn config(&self) -> &InterestConfig {
        &self.config
    }

    // --- subscribers ---

    pub fn add_subscriber(&mut self, subscriber: Subscriber) {
        let Subscriber {
            id,
            position,
            requirement,
        } = subscriber;
        assert!(
            !self.subscribers.contains_key(&id),
            "subscriber {id} added twice"
        );
        let view = ViewFormula::new(
            position,
            self.config.horizontal_radius,
            self.config.vertical_radius,
        );
        tracing::debug!(%id, center = %view.center(), "subscriber joined");
        self.subscribers.insert(
            id,
            SubscriberState {
                position,
                requirement,
                view,
            },
        );
        for pos in view.positions() {
            self.watch(id, pos, requirement);
        }
    }

    /// Returns false if the subscriber is unknown.
    pub fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        let Some(state) = self.subscribers.remove(&id) else {
            return false;
        };
        tracing::debug!(%id, "subscriber left");
        for pos in state.view.positions() {
            self.unwatch(id, pos);
        }
        true
    }

    /// Returns true if the move changed the subscriber's view.
    pub fn on_subscriber_moved(&mut self, id: SubscriberId, position: Vec3) -> bool {
        let (h, v) = (self.config.horizontal_radius, self.config.vertical_radius);
        let Some(state) = self.subscribers.get_mut(&id) else {
            return false;
        };
        state.position = position;
        match state.view.next(position, h, v) {
            Some(next) => {
                self.replace_view(id, next);
                true
            }
            None => false,
        }
    }

    /// Change the view size of every subscriber.
    pub fn set_view_radii(&mut self, horizontal: i32, vertical: i32) -> Result<(), ConfigError> {
        let config = InterestConfig {
            horizontal_radius: horizontal,
            vertical_radius: vertical,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        let ids: Vec<_> = self.subscribers.keys().copied().collect();
        for id in ids {
            let Some(state) = self.subscribers.get(&id) else {
                continue;
            };
            if let Some(next) = state.view.next(state.position, horizontal, vertical) {
                self.replace_view(id, next);
            }
        }
        Ok(())
    }

    /// Raise the tier a subscriber needs. Trackers never lower their tier, so
    /// lowering only affects regions the subscriber starts watching later.
    pub fn set_subscriber_requirement(&mut self, id: SubscriberId, requirement: Requirement) -> bool {
        let Some(state) = self.subscribers.get_mut(&id) else {
            return false;
        };
        state.requirement = requirement;
        let view = state.view;
        for pos in view.positions() {
            if let Some(column) = self.columns.get_mut(&pos.column()) {
                column.raise(requirement, &mut self.provider);
                column.deliver(&self.provider, &mut self.outbox);
            }
            if let Some(tracker) = self.regions.get_mut(&pos) {
                tracker.raise(requirement, &mut self.provider);
            }
            self.schedule(pos);
        }
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn view(&self, id: SubscriberId) -> Option<ViewFormula> {
        self.subscribers.get(&id).map(|s| s.view)
    }

    /// Whether the column's snapshot has been sent to the subscriber and not
    /// yet withdrawn.
    pub fn is_watching_column(&self, id: SubscriberId, pos: ColumnPos) -> bool {
        self.columns.get(&pos).is_some_and(|c| c.has_delivered(id))
    }

    fn replace_view(&mut self, id: SubscriberId, next: ViewFormula) {
        let Some(state) = self.subscribers.get_mut(&id) else {
            return;
        };
        let previous = state.view;
        let requirement = state.requirement;
        state.view = next;
        tracing::debug!(%id, from = %previous.center(), to = %next.center(), "view moved");
        for pos in previous.positions().filter(|p| !next.contains(*p)) {
            self.unwatch(id, pos);
        }
        for pos in next.positions().filter(|p| !previous.contains(*p)) {
            self.watch(id, pos, requirement);
        }
        self.sort_generation = true;
        self.sort_send = true;
    }

    /// Subscribe to one region: column first, then the region itself.
    fn watch(&mut self, id: SubscriberId, pos: RegionPos, requirement: Requirement) {
        let col = pos.column();
        if !self.columns.contains_key(&col) {
            tracing::trace!(%col, "column tracker created");
            self.columns
                .put(col, ColumnTracker::new(col, self.config.height_buffer_capacity));
        }
        if let Some(column) = self.columns.get_mut(&col) {
            column.add_region(id, pos.y, requirement, &mut self.provider, &mut self.outbox);
        }

        if !self.regions.contains_key(&pos) {
            tracing::trace!(%pos, "region tracker created");
            self.regions
                .put(pos, RegionTracker::new(pos, self.config.change_buffer_capacity));
        }
        let columns = &self.columns;
        if let Some(tracker) = self.regions.get_mut(&pos) {
            tracker.add_subscriber(id, requirement, &mut self.provider);
            if tracker.is_ready() {
                tracker.deliver(&self.provider, &mut self.outbox, |s| {
                    columns.get(&col).is_some_and(|c| c.has_delivered(s))
                });
            }
        }
        self.schedule(pos);
    }

    /// Unsubscribe from one region: the region first, then its column.
    fn unwatch(&mut self, id: SubscriberId, pos: RegionPos) {
        let Some(tracker) = self.regions.get_mut(&pos) else {
            panic!("subscriber {id} watches region {pos} without a tracker");
        };
        if tracker.remove_subscriber(id, &mut self.provider, &mut self.outbox) {
            tracing::trace!(%pos, "region tracker dropped");
            self.regions.remove(&pos);
            self.generation_queue.retain(|p| *p != pos);
            self.send_queue.retain(|p| *p != pos);
            self.pending_flush.retain(|k| *k != FlushKey::Region(pos));
        }

        let col = pos.column();
        let regions = &self.regions;
        let Some(column) = self.columns.get_mut(&col) else {
            panic!("subscriber {id} watches column {col} without a tracker");
        };
        let removal = column.remove_region(
            id,
            pos.y,
            |y| {
                regions
                    .get(&col.region(y))
                    .is_some_and(|t| t.has_subscriber(id))
            },
            &mut self.provider,
            &mut self.outbox,
        );
        if removal == ColumnRemoval::Emptied {
            tracing::trace!(%col, "column tracker dropped");
            self.columns.remove(&col);
            self.pending_flush.retain(|k| *k != FlushKey::Column(col));
        }
    }

    /// Put a region tracker on the queues it now belongs to.
    fn schedule(&mut self, pos: RegionPos) {
        let Some(tracker) = self.regions.get_mut(&pos) else {
            return;
        };
        if !tracker.in_generation && tracker.wants_progress() {
            tracker.in_generation = true;
            self.generation_queue.push(pos);
            self.sort_generation = true;
        }
        if !tracker.in_send && tracker.wants_send() {
            tracker.in_send = true;
            self.send_queue.push(pos);
            self.sort_send = true;
        }
    }

    // --- world changes ---

    /// Note a voxel change at a world block position.
    pub fn on_region_change(&mut self, block: IVec3) {
        let pos = RegionPos::from_block(block);
        if let Some(tracker) = self.regions.get_mut(&pos) {
            if tracker.on_change(LocalPos::from_block(block)) {
                self.pending_flush.push(FlushKey::Region(pos));
            }
        }
    }

    /// Note a height change at a world block column.
    pub fn on_height_change(&mut self, block_x: i32, block_z: i32) {
        let pos = ColumnPos::from_block(block_x, block_z);
        if let Some(column) = self.columns.get_mut(&pos) {
            if column.on_change(LocalColumnPos::from_block(block_x, block_z)) {
                self.pending_flush.push(FlushKey::Column(pos));
            }
        }
    }

    // --- tick ---

    /// Run one tick without blocking on store reads.
    pub fn update(&mut self) -> TickStats {
        let completions = self.provider.poll_completions();
        self.run_tick(completions)
    }

    /// Run one tick, first waiting up to `timeout` for a store read when
    /// none has finished yet.
    pub fn update_waiting(&mut self, timeout: Duration) -> TickStats {
        let completions = self.provider.wait_completions(timeout);
        self.run_tick(completions)
    }

    fn run_tick(&mut self, completions: Vec<Completion>) -> TickStats {
        let _span = tracing::info_span!("interest_update", tick = self.tick).entered();
        let start = Instant::now();

        let mut stats = TickStats {
            tick: self.tick,
            ..TickStats::default()
        };
        stats.completions = self.route_completions(completions);
        stats.flushed = self.flush_changes();
        self.sort_queues();
        stats.generated = self.generate();
        stats.sent = self.send();
        if self.subscribers.is_empty() {
            stats.collected = Some(self.provider.collect_garbage());
        }

        stats.pending_generation = self.generation_queue.len();
        stats.pending_send = self.send_queue.len();
        stats.region_trackers = self.regions.len();
        stats.column_trackers = self.columns.len();
        stats.tick_time = start.elapsed();
        self.timer.record(stats.tick_time);
        self.tick += 1;

        tracing::trace!(
            completions = stats.completions,
            generated = stats.generated,
            sent = stats.sent,
            pending_generation = stats.pending_generation,
            pending_send = stats.pending_send,
            "interest update complete"
        );
        self.last_stats = stats.clone();
        stats
    }

    fn route_completions(&mut self, completions: Vec<Completion>) -> usize {
        let mut routed = 0;
        for completion in completions {
            match completion.target {
                FetchTarget::Region(pos) => {
                    let Some(tracker) = self.regions.get_mut(&pos) else {
                        continue;
                    };
                    if tracker.on_completion(completion.id, &mut self.provider) {
                        routed += 1;
                        if tracker.is_ready() {
                            if let Some(column) = self.columns.get_mut(&pos.column()) {
                                column.sync(&mut self.provider, &mut self.outbox);
                            }
                        }
                        self.schedule(pos);
                    }
                }
                FetchTarget::Column(pos) => {
                    let Some(column) = self.columns.get_mut(&pos) else {
                        continue;
                    };
                    if column.on_completion(completion.id, &self.provider) {
                        routed += 1;
                        column.deliver(&self.provider, &mut self.outbox);
                    }
                }
            }
        }
        routed
    }

    fn flush_changes(&mut self) -> usize {
        let mut flushed = 0;
        for key in std::mem::take(&mut self.pending_flush) {
            let sent = match key {
                FlushKey::Region(pos) => self
                    .regions
                    .get_mut(&pos)
                    .is_some_and(|t| t.flush(&self.provider, &mut self.outbox)),
                FlushKey::Column(pos) => self
                    .columns
                    .get_mut(&pos)
                    .is_some_and(|c| c.flush(&self.provider, &mut self.outbox)),
            };
            if sent {
                flushed += 1;
            }
        }
        flushed
    }

    fn sort_queues(&mut self) {
        let interval = self.config.sort_interval;
        let phase = self.tick % interval;
        if phase == 0 && self.sort_generation {
            let queue = std::mem::take(&mut self.generation_queue);
            self.generation_queue = self.by_priority(queue);
            self.sort_generation = false;
        }
        if phase == interval / 2 && self.sort_send {
            let queue = std::mem::take(&mut self.send_queue);
            self.send_queue = self.by_priority(queue);
            self.sort_send = false;
        }
    }

    /// Order positions by squared distance to the closest subscriber
    /// watching them.
    fn by_priority(&self, queue: Vec<RegionPos>) -> Vec<RegionPos> {
        let mut keyed: Vec<(f32, RegionPos)> = queue
            .into_iter()
            .map(|pos| {
                let distance = self
                    .regions
                    .get(&pos)
                    .into_iter()
                    .flat_map(|t| t.subscribers())
                    .filter_map(|id| self.subscribers.get(id))
                    .map(|s| pos.distance_sq(s.position))
                    .fold(f32::INFINITY, f32::min);
                (distance, pos)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        keyed.into_iter().map(|(_, pos)| pos).collect()
    }

    fn generate(&mut self) -> usize {
        let deadline = Instant::now() + self.config.generation_budget();
        let max = self.config.max_generated_per_tick;
        let mut generated = 0;
        let mut keep = Vec::new();
        let mut queue = std::mem::take(&mut self.generation_queue).into_iter();
        while let Some(pos) = queue.next() {
            if generated >= max || Instant::now() >= deadline {
                keep.push(pos);
                keep.extend(queue.by_ref());
                break;
            }
            let Some(tracker) = self.regions.get_mut(&pos) else {
                continue;
            };
            if !tracker.wants_progress() {
                tracker.in_generation = false;
                continue;
            }
            if !tracker.can_generate() {
                // Regions below the generating tiers appear only when a store
                // read or some other party makes them resident.
                if tracker.poll(&mut self.provider) {
                    tracker.in_generation = false;
                    tracing::debug!(%pos, "region became available to subscribers");
                    if let Some(column) = self.columns.get_mut(&pos.column()) {
                        column.sync(&mut self.provider, &mut self.outbox);
                    }
                    self.schedule(pos);
                } else {
                    if let Some(column) = self.columns.get_mut(&pos.column()) {
                        column.poll(&mut self.provider, &mut self.outbox);
                    }
                    keep.push(pos);
                }
                continue;
            }
            if tracker.pending().is_some() || !tracker.generate(&mut self.provider) {
                keep.push(pos);
                continue;
            }
            tracker.in_generation = false;
            generated += 1;
            tracing::debug!(%pos, "region generated for subscribers");
            if let Some(column) = self.columns.get_mut(&pos.column()) {
                column.sync(&mut self.provider, &mut self.outbox);
            }
            self.schedule(pos);
        }
        self.generation_queue = keep;
        generated
    }

    fn send(&mut self) -> usize {
        let max = self.config.max_sent_per_tick;
        let mut sent = 0;
        let mut keep = Vec::new();
        let mut queue = std::mem::take(&mut self.send_queue).into_iter();
        let columns = &self.columns;
        while let Some(pos) = queue.next() {
            if sent >= max {
                keep.push(pos);
                keep.extend(queue.by_ref());
                break;
            }
            let Some(tracker) = self.regions.get_mut(&pos) else {
                continue;
            };
            if !tracker.is_ready() {
                tracker.in_send = false;
                continue;
            }
            let col = pos.column();
            let done = tracker.deliver(&self.provider, &mut self.outbox, |s| {
                columns.get(&col).is_some_and(|c| c.has_delivered(s))
            });
            if done {
                tracker.in_send = false;
                sent += 1;
            } else {
                keep.push(pos);
            }
        }
        self.send_queue = keep;
        sent
    }

    // --- inspection ---

    /// Take every message queued since the last drain.
    pub fn drain_messages(&mut self) -> Vec<Delivery> {
        self.outbox.drain()
    }

    /// Statistics of the most recent tick.
    pub fn stats(&self) -> &TickStats {
        &self.last_stats
    }

    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn provider(&self) -> &RegionProvider {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut RegionProvider {
        &mut self.provider
    }

    pub fn region_tracker(&self, pos: RegionPos) -> Option<&RegionTracker> {
        self.regions.get(&pos)
    }

    pub fn column_tracker(&self, pos: ColumnPos) -> Option<&ColumnTracker> {
        self.columns.get(&pos)
    }

    pub fn region_tracker_count(&self) -> usize {
        self.regions.len()
    }

    pub fn column_tracker_count(&self) -> usize {
        self.columns.len()
    }

    pub fn pending_generation(&self) -> usize {
        self.generation_queue.len()
    }

    pub fn pending_send(&self) -> usize {
        self.send_queue.len()
    }
}

impl std::fmt::Display for InterestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "InterestManager: {} subscribers, {} region trackers, {} column trackers",
            self.subscribers.len(),
            self.regions.len(),
            self.columns.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_world::{FlatGenerator, MemoryStore, NullLighting, ProviderConfig};

    use crate::message::Outbound;

    fn manager(h: i32, v: i32) -> InterestManager {
        let provider = RegionProvider::new(
            ProviderConfig {
                io_threads: 1,
                ..ProviderConfig::default()
            },
            Box::new(FlatGenerator::new(0)),
            Box::new(NullLighting),
            Arc::new(MemoryStore::new()),
        );
        let config = InterestConfig {
            horizontal_radius: h,
            vertical_radius: v,
            generation_budget_ms: 10_000,
            ..InterestConfig::default()
        };
        InterestManager::new(config, provider).unwrap()
    }

    fn run_until_idle(m: &mut InterestManager) {
        for _ in 0..400 {
            m.update_waiting(Duration::from_millis(10));
            if m.pending_generation() == 0
                && m.pending_send() == 0
                && !m.provider().has_pending()
            {
                return;
            }
        }
        panic!("interest manager never settled: {m}");
    }

    #[test]
    fn rejects_invalid_config() {
        let provider = RegionProvider::new(
            ProviderConfig::default(),
            Box::new(FlatGenerator::new(0)),
            Box::new(NullLighting),
            Arc::new(MemoryStore::new()),
        );
        let config = InterestConfig {
            max_sent_per_tick: 0,
            ..InterestConfig::default()
        };
        assert!(InterestManager::new(config, provider).is_err());
    }

    #[test]
    fn join_creates_trackers_for_view() {
        let mut m = manager(1, 1);
        let s = Subscriber::new(Vec3::new(8.0, 8.0, 8.0)).with_requirement(Requirement::Generate);
        m.add_subscriber(s);
        assert_eq!(m.region_tracker_count(), 27);
        assert_eq!(m.column_tracker_count(), 9);
        assert_eq!(m.column_tracker(ColumnPos::new(0, 0)).unwrap().span(s.id), Some((-1, 1)));
    }

    #[test]
    fn join_then_leave_releases_everything() {
        let mut m = manager(1, 0);
        let s = Subscriber::new(Vec3::ZERO).with_requirement(Requirement::Generate);
        m.add_subscriber(s);
        run_until_idle(&mut m);
        assert!(m.is_watching_column(s.id, ColumnPos::new(0, 0)));
        assert!(m.remove_subscriber(s.id));
        assert!(!m.remove_subscriber(s.id));
        assert_eq!(m.region_tracker_count(), 0);
        assert_eq!(m.column_tracker_count(), 0);

        let unloads = m
            .drain_messages()
            .into_iter()
            .filter(|d| matches!(d.message, Outbound::RegionUnload { .. }))
            .count();
        assert_eq!(unloads, 9);

        let stats = m.update();
        assert!(stats.collected.is_some_and(|r| r.regions_unloaded > 0));
        assert_eq!(m.provider().loaded_regions(), 0);
    }

    #[test]
    fn small_moves_keep_view() {
        let mut m = manager(1, 1);
        let s = Subscriber::new(Vec3::new(8.0, 8.0, 8.0));
        m.add_subscriber(s);
        assert!(!m.on_subscriber_moved(s.id, Vec3::new(12.0, 8.0, 8.0)));
        assert!(m.on_subscriber_moved(s.id, Vec3::new(40.0, 8.0, 8.0)));
        assert_eq!(m.view(s.id).unwrap().center(), RegionPos::new(2, 0, 0));
        assert_eq!(m.region_tracker_count(), 27);
        assert!(m.region_tracker(RegionPos::new(-1, 0, 0)).is_none());
        assert!(m.region_tracker(RegionPos::new(3, 0, 0)).is_some());
    }

    #[test]
    fn unknown_subscriber_moves_are_ignored() {
        let mut m = manager(1, 1);
        assert!(!m.on_subscriber_moved(SubscriberId::new(), Vec3::ZERO));
        assert!(!m.set_subscriber_requirement(SubscriberId::new(), Requirement::Load));
    }

    #[test]
    #[should_panic]
    fn duplicate_subscriber_panics() {
        let mut m = manager(0, 0);
        let s = Subscriber::new(Vec3::ZERO);
        m.add_subscriber(s);
        m.add_subscriber(s);
    }

    #[test]
    fn generation_respects_per_tick_cap() {
        let mut m = manager(1, 1);
        m.config.max_generated_per_tick = 5;
        m.add_subscriber(Subscriber::new(Vec3::ZERO).with_requirement(Requirement::Generate));
        let mut total = 0;
        for _ in 0..400 {
            let stats = m.update_waiting(Duration::from_millis(10));
            assert!(stats.generated <= 5);
            total += stats.generated;
            if total == 27 {
                break;
            }
        }
        assert_eq!(total, 27);
    }

    #[test]
    fn changes_flush_to_watchers() {
        let mut m = manager(0, 0);
        let s = Subscriber::new(Vec3::ZERO).with_requirement(Requirement::Generate);
        m.add_subscriber(s);
        run_until_idle(&mut m);
        m.drain_messages();

        m.on_region_change(IVec3::new(3, 4, 5));
        m.on_region_change(IVec3::new(3, 4, 5));
        m.on_height_change(3, 5);
        m.on_region_change(IVec3::new(100, 0, 0));
        let stats = m.update();
        assert_eq!(stats.flushed, 2);
        let kinds: Vec<_> = m.drain_messages().iter().map(|d| d.message.kind()).collect();
        assert_eq!(kinds, vec!["region_single", "column_heights"]);
    }

    #[test]
    fn radii_change_resizes_views() {
        let mut m = manager(1, 0);
        let s = Subscriber::new(Vec3::ZERO);
        m.add_subscriber(s);
        assert_eq!(m.region_tracker_count(), 9);
        m.set_view_radii(2, 0).unwrap();
        assert_eq!(m.region_tracker_count(), 25);
        assert!(m.set_view_radii(-1, 0).is_err());
        assert_eq!(m.config().horizontal_radius, 2);
    }

    #[test]
    fn raising_requirement_reaches_new_tier() {
        let mut m = manager(0, 0);
        let s = Subscriber::new(Vec3::ZERO).with_requirement(Requirement::Generate);
        m.add_subscriber(s);
        run_until_idle(&mut m);
        assert!(m.set_subscriber_requirement(s.id, Requirement::Light));
        run_until_idle(&mut m);
        let origin = RegionPos::new(0, 0, 0);
        assert_eq!(m.region_tracker(origin).unwrap().requested(), Some(Requirement::Light));
        assert!(m.provider().region(origin).unwrap().is_lit());
        let snapshots = m
            .drain_messages()
            .iter()
            .filter(|d| d.message.kind() == "full_region")
            .count();
        assert_eq!(snapshots, 2);
    }
}
