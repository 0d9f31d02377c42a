use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use glam::IVec3;
use serde::{Deserialize, Serialize};
use strata_common::{ColumnPos, RegionPos, Requirement, SpatialIndex};

use crate::collab::{Generator, LightingEngine, ProviderListener, Store};
use crate::io::{IoKey, IoPool, IoResult};
use crate::region::{Column, ColumnRecord, Region, RegionRecord, Ticket};

/// Radius of the neighborhood that must be resident before skylight diffusion.
const LIGHT_RADIUS: i32 = 2;

/// Provider construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Worker threads serving store reads.
    pub io_threads: usize,
    /// Load factor of the region and column indexes.
    pub index_load_factor: f32,
    /// Initial index capacity as a power of two.
    pub index_power: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            io_threads: 2,
            index_load_factor: 0.75,
            index_power: 10,
        }
    }
}

/// Provider parameters that cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderConfigError {
    #[error("index load factor must be in (0, 1], got {0}")]
    LoadFactor(f32),
    #[error("index power must be in 1..31, got {0}")]
    IndexPower(u32),
    #[error("io_threads must be at least 1")]
    NoIoThreads,
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ProviderConfigError> {
        if !(self.index_load_factor > 0.0 && self.index_load_factor <= 1.0) {
            return Err(ProviderConfigError::LoadFactor(self.index_load_factor));
        }
        if !(1..31).contains(&self.index_power) {
            return Err(ProviderConfigError::IndexPower(self.index_power));
        }
        if self.io_threads == 0 {
            return Err(ProviderConfigError::NoIoThreads);
        }
        Ok(())
    }
}

/// Handle of an outstanding asynchronous request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an asynchronous request was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchTarget {
    Region(RegionPos),
    Column(ColumnPos),
}

/// Immediate answer to an asynchronous request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncFetch {
    /// Resolved without IO; `true` if the entity is available at the tier.
    Ready(bool),
    /// A [`Completion`] with this id will be returned by a later poll.
    Pending(RequestId),
}

/// Result of an asynchronous request, produced on the owner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub id: RequestId,
    pub target: FetchTarget,
    /// Whether the entity is resident at the requested tier.
    pub available: bool,
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    id: RequestId,
    requirement: Requirement,
    target: FetchTarget,
}

/// Counters accumulated over the provider's lifetime.
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub regions_generated: u64,
    pub columns_generated: u64,
    pub regions_loaded: u64,
    pub columns_loaded: u64,
    pub regions_populated: u64,
    pub regions_lit: u64,
    pub regions_saved: u64,
    pub columns_saved: u64,
    pub regions_unloaded: u64,
    pub columns_unloaded: u64,
    pub read_failures: u64,
    pub save_failures: u64,
}

/// Outcome of one reclamation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub regions_unloaded: usize,
    pub columns_unloaded: usize,
}

/// Loads, generates, populates and lights regions on demand.
///
/// Every call either returns an entity at (at least) the requested tier or
/// reports absence; nothing is handed out half-upgraded. Store reads may be
/// issued to worker threads through the async methods, but results are only
/// applied inside [`RegionProvider::poll_completions`] on the owning thread.
pub struct RegionProvider {
    regions: SpatialIndex<RegionPos, Region>,
    columns: SpatialIndex<ColumnPos, Column>,
    generator: Box<dyn Generator>,
    lighting: Box<dyn LightingEngine>,
    store: Arc<dyn Store>,
    listeners: Vec<Box<dyn ProviderListener>>,
    io: IoPool,
    in_flight: HashMap<IoKey, Vec<Waiter>>,
    deferred: Vec<Waiter>,
    next_request: u64,
    stats: ProviderStats,
}

impl RegionProvider {
    /// Like [`RegionProvider::new`], but rejects an unusable config instead
    /// of panicking.
    pub fn try_new(
        config: ProviderConfig,
        generator: Box<dyn Generator>,
        lighting: Box<dyn LightingEngine>,
        store: Arc<dyn Store>,
    ) -> Result<Self, ProviderConfigError> {
        config.validate()?;
        Ok(Self::new(config, generator, lighting, store))
    }

    /// # Panics
    /// If `config` fails [`ProviderConfig::validate`].
    pub fn new(
        config: ProviderConfig,
        generator: Box<dyn Generator>,
        lighting: Box<dyn LightingEngine>,
        store: Arc<dyn Store>,
    ) -> Self {
        let io = IoPool::new(Arc::clone(&store), config.io_threads);
        Self {
            regions: SpatialIndex::new(config.index_load_factor, config.index_power),
            columns: SpatialIndex::new(config.index_load_factor, config.index_power),
            generator,
            lighting,
            store,
            listeners: Vec::new(),
            io,
            in_flight: HashMap::new(),
            deferred: Vec::new(),
            next_request: 0,
            stats: ProviderStats::default(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn ProviderListener>) {
        self.listeners.push(listener);
    }

    // --- synchronous access ---

    /// Return the region at `pos`, doing whatever work `req` demands.
    pub fn get_region(&mut self, pos: RegionPos, req: Requirement) -> Option<&mut Region> {
        if self.ensure_region(pos, req, true) {
            self.regions.get_mut(&pos)
        } else {
            None
        }
    }

    /// Return the column at `pos`, loading or generating it as `req` allows.
    pub fn get_column(&mut self, pos: ColumnPos, req: Requirement) -> Option<&mut Column> {
        if self.ensure_column(pos, req, true) {
            self.columns.get_mut(&pos)
        } else {
            None
        }
    }

    pub fn region(&self, pos: RegionPos) -> Option<&Region> {
        self.regions.get(&pos)
    }

    pub fn region_mut(&mut self, pos: RegionPos) -> Option<&mut Region> {
        self.regions.get_mut(&pos)
    }

    pub fn column(&self, pos: ColumnPos) -> Option<&Column> {
        self.columns.get(&pos)
    }

    pub fn column_mut(&mut self, pos: ColumnPos) -> Option<&mut Column> {
        self.columns.get_mut(&pos)
    }

    /// Whether the region is resident with at least the given tier.
    pub fn is_available(&self, pos: RegionPos, req: Requirement) -> bool {
        self.regions
            .get(&pos)
            .is_some_and(|r| req == Requirement::Cached || r.achieved() >= req)
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> + '_ {
        self.regions.values()
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.columns.values()
    }

    pub fn loaded_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn loaded_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    // --- tickets ---

    /// Returns false if the region is not resident.
    pub fn add_ticket(&mut self, pos: RegionPos, ticket: Ticket) -> bool {
        match self.regions.get_mut(&pos) {
            Some(region) => {
                region.tickets.insert(ticket);
                true
            }
            None => false,
        }
    }

    /// Returns true if the ticket was held.
    pub fn remove_ticket(&mut self, pos: RegionPos, ticket: Ticket) -> bool {
        self.regions
            .get_mut(&pos)
            .is_some_and(|region| region.tickets.remove(&ticket))
    }

    // --- asynchronous access ---

    /// Request a region at `req`, reading from the store on a worker thread
    /// when it is not already resident.
    pub fn get_region_async(&mut self, pos: RegionPos, req: Requirement) -> AsyncFetch {
        if req == Requirement::Cached {
            return AsyncFetch::Ready(self.regions.contains_key(&pos));
        }
        if self.is_available(pos, req) {
            return AsyncFetch::Ready(true);
        }

        let waiter = Waiter {
            id: self.next_id(),
            requirement: req,
            target: FetchTarget::Region(pos),
        };
        if self.regions.contains_key(&pos) {
            // Resident below the tier: the upgrade runs on the next poll.
            self.deferred.push(waiter);
        } else if self.columns.contains_key(&pos.column()) {
            self.enqueue_read(IoKey::Region(pos), waiter);
        } else {
            self.enqueue_read(IoKey::Column(pos.column()), waiter);
        }
        AsyncFetch::Pending(waiter.id)
    }

    /// Request a column, reading from the store on a worker thread when it is
    /// not already resident.
    pub fn get_column_async(&mut self, pos: ColumnPos, req: Requirement) -> AsyncFetch {
        if req == Requirement::Cached || self.columns.contains_key(&pos) {
            return AsyncFetch::Ready(self.columns.contains_key(&pos));
        }
        let waiter = Waiter {
            id: self.next_id(),
            requirement: req,
            target: FetchTarget::Column(pos),
        };
        self.enqueue_read(IoKey::Column(pos), waiter);
        AsyncFetch::Pending(waiter.id)
    }

    /// Withdraw a pending request. Returns false if it was unknown or already
    /// completed.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        let mut found = false;
        for waiters in self.in_flight.values_mut() {
            let before = waiters.len();
            waiters.retain(|w| w.id != id);
            found |= waiters.len() != before;
        }
        let before = self.deferred.len();
        self.deferred.retain(|w| w.id != id);
        found | (self.deferred.len() != before)
    }

    /// Number of store reads currently outstanding.
    pub fn pending_reads(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether any request is still waiting for a completion.
    pub fn has_pending(&self) -> bool {
        !self.deferred.is_empty() || self.in_flight.values().any(|w| !w.is_empty())
    }

    /// Apply finished store reads and finish their requests.
    pub fn poll_completions(&mut self) -> Vec<Completion> {
        self.drain_completions(None)
    }

    /// Like [`RegionProvider::poll_completions`], but blocks up to `timeout`
    /// for the first read result when nothing is ready yet.
    pub fn wait_completions(&mut self, timeout: Duration) -> Vec<Completion> {
        self.drain_completions(Some(timeout))
    }

    fn drain_completions(&mut self, timeout: Option<Duration>) -> Vec<Completion> {
        let mut out = Vec::new();
        for waiter in std::mem::take(&mut self.deferred) {
            self.finish_region(waiter, true, &mut out);
        }

        let mut first = match timeout {
            Some(t) if out.is_empty() && !self.in_flight.is_empty() => self.io.recv_timeout(t),
            _ => None,
        };
        while let Some(result) = first.take().or_else(|| self.io.try_recv()) {
            match result {
                IoResult::Column(pos, result) => {
                    let waiters = self.in_flight.remove(&IoKey::Column(pos)).unwrap_or_default();
                    if waiters.is_empty() {
                        continue;
                    }
                    let record = self.read_outcome(result, "column");
                    if let Some(record) = record {
                        if !self.columns.contains_key(&pos) {
                            self.attach_column(Column::from_record(record));
                        }
                    }
                    for waiter in waiters {
                        self.finish_after_column(waiter, &mut out);
                    }
                }
                IoResult::Region(pos, result) => {
                    let waiters = self.in_flight.remove(&IoKey::Region(pos)).unwrap_or_default();
                    if waiters.is_empty() {
                        continue;
                    }
                    let record = self.read_outcome(result, "region");
                    let mut dropped = false;
                    // Skip the record if a synchronous call got there first.
                    if let Some(record) = record.filter(|_| !self.regions.contains_key(&pos)) {
                        if self.columns.contains_key(&pos.column()) {
                            self.attach_loaded_region(record);
                        } else {
                            dropped = true;
                        }
                    }
                    for waiter in waiters {
                        self.finish_region(waiter, dropped, &mut out);
                    }
                }
            }
        }
        out
    }

    fn next_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn enqueue_read(&mut self, key: IoKey, waiter: Waiter) {
        let waiters = self.in_flight.entry(key).or_default();
        let is_new = waiters.is_empty();
        waiters.push(waiter);
        if is_new {
            tracing::trace!(?key, "store read submitted");
            self.io.submit(key);
        }
    }

    /// A column read finished; continue whatever the waiter asked for.
    fn finish_after_column(&mut self, waiter: Waiter, out: &mut Vec<Completion>) {
        let column = match waiter.target {
            FetchTarget::Column(pos) => pos,
            FetchTarget::Region(pos) => pos.column(),
        };
        let has_column = self.ensure_column(column, waiter.requirement, false);
        match waiter.target {
            FetchTarget::Column(_) => out.push(Completion {
                id: waiter.id,
                target: waiter.target,
                available: has_column,
            }),
            FetchTarget::Region(pos) if !has_column => out.push(Completion {
                id: waiter.id,
                target: FetchTarget::Region(pos),
                available: false,
            }),
            FetchTarget::Region(pos) if self.regions.contains_key(&pos) => {
                self.finish_region(waiter, false, out)
            }
            FetchTarget::Region(pos) => self.enqueue_read(IoKey::Region(pos), waiter),
        }
    }

    fn finish_region(&mut self, waiter: Waiter, consult_store: bool, out: &mut Vec<Completion>) {
        let available = match waiter.target {
            FetchTarget::Region(pos) => self.ensure_region(pos, waiter.requirement, consult_store),
            FetchTarget::Column(pos) => self.ensure_column(pos, waiter.requirement, consult_store),
        };
        out.push(Completion {
            id: waiter.id,
            target: waiter.target,
            available,
        });
    }

    // --- tier pipeline ---

    fn ensure_column(&mut self, pos: ColumnPos, req: Requirement, consult_store: bool) -> bool {
        if self.columns.contains_key(&pos) {
            return true;
        }
        if req == Requirement::Cached {
            return false;
        }
        if consult_store {
            let result = self.store.load_column(pos);
            if let Some(record) = self.read_outcome(result, "column") {
                self.attach_column(Column::from_record(record));
                return true;
            }
        }
        if !req.allows_generation() {
            return false;
        }
        tracing::debug!(%pos, "generating column");
        let heights = self.generator.generate_column(pos);
        self.stats.columns_generated += 1;
        self.attach_column(Column::new(pos, heights));
        true
    }

    fn ensure_region(&mut self, pos: RegionPos, req: Requirement, consult_store: bool) -> bool {
        if req == Requirement::Cached {
            return self.regions.contains_key(&pos);
        }
        if self.is_available(pos, req) {
            return true;
        }
        if !self.ensure_column(pos.column(), req, true) {
            return false;
        }

        if !self.regions.contains_key(&pos) {
            let record = if consult_store {
                let result = self.store.load_region(pos);
                self.read_outcome(result, "region")
            } else {
                None
            };
            match record {
                Some(record) => self.attach_loaded_region(record),
                None if !req.allows_generation() => return false,
                None => self.generate_region(pos),
            }
        }

        if req >= Requirement::Populate
            && self.regions.get(&pos).is_some_and(|r| !r.fully_populated)
        {
            self.populate_footprint(pos);
        }
        if req >= Requirement::Light && self.regions.get(&pos).is_some_and(|r| !r.lit) {
            self.light_neighborhood(pos);
        }
        self.is_available(pos, req)
    }

    fn generate_region(&mut self, pos: RegionPos) {
        tracing::debug!(%pos, "generating region");
        let payload = self.generator.generate_region(pos);
        let mut region = Region::new(pos, payload);
        self.lighting.initialize_skylight(&mut region);
        self.stats.regions_generated += 1;
        self.attach_region(region);
    }

    fn populate_footprint(&mut self, pos: RegionPos) {
        let footprint = match self.regions.get(&pos) {
            Some(region) => self.generator.population_footprint(region),
            None => return,
        };
        for offset in footprint {
            let neighbor = pos.offset(offset);
            if !self.ensure_region(neighbor, Requirement::Generate, true) {
                continue;
            }
            if let Some(region) = self.regions.get_mut(&neighbor) {
                if !region.populated {
                    self.generator.populate(region);
                    region.populated = true;
                    region.dirty = true;
                    self.stats.regions_populated += 1;
                }
            }
        }
        if let Some(region) = self.regions.get_mut(&pos) {
            region.fully_populated = true;
            region.dirty = true;
        }
    }

    fn light_neighborhood(&mut self, pos: RegionPos) {
        for dx in -LIGHT_RADIUS..=LIGHT_RADIUS {
            for dz in -LIGHT_RADIUS..=LIGHT_RADIUS {
                // Top down so the center layer is loaded last.
                for dy in (-LIGHT_RADIUS..=LIGHT_RADIUS).rev() {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    self.ensure_region(pos.offset(IVec3::new(dx, dy, dz)), Requirement::Generate, true);
                }
            }
        }
        if let Some(region) = self.regions.get_mut(&pos) {
            self.lighting.diffuse_skylight(region);
            region.lit = true;
            region.dirty = true;
            self.stats.regions_lit += 1;
        }
    }

    fn read_outcome<T>(
        &mut self,
        result: Result<Option<T>, crate::collab::StoreError>,
        what: &str,
    ) -> Option<T> {
        match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, kind = what, "store read failed; treating as absent");
                self.stats.read_failures += 1;
                None
            }
        }
    }

    fn attach_loaded_region(&mut self, record: RegionRecord) {
        self.stats.regions_loaded += 1;
        self.attach_region(Region::from_record(record));
    }

    fn attach_region(&mut self, region: Region) {
        let pos = region.pos;
        if let Some(column) = self.columns.get_mut(&pos.column()) {
            column.attach_region(pos.y);
        }
        for listener in &mut self.listeners {
            listener.region_loaded(&region);
        }
        let previous = self.regions.put(pos, region);
        assert!(previous.is_none(), "region {pos} attached twice");
    }

    fn attach_column(&mut self, column: Column) {
        let pos = column.pos;
        if !column.dirty {
            self.stats.columns_loaded += 1;
        }
        for listener in &mut self.listeners {
            listener.column_loaded(&column);
        }
        let previous = self.columns.put(pos, column);
        assert!(previous.is_none(), "column {pos} attached twice");
    }

    // --- persistence and reclamation ---

    /// Unload every region without tickets, then every column left empty.
    pub fn collect_garbage(&mut self) -> GcReport {
        let _span = tracing::debug_span!("collect_garbage").entered();
        let mut report = GcReport::default();

        let mut unloaded = Vec::new();
        let mut cursor = self.regions.cursor();
        while let Some((_, region)) = cursor.advance() {
            if region.has_tickets() {
                continue;
            }
            if let Some(region) = cursor.remove_current() {
                unloaded.push(region);
            }
        }
        for mut region in unloaded {
            for listener in &mut self.listeners {
                listener.region_unloaded(&region);
            }
            if region.dirty {
                self.save_region(&mut region);
            }
            if let Some(column) = self.columns.get_mut(&region.pos.column()) {
                column.detach_region(region.pos.y);
            }
            report.regions_unloaded += 1;
        }

        let mut unloaded = Vec::new();
        let mut cursor = self.columns.cursor();
        while let Some((_, column)) = cursor.advance() {
            if column.region_count() > 0 {
                continue;
            }
            if let Some(column) = cursor.remove_current() {
                unloaded.push(column);
            }
        }
        for mut column in unloaded {
            column.unloaded = true;
            for listener in &mut self.listeners {
                listener.column_unloaded(&column);
            }
            if column.dirty {
                self.save_column(&mut column);
            }
            report.columns_unloaded += 1;
        }

        self.stats.regions_unloaded += report.regions_unloaded as u64;
        self.stats.columns_unloaded += report.columns_unloaded as u64;
        tracing::debug!(
            regions = report.regions_unloaded,
            columns = report.columns_unloaded,
            "garbage collected"
        );
        report
    }

    /// Persist every dirty region and column without unloading anything.
    /// Returns the number of records written.
    pub fn save_all(&mut self) -> usize {
        let mut dirty_regions = Vec::new();
        for (pos, region) in self.regions.iter() {
            if region.dirty {
                dirty_regions.push((*pos, region.to_record()));
            }
        }
        let mut dirty_columns = Vec::new();
        for (pos, column) in self.columns.iter() {
            if column.dirty {
                dirty_columns.push((*pos, column.to_record()));
            }
        }

        let mut written = 0;
        for (pos, record) in dirty_regions {
            if self.write_region(&record) {
                if let Some(region) = self.regions.get_mut(&pos) {
                    region.dirty = false;
                }
                written += 1;
            }
        }
        for (pos, record) in dirty_columns {
            if self.write_column(&record) {
                if let Some(column) = self.columns.get_mut(&pos) {
                    column.dirty = false;
                }
                written += 1;
            }
        }
        tracing::debug!(written, "saved dirty regions and columns");
        written
    }

    fn save_region(&mut self, region: &mut Region) {
        if self.write_region(&region.to_record()) {
            region.dirty = false;
        }
    }

    fn save_column(&mut self, column: &mut Column) {
        if self.write_column(&column.to_record()) {
            column.dirty = false;
        }
    }

    fn write_region(&mut self, record: &RegionRecord) -> bool {
        match self.store.save_region(record) {
            Ok(()) => {
                self.stats.regions_saved += 1;
                true
            }
            Err(e) => {
                tracing::error!(pos = %record.pos, error = %e, "failed to save region");
                self.stats.save_failures += 1;
                false
            }
        }
    }

    fn write_column(&mut self, record: &ColumnRecord) -> bool {
        match self.store.save_column(record) {
            Ok(()) => {
                self.stats.columns_saved += 1;
                true
            }
            Err(e) => {
                tracing::error!(pos = %record.pos, error = %e, "failed to save column");
                self.stats.save_failures += 1;
                false
            }
        }
    }
}

impl std::fmt::Display for RegionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RegionProvider: {} columns, {} regions",
            self.columns.len(),
            self.regions.len()
        )
    }
}
