use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use strata_common::{ColumnPos, RegionPos};

use crate::collab::{Store, StoreError};
use crate::region::{ColumnRecord, RegionRecord};

/// In-memory [`Store`] with read counters and failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    regions: Mutex<HashMap<RegionPos, RegionRecord>>,
    columns: Mutex<HashMap<ColumnPos, ColumnRecord>>,
    region_reads: AtomicUsize,
    column_reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn region_reads(&self) -> usize {
        self.region_reads.load(Ordering::SeqCst)
    }

    pub fn column_reads(&self) -> usize {
        self.column_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn region_count(&self) -> usize {
        lock(&self.regions).len()
    }

    pub fn column_count(&self) -> usize {
        lock(&self.columns).len()
    }

    pub fn contains_region(&self, pos: RegionPos) -> bool {
        lock(&self.regions).contains_key(&pos)
    }

    pub fn stored_region(&self, pos: RegionPos) -> Option<RegionRecord> {
        lock(&self.regions).get(&pos).cloned()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read failure injected".into()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn load_region(&self, pos: RegionPos) -> Result<Option<RegionRecord>, StoreError> {
        self.region_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(lock(&self.regions).get(&pos).cloned())
    }

    fn load_column(&self, pos: ColumnPos) -> Result<Option<ColumnRecord>, StoreError> {
        self.column_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(lock(&self.columns).get(&pos).cloned())
    }

    fn save_region(&self, record: &RegionRecord) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.regions).insert(record.pos, record.clone());
        Ok(())
    }

    fn save_column(&self, record: &ColumnRecord) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.columns).insert(record.pos, record.clone());
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
