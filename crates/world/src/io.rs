//! Worker pool running store reads off the owner thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use strata_common::{ColumnPos, RegionPos};

use crate::collab::{Store, StoreError};
use crate::region::{ColumnRecord, RegionRecord};

/// Entity a store read is for. Reads are coalesced per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum IoKey {
    Region(RegionPos),
    Column(ColumnPos),
}

pub(crate) enum IoResult {
    Region(RegionPos, Result<Option<RegionRecord>, StoreError>),
    Column(ColumnPos, Result<Option<ColumnRecord>, StoreError>),
}

/// Fixed set of threads fed through an unbounded job channel.
pub(crate) struct IoPool {
    jobs: Option<Sender<IoKey>>,
    results: Receiver<IoResult>,
    workers: Vec<JoinHandle<()>>,
}

impl IoPool {
    pub(crate) fn new(store: Arc<dyn Store>, threads: usize) -> Self {
        let (tx_job, rx_job) = unbounded::<IoKey>();
        let (tx_done, rx_done) = unbounded::<IoResult>();

        let workers = (0..threads.max(1))
            .map(|_| {
                let store = Arc::clone(&store);
                let rx_job = rx_job.clone();
                let tx_done = tx_done.clone();
                std::thread::spawn(move || {
                    while let Ok(key) = rx_job.recv() {
                        let result = match key {
                            IoKey::Region(pos) => IoResult::Region(pos, store.load_region(pos)),
                            IoKey::Column(pos) => IoResult::Column(pos, store.load_column(pos)),
                        };
                        if tx_done.send(result).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Self {
            jobs: Some(tx_job),
            results: rx_done,
            workers,
        }
    }

    pub(crate) fn submit(&self, key: IoKey) {
        if let Some(jobs) = &self.jobs {
            if jobs.send(key).is_err() {
                tracing::error!(?key, "io pool has shut down; read dropped");
            }
        }
    }

    pub(crate) fn try_recv(&self) -> Option<IoResult> {
        self.results.try_recv().ok()
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<IoResult> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("io worker panicked");
            }
        }
    }
}
