use std::collections::VecDeque;
use std::time::Duration;

use strata_world::GcReport;

/// Work done by one [`crate::InterestManager::update`] call.
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub tick: u64,
    /// Provider completions routed to live trackers.
    pub completions: usize,
    /// Trackers whose change buffers were flushed.
    pub flushed: usize,
    /// Trackers that reached their tier through generation.
    pub generated: usize,
    /// Trackers fully delivered to their subscribers.
    pub sent: usize,
    pub pending_generation: usize,
    pub pending_send: usize,
    pub region_trackers: usize,
    pub column_trackers: usize,
    /// Set when the tick ran a reclamation sweep.
    pub collected: Option<GcReport>,
    pub tick_time: Duration,
}

/// Rolling window of tick durations.
#[derive(Debug)]
pub struct TickTimer {
    history: VecDeque<Duration>,
    capacity: usize,
}

impl TickTimer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "tick timer needs a non-empty window");
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(dt);
    }

    pub fn average(&self) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.history.iter().sum();
        total / self.history.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.history.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.history.iter().copied().min().unwrap_or(Duration::ZERO)
    }

    pub fn count(&self) -> usize {
        self.history.len()
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new(120)
    }
}
