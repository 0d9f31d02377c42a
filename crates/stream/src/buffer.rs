/// Count reported once a buffer has taken more changes than it can list.
pub const OVERFLOW: usize = usize::MAX;

/// What a buffer holds at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending<'a, L> {
    Empty,
    Single(L),
    Batch(&'a [L]),
    Overflow,
}

/// Fixed-capacity, de-duplicating record of changed positions.
///
/// Once full, any further change flips the buffer into overflow and the
/// individual positions stop mattering: the receiver needs a full resend.
#[derive(Debug, Clone)]
pub struct ChangeBuffer<L> {
    capacity: usize,
    changes: Vec<L>,
    overflowed: bool,
}

impl<L: Copy + Eq> ChangeBuffer<L> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "change buffer capacity must be positive");
        Self {
            capacity,
            changes: Vec::with_capacity(capacity),
            overflowed: false,
        }
    }

    /// Record a change. Returns true if this is the first change since the
    /// last clear.
    pub fn track(&mut self, local: L) -> bool {
        let first = self.is_empty();
        if self.overflowed || self.changes.contains(&local) {
            return first;
        }
        if self.changes.len() == self.capacity {
            self.overflowed = true;
            self.changes.clear();
        } else {
            self.changes.push(local);
        }
        first
    }

    /// Number of buffered changes, or [`OVERFLOW`].
    pub fn count(&self) -> usize {
        if self.overflowed {
            OVERFLOW
        } else {
            self.changes.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.overflowed && self.changes.is_empty()
    }

    pub fn pending(&self) -> Pending<'_, L> {
        match (self.overflowed, self.changes.as_slice()) {
            (true, _) => Pending::Overflow,
            (false, []) => Pending::Empty,
            (false, [one]) => Pending::Single(*one),
            (false, many) => Pending::Batch(many),
        }
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.overflowed = false;
    }
}
