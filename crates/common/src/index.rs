//! Open-addressing hash map keyed by small integer coordinate tuples.
//!
//! Linear probing with backward-shift deletion: removing an entry pulls later
//! members of its probe chain back into the hole, so lookups never have to skip
//! tombstones. At least one slot is always empty, which bounds every probe.

const HASH_SEED: i32 = 1183822147;

/// Keys stored in a [`SpatialIndex`].
pub trait IndexKey: Copy + Eq {
    fn index_hash(&self) -> i32;
}

/// Multiplicative mix of integer coordinates.
pub fn mix_coords(coords: &[i32]) -> i32 {
    let mut hash = HASH_SEED;
    for &c in coords {
        hash = hash.wrapping_add(c);
        hash = hash.wrapping_mul(HASH_SEED);
    }
    hash
}

/// Spatial hash map from region or column coordinates to values.
#[derive(Debug, Clone)]
pub struct SpatialIndex<K, V> {
    slots: Vec<Option<(K, V)>>,
    len: usize,
    load_factor: f32,
    grow_at: usize,
    mask: usize,
}

impl<K: IndexKey, V> SpatialIndex<K, V> {
    /// Create an index with `2^power` slots that doubles once occupancy
    /// exceeds `load_factor`.
    pub fn new(load_factor: f32, power: u32) -> Self {
        assert!(
            load_factor > 0.0 && load_factor <= 1.0,
            "load factor must be in (0, 1], got {load_factor}"
        );
        assert!((1..31).contains(&power), "power must be in 1..31, got {power}");
        let mut index = Self {
            slots: Vec::new(),
            len: 0,
            load_factor,
            grow_at: 0,
            mask: 0,
        };
        index.reset_slots(1 << power);
        index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the backing table.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Insert or overwrite the entry for `key`, returning the previous value.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        match self.find(&key) {
            Ok(i) => self.slots[i]
                .as_mut()
                .map(|(_, v)| std::mem::replace(v, value)),
            Err(i) => {
                self.slots[i] = Some((key, value));
                self.len += 1;
                if self.len > self.grow_at {
                    self.grow();
                }
                None
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let i = self.find(key).ok()?;
        self.slots[i].as_ref().map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let i = self.find(key).ok()?;
        self.slots[i].as_mut().map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_ok()
    }

    /// Remove the entry for `key`, repairing its probe chain.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let i = self.find(key).ok()?;
        self.remove_at(i)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(k, v)| (k, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.slots
            .iter_mut()
            .filter_map(|s| s.as_mut().map(|(k, v)| (&*k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Walk every entry once, allowing the current entry to be removed.
    pub fn cursor(&mut self) -> Cursor<'_, K, V> {
        // Starting right after an empty slot means no backward shift caused by
        // a removal can carry an entry across the starting point.
        let start = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or_default();
        let remaining = self.slots.len();
        Cursor {
            index: self,
            pos: start,
            remaining,
            current: None,
        }
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        let mut cursor = self.cursor();
        while let Some((key, value)) = cursor.advance() {
            if !keep(&key, value) {
                cursor.remove_current();
            }
        }
    }

    fn ideal_slot(&self, key: &K) -> usize {
        key.index_hash() as u32 as usize & self.mask
    }

    /// `Ok(slot)` holding `key`, or `Err(slot)` of the empty slot ending its
    /// probe chain.
    fn find(&self, key: &K) -> Result<usize, usize> {
        let mut i = self.ideal_slot(key);
        loop {
            match &self.slots[i] {
                None => return Err(i),
                Some((k, _)) if k == key => return Ok(i),
                Some(_) => i = (i + 1) & self.mask,
            }
        }
    }

    fn remove_at(&mut self, slot: usize) -> Option<V> {
        let (_, value) = self.slots[slot].take()?;
        self.len -= 1;

        let mut hole = slot;
        let mut cur = (slot + 1) & self.mask;
        while let Some((key, _)) = &self.slots[cur] {
            let ideal = self.ideal_slot(key);
            if !cyclic_between(hole, ideal, cur) {
                self.slots[hole] = self.slots[cur].take();
                hole = cur;
            }
            cur = (cur + 1) & self.mask;
        }
        Some(value)
    }

    fn grow(&mut self) {
        let old = std::mem::take(&mut self.slots);
        self.reset_slots(old.len() * 2);
        for (key, value) in old.into_iter().flatten() {
            if let Err(i) = self.find(&key) {
                self.slots[i] = Some((key, value));
            }
        }
    }

    fn reset_slots(&mut self, capacity: usize) {
        self.slots = std::iter::repeat_with(|| None).take(capacity).collect();
        self.mask = capacity - 1;
        self.grow_at = (capacity - 1).min((capacity as f32 * self.load_factor) as usize);
    }
}

impl<K: IndexKey, V> Default for SpatialIndex<K, V> {
    fn default() -> Self {
        Self::new(0.75, 4)
    }
}

/// True if `x` lies in the cyclic range `(lo, hi]`.
fn cyclic_between(lo: usize, x: usize, hi: usize) -> bool {
    if lo <= hi {
        lo < x && x <= hi
    } else {
        lo < x || x <= hi
    }
}

/// Removal-safe walk over a [`SpatialIndex`].
///
/// Yields each entry present when the cursor was created exactly once, even
/// when [`Cursor::remove_current`] is called along the way.
pub struct Cursor<'a, K, V> {
    index: &'a mut SpatialIndex<K, V>,
    pos: usize,
    remaining: usize,
    current: Option<usize>,
}

impl<K: IndexKey, V> Cursor<'_, K, V> {
    pub fn advance(&mut self) -> Option<(K, &mut V)> {
        self.current = None;
        while self.remaining > 0 {
            self.remaining -= 1;
            self.pos = (self.pos + 1) & self.index.mask;
            if self.index.slots[self.pos].is_some() {
                self.current = Some(self.pos);
                return self.index.slots[self.pos]
                    .as_mut()
                    .map(|(k, v)| (*k, v));
            }
        }
        None
    }

    /// Remove the entry last returned by [`Cursor::advance`].
    pub fn remove_current(&mut self) -> Option<V> {
        let slot = self.current.take()?;
        let value = self.index.remove_at(slot);
        if self.index.slots[slot].is_some() {
            // A later entry was shifted into this slot; look at it again.
            self.pos = (slot + self.index.mask) & self.index.mask;
            self.remaining += 1;
        }
        value
    }
}
