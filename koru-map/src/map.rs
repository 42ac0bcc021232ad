//! The multi-level open-addressed concurrent hash map.

use core::fmt;
use core::hash::{BuildHasher, Hash};

use foldhash::fast::FixedState;

use koru_sync::next_prime;

use crate::bucket::Bucket;
use crate::cell::{Accessor, Counted};

/// Default number of levels.
pub const DEFAULT_LEVELS: usize = 13;

// Target per-level occupancy for the sizing formula.
const OCCUPIED_RATIO: f64 = 0.989;

/// Construction failed: the requested capacity / level count combination
/// cannot be sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    /// The iterative sizing ran out of remaining capacity before reaching
    /// the last level; a larger capacity or fewer levels is needed.
    LevelUndersized {
        /// Index of the level that could not be sized.
        level: usize,
    },
    /// Zero capacity or zero levels requested.
    Invalid,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::LevelUndersized { level } => {
                write!(f, "level {level} cannot be sized for the requested capacity")
            }
            CapacityError::Invalid => write!(f, "capacity and level count must be nonzero"),
        }
    }
}

impl std::error::Error for CapacityError {}

/// A `set` did not take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// No level admitted the key: every probed bucket is occupied by some
    /// other key. Retry against a larger map.
    ProbeExhausted,
    /// A cell allocation failed. Shed load and retry.
    AllocFailed,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::ProbeExhausted => write!(f, "no probe level admits the key"),
            MapError::AllocFailed => write!(f, "cell allocation failed"),
        }
    }
}

impl std::error::Error for MapError {}

/// A fixed-capacity concurrent hash map.
///
/// The bucket array concatenates `L` levels of prime capacities; a key's
/// probe sequence is `hash % capacity[i]` within each level in order. All
/// bucket mutations are lock-free compare-exchange / swap on the two slot
/// words; keys and values live in reference-counted cells handed out
/// through [`Accessor`]s.
///
/// There is no rehashing: a map holds what its levels admit and `set`
/// reports [`MapError::ProbeExhausted`] beyond that.
pub struct AtomicHashMap<K, V, S = FixedState> {
    levels: Vec<usize>,
    buckets: Box<[Bucket<K, V>]>,
    hasher: S,
}

unsafe impl<K: Send + Sync, V: Send + Sync, S: Send> Send for AtomicHashMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for AtomicHashMap<K, V, S> {}

impl<K, V> AtomicHashMap<K, V, FixedState>
where
    K: Hash + Eq,
{
    /// A map sized for `expected` entries across [`DEFAULT_LEVELS`] levels.
    pub fn with_capacity(expected: usize) -> Result<Self, CapacityError> {
        Self::with_capacity_and_levels(expected, DEFAULT_LEVELS)
    }

    /// A map sized for `expected` entries across `levels` levels.
    pub fn with_capacity_and_levels(
        expected: usize,
        levels: usize,
    ) -> Result<Self, CapacityError> {
        Self::with_capacity_levels_and_hasher(expected, levels, FixedState::default())
    }
}

impl<K, V, S> AtomicHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Full-control constructor: capacity, level count, and hasher.
    pub fn with_capacity_levels_and_hasher(
        expected: usize,
        levels: usize,
        hasher: S,
    ) -> Result<Self, CapacityError> {
        if expected == 0 || levels == 0 {
            return Err(CapacityError::Invalid);
        }

        // Two passes: size for `expected`, then re-scale so the total lands
        // on the requested capacity instead of the first pass's overshoot.
        let (_, total) = gen_multi_level_sizes(expected, levels)?;
        let rescaled = (expected as u128 * expected as u128 / total as u128) as usize;
        let (level_caps, total) = gen_multi_level_sizes(rescaled, levels)?;

        let buckets = (0..total).map(|_| Bucket::new()).collect();

        Ok(Self {
            levels: level_caps,
            buckets,
            hasher,
        })
    }

    /// Total bucket count across all levels.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Per-level bucket counts, primes, in probe order.
    pub fn level_capacities(&self) -> &[usize] {
        &self.levels
    }

    fn hash(&self, key: &K) -> usize {
        self.hasher.hash_one(key) as usize
    }

    /// First bucket in the probe sequence occupied by `key`.
    fn lookup(&self, key: &K) -> Option<&Bucket<K, V>> {
        let hash = self.hash(key);
        let mut base = 0usize;
        for &capacity in &self.levels {
            let bucket = &self.buckets[base + hash % capacity];
            if bucket.is_occupied_by(key) {
                return Some(bucket);
            }
            base += capacity;
        }
        None
    }

    /// Walks the probe sequence and claims the first available bucket for
    /// `key`. The key cell is allocated lazily at the first available level
    /// and freed again if every exchange loses.
    fn occupy(&self, key: &K) -> Result<&Bucket<K, V>, MapError>
    where
        K: Clone,
    {
        let hash = self.hash(key);
        let mut cell: Option<*mut Counted<K>> = None;
        let mut base = 0usize;

        for &capacity in &self.levels {
            let bucket = &self.buckets[base + hash % capacity];
            base += capacity;
            if !bucket.is_available_for(key) {
                continue;
            }
            let cell = match cell {
                Some(cell) => cell,
                None => {
                    let fresh = Counted::try_alloc(key.clone())
                        .ok_or(MapError::AllocFailed)?
                        .as_ptr();
                    cell = Some(fresh);
                    fresh
                }
            };
            if bucket.exchange_key(cell) {
                return Ok(bucket);
            }
            // Lost the slot race at this level; probe the next one.
        }

        if let Some(cell) = cell {
            // Provisional cell never installed anywhere.
            unsafe { Counted::release_and_free(cell) };
        }
        Err(MapError::ProbeExhausted)
    }

    /// A value accessor for `key`; empty on miss.
    pub fn get(&self, key: &K) -> Accessor<V> {
        match self.lookup(key) {
            Some(bucket) => bucket.access_value(),
            None => Accessor::empty(),
        }
    }

    /// True when some probe level holds `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lookup(key).is_some()
    }

    /// Occupied-bucket count at the time of the call. O(capacity); an
    /// advisory snapshot under concurrent mutation.
    pub fn len(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_occupied()).count()
    }

    /// True when no bucket is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or updates. The successful key-slot exchange linearizes an
    /// insert, the value-slot swap an update.
    pub fn set(&self, key: &K, value: V) -> Result<(), MapError>
    where
        K: Clone,
    {
        let bucket = self.occupy(key)?;
        let cell = Counted::try_alloc(value)
            .ok_or(MapError::AllocFailed)?
            .as_ptr();
        bucket.exchange_value(cell);
        Ok(())
    }

    /// Removes every bucket occupied by `key`. Succeeds unconditionally.
    pub fn delete(&self, key: &K) {
        self.walk_key_buckets(key, |bucket| bucket.cleanup());
    }

    /// Drops every entry in the map.
    pub fn cleanup(&self) {
        for bucket in self.buckets.iter() {
            if bucket.is_occupied() {
                bucket.cleanup();
            }
        }
    }

    /// Calls `walker` with accessors for every occupied bucket.
    pub fn walk_all<F>(&self, mut walker: F)
    where
        F: FnMut(Accessor<K>, Accessor<V>),
    {
        for bucket in self.buckets.iter() {
            if bucket.is_occupied() {
                walker(bucket.access_key(), bucket.access_value());
            }
        }
    }

    /// Calls `walker` with accessors for every bucket occupied by `key` —
    /// the full array, not just the probe sequence, mirroring `delete`.
    pub fn walk_key<F>(&self, key: &K, mut walker: F)
    where
        F: FnMut(Accessor<K>, Accessor<V>),
    {
        self.walk_key_buckets(key, |bucket| {
            walker(bucket.access_key(), bucket.access_value())
        });
    }

    fn walk_key_buckets<F>(&self, key: &K, mut walker: F)
    where
        F: FnMut(&Bucket<K, V>),
    {
        for bucket in self.buckets.iter() {
            if bucket.is_occupied_by(key) {
                walker(bucket);
            }
        }
    }

    /// Iterates accessor pairs over the occupied buckets.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter {
            map: self,
            index: 0,
        }
    }
}

impl<K, V, S> Drop for AtomicHashMap<K, V, S> {
    fn drop(&mut self) {
        for bucket in self.buckets.iter() {
            bucket.cleanup();
        }
    }
}

/// Iterator over occupied buckets, yielding `(key, value)` accessor pairs.
pub struct Iter<'a, K, V, S> {
    map: &'a AtomicHashMap<K, V, S>,
    index: usize,
}

impl<K, V, S> Iterator for Iter<'_, K, V, S> {
    type Item = (Accessor<K>, Accessor<V>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.map.buckets.len() {
            let bucket = &self.map.buckets[self.index];
            self.index += 1;
            if bucket.is_occupied() {
                return Some((bucket.access_key(), bucket.access_value()));
            }
        }
        None
    }
}

/// The sizing formula: each level gets `next_prime(n / −ln(1 − ρ))`
/// buckets, then `capacity × ρ` is subtracted from the remaining count.
/// Errors out instead of proceeding when the remainder goes negative
/// before the last level.
fn gen_multi_level_sizes(
    mut n: usize,
    levels: usize,
) -> Result<(Vec<usize>, usize), CapacityError> {
    let ln_ratio = -(1.0 - OCCUPIED_RATIO).ln();

    let mut capacities = Vec::with_capacity(levels);
    let mut sum = 0usize;
    for level in 0..levels {
        let capacity = next_prime((n as f64 / ln_ratio) as usize);
        sum += capacity;
        let occupied = (capacity as f64 * OCCUPIED_RATIO) as usize;
        if n < occupied {
            return Err(CapacityError::LevelUndersized { level });
        }
        n -= occupied;
        capacities.push(capacity);
    }
    Ok((capacities, sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sizes_are_prime_and_cover_capacity() {
        let map: AtomicHashMap<u64, u64> = AtomicHashMap::with_capacity(4096).unwrap();
        assert_eq!(map.level_capacities().len(), DEFAULT_LEVELS);
        for &capacity in map.level_capacities() {
            assert!(koru_sync::is_prime(capacity), "{capacity} not prime");
        }
        let total: usize = map.level_capacities().iter().sum();
        assert_eq!(total, map.capacity());
        // The re-scaled total must be in the neighborhood of the request.
        assert!(total >= 4096 * 9 / 10, "total {total} far below request");
    }

    #[test]
    fn undersized_configuration_is_rejected() {
        // A tiny capacity cannot feed 13 levels.
        let result: Result<AtomicHashMap<u64, u64>, _> =
            AtomicHashMap::with_capacity_and_levels(8, 13);
        assert!(matches!(
            result,
            Err(CapacityError::LevelUndersized { .. })
        ));

        let result: Result<AtomicHashMap<u64, u64>, _> =
            AtomicHashMap::with_capacity_and_levels(0, 13);
        assert_eq!(result.err(), Some(CapacityError::Invalid));
    }
}
