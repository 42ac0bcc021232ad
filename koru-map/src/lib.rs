//! A fixed-capacity, multi-level, open-addressed concurrent hash map.
//!
//! The bucket array concatenates a tuple of prime-sized levels; a key
//! probes one bucket per level (`hash % capacity[i]`). Buckets hold two
//! word-sized slots — a key-cell pointer and a value-cell pointer — each
//! mutated only by lock-free compare-exchange or swap. Keys and values are
//! reference-counted cells; readers pin them through RAII [`Accessor`]s, so
//! a deleted entry is physically freed only when its last reader lets go.
//!
//! There is no rehashing and no locking. When every probed bucket is taken
//! by another key, [`AtomicHashMap::set`] reports
//! [`MapError::ProbeExhausted`] and the caller decides (usually: build a
//! bigger map).
//!
//! ```
//! use koru_map::AtomicHashMap;
//!
//! let map = AtomicHashMap::with_capacity(1024).unwrap();
//! map.set(&"answer", 42).unwrap();
//! assert_eq!(map.get(&"answer").get(), Some(&42));
//! map.delete(&"answer");
//! assert!(!map.get(&"answer").has());
//! ```

#![warn(missing_docs)]

mod bucket;
mod cell;
mod map;

pub use cell::Accessor;
pub use map::{AtomicHashMap, CapacityError, Iter, MapError, DEFAULT_LEVELS};
