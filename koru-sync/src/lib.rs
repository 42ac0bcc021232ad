//! Shared low-level primitives for the koru workspace.
//!
//! Everything here is a leaf: the other koru crates build on these types but
//! nothing in this crate knows about them. The contents are deliberately
//! small — a spinlock with an RAII guard, a seqlock for trivially-copyable
//! snapshots, a wait group, a spin barrier, cache-line alignment helpers, and
//! the prime / power-of-two math used by the hash map's level sizing.

mod barrier;
mod cache;
mod math;
mod seqlock;
mod spinlock;
mod wait_group;

pub use barrier::Barrier;
pub use cache::{CacheAligned, CACHE_LINE_SIZE};
pub use math::{is_prime, msb, next_power_of_two, next_prime};
pub use seqlock::Seqlock;
pub use spinlock::{Spinlock, SpinlockGuard};
pub use wait_group::WaitGroup;
