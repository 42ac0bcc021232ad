//! Bounded lock-free ring queues.
//!
//! Two interchangeable MPMC variants plus a single-producer single-consumer
//! flavor:
//!
//! - [`Queue<T>`] — fully generic elements; each slot pairs a state byte
//!   (`EMPTY → STORING → STORED → LOADING → EMPTY`) with element storage.
//! - [`SentinelQueue<T>`] — word-sized elements with a reserved sentinel
//!   meaning "slot empty"; each slot is a single atomic word.
//! - [`spsc`] — the single-producer single-consumer protocol, enforced by
//!   non-cloneable `Producer` / `Consumer` handles rather than by
//!   documentation.
//!
//! All variants share the same contract: `try_push`/`try_pop` report
//! backpressure, `push`/`pop` reserve a slot unconditionally and wait
//! (bounded, per slot) for the peer to make room. `was_empty`, `was_full`
//! and `was_size` are advisory snapshots.
//!
//! Construction takes [`QueueOptions`]: `minimize_contention` rounds the
//! capacity to a power of two and shuffles indices so consecutive tickets
//! land on different cache lines, `maximize_throughput` interleaves relaxed
//! loads into the busy-wait loops to avoid broadcasting read-for-ownership
//! traffic, and `total_order` upgrades the ticket counters to sequentially
//! consistent, giving one global FIFO order across all observers.

mod ring;
mod sentinel;
mod state;

pub mod spsc;

pub use ring::QueueOptions;
pub use sentinel::{SentinelQueue, Word};
pub use state::Queue;
