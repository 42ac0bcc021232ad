//! A single-owner work-stealing deque.
//!
//! The Chase–Lev algorithm with a growable ring buffer: the owning thread
//! pushes and pops at the bottom, any number of thieves steal from the top.
//! The compare-exchange on `top` is the linearization point for every
//! element, so an element is returned by exactly one of owner `pop` or a
//! thief's `steal`.
//!
//! Ownership is split into two handle types: [`Worker`] (not `Clone` — the
//! owner operations really are single-threaded) and [`Stealer`] (`Clone`,
//! shareable freely).
//!
//! ```
//! use koru_deque::Worker;
//!
//! let worker = Worker::new(64);
//! let stealer = worker.stealer();
//!
//! worker.push(1);
//! worker.push(2);
//! assert_eq!(stealer.steal(), Some(1));
//! assert_eq!(worker.pop(), Some(2));
//! ```
//!
//! Growth doubles the buffer; superseded buffers are parked in a garbage
//! list for the deque's lifetime, because a slow thief may still be reading
//! from one. Growth allocation failure aborts, as does the initial
//! allocation.

#![warn(missing_docs)]

mod deque;

pub use deque::{Stealer, Worker};
