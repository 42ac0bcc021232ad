//! Koru: wait-free atomic shared pointers over hazard-pointer reclamation.
//!
//! The crate is built from three interlocking pieces:
//!
//! - a [`hazard`] engine giving every thread one protected-pointer slot and
//!   deferred destruction for retired control blocks,
//! - a [`WaitFreeCounter`] whose increment-from-zero fails instead of
//!   resurrecting a dead object,
//! - [`Shared`] / [`Weak`] ownership handles and the [`AtomicShared`] slot
//!   that combines the two into wait-free `load` and lock-free
//!   `store`/`swap`/`compare_exchange`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::Ordering;
//! use koru::{AtomicShared, Shared};
//!
//! let slot = AtomicShared::from(Shared::new(42));
//!
//! // Wait-free: no retry on the reference count.
//! let value = slot.load(Ordering::Acquire).unwrap();
//! assert_eq!(*value, 42);
//!
//! slot.store(Some(Shared::new(43)), Ordering::Release);
//! assert_eq!(*slot.load(Ordering::Acquire).unwrap(), 43);
//! ```
//!
//! Readers pay a compiler barrier per protected load; writers scanning for
//! reclamation pay a process-wide `membarrier(2)` (or an `mprotect`-based
//! fallback). See [`hazard`] for the mechanics.

#![warn(missing_docs)]

extern crate alloc;

mod atom;
mod atomic_shared;
mod control;
mod counter;
mod fence;
pub mod hazard;
mod retired;
mod shared;
mod slot;

pub use atom::Atom;
pub use atomic_shared::{default_failure_ordering, AtomicShared};
pub use counter::WaitFreeCounter;
pub use hazard::enable_deamortized_reclamation;
pub use retired::Retired;
pub use shared::{EnableSharedFromSelf, ExpiredError, Shared, SharedFromSelf, Weak};

// Re-export for convenience
pub use core::sync::atomic::Ordering;
