//! `Atom<T>` — a safe atomic container for arbitrary values.
//!
//! [`AtomicShared`](crate::AtomicShared) exposes the full shared-pointer
//! machinery; `Atom` is the everyday wrapper over it for the common case of
//! "one value, atomically replaceable, readable from anywhere". It is never
//! empty, so `load` needs no `Option`.
//!
//! ```
//! use koru::Atom;
//!
//! let atom = Atom::new(vec![1, 2, 3]);
//!
//! let snapshot = atom.load();
//! assert_eq!(snapshot.len(), 3);
//!
//! let old = atom.swap(vec![4]);
//! assert_eq!(&*old, &[1, 2, 3]);
//! assert_eq!(atom.load().len(), 1);
//! ```

use core::fmt;
use core::sync::atomic::Ordering;

use crate::atomic_shared::AtomicShared;
use crate::shared::Shared;

/// An atomic cell always holding one shared value.
///
/// `load` hands out a [`Shared`] handle that keeps the observed value alive
/// for as long as the caller holds it, independent of later stores.
pub struct Atom<T> {
    slot: AtomicShared<T>,
}

impl<T> Atom<T> {
    /// A cell initially holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            slot: AtomicShared::from(Shared::new(value)),
        }
    }

    /// A cell adopting an existing handle.
    pub fn from_shared(value: Shared<T>) -> Self {
        Self {
            slot: AtomicShared::from(value),
        }
    }

    /// The current value. Wait-free; the handle pins the value against
    /// replacement-triggered teardown.
    pub fn load(&self) -> Shared<T> {
        // The slot is never stored empty, so the load always yields a value.
        self.slot
            .load(Ordering::Acquire)
            .expect("Atom slot is never empty")
    }

    /// An owned copy of the current value.
    pub fn load_clone(&self) -> T
    where
        T: Clone,
    {
        (*self.load()).clone()
    }

    /// Replaces the value. The previous value is torn down once its last
    /// reader lets go.
    pub fn store(&self, value: T) {
        self.slot.store(Some(Shared::new(value)), Ordering::Release);
    }

    /// Replaces the value with an already-shared handle.
    pub fn store_shared(&self, value: Shared<T>) {
        self.slot.store(Some(value), Ordering::Release);
    }

    /// Replaces the value and returns the previous one.
    pub fn swap(&self, value: T) -> Shared<T> {
        self.slot
            .swap(Some(Shared::new(value)), Ordering::AcqRel)
            .expect("Atom slot is never empty")
    }

    /// Replaces the value only if the cell still holds exactly `current`
    /// (same underlying allocation, not structural equality). Returns the
    /// displaced handle on success and hands `desired` back on failure.
    pub fn compare_swap(
        &self,
        current: &Shared<T>,
        desired: Shared<T>,
    ) -> Result<Shared<T>, Shared<T>> {
        let mut expected = Some(current.clone());
        match self.slot.compare_exchange(
            &mut expected,
            Some(desired),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // Our clone of `current` is the displaced reference.
            Ok(()) => Ok(expected.expect("expectation was non-empty")),
            Err(returned) => Err(returned.expect("desired was non-empty")),
        }
    }
}

impl<T: Default> Default for Atom<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atom").field(&*self.load()).finish()
    }
}
