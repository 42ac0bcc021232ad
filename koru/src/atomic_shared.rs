//! A lock-free atomic slot holding shared ownership.
//!
//! [`AtomicShared<T>`] is one atomic word pointing at a control block.
//! Stores, swaps and compare-exchanges are plain pointer operations plus
//! reference-count transfers; loads are wait-free thanks to the hazard
//! protection around the strong-count claim — a load never spins on the
//! counter, only on the (rare) case that the protected block died between
//! the slot read and the claim.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::control::Header;
use crate::hazard;
use crate::shared::Shared;

/// Maps a compare-exchange success ordering to the strongest failure
/// ordering compatible with it.
pub fn default_failure_ordering(success: Ordering) -> Ordering {
    match success {
        Ordering::AcqRel => Ordering::Acquire,
        Ordering::Release => Ordering::Relaxed,
        other => other,
    }
}

/// An atomic, lock-free cell for `Option<Shared<T>>`.
pub struct AtomicShared<T> {
    // Address of the control block header; 0 when empty. Erased to a word so
    // the hazard engine can protect it without knowing `T`.
    cb: AtomicUsize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send + Sync> Send for AtomicShared<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicShared<T> {}

impl<T> AtomicShared<T> {
    /// Always true: the slot is a single machine word.
    pub const IS_ALWAYS_LOCK_FREE: bool = true;

    /// An empty slot.
    pub const fn empty() -> Self {
        Self {
            cb: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// A slot initially holding `value`'s reference.
    pub fn new(value: Option<Shared<T>>) -> Self {
        Self {
            cb: AtomicUsize::new(into_word(value)),
            _marker: PhantomData,
        }
    }

    /// Whether operations on this slot are lock-free. Always true here.
    pub fn is_lock_free(&self) -> bool {
        Self::IS_ALWAYS_LOCK_FREE
    }

    /// Claims a fresh strong reference to the current value.
    ///
    /// The hazard-protected re-read gives the load acquire semantics
    /// regardless of `order`; weaker orderings are accepted for API
    /// symmetry. Retries only when the observed block lost its last strong
    /// reference between the slot read and the claim.
    pub fn load(&self, order: Ordering) -> Option<Shared<T>> {
        let _ = order;
        loop {
            let word = hazard::protect(&self.cb);
            if word == 0 {
                hazard::release();
                return None;
            }
            let header = word as *mut Header;
            if unsafe { (*header).increment_strong_if_nonzero() } {
                hazard::release();
                let payload = unsafe { (*header).payload } as *mut T;
                return Some(unsafe { Shared::from_parts(payload, header) });
            }
            // Block was disposed while protected; the slot must have moved
            // on. Retry against the new value.
        }
    }

    /// Replaces the current value, releasing its reference.
    pub fn store(&self, desired: Option<Shared<T>>, order: Ordering) {
        let old = self.cb.swap(into_word(desired), order);
        if old != 0 {
            unsafe { Header::decrement_strong(old as *mut Header) };
        }
    }

    /// Replaces the current value and returns the previous handle.
    pub fn swap(&self, desired: Option<Shared<T>>, order: Ordering) -> Option<Shared<T>> {
        let old = self.cb.swap(into_word(desired), order);
        unsafe { from_word(old) }
    }

    /// Single compare-exchange attempt; may fail spuriously and may fail on
    /// ABA of the control-block pointer.
    ///
    /// On success the slot's old reference is released and `desired` moves
    /// into the slot. On failure `expected` is re-loaded from the slot and
    /// `desired` is handed back.
    pub fn compare_exchange_weak(
        &self,
        expected: &mut Option<Shared<T>>,
        desired: Option<Shared<T>>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<(), Option<Shared<T>>> {
        let expected_word = word_of(expected);
        let desired_word = word_of(&desired);

        match self
            .cb
            .compare_exchange_weak(expected_word, desired_word, success, failure)
        {
            Ok(_) => {
                // The slot owned one reference on the old block; release it.
                if expected_word != 0 {
                    unsafe { Header::decrement_strong(expected_word as *mut Header) };
                }
                core::mem::forget(desired);
                Ok(())
            }
            Err(_) => {
                // Re-load rather than reconstructing from the raw observed
                // word: we do not own a reference on it.
                *expected = self.load(failure);
                Err(desired)
            }
        }
    }

    /// Strong compare-exchange built from the weak one: retries while the
    /// failure is spurious, i.e. while the re-loaded `expected` still refers
    /// to the same control block.
    pub fn compare_exchange(
        &self,
        expected: &mut Option<Shared<T>>,
        desired: Option<Shared<T>>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<(), Option<Shared<T>>> {
        let expected_word = word_of(expected);
        let mut desired = desired;
        loop {
            match self.compare_exchange_weak(expected, desired, success, failure) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    if word_of(expected) != expected_word {
                        // Genuine mismatch: the block actually changed.
                        return Err(returned);
                    }
                    desired = returned;
                }
            }
        }
    }

    /// Consumes the slot, returning the contained handle.
    pub fn into_inner(mut self) -> Option<Shared<T>> {
        let word = core::mem::replace(self.cb.get_mut(), 0);
        unsafe { from_word(word) }
    }
}

impl<T> Default for AtomicShared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Shared<T>> for AtomicShared<T> {
    fn from(value: Shared<T>) -> Self {
        Self::new(Some(value))
    }
}

impl<T> From<Option<Shared<T>>> for AtomicShared<T> {
    fn from(value: Option<Shared<T>>) -> Self {
        Self::new(value)
    }
}

impl<T> Drop for AtomicShared<T> {
    fn drop(&mut self) {
        let word = *self.cb.get_mut();
        if word != 0 {
            unsafe { Header::decrement_strong(word as *mut Header) };
        }
    }
}

impl<T> fmt::Debug for AtomicShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.cb.load(Ordering::Relaxed);
        f.debug_struct("AtomicShared")
            .field("occupied", &(word != 0))
            .finish()
    }
}

fn into_word<T>(value: Option<Shared<T>>) -> usize {
    match value {
        Some(shared) => shared.into_header() as usize,
        None => 0,
    }
}

fn word_of<T>(value: &Option<Shared<T>>) -> usize {
    match value {
        Some(shared) => shared.header_ptr() as usize,
        None => 0,
    }
}

// Takes over the reference owned by the raw word.
unsafe fn from_word<T>(word: usize) -> Option<Shared<T>> {
    if word == 0 {
        return None;
    }
    let header = word as *mut Header;
    let payload = unsafe { (*header).payload } as *mut T;
    Some(unsafe { Shared::from_parts(payload, header) })
}
