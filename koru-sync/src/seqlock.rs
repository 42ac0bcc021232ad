use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{compiler_fence, AtomicUsize, Ordering};

use crate::cache::CacheAligned;

/// A sequence lock over a trivially-copyable value.
///
/// Readers never block the writer: they copy the payload bracketed by two
/// reads of the sequence counter and retry until both reads agree on an even
/// value. An odd sequence means a store is in progress.
///
/// Writers must be externally serialized — concurrent `store` calls corrupt
/// the sequence protocol. Readers may run from any thread.
pub struct Seqlock<T> {
    // The payload gets its own cache line so reader copies never contend
    // with the sequence counter or neighbouring data.
    value: CacheAligned<UnsafeCell<T>>,
    seq: CacheAligned<AtomicUsize>,
}

unsafe impl<T: Copy + Send> Send for Seqlock<T> {}
unsafe impl<T: Copy + Send> Sync for Seqlock<T> {}

impl<T: Copy> Seqlock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: CacheAligned::new(UnsafeCell::new(value)),
            seq: CacheAligned::new(AtomicUsize::new(0)),
        }
    }

    /// Takes a consistent snapshot of the value, retrying while a store is
    /// in flight.
    #[inline]
    pub fn load(&self) -> T {
        loop {
            let seq0 = self.seq.load(Ordering::Acquire);
            compiler_fence(Ordering::AcqRel);
            // Volatile: the writer may race this copy; the sequence check
            // below discards torn reads.
            let copy = unsafe { ptr::read_volatile(self.value.get()) };
            compiler_fence(Ordering::AcqRel);
            let seq1 = self.seq.load(Ordering::Acquire);
            if seq0 == seq1 && seq0 & 1 == 0 {
                return copy;
            }
        }
    }

    /// Publishes a new value. Callers must guarantee a single writer.
    #[inline]
    pub fn store(&self, desired: T) {
        let seq0 = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq0.wrapping_add(1), Ordering::Release);
        compiler_fence(Ordering::AcqRel);
        unsafe { ptr::write_volatile(self.value.get(), desired) };
        compiler_fence(Ordering::AcqRel);
        self.seq.store(seq0.wrapping_add(2), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_stored_value() {
        let lock = Seqlock::new((1u64, 2u64));
        assert_eq!(lock.load(), (1, 2));
        lock.store((3, 4));
        assert_eq!(lock.load(), (3, 4));
    }
}
