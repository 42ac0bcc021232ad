//! Single-producer single-consumer ring.
//!
//! The SPSC slot protocol corrupts if either side has two concurrent
//! callers, so instead of documenting a precondition the endpoints are
//! distinct owner handles: [`channel`] returns one [`Producer`] and one
//! [`Consumer`], both `Send`, neither `Clone`. Move them to their threads
//! and the single-owner rule holds by construction.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use koru_sync::{next_power_of_two, CacheAligned};

const EMPTY: u8 = 0;
const STORED: u8 = 2;

struct Inner<T> {
    // Written by the producer only; read by both sides.
    head: CacheAligned<AtomicU32>,
    // Written by the consumer only; read by both sides.
    tail: CacheAligned<AtomicU32>,
    states: Box<[AtomicU8]>,
    values: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u32,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn capacity(&self) -> usize {
        self.states.len()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        for (state, value) in self.states.iter().zip(self.values.iter()) {
            if state.load(Ordering::Relaxed) == STORED {
                unsafe { (*value.get()).assume_init_drop() };
            }
        }
    }
}

/// Creates a bounded SPSC ring of at least `capacity` elements (rounded up
/// to a power of two) and splits it into its two endpoints.
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "queue capacity must be nonzero");
    let capacity = next_power_of_two(capacity);
    assert!(capacity <= i32::MAX as usize, "queue capacity exceeds ticket range");

    let inner = Arc::new(Inner {
        head: CacheAligned::new(AtomicU32::new(0)),
        tail: CacheAligned::new(AtomicU32::new(0)),
        states: (0..capacity).map(|_| AtomicU8::new(EMPTY)).collect(),
        values: (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect(),
        mask: capacity as u32 - 1,
    });

    (
        Producer {
            inner: inner.clone(),
        },
        Consumer { inner },
    )
}

/// The push endpoint of an SPSC ring. `Send` but not `Clone`.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
}

/// The pop endpoint of an SPSC ring. `Send` but not `Clone`.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Producer<T> {
    /// Pushes unless the ring was full, in which case the element comes
    /// back in the error.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let inner = &*self.inner;
        let head = inner.head.load(Ordering::Relaxed);
        let used = head.wrapping_sub(inner.tail.load(Ordering::Relaxed)) as i32;
        if used >= inner.capacity() as i32 {
            return Err(value);
        }
        inner.head.store(head.wrapping_add(1), Ordering::Relaxed);
        self.write_slot(head, value);
        Ok(())
    }

    /// Claims the next slot unconditionally, waiting for the consumer if it
    /// has not drained the previous lap yet.
    pub fn push(&mut self, value: T) {
        let inner = &*self.inner;
        let head = inner.head.load(Ordering::Relaxed);
        inner.head.store(head.wrapping_add(1), Ordering::Relaxed);
        self.write_slot(head, value);
    }

    /// Advisory element count.
    pub fn was_size(&self) -> usize {
        was_size(&self.inner)
    }

    /// Advisory: true when a snapshot of the counters showed a full ring.
    pub fn was_full(&self) -> bool {
        self.was_size() >= self.inner.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn write_slot(&self, ticket: u32, value: T) {
        let inner = &*self.inner;
        let index = (ticket & inner.mask) as usize;
        let state = &inner.states[index];
        while state.load(Ordering::Acquire) != EMPTY {
            spin_loop();
        }
        unsafe { (*inner.values[index].get()).write(value) };
        state.store(STORED, Ordering::Release);
    }
}

impl<T> Consumer<T> {
    /// Pops unless the ring was empty.
    pub fn try_pop(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        let used = inner.head.load(Ordering::Relaxed).wrapping_sub(tail) as i32;
        if used <= 0 {
            return None;
        }
        inner.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        Some(self.read_slot(tail))
    }

    /// Claims the next slot unconditionally, waiting for the producer to
    /// fill it.
    pub fn pop(&mut self) -> T {
        let inner = &*self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        inner.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        self.read_slot(tail)
    }

    /// Advisory element count.
    pub fn was_size(&self) -> usize {
        was_size(&self.inner)
    }

    /// Advisory: true when a snapshot of the counters showed no elements.
    pub fn was_empty(&self) -> bool {
        self.was_size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn read_slot(&self, ticket: u32) -> T {
        let inner = &*self.inner;
        let index = (ticket & inner.mask) as usize;
        let state = &inner.states[index];
        while state.load(Ordering::Acquire) != STORED {
            spin_loop();
        }
        let value = unsafe { (*inner.values[index].get()).assume_init_read() };
        state.store(EMPTY, Ordering::Release);
        value
    }
}

fn was_size<T>(inner: &Inner<T>) -> usize {
    let head = inner.head.load(Ordering::Relaxed);
    let tail = inner.tail.load(Ordering::Relaxed);
    (head.wrapping_sub(tail) as i32).max(0) as usize
}
