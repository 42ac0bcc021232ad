//! The state-byte queue variant: fully generic elements.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::ring::{Ring, QueueOptions};

// Per-slot protocol. Producers own EMPTY→STORING→STORED, consumers own
// STORED→LOADING→EMPTY.
const EMPTY: u8 = 0;
const STORING: u8 = 1;
const STORED: u8 = 2;
const LOADING: u8 = 3;

/// A bounded multi-producer multi-consumer queue for arbitrary element
/// types.
///
/// Each slot is a state byte plus element storage; the state bytes live in
/// their own array so that index shuffling spreads them across cache lines.
/// See the [crate docs](crate) for the shared queue contract.
pub struct Queue<T> {
    ring: Ring,
    states: Box<[AtomicU8]>,
    values: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// A queue holding at least `capacity` elements, with default options.
    pub fn new(capacity: usize) -> Self {
        Self::with_options(capacity, QueueOptions::default())
    }

    /// A queue holding at least `capacity` elements. With
    /// `minimize_contention` the capacity is rounded up to a power of two.
    pub fn with_options(capacity: usize, options: QueueOptions) -> Self {
        let ring = Ring::new(capacity, core::mem::size_of::<AtomicU8>(), options);
        let capacity = ring.capacity();

        let states = (0..capacity).map(|_| AtomicU8::new(EMPTY)).collect();
        let values = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Self {
            ring,
            states,
            values,
        }
    }

    /// Pushes unless the queue was full, in which case the element comes
    /// back in the error.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        match self.ring.try_claim_push() {
            Some(ticket) => {
                self.write_slot(ticket, value);
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Pops unless the queue was empty.
    pub fn try_pop(&self) -> Option<T> {
        let ticket = self.ring.try_claim_pop()?;
        Some(self.read_slot(ticket))
    }

    /// Reserves a slot unconditionally and publishes into it, waiting for
    /// the consumer side if the slot is still occupied. Total only if pops
    /// keep happening; the wait is bounded per slot.
    pub fn push(&self, value: T) {
        let ticket = self.ring.claim_push();
        self.write_slot(ticket, value);
    }

    /// Reserves a slot unconditionally and takes its element, waiting for
    /// the producer side if the slot is still empty.
    pub fn pop(&self) -> T {
        let ticket = self.ring.claim_pop();
        self.read_slot(ticket)
    }

    /// Advisory: true when a snapshot of the counters showed no elements.
    pub fn was_empty(&self) -> bool {
        self.was_size() == 0
    }

    /// Advisory: true when a snapshot of the counters showed a full ring.
    pub fn was_full(&self) -> bool {
        self.was_size() >= self.capacity()
    }

    /// Advisory element count.
    pub fn was_size(&self) -> usize {
        self.ring.was_size()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    fn write_slot(&self, ticket: u32, value: T) {
        let index = self.ring.slot_index(ticket);
        let state = &self.states[index];
        loop {
            if state
                .compare_exchange_weak(EMPTY, STORING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                unsafe { (*self.values[index].get()).write(value) };
                state.store(STORED, Ordering::Release);
                return;
            }
            // Speculative loads while waiting: spinning on the CAS would
            // broadcast RFO messages and starve the peer doing the release.
            loop {
                spin_loop();
                if !self.ring.maximize_throughput || state.load(Ordering::Relaxed) == EMPTY {
                    break;
                }
            }
        }
    }

    fn read_slot(&self, ticket: u32) -> T {
        let index = self.ring.slot_index(ticket);
        let state = &self.states[index];
        loop {
            if state
                .compare_exchange_weak(STORED, LOADING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { (*self.values[index].get()).assume_init_read() };
                state.store(EMPTY, Ordering::Release);
                return value;
            }
            loop {
                spin_loop();
                if !self.ring.maximize_throughput || state.load(Ordering::Relaxed) == STORED {
                    break;
                }
            }
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        // Any slot still marked STORED owns an initialized element.
        for (state, value) in self.states.iter().zip(self.values.iter()) {
            if state.load(Ordering::Relaxed) == STORED {
                unsafe { (*value.get()).assume_init_drop() };
            }
        }
    }
}
