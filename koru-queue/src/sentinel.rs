//! The sentinel queue variant: word-sized elements, one atomic word per
//! slot.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::ring::{QueueOptions, Ring};

/// Element types storable as a single machine word, with a reserved
/// sentinel value meaning "slot empty".
///
/// The sentinel may never be pushed; [`SentinelQueue::push`] asserts this.
pub trait Word: Copy + Eq {
    /// The reserved empty marker (zero / null for the provided impls).
    const NIL: Self;

    fn into_word(self) -> usize;
    fn from_word(word: usize) -> Self;
}

macro_rules! impl_word_for_uint {
    ($($t:ty),*) => {
        $(impl Word for $t {
            const NIL: Self = 0;

            #[inline]
            fn into_word(self) -> usize {
                self as usize
            }

            #[inline]
            fn from_word(word: usize) -> Self {
                word as $t
            }
        })*
    };
}

impl_word_for_uint!(u8, u16, u32, usize);

#[cfg(target_pointer_width = "64")]
impl_word_for_uint!(u64);

impl<T> Word for *mut T {
    const NIL: Self = core::ptr::null_mut();

    #[inline]
    fn into_word(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_word(word: usize) -> Self {
        word as *mut T
    }
}

/// A bounded MPMC queue whose slots are single atomic words.
///
/// Cheaper than [`Queue`](crate::Queue) — a push is one compare-exchange,
/// a pop one exchange — at the price of restricting elements to word-sized
/// values that exclude the sentinel. See the [crate docs](crate) for the
/// shared queue contract.
pub struct SentinelQueue<T: Word> {
    ring: Ring,
    slots: Box<[AtomicUsize]>,
    _marker: core::marker::PhantomData<T>,
}

unsafe impl<T: Word + Send> Send for SentinelQueue<T> {}
unsafe impl<T: Word + Send> Sync for SentinelQueue<T> {}

impl<T: Word> SentinelQueue<T> {
    /// A queue holding at least `capacity` elements, with default options.
    pub fn new(capacity: usize) -> Self {
        Self::with_options(capacity, QueueOptions::default())
    }

    /// A queue holding at least `capacity` elements. With
    /// `minimize_contention` the capacity is rounded up to a power of two.
    pub fn with_options(capacity: usize, options: QueueOptions) -> Self {
        let ring = Ring::new(capacity, core::mem::size_of::<AtomicUsize>(), options);
        let capacity = ring.capacity();
        let nil = T::NIL.into_word();
        let slots = (0..capacity).map(|_| AtomicUsize::new(nil)).collect();

        Self {
            ring,
            slots,
            _marker: core::marker::PhantomData,
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
    /// the consumer side if the slot is still occupied.
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
        let word = value.into_word();
        let nil = T::NIL.into_word();
        assert!(word != nil, "the sentinel value cannot be pushed");

        let slot = &self.slots[self.ring.slot_index(ticket)];
        loop {
            if slot
                .compare_exchange_weak(nil, word, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            // Wait for the consumer of the previous lap to drain the slot.
            loop {
                spin_loop();
                if !self.ring.maximize_throughput || slot.load(Ordering::Relaxed) == nil {
                    break;
                }
            }
        }
    }

    fn read_slot(&self, ticket: u32) -> T {
        let nil = T::NIL.into_word();
        let slot = &self.slots[self.ring.slot_index(ticket)];
        loop {
            let word = slot.swap(nil, Ordering::Acquire);
            if word != nil {
                return T::from_word(word);
            }
            loop {
                spin_loop();
                if !self.ring.maximize_throughput || slot.load(Ordering::Relaxed) != nil {
                    break;
                }
            }
        }
    }
}
