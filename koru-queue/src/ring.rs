//! Ticket counters and index remapping shared by the queue variants.

use core::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::Backoff;
use koru_sync::{msb, next_power_of_two, CacheAligned, CACHE_LINE_SIZE};

/// Behavior knobs fixed at construction.
#[derive(Copy, Clone, Debug)]
pub struct QueueOptions {
    /// Round the capacity up to a power of two and remap indices so
    /// consecutive pushes land on different cache lines.
    pub minimize_contention: bool,
    /// Interleave relaxed loads into busy-wait loops so spinning cores stop
    /// broadcasting read-for-ownership messages.
    pub maximize_throughput: bool,
    /// Sequentially consistent ticket counters: push and pop events get one
    /// global order at the cost of slower index advances. Off, FIFO holds
    /// per (producer, consumer) pair only.
    pub total_order: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            minimize_contention: true,
            maximize_throughput: true,
            total_order: false,
        }
    }
}

/// Swap the low `bits` of an index (position within a cache line) with the
/// next `bits` (the cache line number). Consecutive tickets then touch
/// different lines instead of piling onto one.
#[inline]
pub(crate) fn remap_index(index: u32, bits: u32) -> u32 {
    if bits == 0 {
        return index;
    }
    let mask = (1u32 << bits) - 1;
    let mix = (index ^ (index >> bits)) & mask;
    index ^ mix ^ (mix << bits)
}

/// Shuffle width for an array of `capacity` cells of `cell_size` bytes.
/// Zero (no remapping) unless the array spans at least `2^bits` full cache
/// lines, where `bits` indexes one line's worth of cells.
pub(crate) fn shuffle_bits(capacity: usize, cell_size: usize) -> u32 {
    let per_line = CACHE_LINE_SIZE / cell_size.max(1);
    let bits = msb(per_line);
    let min_size = 1usize << (bits * 2);
    if capacity < min_size {
        0
    } else {
        bits
    }
}

/// The head/tail ticket pair. Heads are claimed by producers, tails by
/// consumers; both only ever increase, and `head − tail` (as a signed
/// 32-bit difference) is the live element count.
pub(crate) struct Ring {
    head: CacheAligned<AtomicU32>,
    tail: CacheAligned<AtomicU32>,
    capacity: u32,
    /// `capacity − 1` when capacity is a power of two, else 0 and indexing
    /// falls back to modulo.
    mask: u32,
    shuffle: u32,
    pub(crate) maximize_throughput: bool,
    total_order: bool,
}

impl Ring {
    /// `cell_size` is the footprint of one slot cell, used to derive the
    /// shuffle width when contention minimization is on.
    pub(crate) fn new(capacity: usize, cell_size: usize, options: QueueOptions) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        assert!(capacity <= i32::MAX as usize, "queue capacity exceeds ticket range");

        let (capacity, shuffle) = if options.minimize_contention {
            // Remapping needs a power-of-two ring; arrays smaller than two
            // full shuffle blocks keep plain indexing (shuffle_bits = 0).
            let capacity = next_power_of_two(capacity);
            (capacity, shuffle_bits(capacity, cell_size))
        } else {
            (capacity, 0)
        };

        let mask = if capacity.is_power_of_two() {
            capacity as u32 - 1
        } else {
            0
        };

        Self {
            head: CacheAligned::new(AtomicU32::new(0)),
            tail: CacheAligned::new(AtomicU32::new(0)),
            capacity: capacity as u32,
            mask,
            shuffle,
            maximize_throughput: options.maximize_throughput,
            total_order: options.total_order,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Maps a ticket to its slot index, applying the cache-line shuffle.
    #[inline]
    pub(crate) fn slot_index(&self, ticket: u32) -> usize {
        let wrapped = if self.mask != 0 {
            ticket & self.mask
        } else {
            ticket % self.capacity
        };
        remap_index(wrapped, self.shuffle) as usize
    }

    #[inline]
    fn ticket_order(&self) -> Ordering {
        if self.total_order {
            Ordering::SeqCst
        } else {
            Ordering::Relaxed
        }
    }

    /// Unconditionally claims a producer ticket.
    #[inline]
    pub(crate) fn claim_push(&self) -> u32 {
        self.head.fetch_add(1, self.ticket_order())
    }

    /// Unconditionally claims a consumer ticket.
    #[inline]
    pub(crate) fn claim_pop(&self) -> u32 {
        self.tail.fetch_add(1, self.ticket_order())
    }

    /// Claims a producer ticket unless the queue was full.
    pub(crate) fn try_claim_push(&self) -> Option<u32> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let used = head.wrapping_sub(self.tail.load(Ordering::Relaxed)) as i32;
            if used >= self.capacity as i32 {
                return None;
            }
            match self.head.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(head),
                Err(h) => {
                    head = h;
                    backoff.spin();
                }
            }
        }
    }

    /// Claims a consumer ticket unless the queue was empty.
    pub(crate) fn try_claim_pop(&self) -> Option<u32> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let used = self.head.load(Ordering::Relaxed).wrapping_sub(tail) as i32;
            if used <= 0 {
                return None;
            }
            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(tail),
                Err(t) => {
                    tail = t;
                    backoff.spin();
                }
            }
        }
    }

    /// Advisory element count. Can briefly read negative when consumers ran
    /// ahead with unconditional pops; clamped to zero.
    pub(crate) fn was_size(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        (head.wrapping_sub(tail) as i32).max(0) as usize
    }
}
