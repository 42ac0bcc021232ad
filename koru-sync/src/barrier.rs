use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

/// A spinning rendezvous between one coordinator and N cooperating threads.
///
/// Cooperators call [`wait`](Barrier::wait): they check in by incrementing
/// the counter and spin until the coordinator resets it. The coordinator
/// calls [`release`](Barrier::release) with the expected number of
/// cooperators: it spins until all have checked in, then resets the counter
/// to let them through.
pub struct Barrier {
    counter: AtomicU32,
}

impl Barrier {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
        }
    }

    /// Checks in and spins until the coordinator releases the barrier.
    pub fn wait(&self) {
        self.counter.fetch_add(1, Ordering::Acquire);
        while self.counter.load(Ordering::Relaxed) != 0 {
            spin_loop();
        }
    }

    /// Spins until `expected` cooperators have checked in, then releases
    /// them all.
    pub fn release(&self, expected: u32) {
        while self.counter.load(Ordering::Relaxed) != expected {
            spin_loop();
        }
        self.counter.store(0, Ordering::Release);
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}
