use core::sync::atomic::{AtomicU32, Ordering};

/// A wait-free counter whose increment from zero fails instead of reviving
/// the count.
///
/// Built for reference counting where the guarded object is torn down when
/// the count first reaches zero: a racing increment must be told it lost,
/// not resurrect the object. The top two bits are bookkeeping (a zero flag
/// and a zero-pending flag), so the largest representable count is
/// [`WaitFreeCounter::MAX`].
///
/// Every operation is a single fetch-op plus at most one CAS — no retry
/// loops, hence wait-free.
pub struct WaitFreeCounter {
    x: AtomicU32,
}

const ZERO_FLAG: u32 = 1 << 31;
const ZERO_PENDING_FLAG: u32 = 1 << 30;

impl WaitFreeCounter {
    /// Largest representable count: 2^30 − 1.
    pub const MAX: u32 = ZERO_PENDING_FLAG - 1;

    /// Starts at one, the usual initial reference count.
    pub const fn new() -> Self {
        Self {
            x: AtomicU32::new(1),
        }
    }

    /// Starts at an arbitrary count (at most [`MAX`](WaitFreeCounter::MAX)).
    pub const fn with_value(v: u32) -> Self {
        Self {
            x: AtomicU32::new(v),
        }
    }

    /// Current count; zero once the counter has been zeroed, regardless of
    /// racing arithmetic on the flag bits.
    pub fn load(&self, order: Ordering) -> u32 {
        let mut val = self.x.load(order);
        if val == 0 {
            // Transient zero: a decrement is mid-flight. Flag it pending so
            // the decrementer knows its zero was observed.
            match self.x.compare_exchange(
                0,
                ZERO_FLAG | ZERO_PENDING_FLAG,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return 0,
                Err(observed) => val = observed,
            }
        }
        if val & ZERO_FLAG != 0 {
            0
        } else {
            val
        }
    }

    /// Adds `n`. Returns false — with the addition logically void — when the
    /// counter had already been zeroed.
    pub fn increment(&self, n: u32, order: Ordering) -> bool {
        let prev = self.x.fetch_add(n, order);
        prev & ZERO_FLAG == 0
    }

    /// Subtracts `n`. Returns true exactly once: for the decrement that took
    /// the counter to zero.
    pub fn decrement(&self, n: u32, order: Ordering) -> bool {
        if self.x.fetch_sub(n, order) == n {
            match self
                .x
                .compare_exchange(0, ZERO_FLAG, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(observed) => {
                    // A load saw the transient zero and set the pending flag;
                    // claim the zero by swapping the flag in ourselves.
                    if observed & ZERO_PENDING_FLAG != 0
                        && self.x.swap(ZERO_FLAG, Ordering::SeqCst) & ZERO_PENDING_FLAG != 0
                    {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Default for WaitFreeCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_one() {
        let c = WaitFreeCounter::new();
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn increment_and_decrement() {
        let c = WaitFreeCounter::new();
        assert!(c.increment(1, Ordering::SeqCst));
        assert_eq!(c.load(Ordering::SeqCst), 2);
        assert!(!c.decrement(1, Ordering::SeqCst));
        assert!(c.decrement(1, Ordering::SeqCst), "final decrement zeroes");
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn increment_from_zero_fails() {
        let c = WaitFreeCounter::new();
        assert!(c.decrement(1, Ordering::SeqCst));
        assert!(!c.increment(1, Ordering::SeqCst));
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn load_observing_transient_zero_reports_zero() {
        // A counter sitting at raw 0 (decremented, CAS-to-flag not yet done)
        // must read as zero and stay dead.
        let c = WaitFreeCounter::with_value(0);
        assert_eq!(c.load(Ordering::SeqCst), 0);
        assert!(!c.increment(1, Ordering::SeqCst));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn zeroing_is_reported_exactly_once() {
        for _ in 0..500 {
            let c = Arc::new(WaitFreeCounter::with_value(4));
            let zeroed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let mut handles = vec![];
            for _ in 0..4 {
                let c = c.clone();
                let zeroed = zeroed.clone();
                handles.push(thread::spawn(move || {
                    if c.decrement(1, Ordering::AcqRel) {
                        zeroed.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(zeroed.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn racing_increment_never_revives() {
        // One thread drops the last reference, another races an increment.
        // Either the increment happened before the zero (and the decrement
        // does not zero), or it failed; both observing success is the bug.
        for _ in 0..500 {
            let c = Arc::new(WaitFreeCounter::new());
            let dec = {
                let c = c.clone();
                thread::spawn(move || c.decrement(1, Ordering::AcqRel))
            };
            let inc = {
                let c = c.clone();
                thread::spawn(move || c.increment(1, Ordering::AcqRel))
            };
            let zeroed = dec.join().unwrap();
            let incremented = inc.join().unwrap();
            assert_ne!(zeroed, incremented, "both claimed the race");
            if zeroed {
                // The losing increment must have no observable effect.
                assert_eq!(c.load(Ordering::SeqCst), 0);
            }
        }
    }
}
