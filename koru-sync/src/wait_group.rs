use std::sync::{Condvar, Mutex};

/// Counts outstanding pieces of work and lets callers block until all of
/// them report completion.
///
/// `add` registers work, `done` retires one unit and wakes waiters when the
/// count reaches zero, `wait` blocks until it does. This is the only
/// primitive in the workspace that parks on the operating system.
pub struct WaitGroup {
    count: Mutex<usize>,
    cond: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Registers `n` additional units of work.
    pub fn add(&self, n: usize) {
        let mut count = self.count.lock().unwrap();
        *count += n;
    }

    /// Retires one unit of work. Wakes all waiters when the count hits zero.
    ///
    /// # Panics
    ///
    /// Panics if called more times than `add` accounted for.
    pub fn done(&self) {
        let mut count = self.count.lock().unwrap();
        assert!(*count > 0, "WaitGroup::done without matching add");
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    /// Blocks until the count reaches zero. Returns immediately if no work
    /// is registered.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cond.wait(count).unwrap();
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}
