use core::cell::UnsafeCell;
use core::mem::{self, MaybeUninit};
use core::sync::atomic::{fence, AtomicIsize, AtomicPtr, Ordering};
use std::sync::Arc;

use koru_sync::CacheAligned;

/// Ring buffer of one growth generation. Never shrunk, never freed before
/// the deque itself drops — a slow thief may still read from a superseded
/// buffer while its CAS on `top` is in flight.
struct Buffer<T> {
    mask: isize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

impl<T> Buffer<T> {
    fn alloc(capacity: usize) -> *mut Buffer<T> {
        debug_assert!(capacity.is_power_of_two());
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Box::into_raw(Box::new(Buffer {
            mask: capacity as isize - 1,
            slots,
        }))
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// # Safety
    ///
    /// Index must address an initialized slot; the read duplicates the
    /// value, so exactly one copy must ever be kept.
    unsafe fn read(&self, index: isize) -> T {
        let slot = &self.slots[(index & self.mask) as usize];
        unsafe { (*slot.get()).assume_init_read() }
    }

    /// # Safety
    ///
    /// Caller must be the owner and the slot must be logically empty.
    unsafe fn write(&self, index: isize, value: T) {
        let slot = &self.slots[(index & self.mask) as usize];
        unsafe { (*slot.get()).write(value) };
    }
}

struct Inner<T> {
    /// Thieves advance `top`; the CAS on it linearizes removals.
    top: CacheAligned<AtomicIsize>,
    /// The owner advances (and briefly retreats) `bottom`.
    bottom: CacheAligned<AtomicIsize>,
    buffer: AtomicPtr<Buffer<T>>,
    /// Superseded buffers, owner-write only, freed on drop.
    garbage: UnsafeCell<Vec<*mut Buffer<T>>>,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Sole remaining reference: plain loads suffice.
        let top = self.top.load(Ordering::Relaxed);
        let bottom = self.bottom.load(Ordering::Relaxed);
        let buffer = self.buffer.load(Ordering::Relaxed);

        unsafe {
            for i in top..bottom {
                drop((*buffer).read(i));
            }
            drop(Box::from_raw(buffer));
            for garbage in (*self.garbage.get()).drain(..) {
                drop(Box::from_raw(garbage));
            }
        }
    }
}

/// The owning endpoint: `push` and `pop` at the bottom. Not `Clone`; move
/// it to the one thread that feeds the deque.
pub struct Worker<T> {
    inner: Arc<Inner<T>>,
}

unsafe impl<T: Send> Send for Worker<T> {}

/// A thief endpoint: `steal` from the top. Clone one per consumer thread.
pub struct Stealer<T> {
    inner: Arc<Inner<T>>,
}

unsafe impl<T: Send> Send for Stealer<T> {}
unsafe impl<T: Send> Sync for Stealer<T> {}

impl<T> Clone for Stealer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Worker<T> {
    /// A deque with the given initial capacity, rounded up to a power of
    /// two. Default in the literature and here: 1024.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            inner: Arc::new(Inner {
                top: CacheAligned::new(AtomicIsize::new(0)),
                bottom: CacheAligned::new(AtomicIsize::new(0)),
                buffer: AtomicPtr::new(Buffer::alloc(capacity)),
                garbage: UnsafeCell::new(Vec::with_capacity(32)),
            }),
        }
    }

    /// A new thief handle for this deque.
    pub fn stealer(&self) -> Stealer<T> {
        Stealer {
            inner: self.inner.clone(),
        }
    }

    /// Appends an element at the bottom, growing the buffer when full.
    pub fn push(&self, value: T) {
        let inner = &*self.inner;
        let b = inner.bottom.load(Ordering::Relaxed);
        let t = inner.top.load(Ordering::Acquire);
        let mut buffer = inner.buffer.load(Ordering::Relaxed);

        // Full: double the capacity and copy the live range over.
        if unsafe { (*buffer).capacity() - 1 } < (b - t) as usize {
            buffer = self.grow(buffer, b, t);
        }

        unsafe { (*buffer).write(b, value) };
        fence(Ordering::Release);
        inner.bottom.store(b + 1, Ordering::Relaxed);
    }

    /// Removes the most recently pushed element, racing thieves for the
    /// last one. Returns `None` when the deque is empty.
    pub fn pop(&self) -> Option<T> {
        let inner = &*self.inner;
        let b = inner.bottom.load(Ordering::Relaxed) - 1;
        let buffer = inner.buffer.load(Ordering::Relaxed);
        inner.bottom.store(b, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let t = inner.top.load(Ordering::Relaxed);

        if t <= b {
            let value = unsafe { (*buffer).read(b) };
            if t == b {
                // Last element: the CAS on top decides between us and a
                // thief reading the same slot.
                if inner
                    .top
                    .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                    .is_err()
                {
                    mem::forget(value);
                    inner.bottom.store(b + 1, Ordering::Relaxed);
                    return None;
                }
                inner.bottom.store(b + 1, Ordering::Relaxed);
            }
            Some(value)
        } else {
            inner.bottom.store(b + 1, Ordering::Relaxed);
            None
        }
    }

    /// True when a snapshot showed no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element count at the time of the call.
    pub fn len(&self) -> usize {
        len(&self.inner)
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        unsafe { (*self.inner.buffer.load(Ordering::Relaxed)).capacity() }
    }

    #[cold]
    fn grow(&self, old: *mut Buffer<T>, b: isize, t: isize) -> *mut Buffer<T> {
        let inner = &*self.inner;
        let new = Buffer::alloc(unsafe { (*old).capacity() } * 2);
        unsafe {
            for i in t..b {
                (*new).write(i, (*old).read(i));
            }
            // Thieves may still read `old`; it lives until the deque drops.
            (*inner.garbage.get()).push(old);
        }
        inner.buffer.store(new, Ordering::Release);
        new
    }
}

impl<T> Stealer<T> {
    /// Removes the oldest element. `None` means empty *or* lost a race —
    /// callers loop if they want exhaustion.
    pub fn steal(&self) -> Option<T> {
        let inner = &*self.inner;
        let t = inner.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = inner.bottom.load(Ordering::Acquire);

        if t < b {
            let buffer = inner.buffer.load(Ordering::Acquire);
            let value = unsafe { (*buffer).read(t) };
            if inner
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
            {
                // Another thief (or the owner's last-element pop) won.
                mem::forget(value);
                return None;
            }
            Some(value)
        } else {
            None
        }
    }

    /// True when a snapshot showed no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element count at the time of the call.
    pub fn len(&self) -> usize {
        len(&self.inner)
    }
}

fn len<T>(inner: &Inner<T>) -> usize {
    let b = inner.bottom.load(Ordering::Relaxed);
    let t = inner.top.load(Ordering::Relaxed);
    if b >= t {
        (b - t) as usize
    } else {
        0
    }
}
