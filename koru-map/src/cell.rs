//! Reference-counted key/value cells and their RAII accessors.
//!
//! A cell is immutable after construction; all life-cycle transitions go
//! through its count. The slot that points at a cell owns one reference;
//! every live accessor owns one more. Acquisition fails once the count has
//! hit zero — the destructor may already be running, so the cell cannot be
//! revived.

use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{fence, AtomicU32, Ordering};
use std::alloc::{alloc, dealloc};

pub(crate) struct Counted<T> {
    refs: AtomicU32,
    value: T,
}

impl<T> Counted<T> {
    /// Heap-allocates a cell with one reference (the owning slot's).
    /// Returns `None` — with `value` dropped — when the allocator refuses.
    pub(crate) fn try_alloc(value: T) -> Option<NonNull<Counted<T>>> {
        let layout = Layout::new::<Counted<T>>();
        let ptr = unsafe { alloc(layout) } as *mut Counted<T>;
        let ptr = NonNull::new(ptr)?;
        unsafe {
            ptr.as_ptr().write(Counted {
                refs: AtomicU32::new(1),
                value,
            });
        }
        Some(ptr)
    }

    /// Claims a reference unless the count already hit zero.
    pub(crate) fn acquire(&self) -> bool {
        let mut curr = self.refs.load(Ordering::Relaxed);
        loop {
            if curr == 0 {
                return false;
            }
            match self.refs.compare_exchange_weak(
                curr,
                curr + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => curr = observed,
            }
        }
    }

    /// Drops a reference; true when the caller must deallocate.
    pub(crate) fn release(&self) -> bool {
        if self.refs.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    /// Releases the given reference and deallocates on last drop.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live cell and the caller must own one reference.
    pub(crate) unsafe fn release_and_free(ptr: *mut Counted<T>) {
        unsafe {
            if (*ptr).release() {
                core::ptr::drop_in_place(ptr);
                dealloc(ptr as *mut u8, Layout::new::<Counted<T>>());
            }
        }
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}

/// Scoped handle keeping a cell alive while its value is in use.
///
/// An accessor may be empty (miss, or the cell died mid-acquire); check
/// with [`has`](Accessor::has) or read through [`get`](Accessor::get).
pub struct Accessor<T> {
    cell: *mut Counted<T>,
}

unsafe impl<T: Send + Sync> Send for Accessor<T> {}
unsafe impl<T: Send + Sync> Sync for Accessor<T> {}

impl<T> Accessor<T> {
    pub(crate) fn empty() -> Self {
        Self {
            cell: core::ptr::null_mut(),
        }
    }

    /// Tries to pin `cell`; yields an empty accessor if it is gone.
    pub(crate) fn acquire(cell: *mut Counted<T>) -> Self {
        if !cell.is_null() && unsafe { (*cell).acquire() } {
            Self { cell }
        } else {
            Self::empty()
        }
    }

    /// True when a cell is pinned.
    pub fn has(&self) -> bool {
        !self.cell.is_null()
    }

    /// The pinned value, if any.
    pub fn get(&self) -> Option<&T> {
        if self.cell.is_null() {
            None
        } else {
            Some(unsafe { (*self.cell).value() })
        }
    }
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self::acquire(self.cell)
    }
}

impl<T> Drop for Accessor<T> {
    fn drop(&mut self) {
        if !self.cell.is_null() {
            unsafe { Counted::release_and_free(self.cell) };
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Accessor").field(value).finish(),
            None => f.write_str("Accessor(<empty>)"),
        }
    }
}
