use core::sync::atomic::{AtomicPtr, Ordering};

/// Type-erased destructor invoked when a retired node is reclaimed.
pub(crate) type DestroyFn = unsafe fn(*mut Retired);

/// Intrusive header for anything the hazard engine can reclaim.
///
/// A retirable allocation must be `#[repr(C)]` with a `Retired` as its first
/// field; the engine links nodes through `next` and calls `destroy` exactly
/// once when no hazard slot protects the node's address any more.
#[repr(C)]
pub struct Retired {
    /// Link in the owning slot's retired list. Only the slot's owner thread
    /// traverses the list, but the field is atomic so a released slot can be
    /// adopted by a new owner without synchronization ceremony.
    pub(crate) next: AtomicPtr<Retired>,
    pub(crate) destroy: Option<DestroyFn>,
}

impl Retired {
    /// A fresh, unlinked header with no destroy hook.
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(core::ptr::null_mut()),
            destroy: None,
        }
    }

    pub(crate) fn set_destroy(&mut self, f: DestroyFn) {
        self.destroy = Some(f);
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut Retired {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_next(&self, next: *mut Retired) {
        self.next.store(next, Ordering::Relaxed);
    }
}

impl Default for Retired {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the header is only mutated by the thread that owns the containing
// slot's retired list; the atomics cover the ownership handoff.
unsafe impl Send for Retired {}
unsafe impl Sync for Retired {}
