//! Hazard slots and the process-wide slot list.
//!
//! Each participating thread owns exactly one [`HazardSlot`] at a time: one
//! protected-pointer word plus that thread's retired list. Slots live in an
//! intrusive linked list that grows monotonically for the lifetime of the
//! process and is leaked on exit; a thread releases its slot on exit and the
//! next new thread re-uses it, retired list and all.

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::collections::HashSet;

use once_cell::race::OnceBox;

use crate::retired::Retired;

/// Deamortized mode sweep state: a detached retired list being drained a few
/// candidates at a time against a snapshot of the protected set.
pub(crate) struct Sweep {
    pub(crate) pending: *mut Retired,
    pub(crate) protected: HashSet<usize>,
}

/// State touched only by the thread currently owning the slot.
pub(crate) struct OwnerState {
    /// Retired list head and tail. Tail append keeps retirement O(1).
    pub(crate) head: *mut Retired,
    pub(crate) tail: *mut Retired,
    /// Retires since the last cleanup (or sweep start).
    pub(crate) since_cleanup: usize,
    /// Scratch set reused across cleanups to avoid re-allocation.
    pub(crate) scratch: HashSet<usize>,
    pub(crate) sweep: Option<Sweep>,
}

/// One hazard slot: a single protected pointer plus the owner-only
/// reclamation state.
pub(crate) struct HazardSlot {
    /// The address this slot's owner is currently dereferencing; 0 when idle.
    pub(crate) protected: AtomicUsize,
    in_use: AtomicBool,
    next: AtomicPtr<HazardSlot>,
    owner: UnsafeCell<OwnerState>,
}

// SAFETY: `owner` is only accessed by the thread holding `in_use`; the
// acquire/release pair on `in_use` orders the handoff between owners.
unsafe impl Send for HazardSlot {}
unsafe impl Sync for HazardSlot {}

impl HazardSlot {
    fn new(in_use: bool) -> Self {
        Self {
            protected: AtomicUsize::new(0),
            in_use: AtomicBool::new(in_use),
            next: AtomicPtr::new(core::ptr::null_mut()),
            owner: UnsafeCell::new(OwnerState {
                head: core::ptr::null_mut(),
                tail: core::ptr::null_mut(),
                since_cleanup: 0,
                scratch: HashSet::new(),
                sweep: None,
            }),
        }
    }

    /// Owner-only access to the reclamation state.
    ///
    /// # Safety
    ///
    /// Caller must be the thread that holds this slot's `in_use` flag.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn owner_state(&self) -> &mut OwnerState {
        unsafe { &mut *self.owner.get() }
    }
}

/// Process-wide engine state: the slot list head and global mode flags.
pub(crate) struct HazardEngine {
    head: AtomicPtr<HazardSlot>,
    deamortized: AtomicBool,
}

impl HazardEngine {
    fn new() -> Self {
        Self {
            head: AtomicPtr::new(core::ptr::null_mut()),
            deamortized: AtomicBool::new(false),
        }
    }

    /// Claims a free slot or grows the list by one. Slots are leaked by
    /// design; allocation failure here is fatal.
    pub(crate) fn acquire_slot(&self) -> &'static HazardSlot {
        let mut cursor = self.head.load(Ordering::Acquire);
        while !cursor.is_null() {
            let slot = unsafe { &*cursor };
            if !slot.in_use.load(Ordering::Relaxed)
                && slot
                    .in_use
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return slot;
            }
            cursor = slot.next.load(Ordering::Acquire);
        }

        let slot: &'static HazardSlot = Box::leak(Box::new(HazardSlot::new(true)));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            slot.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                slot as *const _ as *mut _,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return slot,
                Err(h) => head = h,
            }
        }
    }

    /// Returns a slot to the free pool. Its retired list stays in place for
    /// the next owner.
    pub(crate) fn release_slot(&self, slot: &HazardSlot) {
        slot.protected.store(0, Ordering::Release);
        slot.in_use.store(false, Ordering::Release);
    }

    /// Collects every currently protected pointer into `out`. Callers must
    /// issue the heavy fence first.
    pub(crate) fn collect_protected(&self, out: &mut HashSet<usize>) {
        let mut cursor = self.head.load(Ordering::Acquire);
        while !cursor.is_null() {
            let slot = unsafe { &*cursor };
            let p = slot.protected.load(Ordering::Acquire);
            if p != 0 {
                out.insert(p);
            }
            cursor = slot.next.load(Ordering::Acquire);
        }
    }

    pub(crate) fn set_deamortized(&self, on: bool) {
        self.deamortized.store(on, Ordering::Release);
    }

    pub(crate) fn deamortized(&self) -> bool {
        self.deamortized.load(Ordering::Acquire)
    }
}

static ENGINE: OnceBox<HazardEngine> = OnceBox::new();

/// The lazily initialized process-wide engine. Never torn down.
#[inline]
pub(crate) fn engine() -> &'static HazardEngine {
    ENGINE.get_or_init(|| Box::new(HazardEngine::new()))
}
