//! Per-thread hazard pointer operations.
//!
//! A thread's first call to any operation here claims a slot from the global
//! list. [`protect`] publishes the address being dereferenced, [`release`]
//! clears it, [`retire`] queues a node for deferred destruction, and
//! [`cleanup`] scans all slots and destroys every queued node nobody
//! protects. Retirement amortizes cleanup behind [`CLEANUP_THRESHOLD`];
//! [`enable_deamortized_reclamation`] trades that batch for a bounded amount
//! of work (at most [`DEAMORTIZED_BATCH`] candidates) on every retire.

use alloc::boxed::Box;
use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::HashSet;

use crate::fence;
use crate::retired::Retired;
use crate::slot::{engine, HazardSlot, OwnerState, Sweep};

/// Retires between automatic cleanups in amortized mode. Tuning, not
/// contract.
pub const CLEANUP_THRESHOLD: usize = 2000;

/// Candidates examined per retire once a deamortized sweep is running.
/// Tuning, not contract.
pub const DEAMORTIZED_BATCH: usize = 2;

struct Handle {
    slot: Cell<Option<&'static HazardSlot>>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            slot: Cell::new(None),
        }
    }

    #[inline]
    fn slot(&self) -> &'static HazardSlot {
        match self.slot.get() {
            Some(slot) => slot,
            None => {
                let slot = engine().acquire_slot();
                self.slot.set(Some(slot));
                slot
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.get() {
            // Best-effort drain before the slot goes back to the pool;
            // survivors stay queued for the slot's next owner.
            cleanup_slot(slot);
            engine().release_slot(slot);
        }
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Reads `src`, publishes the observed address in this thread's slot, and
/// re-reads until the two agree. The returned address is protected from
/// reclamation until the next `protect` or [`release`] on this thread.
#[inline]
pub fn protect(src: &AtomicUsize) -> usize {
    protect_with(src, |p| p)
}

/// [`protect`] through a projection: publishes `projection(p)` instead of
/// the raw loaded word. Used when the protectable allocation is reached
/// through a tagged or offset pointer.
#[inline]
pub fn protect_with<F>(src: &AtomicUsize, projection: F) -> usize
where
    F: Fn(usize) -> usize,
{
    HANDLE
        .try_with(|handle| {
            let slot = handle.slot();
            let mut p = src.load(Ordering::Acquire);
            loop {
                slot.protected.store(projection(p), Ordering::Relaxed);
                fence::light();
                let q = src.load(Ordering::Acquire);
                if q == p {
                    return p;
                }
                p = q;
            }
        })
        // TLS teardown: no slot to publish into, and no concurrent writers
        // left either. Fall back to a raw load.
        .unwrap_or_else(|_| src.load(Ordering::Acquire))
}

/// Clears this thread's protected pointer.
#[inline]
pub fn release() {
    let _ = HANDLE.try_with(|handle| {
        if let Some(slot) = handle.slot.get() {
            slot.protected.store(0, Ordering::Release);
        }
    });
}

/// Queues `ptr` for destruction once no thread protects its address. The
/// destructor drops the allocation as a `Box<T>`.
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and point to a `#[repr(C)]` type
///   with a [`Retired`] header as its first field.
/// - The allocation must already be unreachable from any shared location, so
///   no new protection of it can begin.
/// - A node must be retired at most once, and never accessed by the caller
///   afterwards.
pub unsafe fn retire<T: 'static>(ptr: *mut T) {
    let node = ptr as *mut Retired;
    unsafe fn drop_boxed<T>(node: *mut Retired) {
        unsafe { drop(Box::from_raw(node as *mut T)) };
    }
    unsafe {
        (*node).set_destroy(drop_boxed::<T>);
        retire_raw(node);
    }
}

/// Queues a node whose destroy hook is already set.
///
/// # Safety
///
/// Same contract as [`retire`], except the destroy hook must have been
/// installed by the caller.
pub(crate) unsafe fn retire_raw(node: *mut Retired) {
    // On TLS teardown the node leaks: the process is going away and readers
    // may still hold protections we can no longer observe.
    let _ = HANDLE.try_with(|handle| {
        let slot = handle.slot();
        // SAFETY: we own the slot's in_use flag.
        let state = unsafe { slot.owner_state() };
        push_retired(state, node);
        state.since_cleanup += 1;

        if engine().deamortized() {
            deamortized_step(state);
        } else if state.since_cleanup >= CLEANUP_THRESHOLD {
            cleanup_slot(slot);
        }
    });
}

/// Forces a full scan-and-destroy pass over this thread's retired list.
pub fn cleanup() {
    let _ = HANDLE.try_with(|handle| {
        if let Some(slot) = handle.slot.get() {
            cleanup_slot(slot);
        }
    });
}

/// Switches the process to deamortized reclamation: every retire drains at
/// most [`DEAMORTIZED_BATCH`] candidates instead of running bulk cleanups,
/// tightening worst-case store latency at a small cost to loads.
pub fn enable_deamortized_reclamation() {
    engine().set_deamortized(true);
}

fn push_retired(state: &mut OwnerState, node: *mut Retired) {
    unsafe {
        (*node).set_next(core::ptr::null_mut());
        if state.tail.is_null() {
            state.head = node;
        } else {
            (*state.tail).set_next(node);
        }
    }
    state.tail = node;
}

/// Scan every slot's protected pointer and destroy all of this slot's
/// retired nodes that nobody protects.
fn cleanup_slot(slot: &HazardSlot) {
    // SAFETY: called only from the owning thread (retire/cleanup/drop paths).
    let state = unsafe { slot.owner_state() };

    // Fold an interrupted deamortized sweep back in so a full pass covers
    // its pending nodes too.
    if let Some(sweep) = state.sweep.take() {
        let mut cursor = sweep.pending;
        while !cursor.is_null() {
            let next = unsafe { (*cursor).next() };
            push_retired(state, cursor);
            cursor = next;
        }
    }

    if state.head.is_null() {
        state.since_cleanup = 0;
        return;
    }

    fence::heavy();
    let mut scratch = core::mem::take(&mut state.scratch);
    engine().collect_protected(&mut scratch);

    let mut cursor = state.head;
    state.head = core::ptr::null_mut();
    state.tail = core::ptr::null_mut();
    while !cursor.is_null() {
        let next = unsafe { (*cursor).next() };
        if scratch.contains(&(cursor as usize)) {
            push_retired(state, cursor);
        } else {
            destroy(cursor);
        }
        cursor = next;
    }

    scratch.clear();
    state.scratch = scratch;
    state.since_cleanup = 0;
}

/// One deamortized step: start a sweep when the threshold is reached, then
/// drain up to [`DEAMORTIZED_BATCH`] candidates against the sweep's snapshot
/// of the protected set.
fn deamortized_step(state: &mut OwnerState) {
    if state.sweep.is_none() && state.since_cleanup >= CLEANUP_THRESHOLD {
        fence::heavy();
        let mut protected = HashSet::new();
        engine().collect_protected(&mut protected);
        state.sweep = Some(Sweep {
            pending: core::mem::replace(&mut state.head, core::ptr::null_mut()),
            protected,
        });
        state.tail = core::ptr::null_mut();
        state.since_cleanup = 0;
    }

    let Some(mut sweep) = state.sweep.take() else {
        return;
    };
    for _ in 0..DEAMORTIZED_BATCH {
        if sweep.pending.is_null() {
            break;
        }
        let node = sweep.pending;
        sweep.pending = unsafe { (*node).next() };
        if sweep.protected.contains(&(node as usize)) {
            // Still protected under the snapshot; requeue for the next sweep.
            push_retired(state, node);
        } else {
            destroy(node);
        }
    }
    if !sweep.pending.is_null() {
        state.sweep = Some(sweep);
    }
}

fn destroy(node: *mut Retired) {
    unsafe {
        let f = (*node)
            .destroy
            .expect("retired node without a destroy hook");
        f(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;

    #[repr(C)]
    struct Tracked {
        retired: Retired,
        drops: Arc<StdAtomicUsize>,
    }

    impl Tracked {
        fn boxed(drops: Arc<StdAtomicUsize>) -> *mut Tracked {
            Box::into_raw(Box::new(Tracked {
                retired: Retired::new(),
                drops,
            }))
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unprotected_nodes_destroyed_on_cleanup() {
        let drops = Arc::new(StdAtomicUsize::new(0));
        for _ in 0..10 {
            let node = Tracked::boxed(drops.clone());
            unsafe { retire(node) };
        }
        cleanup();
        assert_eq!(drops.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn protected_node_survives_cleanup() {
        let drops = Arc::new(StdAtomicUsize::new(0));
        let node = Tracked::boxed(drops.clone());
        let src = AtomicUsize::new(node as usize);

        let p = protect(&src);
        assert_eq!(p, node as usize);

        unsafe { retire(node) };
        cleanup();
        assert_eq!(drops.load(Ordering::SeqCst), 0, "protected node freed");

        release();
        cleanup();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn protect_returns_current_value() {
        let drops = Arc::new(StdAtomicUsize::new(0));
        let a = Tracked::boxed(drops.clone());
        let src = AtomicUsize::new(a as usize);
        assert_eq!(protect(&src), a as usize);
        release();
        unsafe { retire(a) };
        cleanup();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
