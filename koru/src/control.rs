//! Control blocks for shared ownership.
//!
//! One allocation carries the strong count (a [`WaitFreeCounter`]), the weak
//! count, the payload pointer, and the intrusive header the hazard engine
//! links retired blocks through. The payload lives in one of three storage
//! shapes selected at construction and dispatched by tag:
//!
//! - in-place: payload embedded in the block (`Shared::new`)
//! - boxed: payload in its own allocation (`Shared::from_box`)
//! - disposer: in-place payload with a custom disposal hook
//!   (`Shared::with_disposer`)
//!
//! Disposal (payload teardown) runs exactly once, when the strong count
//! first hits zero. Destruction (freeing the block) runs exactly once, when
//! the weak count hits zero — and is routed through the hazard engine, since
//! a reader may still be between reading an atomic slot and claiming a
//! strong reference.

use alloc::boxed::Box;
use core::mem::ManuallyDrop;
use core::sync::atomic::{fence, AtomicU32, Ordering};

use crate::counter::WaitFreeCounter;
use crate::hazard;
use crate::retired::Retired;

/// Type-erased prefix of every control block. Handles and atomic slots only
/// ever see this; the payload type reappears in the monomorphized dispose
/// and destroy hooks.
#[repr(C)]
pub(crate) struct Header {
    pub(crate) retired: Retired,
    pub(crate) strong: WaitFreeCounter,
    pub(crate) weak: AtomicU32,
    pub(crate) payload: *mut (),
    dispose: unsafe fn(*mut Header),
}

impl Header {
    /// Claims a strong reference. The count must be nonzero.
    pub(crate) fn increment_strong(&self) {
        debug_assert!(self.strong.load(Ordering::Relaxed) > 0);
        let ok = self.strong.increment(1, Ordering::Relaxed);
        debug_assert!(ok);
    }

    /// Claims a strong reference unless the payload is already gone.
    pub(crate) fn increment_strong_if_nonzero(&self) -> bool {
        self.strong.increment(1, Ordering::Relaxed)
    }

    pub(crate) fn increment_weak(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn use_count(&self) -> u32 {
        self.strong.load(Ordering::Relaxed)
    }

    pub(crate) fn weak_count(&self) -> u32 {
        self.weak.load(Ordering::Relaxed)
    }

    /// Releases a strong reference; disposes the payload and drops the
    /// implicit weak reference if it was the last one.
    ///
    /// # Safety
    ///
    /// `this` must point to a live control block and the caller must own a
    /// strong reference.
    pub(crate) unsafe fn decrement_strong(this: *mut Header) {
        // Decrement-release plus an acquire fence on the zero path: the
        // acquire only matters for the thread that tears the payload down.
        unsafe {
            if (*this).strong.decrement(1, Ordering::Release) {
                fence(Ordering::Acquire);
                ((*this).dispose)(this);
                Header::decrement_weak(this);
            }
        }
    }

    /// Releases a weak reference; retires the block through the hazard
    /// engine if it was the last one.
    ///
    /// # Safety
    ///
    /// `this` must point to a live control block and the caller must own a
    /// weak reference.
    pub(crate) unsafe fn decrement_weak(this: *mut Header) {
        unsafe {
            if (*this).weak.fetch_sub(1, Ordering::Release) == 1 {
                fence(Ordering::Acquire);
                // In-flight loads may still hold this address in a hazard
                // slot; destruction is deferred until nobody does.
                hazard::retire_raw(this as *mut Retired);
            }
        }
    }
}

enum Storage<T> {
    Inplace(ManuallyDrop<T>),
    Boxed(*mut T),
    Disposer {
        value: ManuallyDrop<T>,
        hook: ManuallyDrop<Box<dyn FnOnce(T) + Send>>,
    },
}

#[repr(C)]
struct ControlBlock<T> {
    header: Header,
    storage: Storage<T>,
}

/// Allocates a block with the payload embedded in it.
pub(crate) fn new_inplace<T>(value: T) -> *mut Header {
    alloc_block(Storage::Inplace(ManuallyDrop::new(value)))
}

/// Allocates a block owning a separately boxed payload.
pub(crate) fn new_boxed<T>(value: Box<T>) -> *mut Header {
    alloc_block(Storage::Boxed(Box::into_raw(value)))
}

/// Allocates a block whose payload is torn down by `hook` instead of its
/// `Drop` impl.
pub(crate) fn new_with_disposer<T, F>(value: T, hook: F) -> *mut Header
where
    F: FnOnce(T) + Send + 'static,
{
    alloc_block(Storage::Disposer {
        value: ManuallyDrop::new(value),
        hook: ManuallyDrop::new(Box::new(hook)),
    })
}

fn alloc_block<T>(storage: Storage<T>) -> *mut Header {
    let block = Box::new(ControlBlock {
        header: Header {
            retired: Retired::new(),
            strong: WaitFreeCounter::new(),
            weak: AtomicU32::new(1),
            payload: core::ptr::null_mut(),
            dispose: dispose_block::<T>,
        },
        storage,
    });
    let ptr = Box::into_raw(block);
    unsafe {
        (*ptr).header.payload = match &mut (*ptr).storage {
            Storage::Inplace(value) => &mut **value as *mut T as *mut (),
            Storage::Boxed(payload) => *payload as *mut (),
            Storage::Disposer { value, .. } => &mut **value as *mut T as *mut (),
        };
        (*ptr).header.retired.set_destroy(destroy_block::<T>);
        ptr as *mut Header
    }
}

// Runs when the strong count hits zero. Tears down the payload only; the
// block itself stays alive for weak handles and in-flight hazard loads.
unsafe fn dispose_block<T>(header: *mut Header) {
    let block = header as *mut ControlBlock<T>;
    unsafe {
        match &mut (*block).storage {
            Storage::Inplace(value) => ManuallyDrop::drop(value),
            Storage::Boxed(payload) => drop(Box::from_raw(*payload)),
            Storage::Disposer { value, hook } => {
                let value = ManuallyDrop::take(value);
                let hook = ManuallyDrop::take(hook);
                hook(value);
            }
        }
    }
}

// Runs via the hazard engine when the weak count hit zero and no slot
// protects the block. The payload was disposed earlier; `Storage` has no
// drop glue, so this only frees the allocation.
unsafe fn destroy_block<T>(node: *mut Retired) {
    unsafe {
        drop(Box::from_raw(node as *mut ControlBlock<T>));
    }
}
