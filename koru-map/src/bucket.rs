//! Buckets: two word-sized slots manipulated by atomic load and
//! compare-exchange.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::cell::{Accessor, Counted};

/// One bucket: a key-cell pointer and a value-cell pointer. The key slot
/// transitions nil → cell → (possibly) nil; every mutation goes through a
/// compare-exchange or swap on the owning slot, never through the cell.
pub(crate) struct Bucket<K, V> {
    key: AtomicUsize,
    value: AtomicUsize,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            key: AtomicUsize::new(0),
            value: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    pub(crate) fn access_key(&self) -> Accessor<K> {
        Accessor::acquire(self.key.load(Ordering::Relaxed) as *mut Counted<K>)
    }

    pub(crate) fn access_value(&self) -> Accessor<V> {
        Accessor::acquire(self.value.load(Ordering::Relaxed) as *mut Counted<V>)
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.key.load(Ordering::Relaxed) != 0
    }

    pub(crate) fn is_occupied_by(&self, key: &K) -> bool
    where
        K: Eq,
    {
        let accessor = self.access_key();
        accessor.get() == Some(key)
    }

    pub(crate) fn is_available_for(&self, key: &K) -> bool
    where
        K: Eq,
    {
        let accessor = self.access_key();
        match accessor.get() {
            None => true,
            Some(existing) => existing == key,
        }
    }

    /// Installs `cell` in the key slot by compare-exchange from the current
    /// pointer, releasing the displaced cell. Fails when the slot changed
    /// between the load and the exchange.
    pub(crate) fn exchange_key(&self, cell: *mut Counted<K>) -> bool {
        let orig = self.key.load(Ordering::Relaxed);
        if self
            .key
            .compare_exchange(orig, cell as usize, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            if orig != 0 {
                unsafe { Counted::release_and_free(orig as *mut Counted<K>) };
            }
            true
        } else {
            false
        }
    }

    /// Unconditionally swaps the value slot, releasing the displaced cell.
    pub(crate) fn exchange_value(&self, cell: *mut Counted<V>) {
        let orig = self.value.swap(cell as usize, Ordering::AcqRel);
        if orig != 0 {
            unsafe { Counted::release_and_free(orig as *mut Counted<V>) };
        }
    }

    /// Logically deletes the entry: both slots to nil, both prior cells
    /// released. Physical destruction happens when the last accessor lets
    /// go.
    pub(crate) fn cleanup(&self) {
        let key = self.key.swap(0, Ordering::AcqRel);
        if key != 0 {
            unsafe { Counted::release_and_free(key as *mut Counted<K>) };
        }
        let value = self.value.swap(0, Ordering::AcqRel);
        if value != 0 {
            unsafe { Counted::release_and_free(value as *mut Counted<V>) };
        }
    }
}
