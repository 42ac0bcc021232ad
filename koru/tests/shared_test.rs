//! Handle semantics: clone/drop accounting, weak upgrades, aliasing, ESFT.

use koru::{EnableSharedFromSelf, ExpiredError, Shared, SharedFromSelf, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Increments a counter exactly once, when the payload is disposed.
struct DropCounter {
    counter: Arc<AtomicUsize>,
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted(counter: &Arc<AtomicUsize>) -> DropCounter {
    DropCounter {
        counter: counter.clone(),
    }
}

#[test]
fn deref_and_use_count() {
    let s = Shared::new(7u32);
    assert_eq!(*s, 7);
    assert_eq!(s.use_count(), 1);

    let s2 = s.clone();
    assert_eq!(s.use_count(), 2);
    assert!(Shared::ptr_eq(&s, &s2));
    drop(s2);
    assert_eq!(s.use_count(), 1);
}

#[test]
fn payload_disposed_exactly_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let s = Shared::new(counted(&drops));
    let clones: Vec<_> = (0..8).map(|_| s.clone()).collect();
    drop(s);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(clones);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn from_box_round_trip() {
    let s = Shared::from_box(Box::new(String::from("boxed")));
    assert_eq!(&**s, "boxed");
}

#[test]
fn disposer_runs_instead_of_drop() {
    let hooked = Arc::new(AtomicUsize::new(0));
    let via_hook = hooked.clone();
    let s = Shared::with_disposer(41usize, move |v| {
        assert_eq!(v, 41);
        via_hook.fetch_add(1, Ordering::SeqCst);
    });
    drop(s);
    assert_eq!(hooked.load(Ordering::SeqCst), 1);
}

#[test]
fn weak_upgrade_while_alive() {
    let s = Shared::new(5u64);
    let w = Shared::downgrade(&s);
    assert!(!w.expired());
    let upgraded = w.upgrade().expect("object alive");
    assert_eq!(*upgraded, 5);
    assert_eq!(s.use_count(), 2);
}

#[test]
fn weak_upgrade_after_drop_fails() {
    let drops = Arc::new(AtomicUsize::new(0));
    let s = Shared::new(counted(&drops));
    let w = Shared::downgrade(&s);
    drop(s);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(w.expired());
    assert!(w.upgrade().is_none());
    assert_eq!(Shared::try_from(&w).err(), Some(ExpiredError));
}

#[test]
fn empty_weak_never_upgrades() {
    let w: Weak<u32> = Weak::new();
    assert!(w.expired());
    assert!(w.upgrade().is_none());
}

#[test]
fn alias_keeps_outer_payload_alive() {
    struct Pair {
        _left: DropCounter,
        right: u32,
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let outer = Shared::new(Pair {
        _left: counted(&drops),
        right: 99,
    });

    let inner: Shared<u32> = Shared::project(&outer, |p| &p.right);
    assert_eq!(*inner, 99);
    assert_eq!(outer.use_count(), 2);

    drop(outer);
    // The alias still holds the whole pair.
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(*inner, 99);

    drop(inner);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

struct Session {
    id: u32,
    self_ref: EnableSharedFromSelf<Session>,
}

impl SharedFromSelf for Session {
    fn shared_self(&self) -> &EnableSharedFromSelf<Session> {
        &self.self_ref
    }
}

#[test]
fn shared_from_self_mints_handles() {
    let s = Shared::new_with_self(Session {
        id: 12,
        self_ref: EnableSharedFromSelf::new(),
    });

    let again = s.shared_from_self().expect("alive");
    assert_eq!(again.id, 12);
    assert!(Shared::ptr_eq(&s, &again));
    assert_eq!(s.use_count(), 2);

    let weak = s.weak_from_self();
    drop(again);
    drop(s);
    assert!(weak.upgrade().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_clone_drop_keeps_exact_count() {
    let drops = Arc::new(AtomicUsize::new(0));
    let s = Shared::new(counted(&drops));
    let mut handles = vec![];

    for _ in 0..8 {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..10_000 {
                let c = s.clone();
                drop(c);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(s.use_count(), 1);
    drop(s);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
