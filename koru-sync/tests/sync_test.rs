use koru_sync::{Barrier, Seqlock, Spinlock, WaitGroup};
use std::sync::Arc;
use std::thread;

#[test]
fn spinlock_guards_counter() {
    const THREADS: usize = 8;
    const ITERS: usize = 10_000;

    let lock = Arc::new(Spinlock::new(0usize));
    let mut handles = vec![];

    for _ in 0..THREADS {
        let lock = lock.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ITERS {
                *lock.lock() += 1;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*lock.lock(), THREADS * ITERS);
}

#[test]
fn spinlock_try_lock_fails_while_held() {
    let lock = Spinlock::new(1u32);
    let guard = lock.lock();
    assert!(lock.try_lock().is_none());
    drop(guard);
    assert!(lock.try_lock().is_some());
}

#[test]
fn spinlock_released_on_panic() {
    let lock = Arc::new(Spinlock::new(0u32));
    let inner = lock.clone();
    let _ = thread::spawn(move || {
        let _guard = inner.lock();
        panic!("poisoning is not a thing here");
    })
    .join();

    // The panicking thread's guard must have released the lock on unwind.
    assert!(lock.try_lock().is_some());
}

#[test]
#[cfg_attr(miri, ignore)]
fn seqlock_readers_never_observe_torn_pairs() {
    // The writer keeps both halves equal; any torn read breaks that.
    let lock = Arc::new(Seqlock::new((0u64, 0u64)));
    let mut handles = vec![];

    for _ in 0..4 {
        let lock = lock.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200_000 {
                let (a, b) = lock.load();
                assert_eq!(a, b);
            }
        }));
    }

    let writer = lock.clone();
    handles.push(thread::spawn(move || {
        for i in 1..=200_000u64 {
            writer.store((i, i));
        }
    }));

    for h in handles {
        h.join().unwrap();
    }
    let (a, b) = lock.load();
    assert_eq!(a, 200_000);
    assert_eq!(b, 200_000);
}

#[test]
fn wait_group_blocks_until_all_done() {
    let wg = Arc::new(WaitGroup::new());
    let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    wg.add(6);
    let mut handles = vec![];
    for _ in 0..6 {
        let wg = wg.clone();
        let done = done.clone();
        handles.push(thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(5));
            done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            wg.done();
        }));
    }

    wg.wait();
    assert_eq!(done.load(std::sync::atomic::Ordering::SeqCst), 6);
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn wait_group_wait_is_immediate_when_empty() {
    let wg = WaitGroup::new();
    wg.wait();
}

#[test]
#[cfg_attr(miri, ignore)]
fn barrier_releases_all_cooperators() {
    const WORKERS: u32 = 6;

    let barrier = Arc::new(Barrier::new());
    let mut handles = vec![];
    for _ in 0..WORKERS {
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
        }));
    }

    barrier.release(WORKERS);
    for h in handles {
        h.join().unwrap();
    }
}
