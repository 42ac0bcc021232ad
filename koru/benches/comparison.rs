use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use koru::{Atom, AtomicShared, Shared};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

fn uncontended_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_load");

    let slot = AtomicShared::from(Shared::new(42u64));
    group.bench_function("atomic_shared", |b| {
        b.iter(|| {
            let handle = slot.load(koru::Ordering::Acquire).unwrap();
            std::hint::black_box(*handle)
        })
    });

    let atom = Atom::new(42u64);
    group.bench_function("atom", |b| {
        b.iter(|| std::hint::black_box(*atom.load()))
    });

    let rwlock = RwLock::new(Arc::new(42u64));
    group.bench_function("rwlock_arc", |b| {
        b.iter(|| {
            let guard = rwlock.read().unwrap();
            std::hint::black_box(**guard)
        })
    });

    let mutex = Mutex::new(Arc::new(42u64));
    group.bench_function("mutex_arc", |b| {
        b.iter(|| {
            let guard = mutex.lock().unwrap();
            std::hint::black_box(**guard)
        })
    });

    group.finish();
}

fn contended_read_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_read_write");
    group.sample_size(10);

    for readers in [2usize, 4] {
        group.bench_with_input(
            BenchmarkId::new("atomic_shared", readers),
            &readers,
            |b, &readers| {
                b.iter(|| {
                    let slot = Arc::new(AtomicShared::from(Shared::new(0u64)));
                    let mut handles = vec![];
                    for _ in 0..readers {
                        let slot = slot.clone();
                        handles.push(thread::spawn(move || {
                            let mut acc = 0u64;
                            for _ in 0..10_000 {
                                acc = acc.wrapping_add(*slot.load(koru::Ordering::Acquire).unwrap());
                            }
                            acc
                        }));
                    }
                    for i in 0..10_000u64 {
                        slot.store(Some(Shared::new(i)), koru::Ordering::Release);
                    }
                    for h in handles {
                        std::hint::black_box(h.join().unwrap());
                    }
                    koru::hazard::cleanup();
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("rwlock_arc", readers),
            &readers,
            |b, &readers| {
                b.iter(|| {
                    let slot = Arc::new(RwLock::new(Arc::new(0u64)));
                    let mut handles = vec![];
                    for _ in 0..readers {
                        let slot = slot.clone();
                        handles.push(thread::spawn(move || {
                            let mut acc = 0u64;
                            for _ in 0..10_000 {
                                acc = acc.wrapping_add(**slot.read().unwrap());
                            }
                            acc
                        }));
                    }
                    for i in 0..10_000u64 {
                        *slot.write().unwrap() = Arc::new(i);
                    }
                    for h in handles {
                        std::hint::black_box(h.join().unwrap());
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, uncontended_load, contended_read_write);
criterion_main!(benches);
