use koru_queue::spsc;
use std::thread;

#[test]
fn round_trip_in_one_thread() {
    let (mut tx, mut rx) = spsc::channel(8);
    tx.push(String::from("one"));
    tx.push(String::from("two"));
    assert_eq!(rx.pop(), "one");
    assert_eq!(rx.pop(), "two");
    assert_eq!(rx.try_pop(), None);
}

#[test]
fn backpressure_on_full_ring() {
    let (mut tx, mut rx) = spsc::channel(2);
    assert_eq!(tx.capacity(), 2);
    tx.try_push(1).unwrap();
    tx.try_push(2).unwrap();
    assert!(tx.was_full());
    assert_eq!(tx.try_push(3), Err(3));

    assert_eq!(rx.try_pop(), Some(1));
    tx.try_push(3).unwrap();
    assert_eq!(rx.try_pop(), Some(2));
    assert_eq!(rx.try_pop(), Some(3));
    assert!(rx.was_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn cross_thread_transfer_preserves_order() {
    const COUNT: u64 = 200_000;

    let (mut tx, mut rx) = spsc::channel(1024);

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            tx.push(i);
        }
    });

    let consumer = thread::spawn(move || {
        for expected in 0..COUNT {
            assert_eq!(rx.pop(), expected, "SPSC order broken");
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}

#[test]
#[cfg_attr(miri, ignore)]
fn try_ops_under_load_lose_nothing() {
    const COUNT: u64 = 100_000;

    let (mut tx, mut rx) = spsc::channel(64);

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            let mut v = i;
            while let Err(back) = tx.try_push(v) {
                v = back;
                thread::yield_now();
            }
        }
    });

    let consumer = thread::spawn(move || {
        let mut next = 0u64;
        while next < COUNT {
            if let Some(v) = rx.try_pop() {
                assert_eq!(v, next);
                next += 1;
            }
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
