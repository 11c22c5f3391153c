use riptide::{AcquireError, ResourcePool};

use std::time::{Duration, Instant};

#[test]
fn checkout_and_return_round_trip() {
    let pool = ResourcePool::new(vec!["a", "b", "c"]);
    assert_eq!(pool.available(), 3);

    {
        let one = pool.acquire(Duration::from_millis(100)).expect("acquire");
        let two = pool.acquire(Duration::from_millis(100)).expect("acquire");
        assert_eq!(pool.available(), 1);
        assert_ne!(*one, *two);
    }

    // Guards dropped: both handles are back.
    assert_eq!(pool.available(), 3);
}

#[test]
fn exhausted_pool_times_out() {
    let pool = ResourcePool::new(vec![1u32]);
    let _held = pool.acquire(Duration::from_millis(100)).expect("acquire");

    let start = Instant::now();
    let result = pool.acquire(Duration::from_millis(100));
    assert_eq!(result.err(), Some(AcquireError::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn blocked_acquire_wakes_on_release() {
    let pool = ResourcePool::new(vec![7u32]);
    let held = pool.acquire(Duration::from_secs(1)).expect("acquire");

    let waiter_pool = pool.clone();
    let waiter = std::thread::spawn(move || {
        waiter_pool
            .acquire(Duration::from_secs(5))
            .expect("acquire after release")
    });

    std::thread::sleep(Duration::from_millis(100));
    drop(held);

    let handle = waiter.join().unwrap();
    assert_eq!(*handle, 7);
}

#[test]
fn handles_can_be_mutated_through_the_guard() {
    let pool = ResourcePool::new(vec![Vec::<u8>::new()]);
    {
        let mut handle = pool.acquire(Duration::from_millis(100)).expect("acquire");
        handle.extend_from_slice(b"state");
    }
    let handle = pool.acquire(Duration::from_millis(100)).expect("acquire");
    assert_eq!(handle.as_slice(), b"state");
}

#[test]
fn closed_pool_rejects_acquire() {
    let pool = ResourcePool::new(vec![1u32, 2]);
    pool.close();
    assert_eq!(
        pool.acquire(Duration::from_millis(10)).err(),
        Some(AcquireError::Closed)
    );
    assert_eq!(pool.available(), 0);
}
