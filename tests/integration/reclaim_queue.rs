//! Reclaim queue integration tests
//!
//! Delivery, ordering, timeouts and concurrent draining.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use weakling::{Heap, HeapConfig, Processing, ReclaimQueue, WeakHandle};

fn inline_heap() -> Heap {
    Heap::with_config(HeapConfig::with_processing(Processing::Inline))
}

/// A bound handle is delivered exactly once, and only to its own queue.
#[test]
fn test_queue_delivery_exactly_once() {
    let heap = Heap::new();
    let mine = ReclaimQueue::new();
    let other = ReclaimQueue::new();

    let target = heap.alloc(1u64);
    let bystander = heap.alloc(2u64);
    let handle = WeakHandle::with_queue(&target, &mine);
    let _bystander_handle = WeakHandle::with_queue(&bystander, &other);

    assert!(mine.poll().is_none());
    assert!(mine.remove_timeout_millis(50).is_none());

    drop(target);
    for _ in 0..5 {
        heap.collect();
    }

    let dead = mine.poll().expect("handle should be delivered");
    assert_eq!(dead, handle);
    assert!(!dead.is_alive());
    assert!(mine.poll().is_none());
    assert!(other.poll().is_none());
}

/// Two handles on one queue: poll after the first dies, remove after the second.
#[test]
fn test_poll_then_remove() {
    let heap = Heap::new();
    let queue = ReclaimQueue::new();
    let o1 = heap.alloc("o1");
    let o2 = heap.alloc("o2");
    let w1 = WeakHandle::with_queue(&o1, &queue);
    let w2 = WeakHandle::with_queue(&o2, &queue);

    assert_eq!(queue.poll(), None);
    assert_eq!(queue.remove_timeout(Duration::from_millis(50)), None);

    drop(o1);
    heap.collect();
    assert_eq!(queue.poll(), Some(w1));

    drop(o2);
    heap.collect();
    assert_eq!(queue.remove(), Some(w2));
}

/// Unbound handles never show up in any queue.
#[test]
fn test_no_enqueue_without_binding() {
    let heap = inline_heap();
    let queue = ReclaimQueue::new();
    let bound_target = heap.alloc(0u8);
    let free_target = heap.alloc(1u8);
    let bound = WeakHandle::with_queue(&bound_target, &queue);
    let free = WeakHandle::new(&free_target);

    drop(free_target);
    drop(bound_target);
    heap.collect();

    assert!(!free.is_alive());
    assert!(!free.is_enqueued());
    assert_eq!(queue.poll(), Some(bound));
    assert!(queue.poll().is_none());
}

/// `remove_timeout` on an idle queue waits roughly the requested time.
#[test]
fn test_blocking_timeout() {
    let queue = ReclaimQueue::<()>::new();
    let start = Instant::now();
    assert!(queue.remove_timeout_millis(50).is_none());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
}

/// A waiter with a timeout is woken by a reclamation on another thread.
#[test]
fn test_remove_timeout_receives_entry() {
    let heap = inline_heap();
    let queue = ReclaimQueue::new();
    let target = heap.alloc(String::from("late"));
    let handle = WeakHandle::with_queue(&target, &queue);

    let reclaimer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        drop(target);
    });

    assert_eq!(queue.remove_timeout(Duration::from_secs(5)), Some(handle));
    reclaimer.join().unwrap();
}

/// Concurrent reclaimers and drainers: every handle arrives exactly once.
#[test]
fn test_concurrent_producers_and_consumers() {
    const PER_THREAD: usize = 200;
    const THREADS: usize = 4;

    let heap = inline_heap();
    let queue = ReclaimQueue::new();

    let mut all = HashSet::new();
    let mut batches = Vec::new();
    for t in 0..THREADS {
        let targets: Vec<_> = (0..PER_THREAD).map(|i| heap.alloc(t * PER_THREAD + i)).collect();
        for target in &targets {
            all.insert(WeakHandle::with_queue(target, &queue));
        }
        batches.push(targets);
    }

    let producers: Vec<_> = batches
        .into_iter()
        .map(|batch| thread::spawn(move || drop(batch)))
        .collect();

    let consumers: Vec<_> = (0..THREADS)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(dead) = queue.remove_timeout_millis(200) {
                    got.push(dead);
                }
                got
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut received = HashSet::new();
    for consumer in consumers {
        for dead in consumer.join().unwrap() {
            assert!(received.insert(dead), "handle delivered twice");
        }
    }

    assert_eq!(received, all);
    assert_eq!(heap.stats().enqueued, (THREADS * PER_THREAD) as u64);
}

proptest! {
    /// Delivery order is the order of reclamation.
    #[test]
    fn prop_fifo_of_arrival(order in Just((0..16usize).collect::<Vec<_>>()).prop_shuffle()) {
        let heap = inline_heap();
        let queue = ReclaimQueue::new();
        let mut targets: Vec<_> = (0..16usize).map(|i| Some(heap.alloc(i))).collect();
        let handles: Vec<_> = targets
            .iter()
            .map(|t| WeakHandle::with_queue(t.as_ref().unwrap(), &queue))
            .collect();

        for &i in &order {
            targets[i] = None;
        }

        for &i in &order {
            prop_assert_eq!(queue.poll(), Some(handles[i].clone()));
        }
        prop_assert!(queue.poll().is_none());
    }
}
