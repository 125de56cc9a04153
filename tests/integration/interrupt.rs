//! Interruption tests
//!
//! A thread blocked on a reclaim queue returns empty-handed when interrupted.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use weakling::{interrupt, ReclaimQueue};

/// Interrupting a thread blocked in `remove` makes it return `None`.
#[test]
fn test_interrupt_blocked_remove() {
    let queue = ReclaimQueue::<u32>::new();
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let queue = queue.clone();
        thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            let result = queue.remove();
            // The interrupt status is consumed by the wait
            (result, interrupt::interrupted())
        })
    };

    let interrupter = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    interrupter.interrupt();

    let (result, still_interrupted) = waiter.join().unwrap();
    assert!(result.is_none());
    assert!(!still_interrupted);
}

/// Interrupting a thread blocked in `remove_timeout` ends the wait early.
#[test]
fn test_interrupt_blocked_remove_timeout() {
    let queue = ReclaimQueue::<u32>::new();
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let queue = queue.clone();
        thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            let start = Instant::now();
            let result = queue.remove_timeout(Duration::from_secs(30));
            (result, start.elapsed())
        })
    };

    let interrupter = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    interrupter.interrupt();

    let (result, elapsed) = waiter.join().unwrap();
    assert!(result.is_none());
    assert!(elapsed < Duration::from_secs(30));
}

/// An interrupt raised before the wait starts is honoured immediately.
#[test]
fn test_interrupt_before_remove() {
    let queue = ReclaimQueue::<u32>::new();
    interrupt::current().interrupt();
    let start = Instant::now();
    assert!(queue.remove().is_none());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!interrupt::interrupted());
}

/// Interrupts only affect the targeted thread.
#[test]
fn test_interrupt_is_per_thread() {
    let here = interrupt::current();
    let there = thread::spawn(interrupt::current).join().unwrap();
    there.interrupt();
    assert!(there.is_interrupted());
    assert!(!here.is_interrupted());
}
