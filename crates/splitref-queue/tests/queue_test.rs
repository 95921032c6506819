#![cfg(not(feature = "loom"))]

use splitref_queue::SplitRefQueue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TESTCOUNT: u64 = 1000;

fn pop_with_backoff(queue: &SplitRefQueue<u64>) -> u64 {
    loop {
        if let Some(v) = queue.pop() {
            return v;
        }
        thread::sleep(Duration::from_micros(50));
    }
}

#[test]
fn test_two_producers_two_consumers() {
    let queue = Arc::new(SplitRefQueue::new());

    let producers: Vec<_> = (0..2)
        .map(|p| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in p * TESTCOUNT..(p + 1) * TESTCOUNT {
                    q.push(i);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let q = queue.clone();
            thread::spawn(move || {
                (0..TESTCOUNT)
                    .map(|_| pop_with_backoff(&q))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let popped: Vec<u64> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();

    assert_eq!(popped.len(), 2 * TESTCOUNT as usize);
    let unique: HashSet<u64> = popped.iter().copied().collect();
    assert_eq!(unique.len(), popped.len(), "a value was popped twice");
    assert_eq!(unique, (0..2 * TESTCOUNT).collect::<HashSet<_>>());

    assert_eq!(queue.reclaimed(), 2 * TESTCOUNT as usize);
    assert_eq!(queue.pop(), None);

    let counter = queue.reclaim_counter();
    drop(Arc::try_unwrap(queue).ok().expect("queue still shared"));
    assert_eq!(counter.get(), 2 * TESTCOUNT as usize + 1);
}

#[test]
fn test_fifo_per_producer() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 2_000;

    let queue = Arc::new(SplitRefQueue::<(u64, u64)>::new());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    q.push((p, seq));
                }
            })
        })
        .collect();

    // Single consumer: every producer's sequence must come out ascending.
    let mut next_seq = vec![0u64; PRODUCERS as usize];
    let mut taken = 0;
    while taken < PRODUCERS * PER_PRODUCER {
        match queue.pop() {
            Some((p, seq)) => {
                assert_eq!(seq, next_seq[p as usize], "producer {p} reordered");
                next_seq[p as usize] += 1;
                taken += 1;
            }
            None => thread::yield_now(),
        }
    }
    for p in producers {
        p.join().unwrap();
    }
    assert!(next_seq.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn test_fifo_per_producer_across_consumers() {
    const PER_PRODUCER: u64 = 3_000;

    let queue = Arc::new(SplitRefQueue::<(u64, u64)>::new());
    let producers: Vec<_> = (0..2)
        .map(|p| {
            let q = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    q.push((p, seq));
                }
            })
        })
        .collect();

    let remaining = Arc::new(AtomicUsize::new(2 * PER_PRODUCER as usize));
    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let q = queue.clone();
            let remaining = remaining.clone();
            thread::spawn(move || {
                let mut last = [None::<u64>; 2];
                while remaining.load(Ordering::Acquire) > 0 {
                    if let Some((p, seq)) = q.pop() {
                        let slot = &mut last[p as usize];
                        assert!(slot.map_or(true, |prev| prev < seq), "producer {p} reordered");
                        *slot = Some(seq);
                        remaining.fetch_sub(1, Ordering::AcqRel);
                    } else {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    for c in consumers {
        c.join().unwrap();
    }
    assert!(queue.is_empty());
}

#[test]
fn test_no_loss_no_duplication_mixed_roles() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 2_500;

    let queue = Arc::new(SplitRefQueue::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let q = queue.clone();
            thread::spawn(move || {
                let mut got = Vec::new();
                for i in 0..PER_THREAD {
                    q.push(t * PER_THREAD + i);
                    if let Some(v) = q.pop() {
                        got.push(v);
                    }
                }
                got
            })
        })
        .collect();

    let mut popped: Vec<usize> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    while let Some(v) = queue.pop() {
        popped.push(v);
    }

    popped.sort_unstable();
    assert_eq!(popped, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
    assert_eq!(queue.reclaimed(), THREADS * PER_THREAD);
}

#[test]
fn test_no_loss_under_heavy_push_pop_interleaving() {
    // Every thread pushes one value and pops twice, so consumers keep
    // catching up with the tail while other pushers still hold claims on it.
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 20_000;
    const ROUNDS: usize = 10;

    for round in 0..ROUNDS {
        let queue = Arc::new(SplitRefQueue::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let q = queue.clone();
                thread::spawn(move || {
                    let mut got = Vec::with_capacity(PER_THREAD as usize);
                    for i in 0..PER_THREAD {
                        q.push(t * 1_000_000 + i);
                        got.extend(q.pop());
                        got.extend(q.pop());
                    }
                    got
                })
            })
            .collect();

        let mut popped: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        while let Some(v) = queue.pop() {
            popped.push(v);
        }

        popped.sort_unstable();
        let mut expected: Vec<u64> = (0..THREADS)
            .flat_map(|t| (0..PER_THREAD).map(move |i| t * 1_000_000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(popped.len(), expected.len(), "round {round}: value count");
        assert!(popped == expected, "round {round}: popped multiset differs");
        assert_eq!(queue.reclaimed(), (THREADS * PER_THREAD) as usize);
    }
}

#[test]
fn test_empty_after_matched_push_pop() {
    let queue = SplitRefQueue::new();
    assert_eq!(queue.pop(), None);
    for i in 0..50 {
        queue.push(i);
    }
    for _ in 0..50 {
        assert!(queue.pop().is_some());
    }
    assert_eq!(queue.pop(), None);
    assert!(queue.is_empty());
}

#[test]
fn test_payload_destructors_run_once() {
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let queue = Arc::new(SplitRefQueue::new());

    let producers: Vec<_> = (0..2)
        .map(|_| {
            let q = queue.clone();
            let drops = drops.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    q.push(Tracked(drops.clone()));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    // Pop half, leave the rest for the queue's destructor.
    for _ in 0..500 {
        drop(queue.pop().expect("value available"));
    }
    assert_eq!(drops.load(Ordering::SeqCst), 500);

    let counter = queue.reclaim_counter();
    drop(Arc::try_unwrap(queue).ok().expect("queue still shared"));
    assert_eq!(drops.load(Ordering::SeqCst), 1000);
    assert_eq!(counter.get(), 1001);
}

#[test]
fn test_consumers_polling_idle_queue() {
    let queue = Arc::new(SplitRefQueue::<u64>::new());
    let stop = Arc::new(AtomicUsize::new(0));

    let pollers: Vec<_> = (0..3)
        .map(|_| {
            let q = queue.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut got = 0usize;
                while stop.load(Ordering::Acquire) == 0 || !q.is_empty() {
                    if q.pop().is_some() {
                        got += 1;
                    }
                }
                got
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    for i in 0..100 {
        queue.push(i);
    }
    stop.store(1, Ordering::Release);

    let total: usize = pollers.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 100);
    assert_eq!(queue.reclaimed(), 100);
}

#[test]
fn test_random_ops_match_vecdeque() {
    use std::collections::VecDeque;

    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let queue = SplitRefQueue::new();
    let mut model = VecDeque::new();
    let mut pushed = 0usize;

    for i in 0..20_000u32 {
        if rng.bool() {
            queue.push(i);
            model.push_back(i);
            pushed += 1;
        } else {
            assert_eq!(queue.pop(), model.pop_front());
        }
        assert_eq!(queue.is_empty(), model.is_empty());
    }

    let popped = pushed - model.len();
    assert_eq!(queue.reclaimed(), popped);
}
