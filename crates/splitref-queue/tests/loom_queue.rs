//! Loom model checks for the push/pop CAS protocol and node reclamation.
//!
//! Run with:
//! ```bash
//! cargo test -p splitref-queue --features loom --test loom_queue --release
//! ```

#![cfg(feature = "loom")]

use loom::sync::Arc;
use loom::thread;
use splitref_queue::SplitRefQueue;

fn model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(f);
}

#[test]
fn loom_push_races_pop() {
    model(|| {
        let q = Arc::new(SplitRefQueue::new());
        let counter = q.reclaim_counter();

        let qp = q.clone();
        let producer = thread::spawn(move || qp.push(1u32));
        let qc = q.clone();
        let consumer = thread::spawn(move || qc.pop());

        producer.join().unwrap();
        let raced = consumer.join().unwrap();
        let rest = q.pop();

        // Exactly one of the two pops saw the value.
        assert_eq!(raced.or(rest), Some(1));
        assert!(raced.is_none() || rest.is_none());
        assert_eq!(q.pop(), None);
        assert_eq!(counter.get(), 1);

        drop(q);
        assert_eq!(counter.get(), 2);
    });
}

#[test]
fn loom_concurrent_pushes() {
    model(|| {
        let q = Arc::new(SplitRefQueue::new());
        let counter = q.reclaim_counter();

        let handles: Vec<_> = [1u32, 2]
            .into_iter()
            .map(|v| {
                let q = q.clone();
                thread::spawn(move || q.push(v))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut got = vec![q.pop().unwrap(), q.pop().unwrap()];
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
        assert_eq!(q.pop(), None);

        drop(q);
        assert_eq!(counter.get(), 3);
    });
}

#[test]
fn loom_concurrent_pops_take_once() {
    model(|| {
        let q = Arc::new(SplitRefQueue::new());
        q.push(7u32);
        let counter = q.reclaim_counter();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || q.pop())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().flatten().count(), 1);
        assert_eq!(results.iter().flatten().next(), Some(&7));
        assert_eq!(counter.get(), 1);

        drop(q);
        assert_eq!(counter.get(), 2);
    });
}

#[test]
fn loom_push_races_push_and_pop() {
    // The popping thread can take the node another pusher has claimed as
    // its tail but not filled yet; that value must still come out.
    model(|| {
        let q = Arc::new(SplitRefQueue::new());
        let counter = q.reclaim_counter();

        let q1 = q.clone();
        let pusher = thread::spawn(move || q1.push(1u32));
        let q2 = q.clone();
        let mixed = thread::spawn(move || {
            q2.push(2u32);
            q2.pop()
        });

        pusher.join().unwrap();
        let mut got: Vec<u32> = mixed.join().unwrap().into_iter().collect();
        while let Some(v) = q.pop() {
            got.push(v);
        }
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
        assert_eq!(counter.get(), 2);

        drop(q);
        assert_eq!(counter.get(), 3);
    });
}

#[test]
fn loom_push_races_two_pops() {
    model(|| {
        let q = Arc::new(SplitRefQueue::new());
        q.push(7u32);
        let counter = q.reclaim_counter();

        let q1 = q.clone();
        let pusher = thread::spawn(move || q1.push(1u32));
        let q2 = q.clone();
        let popper = thread::spawn(move || [q2.pop(), q2.pop()]);

        pusher.join().unwrap();
        let mut got: Vec<u32> = popper.join().unwrap().into_iter().flatten().collect();
        // 7 was pushed first, so a lone successful pop must return it.
        assert_eq!(got.first(), Some(&7));
        while let Some(v) = q.pop() {
            got.push(v);
        }
        assert_eq!(got, vec![7, 1]);
        assert_eq!(counter.get(), 2);

        drop(q);
        assert_eq!(counter.get(), 3);
    });
}
