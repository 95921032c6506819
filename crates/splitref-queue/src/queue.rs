use std::fmt;
use std::ptr;

use crossbeam_utils::CachePadded;
use tracing::debug;

use crate::counted::{AtomicCountedPtr, CountedPtr};
use crate::node::{taken, Node};
use crate::reclaim::{free_external_counter, increase_external_count, ReclaimCounter};
use crate::sync::{Backoff, Ordering};

/// Lock-free unbounded MPMC FIFO queue.
///
/// - `push` never fails and never blocks; it retries CAS on `tail`
/// - `pop` returns `None` immediately when only the sentinel is left
/// - nodes are freed by split reference counting, no GC pass or epochs
///
/// Values pushed by one thread come out in the order that thread pushed
/// them. Pushes from different threads are ordered by whichever won the
/// payload CAS first.
pub struct SplitRefQueue<T> {
    head: CachePadded<AtomicCountedPtr<T>>,
    tail: CachePadded<AtomicCountedPtr<T>>,
    reclaimed: ReclaimCounter,
}

// Safety: values only move in through `push` and out through `pop`; nodes
// are shared through atomics and freed by exactly one thread.
unsafe impl<T: Send> Send for SplitRefQueue<T> {}
unsafe impl<T: Send> Sync for SplitRefQueue<T> {}

impl<T> SplitRefQueue<T> {
    /// Creates an empty queue holding just the sentinel node, named by both
    /// `head` and `tail`.
    pub fn new() -> Self {
        let sentinel = CountedPtr::new(Node::alloc(), 1);
        Self {
            head: CachePadded::new(AtomicCountedPtr::new(sentinel)),
            tail: CachePadded::new(AtomicCountedPtr::new(sentinel)),
            reclaimed: ReclaimCounter::new(),
        }
    }

    /// Appends `value` at the tail.
    pub fn push(&self, value: T) {
        let new_data = Box::into_raw(Box::new(value));
        let mut new_next = CountedPtr::new(Node::alloc(), 1);
        let mut old_tail = self.tail.load(Ordering::Relaxed);
        loop {
            increase_external_count(&self.tail, &mut old_tail);
            // SAFETY: the claim taken above keeps the tail node alive.
            let tail_node = unsafe { &*old_tail.ptr() };

            match tail_node.data.compare_exchange(
                ptr::null_mut(),
                new_data,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    // Payload is ours; now make sure the node gets a successor.
                    if let Err(linked) = tail_node.next.compare_exchange(
                        CountedPtr::null(),
                        new_next,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        // SAFETY: `new_next` was never published.
                        drop(unsafe { Box::from_raw(new_next.ptr()) });
                        new_next = linked;
                    }
                    self.set_new_tail(&mut old_tail, new_next);
                    return;
                }
                Err(_) => {
                    // Lost the payload race, or the node was already popped.
                    // Help link a successor so the winner's tail advance is
                    // not needed for us to progress.
                    let successor = match tail_node.next.compare_exchange(
                        CountedPtr::null(),
                        new_next,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => {
                            let linked = new_next;
                            new_next = CountedPtr::new(Node::alloc(), 1);
                            linked
                        }
                        Err(linked) => linked,
                    };
                    self.set_new_tail(&mut old_tail, successor);
                }
            }
        }
    }

    /// Removes the value at the head, or returns `None` if the queue is
    /// empty. Never waits for a concurrent push.
    pub fn pop(&self) -> Option<T> {
        let mut old_head = self.head.load(Ordering::Relaxed);
        loop {
            increase_external_count(&self.head, &mut old_head);
            let node = old_head.ptr();

            if node == self.tail.load(Ordering::SeqCst).ptr() {
                // SAFETY: releasing the claim taken above.
                unsafe { Node::release_ref(node, &self.reclaimed) };
                return None;
            }

            // SAFETY: the claim keeps `node` alive.
            let next = unsafe { (*node).next.load(Ordering::SeqCst) };
            match self
                .head
                .compare_exchange(old_head, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    debug_assert!(!next.is_null(), "head advanced to a null link");
                    // SAFETY: only the thread that swung `head` off this node
                    // reaches here, so the payload is taken exactly once. The
                    // slot never goes back to null: a pusher still holding a
                    // stale claim on this node must not be able to fill it.
                    let data = unsafe { (*node).data.swap(taken(), Ordering::AcqRel) };
                    // SAFETY: our CAS replaced `old_head` in the head slot.
                    unsafe { free_external_counter(old_head, &self.reclaimed) };
                    // A node behind the tail always holds a payload.
                    debug_assert!(
                        !data.is_null() && data != taken(),
                        "popped node without payload"
                    );
                    if data.is_null() || data == taken() {
                        return None;
                    }
                    // SAFETY: payloads come from `Box::into_raw` in `push`.
                    let value = unsafe { Box::from_raw(data) };
                    return Some(*value);
                }
                Err(current) => {
                    // SAFETY: releasing the claim on the stale head.
                    unsafe { Node::release_ref(node, &self.reclaimed) };
                    old_head = current;
                }
            }
        }
    }

    /// Whether only the sentinel was left at the moment of the check.
    /// Concurrent pushes or pops may change the answer immediately.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst).ptr() == self.tail.load(Ordering::SeqCst).ptr()
    }

    /// Handle to this queue's destruction count. Stays valid after the
    /// queue is dropped.
    pub fn reclaim_counter(&self) -> ReclaimCounter {
        self.reclaimed.clone()
    }

    /// Nodes destroyed so far by this queue.
    pub fn reclaimed(&self) -> usize {
        self.reclaimed.get()
    }

    /// Swings `tail` from `old_tail` to `new_tail`, retrying only while
    /// `tail` still names the same node. The thread that wins the swing
    /// retires the slot's claim; everyone else just releases its own.
    fn set_new_tail(&self, old_tail: &mut CountedPtr<T>, new_tail: CountedPtr<T>) {
        let current_node = old_tail.ptr();
        let backoff = Backoff::new();
        loop {
            match self
                .tail
                .compare_exchange(*old_tail, new_tail, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    // SAFETY: our CAS replaced `old_tail` in the tail slot.
                    unsafe { free_external_counter(*old_tail, &self.reclaimed) };
                    return;
                }
                Err(current) => {
                    *old_tail = current;
                    if current.ptr() != current_node {
                        // SAFETY: someone else advanced the tail; give back
                        // the claim this thread took on the old node.
                        unsafe { Node::release_ref(current_node, &self.reclaimed) };
                        return;
                    }
                    backoff.spin();
                }
            }
        }
    }
}

impl<T> Default for SplitRefQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SplitRefQueue<T> {
    fn drop(&mut self) {
        let mut drained = 0usize;
        while self.pop().is_some() {
            drained += 1;
        }
        let sentinel = self.head.load(Ordering::Acquire).ptr();
        // SAFETY: `&mut self` rules out other visitors, and after draining
        // head and tail both name the sentinel, which nothing else frees.
        drop(unsafe { Box::from_raw(sentinel) });
        self.reclaimed.record();
        debug!(drained, reclaimed = self.reclaimed.get(), "queue dropped");
    }
}

impl<T> fmt::Debug for SplitRefQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitRefQueue")
            .field("is_empty", &self.is_empty())
            .field("reclaimed", &self.reclaimed.get())
            .finish()
    }
}
