//! Split reference counting: how visitors claim nodes read from shared slots
//! and how the last claim holder frees them.
//!
//! A thread that wants to dereference a node named by `head`, `tail` or a
//! `next` link first bumps the external count stored *in the slot*
//! ([`increase_external_count`]). When the slot later moves on, the thread
//! that moved it folds the slot's count into the node's internal count
//! ([`free_external_counter`]); every other visitor gives its claim back
//! through `Node::release_ref`. Whoever brings both counts to zero frees the
//! node.

use std::fmt;

use metrics::counter;
use tracing::trace;

use crate::counted::{AtomicCountedPtr, CountedPtr};
use crate::node::Node;
use crate::sync::{Arc, AtomicUsize, Backoff, Ordering};

/// Counts nodes destroyed by one queue: every node freed by the reclamation
/// protocol plus the final sentinel freed when the queue is dropped.
///
/// Cloning yields another handle to the same count, so a handle taken from a
/// queue keeps working after the queue is gone.
#[derive(Clone)]
pub struct ReclaimCounter {
    destroyed: Arc<AtomicUsize>,
}

impl ReclaimCounter {
    pub fn new() -> Self {
        Self {
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of nodes destroyed so far.
    pub fn get(&self) -> usize {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.destroyed.store(0, Ordering::Release);
    }

    pub(crate) fn record(&self) {
        let total = self.destroyed.fetch_add(1, Ordering::AcqRel) + 1;
        counter!("splitref_queue_nodes_reclaimed_total").increment(1);
        trace!(total, "node reclaimed");
    }
}

impl Default for ReclaimCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReclaimCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimCounter")
            .field("destroyed", &self.get())
            .finish()
    }
}

/// Claims the node currently named by `slot`.
///
/// `local` is the caller's last view of the slot; it may be stale. On return
/// it equals the slot's new value (same node, count one higher) and the node
/// is safe to dereference until the claim is given back.
pub(crate) fn increase_external_count<T>(slot: &AtomicCountedPtr<T>, local: &mut CountedPtr<T>) {
    let backoff = Backoff::new();
    loop {
        let claimed = local.claimed();
        match slot.compare_exchange(*local, claimed, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {
                *local = claimed;
                return;
            }
            Err(current) => {
                *local = current;
                backoff.spin();
            }
        }
    }
}

/// Retires a slot's claim on a node after the slot stopped naming it.
///
/// `old` is the value the slot held when it was swung away. Its count holds
/// one claim for the slot itself and one for the calling thread; all others
/// belong to visitors that will still `release_ref`, so they move into the
/// node's internal count while one structural reference is dropped.
///
/// # Safety
/// `old.ptr()` must be live and the caller must be the thread whose CAS
/// replaced `old` in its slot. The caller must not touch the node afterwards.
pub(crate) unsafe fn free_external_counter<T>(old: CountedPtr<T>, reclaimed: &ReclaimCounter) {
    let node = old.ptr();
    let count_increase = old.external_count().wrapping_sub(2);
    // SAFETY: the caller's own claim is still counted in `old`, so the node
    // cannot have been freed yet.
    let after = unsafe { (*node).update_count(|c| c.folded(count_increase)) };
    if after.is_zero() {
        // SAFETY: no slot names the node and every visitor has released.
        unsafe { destroy(node, reclaimed) };
    }
}

/// Frees a node whose counts both reached zero.
///
/// # Safety
/// `node` must come from `Node::alloc` and no other thread may hold it.
pub(crate) unsafe fn destroy<T>(node: *mut Node<T>, reclaimed: &ReclaimCounter) {
    // SAFETY: upheld by the caller.
    drop(unsafe { Box::from_raw(node) });
    reclaimed.record();
}
