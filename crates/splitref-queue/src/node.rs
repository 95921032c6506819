use std::ptr;

use crate::counted::{self, AtomicCountedPtr, CountedPtr, COUNT_BITS};
use crate::reclaim::{self, ReclaimCounter};
use crate::sync::{AtomicPtr, AtomicU32, Ordering};

/// Composite reference count of a node.
///
/// Packed into 32 bits:
/// - internal (bits 0..16): folded visitor claims minus releases, wrapping
/// - external (bits 30..32): structural slots still naming the node (0..=2)
///
/// The internal count is kept modulo `2^COUNT_BITS`, the width of the
/// external count it absorbs from a slot. Its true value never strays
/// further from zero than the number of threads holding claims, so the
/// modular zero test is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeCounter {
    internal: u16,
    external: u8,
}

impl NodeCounter {
    const INTERNAL_MASK: u32 = (1 << COUNT_BITS) - 1;
    const EXTERNAL_SHIFT: u32 = 30;

    /// Fresh node: one claim for the slot it is published through (`tail`),
    /// one for the link that will become `head`.
    pub(crate) const INITIAL: Self = Self {
        internal: 0,
        external: 2,
    };

    #[inline]
    const fn pack(self) -> u32 {
        (self.internal as u32) | ((self.external as u32) << Self::EXTERNAL_SHIFT)
    }

    #[inline]
    const fn unpack(raw: u32) -> Self {
        Self {
            internal: (raw & Self::INTERNAL_MASK) as u16,
            external: (raw >> Self::EXTERNAL_SHIFT) as u8,
        }
    }

    #[inline]
    pub(crate) const fn is_zero(self) -> bool {
        self.internal == 0 && self.external == 0
    }

    /// One visitor finished with the node without retiring a slot.
    #[inline]
    pub(crate) const fn released(self) -> Self {
        Self {
            internal: self.internal.wrapping_sub(1),
            external: self.external,
        }
    }

    /// A slot stopped naming the node; its visitors move into `internal`.
    #[inline]
    pub(crate) fn folded(self, count_increase: u16) -> Self {
        debug_assert!(self.external > 0, "no structural slot left to retire");
        Self {
            internal: self.internal.wrapping_add(count_increase),
            external: self.external - 1,
        }
    }
}

static TAKEN: u8 = 0;

/// Payload value of a node whose value has been popped.
///
/// Never produced by `Box::into_raw`, so a pusher still holding a claim on
/// an already popped node fails its expected-null CAS instead of storing a
/// value behind the head.
#[inline]
pub(crate) fn taken<T>() -> *mut T {
    ptr::addr_of!(TAKEN) as *mut T
}

/// One list cell. The tail sentinel is the only live node with an empty
/// payload; nodes that have been popped hold [`taken`].
pub(crate) struct Node<T> {
    pub(crate) data: AtomicPtr<T>,
    count: AtomicU32,
    pub(crate) next: AtomicCountedPtr<T>,
}

impl<T> Node<T> {
    pub(crate) fn new() -> Self {
        Self {
            data: AtomicPtr::new(ptr::null_mut()),
            count: AtomicU32::new(NodeCounter::INITIAL.pack()),
            next: AtomicCountedPtr::new(CountedPtr::null()),
        }
    }

    /// Heap-allocates an empty sentinel and leaks it as a raw pointer.
    ///
    /// Panics if the allocation lies above the 48-bit range a counted
    /// pointer can hold (5-level paging, 52-bit virtual addresses).
    pub(crate) fn alloc() -> *mut Self {
        let node = Box::into_raw(Box::new(Self::new()));
        assert!(
            counted::fits_address(node),
            "node address {node:p} does not fit in {} bits",
            counted::ADDR_BITS
        );
        node
    }

    #[cfg(test)]
    pub(crate) fn counter(&self) -> NodeCounter {
        NodeCounter::unpack(self.count.load(Ordering::Acquire))
    }

    /// CAS loop applying `f` to the counter; returns the value written.
    pub(crate) fn update_count(&self, f: impl Fn(NodeCounter) -> NodeCounter) -> NodeCounter {
        let mut old = self.count.load(Ordering::Relaxed);
        loop {
            let new = f(NodeCounter::unpack(old));
            match self
                .count
                .compare_exchange(old, new.pack(), Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return new,
                Err(current) => old = current,
            }
        }
    }

    /// Drops one visitor claim obtained through `increase_external_count`
    /// that is not being promoted into the structure. Frees the node when
    /// both counts reach zero.
    ///
    /// # Safety
    /// `this` must be a live node on which the caller holds a claim, and the
    /// caller must not touch the node afterwards.
    pub(crate) unsafe fn release_ref(this: *mut Self, reclaimed: &ReclaimCounter) {
        // SAFETY: the caller's claim keeps the node alive until this update.
        let after = unsafe { (*this).update_count(NodeCounter::released) };
        if after.is_zero() {
            // SAFETY: zero counts mean no slot names the node and no
            // visitor holds it; this thread dropped the last claim.
            unsafe { reclaim::destroy(this, reclaimed) };
        }
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        let data = self.data.swap(ptr::null_mut(), Ordering::Acquire);
        if !data.is_null() && data != taken() {
            // SAFETY: payloads are installed from `Box::into_raw` and taken
            // out exactly once by swapping in the taken marker.
            drop(unsafe { Box::from_raw(data) });
        }
    }
}
