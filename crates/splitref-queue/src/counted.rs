use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use crate::node::Node;
use crate::sync::{AtomicU64, Ordering};

/// Number of low bits holding the node address.
pub(crate) const ADDR_BITS: u32 = 48;

/// Width of the external count stored above the address.
pub(crate) const COUNT_BITS: u32 = 64 - ADDR_BITS;

const ADDR_MASK: u64 = (1 << ADDR_BITS) - 1;

/// Whether `node` survives packing into the low `ADDR_BITS` bits.
#[inline]
pub(crate) fn fits_address<T>(node: *mut Node<T>) -> bool {
    (node as usize as u64) & !ADDR_MASK == 0
}

/// A node reference bundled with the number of visitors that have claimed it
/// through one particular atomic slot.
///
/// Layout:
/// - address (48 bits): `*mut Node<T>`, zero for null
/// - external count (16 bits): claims taken through the slot, wrapping
///
/// Two counted pointers are equal only if both fields match, which is what
/// the slot CAS compares.
pub(crate) struct CountedPtr<T> {
    raw: u64,
    _marker: PhantomData<*mut Node<T>>,
}

impl<T> CountedPtr<T> {
    #[inline]
    const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) const fn null() -> Self {
        Self::from_raw(0)
    }

    #[inline]
    pub(crate) fn new(node: *mut Node<T>, external_count: u16) -> Self {
        let addr = node as usize as u64;
        debug_assert!(fits_address(node), "node address exceeds 48 bits");
        Self::from_raw(((external_count as u64) << ADDR_BITS) | (addr & ADDR_MASK))
    }

    #[inline]
    pub(crate) fn ptr(self) -> *mut Node<T> {
        let addr = self.raw & ADDR_MASK;
        if addr == 0 {
            ptr::null_mut()
        } else {
            addr as usize as *mut Node<T>
        }
    }

    #[inline]
    pub(crate) const fn external_count(self) -> u16 {
        (self.raw >> ADDR_BITS) as u16
    }

    #[inline]
    pub(crate) const fn is_null(self) -> bool {
        self.raw & ADDR_MASK == 0
    }

    /// Same node, one more external claim. Wraps at `COUNT_BITS`.
    #[inline]
    pub(crate) const fn claimed(self) -> Self {
        let count = self.external_count().wrapping_add(1);
        Self::from_raw((self.raw & ADDR_MASK) | ((count as u64) << ADDR_BITS))
    }
}

impl<T> Clone for CountedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CountedPtr<T> {}

impl<T> PartialEq for CountedPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for CountedPtr<T> {}

impl<T> fmt::Debug for CountedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountedPtr")
            .field("ptr", &self.ptr())
            .field("external_count", &self.external_count())
            .finish()
    }
}

/// Atomic slot holding a [`CountedPtr`]: `head`, `tail` and every `next` link.
pub(crate) struct AtomicCountedPtr<T> {
    raw: AtomicU64,
    _marker: PhantomData<*mut Node<T>>,
}

impl<T> AtomicCountedPtr<T> {
    pub(crate) fn new(value: CountedPtr<T>) -> Self {
        Self {
            raw: AtomicU64::new(value.raw),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> CountedPtr<T> {
        CountedPtr::from_raw(self.raw.load(order))
    }

    /// On failure the error carries the value currently in the slot, so
    /// retry loops can continue from it without reloading.
    #[inline]
    pub(crate) fn compare_exchange(
        &self,
        current: CountedPtr<T>,
        new: CountedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedPtr<T>, CountedPtr<T>> {
        self.raw
            .compare_exchange(current.raw, new.raw, success, failure)
            .map(CountedPtr::from_raw)
            .map_err(CountedPtr::from_raw)
    }
}
