//! Atomic primitives shared by the queue internals.
//!
//! With the `loom` feature enabled every atomic comes from loom so the CAS
//! protocol can be model checked; otherwise they are the std types.

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};
#[cfg(feature = "loom")]
pub(crate) use loom::sync::Arc;

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::Arc;

#[cfg(not(feature = "loom"))]
pub(crate) use crossbeam_utils::Backoff;

/// Loom explores every interleaving, so a lost CAS just hands control to
/// another modelled thread instead of spinning.
#[cfg(feature = "loom")]
pub(crate) struct Backoff;

#[cfg(feature = "loom")]
impl Backoff {
    pub(crate) fn new() -> Self {
        Backoff
    }

    pub(crate) fn spin(&self) {
        loom::thread::yield_now();
    }
}
