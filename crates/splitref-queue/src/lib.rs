//! Lock-free multi-producer multi-consumer unbounded queue for SplitRef
//!
//! - `queue`: the queue itself (`push`/`pop` built on head/tail CAS loops)
//! - `reclaim`: split internal/external reference counting that frees nodes
//!   once no thread can still be dereferencing them
//! - `node`: list cell with payload slot, next link and composite counter
//! - `counted`: counted pointer packed into a single 64-bit atomic word
//!
//! No locks, hazard pointers or epochs are involved: every node carries its
//! own reference count and is destroyed by whichever thread drops the last
//! claim on it.
//!
//! Node addresses must fit in 48 bits. Allocations above that (5-level
//! paging, 52-bit virtual addresses) panic instead of being truncated.
//!
//! ```
//! use splitref_queue::SplitRefQueue;
//!
//! let queue = SplitRefQueue::new();
//! queue.push(1);
//! queue.push(2);
//! assert_eq!(queue.pop(), Some(1));
//! assert_eq!(queue.pop(), Some(2));
//! assert_eq!(queue.pop(), None);
//! ```

#[cfg(not(target_pointer_width = "64"))]
compile_error!("splitref-queue packs node addresses into 48 bits and requires a 64-bit target");

mod counted;
mod node;
pub mod queue;
pub mod reclaim;
mod sync;

pub use queue::SplitRefQueue;
pub use reclaim::ReclaimCounter;
