//! Queueing and admission core.
//!
//! - [`SlotQueue`]: bounded, slot-indexed queue with round-robin slot reuse
//! - [`allocator`]: free-slot search and eviction of the oldest entry
//! - [`OverflowMailbox`]: evicted entries with read-then-purge semantics
//! - [`AdmissionController`]: per-request bypass / enqueue / evict decision
//! - [`DispatchLoop`]: periodic drain of the queue onto free devices
//!
//! "Oldest" always means smallest `(source_id, request_id)`, never arrival
//! time, for both eviction and dispatch.

pub mod admission;
pub mod allocator;
pub mod dispatch;
pub mod job;
pub mod mailbox;
pub mod queue;

pub use admission::{Admission, AdmissionController, AdmissionPolicy};
pub use dispatch::{DispatchLoop, TickOutcome, TickReport};
pub use job::{QueueEntry, TrashEntry, WorkItem};
pub use mailbox::OverflowMailbox;
pub use queue::{InsertOutcome, SlotQueue};
