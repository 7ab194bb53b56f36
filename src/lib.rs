//! # batchring - Batched Shared-Memory Ring Buffer
//!
//! A fixed-capacity ring of equally sized slots shared by many producers and
//! up to 16 independent consumer groups.
//!
//! ## Design
//!
//! - Capacity is a power-of-two tier, so a sequence maps to a slot by masking
//! - Producers claim contiguous runs of slots as a numbered batch
//! - Admission is a CAS on the write sequence gated by the slowest group
//! - Consumer groups release batches in claim order, moving their barrier
//! - A slot is reused only after every group released the batch holding it
//! - Producer workflow: `claim` → write entries → `publish` or `cancel`
//! - Consumer workflow: `next_published` → read entries → `release`
//! - Handles are consumed by `publish`, `cancel` and `release`, so no entry
//!   view outlives the state that makes it valid
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use batchring::{CapacityTier, RingBuffer};
//!
//! // 64 slots of 6 payload bytes each
//! let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();
//!
//! // Producer: claim two slots, fill them, publish
//! let mut batch = rb.claim(2, Duration::from_millis(10)).unwrap();
//! batch.copy_to(0, b"hello").unwrap();
//! batch.copy_to(1, b"world").unwrap();
//! batch.publish().unwrap();
//!
//! // Consumer: take the batch, read it, release the slots
//! let read = rb.next_published(0).unwrap().unwrap();
//! assert_eq!(&read.entry(1).unwrap()[..5], b"world");
//! read.release().unwrap();
//! assert_eq!(rb.free_slots(), 64);
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod registry;
mod ring_buffer;
mod sequence;
mod stats;
mod store;
mod wait;

pub use config::{BatchingMode, CapacityTier, RingBufferConfig, MAX_GROUPS};
pub use error::{Error, Result};
pub use registry::{BatchState, UNFULFILLED};
pub use ring_buffer::{Batch, ReadBatch, ReleaseError, RingBuffer};
pub use stats::{GroupStats, Info, Stats};
pub use store::{HeapSlots, SlotHeader, SlotStore, HEADER_SIZE, SLOT_ALIGN};
pub use wait::{ClaimCanceller, PendingClaim};
